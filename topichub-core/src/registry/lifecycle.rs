use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::models::{ChannelRef, TopicName};
use crate::provider::ChannelProvider;

/// Decides when a topic's delivery channel is created or destroyed, driven
/// by the subscriber counts held in the registry core.
///
/// Channel names carry the deployment zone so different zones never collide
/// on the same topic name.
pub struct QueueLifecycle {
    provider: Arc<dyn ChannelProvider>,
    zone: String,
}

impl QueueLifecycle {
    pub fn new(provider: Arc<dyn ChannelProvider>, zone: impl Into<String>) -> Self {
        Self {
            provider,
            zone: zone.into(),
        }
    }

    #[must_use]
    pub fn zone(&self) -> &str {
        &self.zone
    }

    #[must_use]
    pub fn provider(&self) -> &Arc<dyn ChannelProvider> {
        &self.provider
    }

    fn scoped_name(&self, topic: &TopicName) -> String {
        format!("{}:{}", self.zone, topic.as_str())
    }

    /// Idempotently return an existing provider-side channel for `topic`, or
    /// create one. Failure leaves no registry entry behind.
    pub async fn ensure(&self, topic: &TopicName) -> Result<ChannelRef> {
        match self.provider.create_channel(&self.scoped_name(topic)).await {
            Ok(reference) => {
                debug!(topic = %topic, reference = %reference, "channel ensured");
                Ok(reference)
            }
            Err(e) => Err(Error::ChannelCreateFailed {
                topic: topic.as_str().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Best-effort channel deletion. Failure is logged, never fatal: the
    /// registry entry is removed regardless and the provider-side object may
    /// leak.
    pub async fn teardown(&self, topic: &TopicName, reference: &ChannelRef) {
        if let Err(e) = self.provider.delete_channel(reference).await {
            let err = Error::ChannelDeleteFailed {
                reference: reference.as_str().to_string(),
                reason: e.to_string(),
            };
            warn!(topic = %topic, error = %err, "channel teardown failed");
        } else {
            debug!(topic = %topic, reference = %reference, "channel torn down");
        }
    }
}
