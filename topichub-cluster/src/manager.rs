use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::info;

use topichub_core::provider::ChannelProvider;
use topichub_core::registry::TopicRegistry;
use topichub_core::Result;

use crate::bootstrap::bind_replication;
use crate::listener::ReplicationListener;
use crate::publisher::ReplicationPublisher;

/// Replication configuration
#[derive(Debug, Clone)]
pub struct ReplicationConfig {
    /// Unique identifier for this replica
    pub node_id: String,
    /// Deployment zone; namespaces the fan-out topic and inbound queue
    pub zone: String,
    /// Long-poll timeout for the listener's receive call
    pub poll_timeout: Duration,
    /// Capacity of the outbound snapshot queue
    pub publish_queue_capacity: usize,
}

/// Owns a replica's replication tasks: the snapshot publisher and the
/// inbound listener, wired through the provider's fan-out topic.
pub struct ReplicationManager {
    node_id: String,
    cancel: CancellationToken,
}

impl ReplicationManager {
    /// Wire replication for one replica: bootstrap the fan-out topic and
    /// inbound queue, start the publisher and listener tasks, and attach the
    /// outbound queue to the registry so every local mutation enqueues a
    /// snapshot.
    pub async fn start(
        provider: Arc<dyn ChannelProvider>,
        registry: Arc<TopicRegistry>,
        config: ReplicationConfig,
    ) -> Result<Self> {
        let wiring = bind_replication(&provider, &config.zone, &config.node_id).await?;
        let cancel = CancellationToken::new();

        let publish_tx = ReplicationPublisher::start(
            provider.clone(),
            wiring.fanout,
            config.node_id.clone(),
            config.publish_queue_capacity,
            cancel.clone(),
        );
        registry.set_replication_sink(publish_tx);

        ReplicationListener::new(
            provider,
            registry,
            wiring.inbound,
            config.node_id.clone(),
            config.poll_timeout,
            cancel.clone(),
        )
        .spawn();

        info!(node_id = %config.node_id, zone = %config.zone, "replication started");
        Ok(Self {
            node_id: config.node_id,
            cancel,
        })
    }

    #[must_use]
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Stop both replication tasks.
    pub fn shutdown(&self) {
        info!(node_id = %self.node_id, "shutting down replication");
        self.cancel.cancel();
    }
}
