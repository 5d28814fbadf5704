use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::error::Result;
use crate::models::ChannelRef;

/// The only subscription protocol the adapters support: fan-out messages are
/// delivered into a provider queue.
pub const QUEUE_PROTOCOL: &str = "queue";

/// A message pulled from a delivery channel.
///
/// `handle` is the provider's receipt handle: it must be passed back to
/// `delete_message` to acknowledge the message.
#[derive(Debug, Clone)]
pub struct ProviderMessage {
    pub body: String,
    pub handle: String,
    pub metadata: HashMap<String, String>,
}

/// On-queue encoding shared by the adapters: body plus sender metadata,
/// stamped with a per-message id so receipt handles stay unique.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct WireMessage {
    pub id: String,
    pub body: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl WireMessage {
    pub(crate) fn new(body: &str, metadata: HashMap<String, String>) -> Self {
        Self {
            id: nanoid::nanoid!(16),
            body: body.to_string(),
            metadata,
        }
    }

    /// Decode a raw queue item into a `ProviderMessage`. Items that are not
    /// wire-encoded (foreign producers) are passed through as a bare body.
    pub(crate) fn decode(raw: String) -> ProviderMessage {
        match serde_json::from_str::<Self>(&raw) {
            Ok(wire) => ProviderMessage {
                body: wire.body,
                handle: raw,
                metadata: wire.metadata,
            },
            Err(_) => ProviderMessage {
                body: raw.clone(),
                handle: raw,
                metadata: HashMap::new(),
            },
        }
    }
}

/// Narrow pass-through interface to the managed queue/topic provider.
///
/// Implementations hold no registry state and propagate provider errors as
/// `ProviderUnavailable`; retry/backoff policy belongs here, never in the
/// registry layer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelProvider: Send + Sync {
    /// Create-or-get a delivery channel. The returned reference is derived
    /// deterministically from `name`, so concurrent creators converge on the
    /// same channel.
    async fn create_channel(&self, name: &str) -> Result<ChannelRef>;

    async fn delete_channel(&self, reference: &ChannelRef) -> Result<()>;

    async fn send(
        &self,
        reference: &ChannelRef,
        payload: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()>;

    /// Long-poll receive: blocks up to `wait`, returns `None` on timeout.
    async fn receive(&self, reference: &ChannelRef, wait: Duration)
        -> Result<Option<ProviderMessage>>;

    /// Acknowledge a received message so it is not redelivered.
    async fn delete_message(&self, reference: &ChannelRef, handle: &str) -> Result<()>;

    /// Create-or-get a fan-out topic.
    async fn create_topic(&self, name: &str) -> Result<ChannelRef>;

    /// One-to-many broadcast to every channel subscribed to the topic.
    async fn publish(&self, topic: &ChannelRef, payload: &str) -> Result<()>;

    /// Wire a channel to receive the topic's broadcasts. Only
    /// `QUEUE_PROTOCOL` endpoints are supported.
    async fn subscribe(
        &self,
        topic: &ChannelRef,
        protocol: &str,
        endpoint: &ChannelRef,
    ) -> Result<String>;
}
