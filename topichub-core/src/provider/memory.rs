use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::debug;

use super::traits::{ChannelProvider, ProviderMessage, WireMessage, QUEUE_PROTOCOL};
use crate::error::{Error, Result};
use crate::models::ChannelRef;

/// In-process channel provider.
///
/// Backs tests and single-node runs where no external provider is
/// configured. Queues, fan-out wiring and in-flight messages all live in
/// process memory; nothing survives a restart.
#[derive(Default)]
pub struct MemoryProvider {
    queues: DashMap<String, Arc<QueueState>>,
    /// topic reference -> endpoint queue references
    topics: DashMap<String, Vec<String>>,
    /// receipt handle -> raw item, for acknowledge bookkeeping
    pending: DashMap<String, String>,
}

struct QueueState {
    items: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl QueueState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        })
    }

    fn push(&self, item: String) {
        self.items.lock().push_back(item);
        self.notify.notify_one();
    }
}

impl MemoryProvider {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, reference: &ChannelRef) -> Option<Arc<QueueState>> {
        self.queues.get(reference.as_str()).map(|q| q.clone())
    }

    /// Number of messages currently sitting in a queue (test helper).
    #[must_use]
    pub fn queue_depth(&self, reference: &ChannelRef) -> usize {
        self.queue(reference).map_or(0, |q| q.items.lock().len())
    }

    /// Whether a channel currently exists (test helper).
    #[must_use]
    pub fn has_channel(&self, reference: &ChannelRef) -> bool {
        self.queues.contains_key(reference.as_str())
    }
}

#[async_trait]
impl ChannelProvider for MemoryProvider {
    async fn create_channel(&self, name: &str) -> Result<ChannelRef> {
        let reference = ChannelRef::from_string(format!("mem:queue:{name}"));
        self.queues
            .entry(reference.as_str().to_string())
            .or_insert_with(QueueState::new);
        Ok(reference)
    }

    async fn delete_channel(&self, reference: &ChannelRef) -> Result<()> {
        self.queues.remove(reference.as_str());
        Ok(())
    }

    async fn send(
        &self,
        reference: &ChannelRef,
        payload: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let queue = self
            .queue(reference)
            .ok_or_else(|| Error::ProviderUnavailable(format!("no such channel: {reference}")))?;
        let item = serde_json::to_string(&WireMessage::new(payload, metadata))?;
        queue.push(item);
        Ok(())
    }

    async fn receive(
        &self,
        reference: &ChannelRef,
        wait: Duration,
    ) -> Result<Option<ProviderMessage>> {
        let queue = self
            .queue(reference)
            .ok_or_else(|| Error::ProviderUnavailable(format!("no such channel: {reference}")))?;
        let deadline = tokio::time::Instant::now() + wait;

        loop {
            // Register interest before checking, so a push between the check
            // and the await is not missed.
            let notified = queue.notify.notified();
            let item = queue.items.lock().pop_front();
            if let Some(raw) = item {
                let message = WireMessage::decode(raw.clone());
                self.pending.insert(message.handle.clone(), raw);
                return Ok(Some(message));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn delete_message(&self, _reference: &ChannelRef, handle: &str) -> Result<()> {
        self.pending.remove(handle);
        Ok(())
    }

    async fn create_topic(&self, name: &str) -> Result<ChannelRef> {
        let reference = ChannelRef::from_string(format!("mem:topic:{name}"));
        self.topics
            .entry(reference.as_str().to_string())
            .or_default();
        Ok(reference)
    }

    async fn publish(&self, topic: &ChannelRef, payload: &str) -> Result<()> {
        let endpoints = self
            .topics
            .get(topic.as_str())
            .map(|subs| subs.clone())
            .unwrap_or_default();

        for endpoint in endpoints {
            // Deleted endpoint queues are skipped, matching provider-side
            // fan-out to a dangling subscription.
            if let Some(queue) = self.queues.get(&endpoint) {
                let item = serde_json::to_string(&WireMessage::new(payload, HashMap::new()))?;
                queue.push(item);
            } else {
                debug!(endpoint = %endpoint, "fan-out endpoint gone, skipping");
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &ChannelRef,
        protocol: &str,
        endpoint: &ChannelRef,
    ) -> Result<String> {
        if protocol != QUEUE_PROTOCOL {
            return Err(Error::Configuration(format!(
                "unsupported subscription protocol: {protocol}"
            )));
        }
        let mut subs = self
            .topics
            .get_mut(topic.as_str())
            .ok_or_else(|| Error::ProviderUnavailable(format!("no such topic: {topic}")))?;
        if !subs.contains(&endpoint.as_str().to_string()) {
            subs.push(endpoint.as_str().to_string());
        }
        Ok(format!("{}::{}", topic.as_str(), endpoint.as_str()))
    }
}
