use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use topichub_core::models::ChannelRef;
use topichub_core::provider::ChannelProvider;
use topichub_core::registry::TopicRegistry;

use crate::snapshot::SnapshotEnvelope;

/// Initial backoff after a failed receive
const INITIAL_BACKOFF_SECS: u64 = 1;

/// Maximum backoff after repeated failed receives
const MAX_BACKOFF_SECS: u64 = 30;

/// The registry's only consumer of cross-replica updates.
///
/// One task per replica long-polls the replica's dedicated inbound queue,
/// decodes snapshot envelopes and merges them into the registry. Messages
/// are always deleted from the queue; decode failures are logged and the
/// poison message dropped, so it can never wedge the loop. Merging never
/// publishes, and own-origin envelopes are skipped, so snapshots cannot
/// loop between replicas.
pub struct ReplicationListener {
    provider: Arc<dyn ChannelProvider>,
    registry: Arc<TopicRegistry>,
    inbound: ChannelRef,
    origin: String,
    poll_timeout: Duration,
    cancel: CancellationToken,
}

impl ReplicationListener {
    pub fn new(
        provider: Arc<dyn ChannelProvider>,
        registry: Arc<TopicRegistry>,
        inbound: ChannelRef,
        origin: impl Into<String>,
        poll_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            provider,
            registry,
            inbound,
            origin: origin.into(),
            poll_timeout,
            cancel,
        }
    }

    /// Run the loop on its own task so it never blocks RPC handling.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!(inbound = %self.inbound, "replication listener started");
        let mut backoff_secs = INITIAL_BACKOFF_SECS;

        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("replication listener cancelled");
                    return;
                }
                received = self.provider.receive(&self.inbound, self.poll_timeout) => received,
            };

            match received {
                // Long-poll timeout: nothing to merge, poll again.
                Ok(None) => {
                    backoff_secs = INITIAL_BACKOFF_SECS;
                }
                Ok(Some(message)) => {
                    backoff_secs = INITIAL_BACKOFF_SECS;
                    self.handle_message(&message.body, &message.handle).await;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        backoff_secs = backoff_secs,
                        "replication receive failed, backing off"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => {
                            info!("replication listener cancelled during backoff");
                            return;
                        }
                        _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                    }
                    backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
                }
            }
        }
    }

    async fn handle_message(&self, body: &str, handle: &str) {
        // Delete first: a poison message must never block the loop.
        if let Err(e) = self.provider.delete_message(&self.inbound, handle).await {
            warn!(error = %e, "failed to delete replication message");
        }

        match SnapshotEnvelope::decode(body) {
            Ok(envelope) if envelope.origin == self.origin => {
                debug!("ignoring own snapshot echo");
            }
            Ok(envelope) => {
                debug!(
                    origin = %envelope.origin,
                    records = envelope.records.len(),
                    "merging remote snapshot"
                );
                self.registry.merge_remote_snapshot(&envelope.records);
            }
            Err(e) => {
                warn!(error = %e, "dropping undecodable replication message");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use topichub_core::models::{IdentityId, TopicName};
    use topichub_core::provider::MemoryProvider;
    use topichub_core::registry::{IdentityRecord, QueueLifecycle};

    fn test_registry(provider: &Arc<MemoryProvider>) -> Arc<TopicRegistry> {
        let lifecycle = QueueLifecycle::new(provider.clone(), "rome");
        Arc::new(TopicRegistry::new(lifecycle, 10))
    }

    async fn send_raw(provider: &Arc<MemoryProvider>, inbound: &ChannelRef, body: &str) {
        provider
            .send(inbound, body, HashMap::new())
            .await
            .expect("send");
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..100 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("condition not reached within 2s");
    }

    fn listener(
        provider: &Arc<MemoryProvider>,
        registry: &Arc<TopicRegistry>,
        inbound: &ChannelRef,
        origin: &str,
        cancel: &CancellationToken,
    ) -> ReplicationListener {
        ReplicationListener::new(
            provider.clone(),
            registry.clone(),
            inbound.clone(),
            origin,
            Duration::from_millis(200),
            cancel.clone(),
        )
    }

    #[tokio::test]
    async fn test_listener_merges_remote_snapshot_and_acks() {
        let provider = Arc::new(MemoryProvider::new());
        let registry = test_registry(&provider);
        let inbound = provider
            .create_channel("rome:replication:r2")
            .await
            .expect("queue");
        let cancel = CancellationToken::new();
        listener(&provider, &registry, &inbound, "r2", &cancel).spawn();

        let envelope = SnapshotEnvelope::new(
            "r1",
            vec![IdentityRecord {
                identity: IdentityId::from_string("u1".to_string()),
                topics: vec![TopicName::from("weather")],
            }],
        );
        send_raw(&provider, &inbound, &envelope.encode().expect("encode")).await;

        let registry_check = registry.clone();
        wait_until(move || {
            registry_check
                .identity_topics(&IdentityId::from_string("u1".to_string()))
                .is_some()
        })
        .await;

        assert_eq!(
            registry.identity_topics(&IdentityId::from_string("u1".to_string())),
            Some(vec![TopicName::from("weather")])
        );
        assert_eq!(provider.queue_depth(&inbound), 0);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_listener_skips_own_origin() {
        let provider = Arc::new(MemoryProvider::new());
        let registry = test_registry(&provider);
        let inbound = provider
            .create_channel("rome:replication:r1")
            .await
            .expect("queue");
        let cancel = CancellationToken::new();
        listener(&provider, &registry, &inbound, "r1", &cancel).spawn();

        let own = SnapshotEnvelope::new(
            "r1",
            vec![IdentityRecord {
                identity: IdentityId::from_string("echo".to_string()),
                topics: vec![],
            }],
        );
        send_raw(&provider, &inbound, &own.encode().expect("encode")).await;

        let provider_check = provider.clone();
        let inbound_check = inbound.clone();
        wait_until(move || provider_check.queue_depth(&inbound_check) == 0).await;

        assert!(registry
            .identity_topics(&IdentityId::from_string("echo".to_string()))
            .is_none());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_poison_message_is_dropped_and_loop_continues() {
        let provider = Arc::new(MemoryProvider::new());
        let registry = test_registry(&provider);
        let inbound = provider
            .create_channel("rome:replication:r2")
            .await
            .expect("queue");
        let cancel = CancellationToken::new();
        listener(&provider, &registry, &inbound, "r2", &cancel).spawn();

        send_raw(&provider, &inbound, "{malformed").await;
        let valid = SnapshotEnvelope::new(
            "r1",
            vec![IdentityRecord {
                identity: IdentityId::from_string("u2".to_string()),
                topics: vec![TopicName::from("sports")],
            }],
        );
        send_raw(&provider, &inbound, &valid.encode().expect("encode")).await;

        let registry_check = registry.clone();
        wait_until(move || {
            registry_check
                .identity_topics(&IdentityId::from_string("u2".to_string()))
                .is_some()
        })
        .await;
        assert_eq!(provider.queue_depth(&inbound), 0);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancellation_stops_listener() {
        let provider = Arc::new(MemoryProvider::new());
        let registry = test_registry(&provider);
        let inbound = provider
            .create_channel("rome:replication:r2")
            .await
            .expect("queue");
        let cancel = CancellationToken::new();
        let handle = listener(&provider, &registry, &inbound, "r2", &cancel).spawn();

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("listener exits promptly")
            .expect("listener task");
    }
}
