use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use topichub_core::models::ChannelRef;
use topichub_core::provider::ChannelProvider;
use topichub_core::registry::IdentityRecord;

use crate::snapshot::SnapshotEnvelope;

/// Drains the bounded outbound snapshot queue onto the shared fan-out topic.
///
/// The mutation path enqueues with `try_send` and never blocks; a full
/// queue drops the snapshot with a warning (a later mutation publishes a
/// newer full view anyway). Publish failures are logged, never retried;
/// the mutation that queued the snapshot has long since returned.
pub struct ReplicationPublisher;

impl ReplicationPublisher {
    pub fn start(
        provider: Arc<dyn ChannelProvider>,
        fanout: ChannelRef,
        origin: String,
        capacity: usize,
        cancel: CancellationToken,
    ) -> mpsc::Sender<Vec<IdentityRecord>> {
        let (tx, mut rx) = mpsc::channel::<Vec<IdentityRecord>>(capacity);

        tokio::spawn(async move {
            loop {
                let records = tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("replication publisher cancelled");
                        return;
                    }
                    records = rx.recv() => records,
                };
                let Some(records) = records else {
                    warn!("replication publish queue closed, exiting");
                    return;
                };

                let envelope = SnapshotEnvelope::new(origin.clone(), records);
                let payload = match envelope.encode() {
                    Ok(payload) => payload,
                    Err(e) => {
                        error!(error = %e, "failed to encode snapshot, dropping");
                        continue;
                    }
                };

                match provider.publish(&fanout, &payload).await {
                    Ok(()) => {
                        debug!(records = envelope.records.len(), "snapshot published");
                    }
                    Err(e) => {
                        warn!(error = %e, "snapshot publication failed, dropping");
                    }
                }
            }
        });

        tx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use topichub_core::models::{IdentityId, TopicName};
    use topichub_core::provider::{MemoryProvider, QUEUE_PROTOCOL};

    #[tokio::test]
    async fn test_publisher_fans_snapshot_out_to_subscribed_queue() {
        let provider = Arc::new(MemoryProvider::new());
        let fanout = provider.create_topic("rome:replication").await.expect("topic");
        let inbound = provider
            .create_channel("rome:replication:r2")
            .await
            .expect("queue");
        provider
            .subscribe(&fanout, QUEUE_PROTOCOL, &inbound)
            .await
            .expect("wire");

        let cancel = CancellationToken::new();
        let tx = ReplicationPublisher::start(
            provider.clone(),
            fanout,
            "r1".to_string(),
            8,
            cancel.clone(),
        );

        tx.send(vec![IdentityRecord {
            identity: IdentityId::from_string("u1".to_string()),
            topics: vec![TopicName::from("weather")],
        }])
        .await
        .expect("enqueue snapshot");

        let message = provider
            .receive(&inbound, Duration::from_secs(1))
            .await
            .expect("receive")
            .expect("snapshot delivered");
        let envelope = SnapshotEnvelope::decode(&message.body).expect("decode");
        assert_eq!(envelope.origin, "r1");
        assert_eq!(envelope.records[0].identity.as_str(), "u1");

        cancel.cancel();
    }
}
