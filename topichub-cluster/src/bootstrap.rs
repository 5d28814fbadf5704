//! Replication wiring
//!
//! Each replica shares one zone-wide fan-out topic and owns a dedicated
//! inbound queue wired to it. Snapshots published by any replica land in
//! every replica's inbound queue, including the publisher's own (its
//! listener drops those by origin).

use std::sync::Arc;
use tracing::info;

use topichub_core::models::ChannelRef;
use topichub_core::provider::{ChannelProvider, QUEUE_PROTOCOL};
use topichub_core::Result;

/// Channel references produced by replication bootstrap.
#[derive(Debug, Clone)]
pub struct ReplicationWiring {
    pub fanout: ChannelRef,
    pub inbound: ChannelRef,
}

fn fanout_topic_name(zone: &str) -> String {
    format!("{zone}:replication")
}

fn inbound_queue_name(zone: &str, node_id: &str) -> String {
    format!("{zone}:replication:{node_id}")
}

/// Ensure the zone's fan-out topic exists, create this replica's inbound
/// queue, and subscribe the queue to the topic.
pub async fn bind_replication(
    provider: &Arc<dyn ChannelProvider>,
    zone: &str,
    node_id: &str,
) -> Result<ReplicationWiring> {
    let fanout = provider.create_topic(&fanout_topic_name(zone)).await?;
    let inbound = provider
        .create_channel(&inbound_queue_name(zone, node_id))
        .await?;
    let subscription = provider
        .subscribe(&fanout, QUEUE_PROTOCOL, &inbound)
        .await?;

    info!(
        fanout = %fanout,
        inbound = %inbound,
        subscription = %subscription,
        "replication wired to fan-out topic"
    );

    Ok(ReplicationWiring { fanout, inbound })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use topichub_core::provider::MemoryProvider;

    #[tokio::test]
    async fn test_bind_replication_wires_topic_to_queue() {
        let provider: Arc<dyn ChannelProvider> = Arc::new(MemoryProvider::new());
        let wiring = bind_replication(&provider, "rome", "r1")
            .await
            .expect("bind");

        provider
            .publish(&wiring.fanout, "snapshot")
            .await
            .expect("publish");
        let message = provider
            .receive(&wiring.inbound, Duration::from_secs(1))
            .await
            .expect("receive")
            .expect("delivered");
        assert_eq!(message.body, "snapshot");

        // Re-binding the same replica is idempotent: no duplicate delivery.
        let rewired = bind_replication(&provider, "rome", "r1")
            .await
            .expect("rebind");
        assert_eq!(rewired.inbound, wiring.inbound);
        provider
            .publish(&wiring.fanout, "second")
            .await
            .expect("publish");
        let message = provider
            .receive(&wiring.inbound, Duration::from_secs(1))
            .await
            .expect("receive")
            .expect("delivered");
        assert_eq!(message.body, "second");
        assert!(provider
            .receive(&wiring.inbound, Duration::from_millis(50))
            .await
            .expect("receive")
            .is_none());
    }
}
