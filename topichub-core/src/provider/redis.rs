use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::StreamExt;
use redis::{AsyncCommands, Client as RedisClient, Direction};
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::traits::{ChannelProvider, ProviderMessage, WireMessage, QUEUE_PROTOCOL};
use crate::error::{Error, Result};
use crate::models::ChannelRef;

/// Initial backoff delay for forwarder reconnection
const INITIAL_BACKOFF_SECS: u64 = 1;

/// Maximum backoff delay for forwarder reconnection
const MAX_BACKOFF_SECS: u64 = 30;

/// Key prefix for delivery channels (Redis lists)
const QUEUE_PREFIX: &str = "topichub:queue:";

/// Key prefix for fan-out topics (Redis Pub/Sub channels)
const TOPIC_PREFIX: &str = "topichub:fanout:";

/// Redis-backed channel provider.
///
/// Delivery channels are Redis lists: `LPUSH` to send, `BLMOVE` into a
/// per-channel pending list to receive, `LREM` on the pending list to
/// acknowledge. Fan-out topics are Pub/Sub channels; `subscribe` wires a
/// topic into a list queue through a background forwarder task so the queue
/// can be long-polled like any other channel.
///
/// Every call carries an explicit timeout so a slow or unavailable Redis
/// cannot hang a registry operation.
pub struct RedisChannelProvider {
    client: RedisClient,
    op_timeout: Duration,
    forwarders: DashMap<String, CancellationToken>,
}

impl RedisChannelProvider {
    pub fn new(url: &str, op_timeout: Duration) -> Result<Self> {
        let client = RedisClient::open(url).map_err(Error::provider)?;
        Ok(Self {
            client,
            op_timeout,
            forwarders: DashMap::new(),
        })
    }

    /// Cancel all fan-out forwarder tasks.
    pub fn shutdown(&self) {
        for entry in self.forwarders.iter() {
            entry.value().cancel();
        }
    }

    async fn with_timeout<T>(
        &self,
        what: &str,
        fut: impl Future<Output = redis::RedisResult<T>>,
    ) -> Result<T> {
        match timeout(self.op_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(Error::provider(e)),
            Err(_) => Err(Error::ProviderUnavailable(format!("timed out: {what}"))),
        }
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.with_timeout("connect", self.client.get_multiplexed_async_connection())
            .await
    }

    fn pending_key(reference: &ChannelRef) -> String {
        format!("{}:pending", reference.as_str())
    }
}

#[async_trait]
impl ChannelProvider for RedisChannelProvider {
    async fn create_channel(&self, name: &str) -> Result<ChannelRef> {
        // The reference is derived from the name, so create is naturally
        // idempotent; the connection check surfaces an unreachable provider
        // at creation time instead of first use.
        self.conn().await?;
        Ok(ChannelRef::from_string(format!("{QUEUE_PREFIX}{name}")))
    }

    async fn delete_channel(&self, reference: &ChannelRef) -> Result<()> {
        let mut conn = self.conn().await?;
        let keys = [reference.as_str().to_string(), Self::pending_key(reference)];
        let _: i64 = self
            .with_timeout("delete channel", conn.del(&keys[..]))
            .await?;
        Ok(())
    }

    async fn send(
        &self,
        reference: &ChannelRef,
        payload: &str,
        metadata: HashMap<String, String>,
    ) -> Result<()> {
        let mut conn = self.conn().await?;
        let item = serde_json::to_string(&WireMessage::new(payload, metadata))?;
        let _: i64 = self
            .with_timeout("send", conn.lpush(reference.as_str(), item))
            .await?;
        Ok(())
    }

    async fn receive(
        &self,
        reference: &ChannelRef,
        wait: Duration,
    ) -> Result<Option<ProviderMessage>> {
        let mut conn = self.conn().await?;
        let pending = Self::pending_key(reference);

        // BLMOVE parks the message in the pending list until it is
        // acknowledged via delete_message. The outer timeout budgets for the
        // full long-poll on top of the per-operation allowance.
        let fut = conn.blmove(
            reference.as_str(),
            pending.as_str(),
            Direction::Right,
            Direction::Left,
            wait.as_secs_f64(),
        );
        let raw: Option<String> = match timeout(wait + self.op_timeout, fut).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => return Err(Error::provider(e)),
            Err(_) => return Err(Error::ProviderUnavailable("timed out: receive".to_string())),
        };

        Ok(raw.map(WireMessage::decode))
    }

    async fn delete_message(&self, reference: &ChannelRef, handle: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let pending = Self::pending_key(reference);
        let removed: i64 = self
            .with_timeout("delete message", conn.lrem(pending.as_str(), 1, handle))
            .await?;
        if removed == 0 {
            debug!(reference = %reference, "receipt handle not found in pending list");
        }
        Ok(())
    }

    async fn create_topic(&self, name: &str) -> Result<ChannelRef> {
        // Pub/Sub channels exist implicitly; the connection check mirrors
        // create_channel.
        self.conn().await?;
        Ok(ChannelRef::from_string(format!("{TOPIC_PREFIX}{name}")))
    }

    async fn publish(&self, topic: &ChannelRef, payload: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let subscribers: usize = self
            .with_timeout("publish", conn.publish(topic.as_str(), payload))
            .await?;
        debug!(topic = %topic, subscribers = subscribers, "published to fan-out topic");
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

        let handle = format!("sub:{}", nanoid::nanoid!(8));
        let cancel = CancellationToken::new();
        self.forwarders.insert(handle.clone(), cancel.clone());

        let client = self.client.clone();
        let op_timeout = self.op_timeout;
        let topic = topic.clone();
        let endpoint = endpoint.clone();

        // Forwarder task: drain the Pub/Sub channel into the endpoint list
        // queue, reconnecting with exponential backoff.
        tokio::spawn(async move {
            let mut backoff_secs = INITIAL_BACKOFF_SECS;
            loop {
                if cancel.is_cancelled() {
                    return;
                }

                match run_forwarder(&client, op_timeout, &topic, &endpoint, &cancel).await {
                    ForwarderExit::Cancelled => {
                        info!(topic = %topic, "fan-out forwarder cancelled");
                        return;
                    }
                    ForwarderExit::Disconnected => {
                        // The connection was healthy before it dropped.
                        warn!(topic = %topic, "fan-out forwarder disconnected, reconnecting");
                        backoff_secs = INITIAL_BACKOFF_SECS;
                    }
                    ForwarderExit::ConnectFailed(e) => {
                        warn!(
                            topic = %topic,
                            error = %e,
                            backoff_secs = backoff_secs,
                            "fan-out forwarder failed to connect, retrying after backoff"
                        );
                    }
                }

                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(Duration::from_secs(backoff_secs)) => {}
                }
                backoff_secs = (backoff_secs * 2).min(MAX_BACKOFF_SECS);
            }
        });

        Ok(handle)
    }
}

/// Describes how a forwarder connection attempt ended.
enum ForwarderExit {
    Cancelled,
    Disconnected,
    ConnectFailed(Error),
}

async fn run_forwarder(
    client: &RedisClient,
    op_timeout: Duration,
    topic: &ChannelRef,
    endpoint: &ChannelRef,
    cancel: &CancellationToken,
) -> ForwarderExit {
    let mut pubsub = match timeout(op_timeout, client.get_async_pubsub()).await {
        Ok(Ok(ps)) => ps,
        Ok(Err(e)) => return ForwarderExit::ConnectFailed(Error::provider(e)),
        Err(_) => {
            return ForwarderExit::ConnectFailed(Error::ProviderUnavailable(
                "timed out: pubsub connect".to_string(),
            ))
        }
    };

    match timeout(op_timeout, pubsub.subscribe(topic.as_str())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return ForwarderExit::ConnectFailed(Error::provider(e)),
        Err(_) => {
            return ForwarderExit::ConnectFailed(Error::ProviderUnavailable(
                "timed out: pubsub subscribe".to_string(),
            ))
        }
    }

    let mut push_conn = match timeout(op_timeout, client.get_multiplexed_async_connection()).await
    {
        Ok(Ok(conn)) => conn,
        Ok(Err(e)) => return ForwarderExit::ConnectFailed(Error::provider(e)),
        Err(_) => {
            return ForwarderExit::ConnectFailed(Error::ProviderUnavailable(
                "timed out: connect".to_string(),
            ))
        }
    };

    info!(topic = %topic, endpoint = %endpoint, "fan-out forwarder connected");

    let mut stream = pubsub.on_message();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return ForwarderExit::Cancelled,
            msg = stream.next() => {
                let Some(msg) = msg else {
                    return ForwarderExit::Disconnected;
                };
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "invalid fan-out payload, dropping");
                        continue;
                    }
                };
                let item = match serde_json::to_string(&WireMessage::new(&payload, HashMap::new())) {
                    Ok(item) => item,
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "failed to encode fan-out item, dropping");
                        continue;
                    }
                };
                let pushed: redis::RedisResult<i64> =
                    push_conn.lpush(endpoint.as_str(), item).await;
                if let Err(e) = pushed {
                    warn!(endpoint = %endpoint, error = %e, "failed to enqueue fan-out message");
                    return ForwarderExit::Disconnected;
                }
            }
        }
    }
}
