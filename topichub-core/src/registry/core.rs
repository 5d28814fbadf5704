use parking_lot::RwLock;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::lifecycle::QueueLifecycle;
use super::state::{IdentityRecord, RegistryState, TopicEntry};
use crate::error::{Error, Result};
use crate::models::{ChannelRef, IdentityId, TopicName};

/// Counters over the registry's current view.
#[derive(Debug, Clone)]
pub struct RegistryMetrics {
    pub identities: usize,
    pub topics: usize,
}

/// The registry core: sole owner of the identity->topics and topic->entry
/// maps, serialized through one shared/exclusive lock.
///
/// The lock is never held across a provider call. Operations that need one
/// run check -> release -> provider call -> re-acquire -> re-validate -> commit;
/// channel creation is idempotent (references derive from the
/// zone-namespaced topic name), so two racing creators converge on the same
/// reference and the commit only reconciles the count.
pub struct TopicRegistry {
    state: RwLock<RegistryState>,
    lifecycle: QueueLifecycle,
    identity_attempts: u32,
    replication_tx: OnceLock<mpsc::Sender<Vec<IdentityRecord>>>,
}

impl TopicRegistry {
    pub fn new(lifecycle: QueueLifecycle, identity_attempts: u32) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            lifecycle,
            identity_attempts,
            replication_tx: OnceLock::new(),
        }
    }

    /// Attach the outbound replication queue. Every successful local
    /// mutation enqueues a full snapshot on it.
    pub fn set_replication_sink(&self, tx: mpsc::Sender<Vec<IdentityRecord>>) {
        if self.replication_tx.set(tx).is_err() {
            warn!("replication sink already attached, ignoring");
        }
    }

    /// Register a new identity: a random token not already present, with an
    /// empty topic sequence. The retry loop is bounded; exhaustion means the
    /// token space is misconfigured, not that the caller should retry.
    pub fn generate_identity(&self) -> Result<IdentityId> {
        for _ in 0..self.identity_attempts {
            let candidate = IdentityId::generate();
            let inserted = {
                let mut state = self.state.write();
                if state.identities.contains_key(&candidate) {
                    false
                } else {
                    state.identities.insert(candidate.clone(), Vec::new());
                    true
                }
            };
            if inserted {
                info!(identity = %candidate, "identity registered");
                self.broadcast_snapshot();
                return Ok(candidate);
            }
        }
        Err(Error::IdentityGenerationExhausted {
            attempts: self.identity_attempts,
        })
    }

    /// Subscribe `identity` to `topic`, creating the delivery channel on the
    /// first subscriber. Returns the channel reference.
    pub async fn subscribe(&self, identity: &IdentityId, topic: &TopicName) -> Result<ChannelRef> {
        // Fast-path validation under the shared lock, before any provider
        // traffic.
        {
            let state = self.state.read();
            let topics = state
                .identities
                .get(identity)
                .ok_or_else(|| Error::UnknownIdentity(identity.as_str().to_string()))?;
            if topics.contains(topic) {
                return Err(Error::AlreadySubscribed {
                    identity: identity.as_str().to_string(),
                    topic: topic.as_str().to_string(),
                });
            }
        }

        loop {
            let needs_channel = { !self.state.read().topics.contains_key(topic) };
            let created = if needs_channel {
                Some(self.lifecycle.ensure(topic).await?)
            } else {
                None
            };

            // Commit under the exclusive lock, re-validating everything the
            // provider call may have raced with.
            let mut state = self.state.write();
            let subscribed = match state.identities.get(identity) {
                Some(topics) => topics.contains(topic),
                None => return Err(Error::UnknownIdentity(identity.as_str().to_string())),
            };
            if subscribed {
                return Err(Error::AlreadySubscribed {
                    identity: identity.as_str().to_string(),
                    topic: topic.as_str().to_string(),
                });
            }

            let reference = if let Some(entry) = state.topics.get_mut(topic) {
                // A racer may have installed the entry since the plan was
                // made; `created` (if any) refers to the same channel.
                entry.subscribers += 1;
                entry.channel.clone()
            } else if let Some(reference) = created {
                state.topics.insert(
                    topic.clone(),
                    TopicEntry {
                        subscribers: 1,
                        channel: reference.clone(),
                    },
                );
                reference
            } else {
                // The entry existed at planning time but a teardown removed
                // it meanwhile; plan again.
                drop(state);
                continue;
            };

            if let Some(topics) = state.identities.get_mut(identity) {
                topics.push(topic.clone());
            }
            drop(state);

            debug!(identity = %identity, topic = %topic, "subscribed");
            self.broadcast_snapshot();
            return Ok(reference);
        }
    }

    /// Remove `topic` from the identity's set. Unsubscribing a topic that is
    /// not in the set is a silent no-op. The delivery channel is torn down
    /// when the last local subscriber leaves.
    pub async fn unsubscribe(&self, identity: &IdentityId, topic: &TopicName) -> Result<()> {
        let teardown = {
            let mut state = self.state.write();
            let topics = state
                .identities
                .get_mut(identity)
                .ok_or_else(|| Error::UnknownIdentity(identity.as_str().to_string()))?;
            let Some(position) = topics.iter().position(|t| t == topic) else {
                return Ok(());
            };
            topics.remove(position);

            // Only an actual 1->0 transition owns the channel teardown; a
            // count already at 0 is a replication cache-fill entry.
            let emptied = match state.topics.get_mut(topic) {
                Some(entry) if entry.subscribers > 0 => {
                    entry.subscribers -= 1;
                    entry.subscribers == 0
                }
                _ => false,
            };
            if emptied {
                state.topics.remove(topic).map(|entry| entry.channel)
            } else {
                None
            }
        };

        if let Some(reference) = teardown {
            self.lifecycle.teardown(topic, &reference).await;
        }

        debug!(identity = %identity, topic = %topic, "unsubscribed");
        self.broadcast_snapshot();
        Ok(())
    }

    /// Return the delivery channel reference for an existing subscription.
    ///
    /// A subscription learned only through replication has no local topic
    /// entry yet; the channel is re-resolved through the lifecycle manager
    /// and cached with a count of 0; the count is owned by the subscribe
    /// path and is never incremented here.
    pub async fn resolve_channel(
        &self,
        identity: &IdentityId,
        topic: &TopicName,
    ) -> Result<ChannelRef> {
        {
            let state = self.state.read();
            let topics = state
                .identities
                .get(identity)
                .ok_or_else(|| Error::UnknownIdentity(identity.as_str().to_string()))?;
            if !topics.contains(topic) {
                return Err(Error::NotSubscribed {
                    identity: identity.as_str().to_string(),
                    topic: topic.as_str().to_string(),
                });
            }
            if let Some(entry) = state.topics.get(topic) {
                return Ok(entry.channel.clone());
            }
        }

        let reference = self.lifecycle.ensure(topic).await?;

        let mut state = self.state.write();
        match state.identities.get(identity) {
            None => return Err(Error::UnknownIdentity(identity.as_str().to_string())),
            Some(topics) if !topics.contains(topic) => {
                return Err(Error::NotSubscribed {
                    identity: identity.as_str().to_string(),
                    topic: topic.as_str().to_string(),
                })
            }
            Some(_) => {}
        }
        let entry = state.topics.entry(topic.clone()).or_insert(TopicEntry {
            subscribers: 0,
            channel: reference,
        });
        Ok(entry.channel.clone())
    }

    /// Fold a remote snapshot into the local identity->topics view.
    ///
    /// Reconciles bookkeeping only: no channel is created or destroyed and
    /// no snapshot is re-broadcast, so out-of-order or duplicate delivery
    /// cannot corrupt state or start a replication storm.
    pub fn merge_remote_snapshot(&self, records: &[IdentityRecord]) {
        let mut state = self.state.write();
        for record in records {
            state.merge_record(record);
        }
        debug!(records = records.len(), "merged remote snapshot");
    }

    /// Current full identity->topics view.
    #[must_use]
    pub fn snapshot(&self) -> Vec<IdentityRecord> {
        self.state.read().snapshot()
    }

    /// Topic set of one identity, if it exists.
    #[must_use]
    pub fn identity_topics(&self, identity: &IdentityId) -> Option<Vec<TopicName>> {
        self.state.read().identities.get(identity).cloned()
    }

    /// Subscriber count and channel reference of one topic, if an entry
    /// exists.
    #[must_use]
    pub fn topic_entry(&self, topic: &TopicName) -> Option<(u64, ChannelRef)> {
        self.state
            .read()
            .topics
            .get(topic)
            .map(|entry| (entry.subscribers, entry.channel.clone()))
    }

    #[must_use]
    pub fn metrics(&self) -> RegistryMetrics {
        let state = self.state.read();
        RegistryMetrics {
            identities: state.identities.len(),
            topics: state.topics.len(),
        }
    }

    fn broadcast_snapshot(&self) {
        let Some(tx) = self.replication_tx.get() else {
            return;
        };
        match tx.try_send(self.snapshot()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("replication publish queue full, dropping snapshot");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                error!("replication publish queue closed, cannot queue snapshot");
            }
        }
    }
}
