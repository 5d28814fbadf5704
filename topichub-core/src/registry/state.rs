use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::{ChannelRef, IdentityId, TopicName};

/// Bookkeeping for one topic: how many local subscribers hold it, and where
/// its delivery channel lives.
///
/// `subscribers` is owned by the subscribe/unsubscribe path. A count of 0
/// only occurs on cache-fill entries installed for replication-learned
/// subscriptions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicEntry {
    pub subscribers: u64,
    pub channel: ChannelRef,
}

/// One identity's row in a replication snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity: IdentityId,
    pub topics: Vec<TopicName>,
}

/// The registry's owned state: identity->topics and topic->entry, guarded by
/// the single lock in `TopicRegistry`. No other component holds these maps.
#[derive(Debug, Default)]
pub(crate) struct RegistryState {
    pub identities: HashMap<IdentityId, Vec<TopicName>>,
    pub topics: HashMap<TopicName, TopicEntry>,
}

impl RegistryState {
    /// Serialize the full identity->topics view, sorted for stable output.
    pub fn snapshot(&self) -> Vec<IdentityRecord> {
        let mut records: Vec<IdentityRecord> = self
            .identities
            .iter()
            .map(|(identity, topics)| IdentityRecord {
                identity: identity.clone(),
                topics: topics.clone(),
            })
            .collect();
        records.sort_by(|a, b| a.identity.as_str().cmp(b.identity.as_str()));
        records
    }

    /// Fold one remote record into the local view: insert an absent identity
    /// verbatim, otherwise take the set union of the topic sequences. Local
    /// order is preserved; unseen remote topics append in remote order. The
    /// union is idempotent and commutative up to ordering.
    pub fn merge_record(&mut self, record: &IdentityRecord) {
        let topics = self.identities.entry(record.identity.clone()).or_default();
        for topic in &record.topics {
            if !topics.contains(topic) {
                topics.push(topic.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(identity: &str, topics: &[&str]) -> IdentityRecord {
        IdentityRecord {
            identity: IdentityId::from_string(identity.to_string()),
            topics: topics.iter().map(|t| TopicName::from(*t)).collect(),
        }
    }

    fn topics_of(state: &RegistryState, identity: &str) -> Vec<String> {
        state
            .identities
            .get(&IdentityId::from_string(identity.to_string()))
            .map(|topics| topics.iter().map(|t| t.as_str().to_string()).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_merge_inserts_absent_identity() {
        let mut state = RegistryState::default();
        state.merge_record(&record("u1", &["a", "b"]));
        assert_eq!(topics_of(&state, "u1"), vec!["a", "b"]);
    }

    #[test]
    fn test_merge_unions_preserving_local_order() {
        let mut state = RegistryState::default();
        state.merge_record(&record("u1", &["b"]));
        state.merge_record(&record("u1", &["b", "c"]));
        assert_eq!(topics_of(&state, "u1"), vec!["b", "c"]);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let mut state = RegistryState::default();
        let snapshot = record("u1", &["a", "b", "c"]);
        state.merge_record(&snapshot);
        let once = topics_of(&state, "u1");
        state.merge_record(&snapshot);
        assert_eq!(topics_of(&state, "u1"), once);
    }

    #[test]
    fn test_merge_is_commutative_as_sets() {
        let a = record("u1", &["a", "b"]);
        let b = record("u1", &["b", "c"]);

        let mut forward = RegistryState::default();
        forward.merge_record(&a);
        forward.merge_record(&b);

        let mut reverse = RegistryState::default();
        reverse.merge_record(&b);
        reverse.merge_record(&a);

        let mut lhs = topics_of(&forward, "u1");
        let mut rhs = topics_of(&reverse, "u1");
        lhs.sort();
        rhs.sort();
        assert_eq!(lhs, rhs);
        assert_eq!(lhs, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_snapshot_is_sorted_and_complete() {
        let mut state = RegistryState::default();
        state.merge_record(&record("zz", &["a"]));
        state.merge_record(&record("aa", &["b"]));

        let snapshot = state.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].identity.as_str(), "aa");
        assert_eq!(snapshot[1].identity.as_str(), "zz");
    }
}
