use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use topichub_core::registry::IdentityRecord;
use topichub_core::Result;

/// Envelope for snapshots published on the shared fan-out topic.
///
/// `origin` carries the publishing replica's id so each replica can drop
/// its own echoes. Merges never re-broadcast, and this guard closes the
/// remaining loop through the replica's own inbound queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEnvelope {
    pub origin: String,
    pub published_at: DateTime<Utc>,
    pub records: Vec<IdentityRecord>,
}

impl SnapshotEnvelope {
    #[must_use]
    pub fn new(origin: impl Into<String>, records: Vec<IdentityRecord>) -> Self {
        Self {
            origin: origin.into(),
            published_at: Utc::now(),
            records,
        }
    }

    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topichub_core::models::{IdentityId, TopicName};

    #[test]
    fn test_envelope_round_trip() {
        let envelope = SnapshotEnvelope::new(
            "replica-1",
            vec![IdentityRecord {
                identity: IdentityId::from_string("u1".to_string()),
                topics: vec![TopicName::from("weather"), TopicName::from("sports")],
            }],
        );

        let raw = envelope.encode().expect("encode");
        let decoded = SnapshotEnvelope::decode(&raw).expect("decode");
        assert_eq!(decoded.origin, "replica-1");
        assert_eq!(decoded.records, envelope.records);
    }

    #[test]
    fn test_decode_rejects_malformed_payload() {
        let err = SnapshotEnvelope::decode("{\"origin\": 42}").expect_err("must fail");
        assert!(matches!(err, topichub_core::Error::DecodeFailed(_)));
    }
}
