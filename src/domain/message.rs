//! The stored unit of the queue: a message plus its ordering and
//! assignment metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque payload carried by a message, preserved verbatim on round-trip.
///
/// `content_type` is a caller-supplied discriminator (e.g. `"application/json"`);
/// `data` is the payload body as a JSON value so every backend can store it
/// natively (JSONB, a Mongo document field, a serialized blob) without a
/// lossy re-encoding step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payload {
    pub content_type: String,
    pub data: serde_json::Value,
}

impl Payload {
    pub fn new(content_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            content_type: content_type.into(),
            data,
        }
    }
}

/// A message stored in a sub-queue.
///
/// `uuid` is unique across the whole service, not merely within
/// `sub_queue`. `id` is the ordering key within `sub_queue`; it is either
/// assigned by the backend (intrinsic ordinality) or by the core
/// (core-assigned ordinality) and is `None` only for a record that has not
/// yet been stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub uuid: String,
    pub sub_queue: String,
    pub payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_timestamp: Option<DateTime<Utc>>,
}

impl MessageRecord {
    /// Build a new, not-yet-stored record. `uuid` is assigned by the
    /// caller if present in the inbound request, otherwise by this
    /// constructor.
    pub fn new(uuid: Option<String>, sub_queue: impl Into<String>, payload: Payload) -> Self {
        Self {
            uuid: uuid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            sub_queue: sub_queue.into(),
            payload,
            id: None,
            assigned_to: None,
            assignment_timestamp: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_to.is_some()
    }
}

/// Filter applied when listing the records of one sub-queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    All,
    Assigned,
    Unassigned,
    AssignedTo(String),
}

impl MessageFilter {
    pub fn matches(&self, record: &MessageRecord) -> bool {
        match self {
            MessageFilter::All => true,
            MessageFilter::Assigned => record.is_assigned(),
            MessageFilter::Unassigned => !record.is_assigned(),
            MessageFilter::AssignedTo(owner) => record.assigned_to.as_deref() == Some(owner.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload() -> Payload {
        Payload::new("application/json", json!({"k": "v"}))
    }

    #[test]
    fn new_assigns_uuid_when_absent() {
        let record = MessageRecord::new(None, "orders", payload());
        assert!(!record.uuid.is_empty());
        assert_eq!(record.sub_queue, "orders");
        assert!(record.id.is_none());
        assert!(!record.is_assigned());
    }

    #[test]
    fn new_preserves_caller_uuid() {
        let record = MessageRecord::new(Some("a".to_string()), "orders", payload());
        assert_eq!(record.uuid, "a");
    }

    #[test]
    fn filter_matches() {
        let mut record = MessageRecord::new(Some("a".to_string()), "orders", payload());
        assert!(MessageFilter::All.matches(&record));
        assert!(MessageFilter::Unassigned.matches(&record));
        assert!(!MessageFilter::Assigned.matches(&record));

        record.assigned_to = Some("worker-1".to_string());
        assert!(MessageFilter::Assigned.matches(&record));
        assert!(!MessageFilter::Unassigned.matches(&record));
        assert!(MessageFilter::AssignedTo("worker-1".to_string()).matches(&record));
        assert!(!MessageFilter::AssignedTo("worker-2".to_string()).matches(&record));
    }

    #[test]
    fn payload_round_trips_through_json() {
        let p = payload();
        let json = serde_json::to_string(&p).unwrap();
        let back: Payload = serde_json::from_str(&json).unwrap();
        assert_eq!(p, back);
    }
}
