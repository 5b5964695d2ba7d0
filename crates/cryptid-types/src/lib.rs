//! Shared data model for the Cryptid sighting tracker.
//!
//! Defines the persisted [`Sighting`] record, the store's [`ChangeEvent`]
//! notification, its classified form [`SightingChange`], and the message
//! shape delivered to topic subscribers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Name of the sighting collection, used as the topic prefix.
pub const COLLECTION: &str = "sightings";

/// A cryptid sighting report.
///
/// The SQLite table backing this record carries an internal integer rowid
/// for storage bookkeeping; it is never selected into this struct, so API
/// responses only ever expose the public `id`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sighting {
    /// Public unique ID (UUID v4), assigned by the store on creation.
    pub id: String,
    /// Two-letter state code where the sighting occurred. Partition key for
    /// topic routing and list queries.
    pub state: String,
    /// Free-form description of the sighting.
    pub description: String,
    /// Optional location detail (trail name, coordinates, etc.).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// When the sighting reportedly happened (ISO 8601), as supplied by the
    /// reporter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sighted_at: Option<String>,
    /// Record creation timestamp (ISO 8601), set by the store.
    pub created_at: String,
}

/// An ordered notification of a single committed write to the sighting
/// collection.
///
/// `previous` is absent on creation, `current` is absent on deletion, both
/// are present on update. Both absent never occurs from a well-behaved
/// store and is rejected at classification time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChangeEvent {
    /// Record state before the write, if it existed.
    pub previous: Option<Sighting>,
    /// Record state after the write, if it still exists.
    pub current: Option<Sighting>,
}

/// A malformed [`ChangeEvent`] (neither side present).
#[derive(Debug, Error)]
#[error("change event carries neither a previous nor a current record")]
pub struct ProtocolViolation;

/// A [`ChangeEvent`] classified by the presence of its two sides.
///
/// Constructed once at the bridge boundary so downstream code never
/// re-checks option presence.
#[derive(Debug, Clone, PartialEq)]
pub enum SightingChange {
    /// A record was created; only `current` exists.
    Created { current: Sighting },
    /// A record was modified; both sides exist.
    Updated {
        previous: Sighting,
        current: Sighting,
    },
    /// A record was deleted; only `previous` remains.
    Destroyed { previous: Sighting },
}

impl TryFrom<ChangeEvent> for SightingChange {
    type Error = ProtocolViolation;

    fn try_from(event: ChangeEvent) -> Result<Self, Self::Error> {
        match (event.previous, event.current) {
            (None, Some(current)) => Ok(SightingChange::Created { current }),
            (Some(previous), Some(current)) => Ok(SightingChange::Updated { previous, current }),
            (Some(previous), None) => Ok(SightingChange::Destroyed { previous }),
            (None, None) => Err(ProtocolViolation),
        }
    }
}

impl SightingChange {
    /// The state value that routes this change: `current.state` for
    /// created/updated, `previous.state` for destroyed (on delete only the
    /// prior snapshot carries the partition value).
    pub fn partition_state(&self) -> &str {
        match self {
            SightingChange::Created { current } => &current.state,
            SightingChange::Updated { current, .. } => &current.state,
            SightingChange::Destroyed { previous } => &previous.state,
        }
    }

    /// Topic string for this change, `"sightings/<state>"`.
    pub fn topic(&self) -> String {
        format!("{}/{}", COLLECTION, self.partition_state())
    }

    /// Converts into the message delivered to subscribers, carrying the
    /// relevant side of the event.
    pub fn into_message(self) -> SightingMessage {
        match self {
            SightingChange::Created { current } => SightingMessage::Created { sighting: current },
            SightingChange::Updated { current, .. } => {
                SightingMessage::Updated { sighting: current }
            }
            SightingChange::Destroyed { previous } => {
                SightingMessage::Destroyed { sighting: previous }
            }
        }
    }
}

/// Message published to a sighting topic.
///
/// Serializes as `{"type": "created"|"updated"|"destroyed", "sighting": …}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SightingMessage {
    Created { sighting: Sighting },
    Updated { sighting: Sighting },
    Destroyed { sighting: Sighting },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sighting(id: &str, state: &str) -> Sighting {
        Sighting {
            id: id.to_string(),
            state: state.to_string(),
            description: "tall figure".to_string(),
            location: None,
            sighted_at: None,
            created_at: "2025-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn classify_created() {
        let event = ChangeEvent {
            previous: None,
            current: Some(sighting("a", "OR")),
        };
        let change = SightingChange::try_from(event).expect("should classify");
        assert!(matches!(change, SightingChange::Created { .. }));
        assert_eq!(change.topic(), "sightings/OR");
    }

    #[test]
    fn classify_updated() {
        let event = ChangeEvent {
            previous: Some(sighting("a", "WA")),
            current: Some(sighting("a", "WA")),
        };
        let change = SightingChange::try_from(event).expect("should classify");
        assert!(matches!(change, SightingChange::Updated { .. }));
        assert_eq!(change.topic(), "sightings/WA");
    }

    #[test]
    fn classify_destroyed_routes_by_previous_state() {
        let event = ChangeEvent {
            previous: Some(sighting("a", "WA")),
            current: None,
        };
        let change = SightingChange::try_from(event).expect("should classify");
        assert!(matches!(change, SightingChange::Destroyed { .. }));
        // Only the prior snapshot carries the partition value on delete.
        assert_eq!(change.partition_state(), "WA");
        assert_eq!(change.topic(), "sightings/WA");
    }

    #[test]
    fn classify_rejects_empty_event() {
        let event = ChangeEvent {
            previous: None,
            current: None,
        };
        assert!(SightingChange::try_from(event).is_err());
    }

    #[test]
    fn message_serializes_with_type_tag() {
        let change = SightingChange::Created {
            current: sighting("abc", "OR"),
        };
        let json = serde_json::to_value(change.into_message()).expect("should serialize");
        assert_eq!(json.get("type").and_then(|v| v.as_str()), Some("created"));
        assert_eq!(
            json.pointer("/sighting/id").and_then(|v| v.as_str()),
            Some("abc")
        );
    }

    #[test]
    fn destroyed_message_carries_previous_record() {
        let change = SightingChange::Destroyed {
            previous: sighting("gone", "ID"),
        };
        let msg = change.into_message();
        match msg {
            SightingMessage::Destroyed { sighting } => assert_eq!(sighting.id, "gone"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn sighting_omits_empty_optional_fields() {
        let json = serde_json::to_value(sighting("s1", "OR")).expect("should serialize");
        assert!(json.get("location").is_none());
        assert!(json.get("sighted_at").is_none());
        assert!(json.get("created_at").is_some());
    }
}
