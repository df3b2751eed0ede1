//! # Wire Envelope
//!
//! The immutable record that wraps a domain event for transit: a unique id,
//! a creation timestamp, and the adjacently-tagged event itself. On the
//! wire this is the JSON dictionary `{kind, id, timestamp, payload}`.

use crate::errors::CodecError;
use crate::events::{EventKind, GameEvent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An immutable, uniquely-identified domain event in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identifier.
    pub id: Uuid,
    /// Creation timestamp (publisher's clock).
    pub timestamp: DateTime<Utc>,
    /// The event, flattened into `kind` + `payload` on the wire.
    #[serde(flatten)]
    pub event: GameEvent,
}

/// Loose first-pass decode used to separate "unknown kind" from
/// "malformed payload" before committing to the typed event.
#[derive(Debug, Deserialize)]
struct RawEnvelope {
    kind: String,
    id: Uuid,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    payload: serde_json::Value,
}

impl EventEnvelope {
    /// Wrap an event, stamping a fresh id and the current time.
    #[must_use]
    pub fn new(event: GameEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event,
        }
    }

    /// Get the event kind.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.event.kind()
    }

    /// Encode to the JSON wire format.
    pub fn to_json(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(CodecError::Malformed)
    }

    /// Decode from the JSON wire format.
    ///
    /// Unknown kinds are rejected with [`CodecError::UnknownKind`] so the
    /// caller can log and drop; a payload that does not match its kind is
    /// [`CodecError::Malformed`].
    pub fn from_json(bytes: &[u8]) -> Result<Self, CodecError> {
        let raw: RawEnvelope = serde_json::from_slice(bytes).map_err(CodecError::Malformed)?;

        // Resolve the kind first so unrecognized kinds fail distinctly.
        let _kind: EventKind = raw.kind.parse()?;

        let event: GameEvent = serde_json::from_value(serde_json::json!({
            "kind": raw.kind,
            "payload": raw.payload,
        }))
        .map_err(CodecError::Malformed)?;

        Ok(Self {
            id: raw.id,
            timestamp: raw.timestamp,
            event,
        })
    }
}
