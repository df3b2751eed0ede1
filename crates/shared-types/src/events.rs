//! # Domain Events
//!
//! The closed set of events that flow through the local bus and, mirrored
//! through the broker, across every server instance.
//!
//! Each variant carries a strongly-typed payload; the wire representation
//! is adjacently tagged as `{"kind": ..., "payload": ...}` so the broker
//! subject can be derived from the kind alone.

use crate::entities::{PlayerId, Profession, RoomId};
use serde::{Deserialize, Serialize};

/// All domain events published by game logic.
///
/// The variant set is closed: adding a kind means adding it here, to
/// [`EventKind`], and to the kind mapping below, all checked at compile
/// time by the exhaustive matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum GameEvent {
    /// A player entered a room.
    PlayerEnteredRoom {
        /// The player who moved.
        player: PlayerId,
        /// The room that was entered.
        room: RoomId,
    },

    /// A player left a room.
    PlayerLeftRoom {
        /// The player who moved.
        player: PlayerId,
        /// The room that was left.
        room: RoomId,
    },

    /// Combat began between two players.
    CombatStarted {
        /// The room the fight takes place in.
        room: RoomId,
        /// The player who initiated combat.
        attacker: PlayerId,
        /// The player being attacked.
        defender: PlayerId,
    },

    /// Combat in a room concluded.
    CombatEnded {
        /// The room the fight took place in.
        room: RoomId,
        /// The winner, if the fight was not a draw or flight.
        victor: Option<PlayerId>,
    },

    /// A player died.
    PlayerDied {
        /// The player who died.
        player: PlayerId,
        /// The room the player died in.
        room: RoomId,
        /// Human-readable cause of death.
        cause: String,
    },

    /// A chat message was spoken in a room.
    ChatMessage {
        /// The room the message was spoken in.
        room: RoomId,
        /// The speaking player.
        sender: PlayerId,
        /// The message text.
        text: String,
    },

    /// A player chose a profession.
    ProfessionSelected {
        /// The player who selected.
        player: PlayerId,
        /// The chosen profession.
        profession: Profession,
    },

    /// A world simulation tick elapsed.
    GameTick {
        /// Monotonic tick sequence number.
        sequence: u64,
    },
}

impl GameEvent {
    /// Get the kind discriminant for this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PlayerEnteredRoom { .. } => EventKind::PlayerEnteredRoom,
            Self::PlayerLeftRoom { .. } => EventKind::PlayerLeftRoom,
            Self::CombatStarted { .. } => EventKind::CombatStarted,
            Self::CombatEnded { .. } => EventKind::CombatEnded,
            Self::PlayerDied { .. } => EventKind::PlayerDied,
            Self::ChatMessage { .. } => EventKind::ChatMessage,
            Self::ProfessionSelected { .. } => EventKind::ProfessionSelected,
            Self::GameTick { .. } => EventKind::GameTick,
        }
    }
}

/// Event kind discriminants with stable wire names.
///
/// Used for subscription filtering and broker subject derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A player entered a room.
    PlayerEnteredRoom,
    /// A player left a room.
    PlayerLeftRoom,
    /// Combat began.
    CombatStarted,
    /// Combat concluded.
    CombatEnded,
    /// A player died.
    PlayerDied,
    /// A chat message was spoken.
    ChatMessage,
    /// A world tick elapsed.
    GameTick,
    /// A player chose a profession.
    ProfessionSelected,
}

impl EventKind {
    /// Every kind, in declaration order.
    pub const ALL: [EventKind; 8] = [
        EventKind::PlayerEnteredRoom,
        EventKind::PlayerLeftRoom,
        EventKind::CombatStarted,
        EventKind::CombatEnded,
        EventKind::PlayerDied,
        EventKind::ChatMessage,
        EventKind::GameTick,
        EventKind::ProfessionSelected,
    ];

    /// Stable wire name, used in envelopes and broker subjects.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlayerEnteredRoom => "player_entered_room",
            Self::PlayerLeftRoom => "player_left_room",
            Self::CombatStarted => "combat_started",
            Self::CombatEnded => "combat_ended",
            Self::PlayerDied => "player_died",
            Self::ChatMessage => "chat_message",
            Self::GameTick => "game_tick",
            Self::ProfessionSelected => "profession_selected",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventKind {
    type Err = crate::errors::CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| crate::errors::CodecError::UnknownKind(s.to_string()))
    }
}

/// Filter for subscribing to specific event kinds.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Kinds to include. Empty means all kinds.
    pub kinds: Vec<EventKind>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific kinds.
    #[must_use]
    pub fn kinds(kinds: Vec<EventKind>) -> Self {
        Self { kinds }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &GameEvent) -> bool {
        self.kinds.is_empty() || self.kinds.contains(&event.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let event = GameEvent::GameTick { sequence: 7 };
        assert_eq!(event.kind(), EventKind::GameTick);
        assert_eq!(event.kind().as_str(), "game_tick");
    }

    #[test]
    fn test_kind_round_trip() {
        for kind in EventKind::ALL {
            let parsed: EventKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "teleport_requested".parse::<EventKind>().unwrap_err();
        assert!(err.to_string().contains("teleport_requested"));
    }

    #[test]
    fn test_filter_all() {
        let filter = EventFilter::all();
        let event = GameEvent::GameTick { sequence: 1 };
        assert!(filter.matches(&event));
    }

    #[test]
    fn test_filter_by_kind() {
        let filter = EventFilter::kinds(vec![EventKind::PlayerDied]);

        let death = GameEvent::PlayerDied {
            player: PlayerId::new(),
            room: RoomId::new(),
            cause: "fell into lava".to_string(),
        };
        assert!(filter.matches(&death));

        let tick = GameEvent::GameTick { sequence: 1 };
        assert!(!filter.matches(&tick));
    }

    #[test]
    fn test_wire_tagging() {
        let event = GameEvent::ChatMessage {
            room: RoomId::new(),
            sender: PlayerId::new(),
            text: "hello".to_string(),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], "chat_message");
        assert_eq!(value["payload"]["text"], "hello");
    }
}
