//! # Subject Naming
//!
//! Hierarchical, wildcard-capable subject names routing messages on the
//! broker. Domain events live under `events.domain.<kind>`; chat and
//! combat messages use their own families but share the client.
//!
//! Wildcards follow broker convention: `*` matches exactly one token,
//! `>` matches one or more trailing tokens.

use shared_types::{EventKind, RoomId};

/// Prefix for mirrored domain events.
pub const DOMAIN_EVENT_PREFIX: &str = "events.domain";

/// Wildcard every instance subscribes to at startup.
pub const DOMAIN_EVENT_WILDCARD: &str = "events.domain.>";

/// Subject a domain event of `kind` is published under.
#[must_use]
pub fn domain_event(kind: EventKind) -> String {
    format!("{DOMAIN_EVENT_PREFIX}.{kind}")
}

/// Subject for chat messages spoken in a room.
#[must_use]
pub fn chat_say(room: RoomId) -> String {
    format!("chat.say.{room}")
}

/// Subject for combat updates in a room.
#[must_use]
pub fn combat(room: RoomId) -> String {
    format!("combat.{room}")
}

/// Check whether `subject` matches a subscription `pattern`.
///
/// Token-wise comparison: `*` consumes one token, a terminal `>` consumes
/// the rest (at least one token).
#[must_use]
pub fn matches(pattern: &str, subject: &str) -> bool {
    let mut pattern_tokens = pattern.split('.');
    let mut subject_tokens = subject.split('.');

    loop {
        match (pattern_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return true,
            (Some("*"), Some(_)) => {}
            (Some(p), Some(s)) if p == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_domain_event_subject() {
        assert_eq!(
            domain_event(EventKind::PlayerDied),
            "events.domain.player_died"
        );
    }

    #[test]
    fn test_room_subjects() {
        let room = RoomId(Uuid::nil());
        assert!(chat_say(room).starts_with("chat.say."));
        assert!(combat(room).starts_with("combat."));
    }

    #[test]
    fn test_exact_match() {
        assert!(matches("events.domain.game_tick", "events.domain.game_tick"));
        assert!(!matches("events.domain.game_tick", "events.domain.player_died"));
    }

    #[test]
    fn test_tail_wildcard() {
        assert!(matches("events.domain.>", "events.domain.game_tick"));
        assert!(matches("events.domain.>", "events.domain.a.b.c"));
        // `>` requires at least one token.
        assert!(!matches("events.domain.>", "events.domain"));
        assert!(!matches("events.domain.>", "chat.say.lobby"));
    }

    #[test]
    fn test_single_token_wildcard() {
        assert!(matches("chat.*.lobby", "chat.say.lobby"));
        assert!(!matches("chat.*.lobby", "chat.say.arena"));
        assert!(!matches("chat.*", "chat.say.lobby"));
    }
}
