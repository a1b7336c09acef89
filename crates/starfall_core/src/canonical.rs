//! Canonical ordering and state hashing.
//!
//! Determinism requires order-stable iteration: any collection that is
//! iterated while consuming RNG must be in a single total order first.
//! [`canonicalize`] imposes that order - a locale-insensitive byte compare
//! on ids for entity collections, (day, id) for time-ordered logs and
//! messages - and is idempotent, so applying it after every state-producing
//! operation is always safe.
//!
//! [`state_hash`] condenses a state into a u64 for divergence detection in
//! tests and debug logging, hashing the canonical serialized bytes.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::state::GameState;

/// Sort every collection of the state into canonical order.
///
/// Idempotent: `canonicalize(canonicalize(s)) == canonicalize(s)`.
pub fn canonicalize(state: &mut GameState) {
    state.factions.sort_by(|a, b| a.id.cmp(&b.id));
    state.systems.sort_by(|a, b| a.id.cmp(&b.id));
    for system in &mut state.systems {
        system.planets.sort_by(|a, b| a.id.cmp(&b.id));
    }
    state.fleets.sort_by(|a, b| a.id.cmp(&b.id));
    for fleet in &mut state.fleets {
        fleet.ships.sort_by(|a, b| a.id.cmp(&b.id));
    }
    state.armies.sort_by(|a, b| a.id.cmp(&b.id));
    state.battles.sort_by(|a, b| a.id.cmp(&b.id));
    for battle in &mut state.battles {
        battle.involved_fleet_ids.sort();
    }
    state
        .logs
        .sort_by(|a, b| a.day.cmp(&b.day).then_with(|| a.id.cmp(&b.id)));
    state
        .messages
        .sort_by(|a, b| a.day.cmp(&b.day).then_with(|| a.id.cmp(&b.id)));
}

/// Hash a state for divergence detection.
///
/// Two canonically-identical states produce identical hashes. The hash is
/// computed over the bincode serialization of the state, so every field
/// participates.
#[must_use]
pub fn state_hash(state: &GameState) -> u64 {
    let bytes = bincode::serialize(state).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Vec3;
    use crate::state::{Fleet, FleetState, LogEntry, Ship};

    fn fleet(id: &str) -> Fleet {
        Fleet {
            id: id.to_string(),
            faction_id: "red".to_string(),
            ships: vec![ship("s-b"), ship("s-a")],
            position: Vec3::ZERO,
            state: FleetState::Orbit,
            target_system_id: None,
            target_position: None,
            retreating: false,
            order: None,
            state_start_day: 0,
        }
    }

    fn ship(id: &str) -> Ship {
        Ship {
            id: id.to_string(),
            class: "corvette".to_string(),
            hp: 40,
            max_hp: 40,
            fuel: 100.0,
            carried_army_id: None,
            missiles: 4,
            torpedoes: 0,
            kills: 0,
            busy_day: None,
        }
    }

    #[test]
    fn test_canonicalize_sorts_everything() {
        let mut state = GameState::empty(1);
        state.fleets.push(fleet("fleet-b"));
        state.fleets.push(fleet("fleet-a"));
        state.logs.push(LogEntry {
            id: "log-2".to_string(),
            day: 5,
            text: String::new(),
        });
        state.logs.push(LogEntry {
            id: "log-1".to_string(),
            day: 2,
            text: String::new(),
        });

        canonicalize(&mut state);

        assert_eq!(state.fleets[0].id, "fleet-a");
        assert_eq!(state.fleets[0].ships[0].id, "s-a");
        assert_eq!(state.logs[0].day, 2);
    }

    #[test]
    fn test_canonicalize_is_idempotent() {
        let mut state = GameState::empty(9);
        state.fleets.push(fleet("fleet-z"));
        state.fleets.push(fleet("fleet-a"));

        canonicalize(&mut state);
        let once = state.clone();
        canonicalize(&mut state);
        assert_eq!(once, state);
    }

    #[test]
    fn test_state_hash_detects_divergence() {
        let mut a = GameState::empty(1);
        let mut b = GameState::empty(1);
        canonicalize(&mut a);
        canonicalize(&mut b);
        assert_eq!(state_hash(&a), state_hash(&b));

        b.day = 1;
        assert_ne!(state_hash(&a), state_hash(&b));
    }
}
