//! Save/load codec.
//!
//! Two formats share one envelope:
//!
//! - JSON ([`to_json`] / [`from_json`]) for durable saves. Loading is
//!   tolerant and self-healing: unknown fields are dropped, missing
//!   collections default to empty, broken cross-references are repaired,
//!   and systems whose planet rosters were stripped regenerate them
//!   bit-identically from `(seed, system_id)`. Every repair is reported.
//! - bincode ([`to_bytes`] / [`from_bytes`]) for in-process snapshots,
//!   loaded strictly.
//!
//! Only two failures are unrecoverable: a payload from a newer engine
//! version, and a payload missing its seed or day - without those the
//! deterministic stream cannot be reconstructed.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::canonical::canonicalize;
use crate::data::ShipClassTable;
use crate::error::{GameError, Result};
use crate::logistics;
use crate::math::Vec3;
use crate::rng::RngCursor;
use crate::scenario;
use crate::state::GameState;

/// Newest payload version this build writes and reads.
pub const SAVE_VERSION: u32 = 1;

/// Versioned wrapper around a serialized state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveEnvelope {
    /// Payload version.
    pub version: u32,
    /// Day the state was saved on, duplicated for quick inspection.
    pub saved_day: u64,
    /// The state itself.
    pub state: GameState,
}

/// A loaded state together with every repair the codec performed.
#[derive(Debug, Clone)]
pub struct LoadReport {
    /// The healed, canonical state.
    pub state: GameState,
    /// Human-readable repair lines, empty for a pristine payload.
    pub repairs: Vec<String>,
}

/// Serialize a state into a versioned JSON save.
///
/// # Errors
///
/// Fails only if serialization itself fails.
pub fn to_json(state: &GameState) -> Result<String> {
    let envelope = SaveEnvelope {
        version: SAVE_VERSION,
        saved_day: state.day,
        state: state.clone(),
    };
    serde_json::to_string(&envelope).map_err(|e| GameError::MalformedSave(e.to_string()))
}

/// Load a state from a JSON save, healing whatever can be healed.
///
/// # Errors
///
/// [`GameError::SaveVersionTooNew`] for payloads from a newer engine, and
/// [`GameError::MalformedSave`] when the text is not JSON or the payload
/// lacks a version, seed, or day.
pub fn from_json(text: &str, table: &ShipClassTable) -> Result<LoadReport> {
    let mut value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| GameError::MalformedSave(e.to_string()))?;

    let version = value
        .get("version")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| GameError::MalformedSave("missing version".to_string()))?;
    let version = u32::try_from(version)
        .map_err(|_| GameError::MalformedSave(format!("absurd version {version}")))?;
    if version > SAVE_VERSION {
        return Err(GameError::SaveVersionTooNew {
            found: version,
            supported: SAVE_VERSION,
        });
    }

    let state_value = value
        .get_mut("state")
        .ok_or_else(|| GameError::MalformedSave("missing state payload".to_string()))?;
    let seed = state_value
        .get("seed")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| GameError::MalformedSave("state has no seed".to_string()))?;
    if state_value.get("day").and_then(serde_json::Value::as_u64).is_none() {
        return Err(GameError::MalformedSave("state has no day".to_string()));
    }

    let mut repairs = Vec::new();

    // A missing cursor restarts the stream at the seed origin.
    if state_value.get("rng_cursor").is_none() {
        let cursor = serde_json::to_value(RngCursor::start(seed))
            .map_err(|e| GameError::MalformedSave(e.to_string()))?;
        state_value["rng_cursor"] = cursor;
        repairs.push("Missing RNG cursor reset to the stream origin".to_string());
    }

    let mut state: GameState = serde_json::from_value(state_value.take())
        .map_err(|e| GameError::MalformedSave(e.to_string()))?;

    heal(&mut state, table, &mut repairs);
    for line in &repairs {
        warn!(%line, "Save repaired");
    }
    Ok(LoadReport { state, repairs })
}

/// Serialize a state into a bincode snapshot.
///
/// # Errors
///
/// Fails only if serialization itself fails.
pub fn to_bytes(state: &GameState) -> Result<Vec<u8>> {
    let envelope = SaveEnvelope {
        version: SAVE_VERSION,
        saved_day: state.day,
        state: state.clone(),
    };
    bincode::serialize(&envelope).map_err(|e| GameError::MalformedSave(e.to_string()))
}

/// Load a state from a bincode snapshot, strictly.
///
/// # Errors
///
/// [`GameError::SaveVersionTooNew`] or [`GameError::MalformedSave`].
pub fn from_bytes(bytes: &[u8]) -> Result<GameState> {
    let envelope: SaveEnvelope =
        bincode::deserialize(bytes).map_err(|e| GameError::MalformedSave(e.to_string()))?;
    if envelope.version > SAVE_VERSION {
        return Err(GameError::SaveVersionTooNew {
            found: envelope.version,
            supported: SAVE_VERSION,
        });
    }
    let mut state = envelope.state;
    canonicalize(&mut state);
    Ok(state)
}

/// Repair structural damage after a tolerant deserialization.
fn heal(state: &mut GameState, table: &ShipClassTable, repairs: &mut Vec<String>) {
    let balance = state.rules.balance.clone();

    // Cursor from a different stream cannot be resumed meaningfully.
    if state.rng_cursor.seed != state.seed {
        state.rng_cursor = RngCursor::start(state.seed);
        repairs.push("RNG cursor seed mismatch; cursor reset to the stream origin".to_string());
    }

    // Regenerate stripped planet rosters; generation is pure in
    // (seed, system_id), so the roster comes back bit-identical.
    for system in &mut state.systems {
        if system.planets.is_empty() {
            system.planets = scenario::generate_planets(state.seed, &system.id);
            repairs.push(format!("Regenerated planet roster of {}", system.id));
        }
        if !system.position.is_finite() {
            system.position = Vec3::ZERO;
            repairs.push(format!("System {} had a non-finite position", system.id));
        }
    }

    // Ships of classes this build does not know cannot be simulated.
    for fleet in &mut state.fleets {
        let before = fleet.ships.len();
        fleet.ships.retain(|s| table.get(&s.class).is_some());
        if fleet.ships.len() < before {
            repairs.push(format!(
                "Dropped {} ship(s) of unknown class from fleet {}",
                before - fleet.ships.len(),
                fleet.id
            ));
        }
        if !fleet.position.is_finite() {
            fleet.position = Vec3::ZERO;
            repairs.push(format!("Fleet {} had a non-finite position", fleet.id));
        }
        for ship in &mut fleet.ships {
            if !ship.fuel.is_finite() || ship.fuel < 0.0 {
                ship.fuel = 0.0;
                repairs.push(format!("Ship {} had invalid fuel", ship.id));
            }
        }
    }
    let before = state.fleets.len();
    state.fleets.retain(|f| !f.ships.is_empty());
    if state.fleets.len() < before {
        repairs.push(format!("Dropped {} empty fleet(s)", before - state.fleets.len()));
    }

    // Armies of factions this state does not know are unownable.
    let faction_ids: Vec<String> = state.factions.iter().map(|f| f.id.clone()).collect();
    let before = state.armies.len();
    state.armies.retain(|a| faction_ids.contains(&a.faction_id));
    if state.armies.len() < before {
        repairs.push(format!(
            "Dropped {} army(ies) of unknown factions",
            before - state.armies.len()
        ));
    }

    // Battles without participants carry no information.
    let before = state.battles.len();
    state.battles.retain(|b| !b.involved_fleet_ids.is_empty());
    if state.battles.len() < before {
        repairs.push(format!(
            "Dropped {} battle(s) with no participants",
            before - state.battles.len()
        ));
    }

    canonicalize(state);

    // Entity caps, oldest-surplus-first in canonical order.
    if state.armies.len() > balance.army_cap {
        let dropped = state.armies.len() - balance.army_cap;
        state.armies.truncate(balance.army_cap);
        repairs.push(format!("Dropped {dropped} army(ies) over the cap"));
    }
    if state.battles.len() > balance.battle_cap {
        let dropped = state.battles.len() - balance.battle_cap;
        state.battles.truncate(balance.battle_cap);
        repairs.push(format!("Dropped {dropped} battle(s) over the cap"));
    }
    if state.logs.len() > balance.log_history_cap {
        let excess = state.logs.len() - balance.log_history_cap;
        state.logs.drain(..excess);
        repairs.push(format!("Trimmed {excess} oldest log entries"));
    }
    if state.messages.len() > balance.message_history_cap {
        let excess = state.messages.len() - balance.message_history_cap;
        state.messages.drain(..excess);
        repairs.push(format!("Trimmed {excess} oldest messages"));
    }

    // Cross-reference repair shares the cleanup-phase pass.
    repairs.extend(logistics::sanitize(state, &balance));
    canonicalize(state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::state_hash;
    use crate::scenario::{new_game, ScenarioConfig};

    fn setup() -> (GameState, ShipClassTable) {
        let table = ShipClassTable::builtin();
        let state = new_game(&ScenarioConfig::skirmish(61), &table).unwrap();
        (state, table)
    }

    #[test]
    fn test_json_roundtrip_is_bit_identical() {
        let (state, table) = setup();
        let text = to_json(&state).unwrap();
        let report = from_json(&text, &table).unwrap();
        assert!(report.repairs.is_empty(), "pristine save needs no repairs: {:?}", report.repairs);
        assert_eq!(state_hash(&report.state), state_hash(&state));
    }

    #[test]
    fn test_bincode_roundtrip_is_bit_identical() {
        let (state, _table) = setup();
        let bytes = to_bytes(&state).unwrap();
        let loaded = from_bytes(&bytes).unwrap();
        assert_eq!(state_hash(&loaded), state_hash(&state));
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let (state, table) = setup();
        let text = to_json(&state).unwrap();
        let bumped = text.replacen("\"version\":1", "\"version\":99", 1);
        assert!(matches!(
            from_json(&bumped, &table),
            Err(GameError::SaveVersionTooNew { found: 99, supported: SAVE_VERSION })
        ));
    }

    #[test]
    fn test_missing_seed_is_fatal() {
        let table = ShipClassTable::builtin();
        let text = r#"{"version":1,"saved_day":0,"state":{"day":3}}"#;
        assert!(matches!(
            from_json(text, &table),
            Err(GameError::MalformedSave(_))
        ));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let table = ShipClassTable::builtin();
        assert!(matches!(
            from_json("not json at all", &table),
            Err(GameError::MalformedSave(_))
        ));
    }

    #[test]
    fn test_stripped_planets_regenerate_bit_identically() {
        let (state, table) = setup();
        let mut value: serde_json::Value =
            serde_json::from_str(&to_json(&state).unwrap()).unwrap();
        for system in value["state"]["systems"].as_array_mut().unwrap() {
            system["planets"] = serde_json::json!([]);
        }
        // Owners cached on the stripped planets are gone too; compare the
        // regenerated rosters structurally.
        let report = from_json(&value.to_string(), &table).unwrap();
        assert!(report.repairs.iter().any(|r| r.contains("Regenerated")));
        for (loaded, original) in report.state.systems.iter().zip(state.systems.iter()) {
            assert_eq!(loaded.planets.len(), original.planets.len());
            for (a, b) in loaded.planets.iter().zip(original.planets.iter()) {
                assert_eq!(a.id, b.id);
                assert_eq!(a.is_solid, b.is_solid);
            }
        }
    }

    #[test]
    fn test_unknown_ship_class_is_dropped() {
        let (state, table) = setup();
        let mut value: serde_json::Value =
            serde_json::from_str(&to_json(&state).unwrap()).unwrap();
        value["state"]["fleets"][0]["ships"][0]["class"] =
            serde_json::json!("experimental_monitor");
        let report = from_json(&value.to_string(), &table).unwrap();
        assert!(report.repairs.iter().any(|r| r.contains("unknown class")));
        for fleet in &report.state.fleets {
            for ship in &fleet.ships {
                assert!(table.get(&ship.class).is_some());
            }
        }
    }

    #[test]
    fn test_army_of_unknown_faction_is_dropped() {
        let (state, table) = setup();
        let mut value: serde_json::Value =
            serde_json::from_str(&to_json(&state).unwrap()).unwrap();
        value["state"]["armies"][0]["faction_id"] = serde_json::json!("ghost-empire");
        let report = from_json(&value.to_string(), &table).unwrap();
        assert!(report.repairs.iter().any(|r| r.contains("unknown factions")));
        assert!(report
            .state
            .armies
            .iter()
            .all(|a| report.state.faction(&a.faction_id).is_some()));
    }

    #[test]
    fn test_undersized_army_is_dropped_on_load() {
        let (state, table) = setup();
        let mut value: serde_json::Value =
            serde_json::from_str(&to_json(&state).unwrap()).unwrap();
        // Above its own destruction threshold but under the fielding minimum.
        value["state"]["armies"][0]["strength"] = serde_json::json!(50);
        value["state"]["armies"][0]["max_strength"] = serde_json::json!(400);
        let report = from_json(&value.to_string(), &table).unwrap();
        assert!(report.repairs.iter().any(|r| r.contains("fighting strength")));
        let min = report.state.rules.balance.min_army_strength;
        assert!(report.state.armies.iter().all(|a| a.strength >= min));
    }

    #[test]
    fn test_missing_cursor_is_reset() {
        let (state, table) = setup();
        let mut value: serde_json::Value =
            serde_json::from_str(&to_json(&state).unwrap()).unwrap();
        value["state"]
            .as_object_mut()
            .unwrap()
            .remove("rng_cursor");
        let report = from_json(&value.to_string(), &table).unwrap();
        assert_eq!(report.state.rng_cursor, RngCursor::start(state.seed));
        assert!(!report.repairs.is_empty());
    }

    #[test]
    fn test_unknown_fields_are_ignored() {
        let (state, table) = setup();
        let mut value: serde_json::Value =
            serde_json::from_str(&to_json(&state).unwrap()).unwrap();
        value["state"]["shiny_new_feature"] = serde_json::json!({"x": 1});
        let report = from_json(&value.to_string(), &table).unwrap();
        assert_eq!(state_hash(&report.state), state_hash(&state));
    }

    #[test]
    fn test_non_finite_position_is_clamped() {
        // JSON cannot carry NaN, but a bincode snapshot can; heal covers both
        // paths.
        let (mut state, table) = setup();
        state.fleets[0].position.x = f64::NAN;
        let mut repairs = Vec::new();
        heal(&mut state, &table, &mut repairs);
        assert!(repairs.iter().any(|r| r.contains("non-finite")));
        for fleet in &state.fleets {
            assert!(fleet.position.is_finite());
        }
    }

    #[test]
    fn test_history_caps_drop_oldest_first() {
        let (mut state, table) = setup();
        let cap = state.rules.balance.log_history_cap;
        for i in 0..cap + 50 {
            state.logs.push(crate::state::LogEntry {
                id: format!("log-{i:06}"),
                day: i as u64,
                text: format!("entry {i}"),
            });
        }
        canonicalize(&mut state);
        let report = from_json(&to_json(&state).unwrap(), &table).unwrap();
        assert_eq!(report.state.logs.len(), cap);
        // The survivors are the newest entries.
        assert_eq!(report.state.logs.first().unwrap().day, 50);
    }
}
