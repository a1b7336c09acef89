//! Test fixtures and helpers.
//!
//! Pre-built game states and entity builders for consistent testing.

use starfall_core::data::ShipClassTable;
use starfall_core::math::Vec3;
use starfall_core::scenario::{new_game, ScenarioConfig};
use starfall_core::state::{
    Army, ArmyState, Fleet, FleetState, GameState, PlanetBody, Ship, StarSystem,
};

/// The builtin ship class table.
#[must_use]
pub fn table() -> ShipClassTable {
    ShipClassTable::builtin()
}

/// A two-faction skirmish ("fed" vs AI "kor") on six systems.
///
/// # Panics
///
/// Panics if the scenario fails to build; that is a bug, not a test case.
#[must_use]
pub fn skirmish(seed: u64) -> GameState {
    new_game(&ScenarioConfig::skirmish(seed), &table()).expect("skirmish scenario must build")
}

/// A fresh ship of the given class at full hull, fuel, and magazines.
///
/// # Panics
///
/// Panics on an unknown class id.
#[must_use]
pub fn ship(id: &str, class: &str, table: &ShipClassTable) -> Ship {
    let data = table.get(class).expect("known ship class");
    Ship {
        id: id.to_string(),
        class: class.to_string(),
        hp: data.hp,
        max_hp: data.hp,
        fuel: data.fuel_capacity,
        carried_army_id: None,
        missiles: data.missiles,
        torpedoes: data.torpedoes,
        kills: 0,
        busy_day: None,
    }
}

/// An orbiting fleet at the given position.
#[must_use]
pub fn fleet_at(id: &str, faction: &str, position: Vec3, ships: Vec<Ship>) -> Fleet {
    Fleet {
        id: id.to_string(),
        faction_id: faction.to_string(),
        ships,
        position,
        state: FleetState::Orbit,
        target_system_id: None,
        target_position: None,
        retreating: false,
        order: None,
        state_start_day: 0,
    }
}

/// A full-strength army deployed on the given planet.
#[must_use]
pub fn deployed_army(id: &str, faction: &str, planet_id: &str, strength: u32) -> Army {
    Army {
        id: id.to_string(),
        faction_id: faction.to_string(),
        strength,
        max_strength: strength,
        morale: 1.0,
        state: ArmyState::Deployed,
        container_id: planet_id.to_string(),
    }
}

/// A single-planet star system at the given position.
#[must_use]
pub fn system_at(id: &str, position: Vec3) -> StarSystem {
    StarSystem {
        id: id.to_string(),
        name: id.to_string(),
        position,
        planets: vec![PlanetBody {
            id: format!("{id}-p1"),
            system_id: id.to_string(),
            is_solid: true,
            owner_faction_id: None,
        }],
    }
}
