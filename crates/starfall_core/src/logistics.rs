//! Army and transport logistics.
//!
//! Loading, unloading, invasion deployment and intra-system transfers of
//! armies, plus the sanitize-and-repair pass run during cleanup. All
//! operations validate before mutating; the sanitize pass never fails, it
//! only repairs and reports.

use tracing::debug;

use crate::data::{BalanceConfig, ShipClassTable};
use crate::error::{GameError, Result};
use crate::rng::GameRng;
use crate::state::{ArmyState, FleetState, GameState, LogisticsOrder};

/// Whether a rival faction has an armed fleet contesting the system's orbit.
#[must_use]
pub fn orbit_contested(
    state: &GameState,
    table: &ShipClassTable,
    system_id: &str,
    faction_id: &str,
) -> bool {
    let Some(system) = state.system(system_id) else {
        return false;
    };
    let radius = state.rules.balance.engagement_radius;
    state.fleets.iter().any(|fleet| {
        fleet.faction_id != faction_id
            && fleet.position.distance(&system.position) <= radius
            && fleet
                .ships
                .iter()
                .any(|ship| table.get(&ship.class).is_some_and(|c| c.is_armed()))
    })
}

fn fleet_at_system(state: &GameState, fleet_id: &str, system_id: &str) -> bool {
    match (state.fleet(fleet_id), state.system(system_id)) {
        (Some(fleet), Some(system)) => {
            fleet.position.distance(&system.position) <= state.rules.balance.engagement_radius
        }
        _ => false,
    }
}

/// Load a deployed army onto an idle troop transport of the fleet.
///
/// # Errors
///
/// Rejects occupied or busy ships, non-transport classes, faction
/// mismatches, armies that are not deployed, and fleets out of range of the
/// army's planet.
pub fn load_army(
    state: &mut GameState,
    table: &ShipClassTable,
    fleet_id: &str,
    ship_id: &str,
    army_id: &str,
) -> Result<Vec<String>> {
    let fleet = state
        .fleet(fleet_id)
        .ok_or_else(|| GameError::FleetNotFound(fleet_id.to_string()))?;
    if fleet.is_combat_locked() {
        return Err(GameError::CombatLock(fleet_id.to_string()));
    }
    let ship = fleet
        .ship(ship_id)
        .ok_or_else(|| GameError::ShipNotFound(ship_id.to_string()))?;
    let army = state
        .army(army_id)
        .ok_or_else(|| GameError::ArmyNotFound(army_id.to_string()))?;

    if army.faction_id != fleet.faction_id {
        return Err(GameError::FactionMismatch {
            entity: army_id.to_string(),
            actual: army.faction_id.clone(),
            expected: fleet.faction_id.clone(),
        });
    }
    let class = table
        .get(&ship.class)
        .ok_or_else(|| GameError::InvalidCommand(format!("Unknown ship class: {}", ship.class)))?;
    if !class.can_carry_army() {
        return Err(GameError::InvalidCommand(format!(
            "Ship {ship_id} ({}) cannot carry an army",
            ship.class
        )));
    }
    if ship.carried_army_id.is_some() {
        return Err(GameError::InvalidCommand(format!(
            "Ship {ship_id} already carries an army"
        )));
    }
    if ship.busy_day == Some(state.day) {
        return Err(GameError::InvalidCommand(format!(
            "Ship {ship_id} is busy this day"
        )));
    }
    if army.state != ArmyState::Deployed {
        return Err(GameError::InvalidCommand(format!(
            "Army {army_id} is not deployed"
        )));
    }
    let planet = state
        .planet(&army.container_id)
        .ok_or_else(|| GameError::PlanetNotFound(army.container_id.clone()))?;
    if !fleet_at_system(state, fleet_id, &planet.system_id) {
        return Err(GameError::InvalidCommand(format!(
            "Fleet {fleet_id} is not in orbit of system {}",
            planet.system_id
        )));
    }

    let fleet_id_owned = fleet_id.to_string();
    let army = state.army_mut(army_id).expect("validated above");
    army.state = ArmyState::Embarked;
    army.container_id = fleet_id_owned;
    let ship = state
        .fleet_mut(fleet_id)
        .and_then(|f| f.ship_mut(ship_id))
        .expect("validated above");
    ship.carried_army_id = Some(army_id.to_string());

    Ok(vec![format!("Army {army_id} embarked aboard {ship_id}")])
}

/// Unload a carried army onto a solid planet.
///
/// Under a contested orbit a deterministic risk roll may inflict a strength
/// loss and abort the landing; the army then stays aboard.
///
/// # Errors
///
/// Rejects empty or unknown ships, non-solid or out-of-system planets, and
/// combat-locked fleets.
pub fn unload_army(
    state: &mut GameState,
    table: &ShipClassTable,
    rng: &mut GameRng,
    fleet_id: &str,
    ship_id: &str,
    planet_id: &str,
) -> Result<Vec<String>> {
    let fleet = state
        .fleet(fleet_id)
        .ok_or_else(|| GameError::FleetNotFound(fleet_id.to_string()))?;
    if fleet.is_combat_locked() {
        return Err(GameError::CombatLock(fleet_id.to_string()));
    }
    let faction_id = fleet.faction_id.clone();
    let ship = fleet
        .ship(ship_id)
        .ok_or_else(|| GameError::ShipNotFound(ship_id.to_string()))?;
    let army_id = ship
        .carried_army_id
        .clone()
        .ok_or_else(|| GameError::InvalidCommand(format!("Ship {ship_id} carries no army")))?;
    let planet = state
        .planet(planet_id)
        .ok_or_else(|| GameError::PlanetNotFound(planet_id.to_string()))?;
    if !planet.is_solid {
        return Err(GameError::InvalidCommand(format!(
            "Planet {planet_id} cannot host armies"
        )));
    }
    let system_id = planet.system_id.clone();
    if !fleet_at_system(state, fleet_id, &system_id) {
        return Err(GameError::InvalidCommand(format!(
            "Fleet {fleet_id} is not in orbit of system {system_id}"
        )));
    }

    let contested = orbit_contested(state, table, &system_id, &faction_id);
    Ok(drop_army(
        state, rng, contested, fleet_id, ship_id, &army_id, planet_id,
    ))
}

/// Land one carried army, applying the contested-orbit risk roll.
///
/// Returns log lines; on a failed roll the army takes a strength loss and
/// stays aboard (or is destroyed if the loss crosses the threshold).
fn drop_army(
    state: &mut GameState,
    rng: &mut GameRng,
    contested: bool,
    fleet_id: &str,
    ship_id: &str,
    army_id: &str,
    planet_id: &str,
) -> Vec<String> {
    let balance = state.rules.balance.clone();
    let mut lines = Vec::new();

    if contested && rng.next_f64() < balance.contested_landing_risk {
        let Some(army) = state.army_mut(army_id) else {
            return lines;
        };
        let loss = (f64::from(army.strength) * balance.contested_landing_loss).floor() as u32;
        army.strength = army.strength.saturating_sub(loss);
        let remaining = army.strength;
        let threshold = balance.destruction_threshold(army.max_strength);
        if remaining <= threshold {
            lines.push(format!(
                "Landing of army {army_id} at {planet_id} repelled; army destroyed"
            ));
            state.armies.retain(|a| a.id != army_id);
            if let Some(ship) = state.fleet_mut(fleet_id).and_then(|f| f.ship_mut(ship_id)) {
                ship.carried_army_id = None;
            }
        } else {
            lines.push(format!(
                "Landing of army {army_id} at {planet_id} failed under fire ({loss} casualties)"
            ));
        }
        return lines;
    }

    if let Some(army) = state.army_mut(army_id) {
        army.state = ArmyState::Deployed;
        army.container_id = planet_id.to_string();
    }
    if let Some(ship) = state.fleet_mut(fleet_id).and_then(|f| f.ship_mut(ship_id)) {
        ship.carried_army_id = None;
    }
    lines.push(format!("Army {army_id} landed on {planet_id}"));
    lines
}

/// Execute a fleet's pending logistics order on arrival at its target.
///
/// Runs atomically with the position update in the movement phase. The
/// pending order is always cleared, whether or not it could execute.
pub fn execute_arrival(
    state: &mut GameState,
    table: &ShipClassTable,
    rng: &mut GameRng,
    fleet_id: &str,
) -> Vec<String> {
    let Some(fleet) = state.fleet(fleet_id) else {
        return Vec::new();
    };
    let Some(order) = fleet.order.clone() else {
        return Vec::new();
    };
    let faction_id = fleet.faction_id.clone();

    if let Some(fleet) = state.fleet_mut(fleet_id) {
        fleet.order = None;
    }

    let mut lines = Vec::new();
    let invasion = matches!(&order, LogisticsOrder::Invade { .. });
    match order {
        LogisticsOrder::Invade { system_id } | LogisticsOrder::UnloadAt { system_id } => {
            let target_planet = state
                .system(&system_id)
                .and_then(|s| s.default_solid_planet())
                .map(|p| p.id.clone());
            let Some(planet_id) = target_planet else {
                lines.push(if invasion {
                    format!("Invasion of {system_id} aborted: no solid planet to land on")
                } else {
                    format!("Unloading at {system_id} aborted: no solid planet to land on")
                });
                return lines;
            };

            let contested = orbit_contested(state, table, &system_id, &faction_id);
            let carried: Vec<(String, String)> = state
                .fleet(fleet_id)
                .map(|f| {
                    f.ships
                        .iter()
                        .filter_map(|s| s.carried_army_id.clone().map(|a| (s.id.clone(), a)))
                        .collect()
                })
                .unwrap_or_default();

            for (ship_id, army_id) in carried {
                lines.extend(drop_army(
                    state, rng, contested, fleet_id, &ship_id, &army_id, &planet_id,
                ));
            }
        }
        LogisticsOrder::LoadAt { system_id } => {
            let planet_ids: Vec<String> = state
                .system(&system_id)
                .map(|s| s.planets.iter().filter(|p| p.is_solid).map(|p| p.id.clone()).collect())
                .unwrap_or_default();
            let deployed: Vec<String> = state
                .armies
                .iter()
                .filter(|a| {
                    a.state == ArmyState::Deployed
                        && a.faction_id == faction_id
                        && planet_ids.contains(&a.container_id)
                })
                .map(|a| a.id.clone())
                .collect();

            for army_id in deployed {
                let idle_ship = state.fleet(fleet_id).and_then(|f| {
                    f.ships
                        .iter()
                        .find(|s| {
                            s.carried_army_id.is_none()
                                && s.busy_day != Some(state.day)
                                && table.get(&s.class).is_some_and(|c| c.can_carry_army())
                        })
                        .map(|s| s.id.clone())
                });
                let Some(ship_id) = idle_ship else {
                    break;
                };
                match load_army(state, table, fleet_id, &ship_id, &army_id) {
                    Ok(mut l) => lines.append(&mut l),
                    Err(e) => debug!(army = %army_id, error = %e, "Arrival load skipped"),
                }
            }
        }
    }
    lines
}

/// Move a deployed army between two solid planets of the same system using
/// an idle transport already in orbit. The transport is busy for the rest
/// of the day.
///
/// # Errors
///
/// Rejects cross-system transfers, non-solid planets, armies not deployed
/// at the source, and fleets without an idle transport in orbit.
pub fn transfer_army(
    state: &mut GameState,
    table: &ShipClassTable,
    fleet_id: &str,
    army_id: &str,
    from_planet_id: &str,
    to_planet_id: &str,
) -> Result<Vec<String>> {
    let fleet = state
        .fleet(fleet_id)
        .ok_or_else(|| GameError::FleetNotFound(fleet_id.to_string()))?;
    if fleet.is_combat_locked() {
        return Err(GameError::CombatLock(fleet_id.to_string()));
    }
    if fleet.state != FleetState::Orbit {
        return Err(GameError::InvalidCommand(format!(
            "Fleet {fleet_id} must be in orbit to transfer"
        )));
    }
    let army = state
        .army(army_id)
        .ok_or_else(|| GameError::ArmyNotFound(army_id.to_string()))?;
    if army.faction_id != fleet.faction_id {
        return Err(GameError::FactionMismatch {
            entity: army_id.to_string(),
            actual: army.faction_id.clone(),
            expected: fleet.faction_id.clone(),
        });
    }
    if army.state != ArmyState::Deployed || army.container_id != from_planet_id {
        return Err(GameError::InvalidCommand(format!(
            "Army {army_id} is not deployed on {from_planet_id}"
        )));
    }
    let from = state
        .planet(from_planet_id)
        .ok_or_else(|| GameError::PlanetNotFound(from_planet_id.to_string()))?;
    let to = state
        .planet(to_planet_id)
        .ok_or_else(|| GameError::PlanetNotFound(to_planet_id.to_string()))?;
    if !to.is_solid {
        return Err(GameError::InvalidCommand(format!(
            "Planet {to_planet_id} cannot host armies"
        )));
    }
    if from.system_id != to.system_id {
        return Err(GameError::InvalidCommand(
            "Transfer requires both planets in the same system".to_string(),
        ));
    }
    let system_id = from.system_id.clone();
    if !fleet_at_system(state, fleet_id, &system_id) {
        return Err(GameError::InvalidCommand(format!(
            "Fleet {fleet_id} is not in orbit of system {system_id}"
        )));
    }

    let transport = fleet
        .ships
        .iter()
        .find(|s| {
            s.carried_army_id.is_none()
                && s.busy_day != Some(state.day)
                && table.get(&s.class).is_some_and(|c| c.can_carry_army())
        })
        .map(|s| s.id.clone())
        .ok_or_else(|| {
            GameError::InvalidCommand(format!("Fleet {fleet_id} has no idle transport"))
        })?;

    let day = state.day;
    if let Some(ship) = state.fleet_mut(fleet_id).and_then(|f| f.ship_mut(&transport)) {
        ship.busy_day = Some(day);
    }
    if let Some(army) = state.army_mut(army_id) {
        army.container_id = to_planet_id.to_string();
    }

    Ok(vec![format!(
        "Army {army_id} ferried from {from_planet_id} to {to_planet_id}"
    )])
}

/// Full consistency pass over ship/army cross-references.
///
/// Repairs accumulated drift and returns human-readable correction lines:
/// - clears ship carrier references to missing armies
/// - resolves duplicate carrier claims (lowest ship id keeps the army)
/// - destroys embarked armies with no live carrying ship
/// - destroys armies with invalid containers
/// - destroys armies at or below the destruction threshold, or under the
///   minimum fighting strength
/// - clamps morale into the configured multiplier range
pub fn sanitize(state: &mut GameState, balance: &BalanceConfig) -> Vec<String> {
    let mut lines = Vec::new();

    // Clear references to armies that no longer exist.
    let army_ids: Vec<String> = state.armies.iter().map(|a| a.id.clone()).collect();
    for fleet in &mut state.fleets {
        for ship in &mut fleet.ships {
            if let Some(carried) = &ship.carried_army_id {
                if !army_ids.contains(carried) {
                    lines.push(format!(
                        "Cleared ship {} reference to missing army {carried}",
                        ship.id
                    ));
                    ship.carried_army_id = None;
                }
            }
        }
    }

    // Duplicate carrier claims: the lowest ship id keeps the army.
    let mut claims: Vec<(String, String, String)> = state
        .fleets
        .iter()
        .flat_map(|f| {
            f.ships.iter().filter_map(|s| {
                s.carried_army_id
                    .clone()
                    .map(|a| (s.id.clone(), f.id.clone(), a))
            })
        })
        .collect();
    claims.sort_by(|a, b| a.0.cmp(&b.0));
    let mut keeper: std::collections::BTreeMap<String, (String, String)> =
        std::collections::BTreeMap::new();
    for (ship_id, fleet_id, army_id) in claims {
        if let Some((kept_ship, _)) = keeper.get(&army_id) {
            lines.push(format!(
                "Ship {ship_id} duplicate claim on army {army_id} removed (kept {kept_ship})"
            ));
            let kept = kept_ship.clone();
            if let Some(ship) = state.fleet_mut(&fleet_id).and_then(|f| f.ship_mut(&ship_id)) {
                if ship.id != kept {
                    ship.carried_army_id = None;
                }
            }
        } else {
            keeper.insert(army_id, (ship_id, fleet_id));
        }
    }

    // Every embarked army must resolve to a live carrying ship in the fleet
    // named by its container, and every army to a valid container.
    let mut to_remove: Vec<(String, String)> = Vec::new();
    for army in &state.armies {
        match army.state {
            ArmyState::Embarked | ArmyState::InTransit => {
                let valid = keeper
                    .get(&army.id)
                    .is_some_and(|(_, fleet_id)| *fleet_id == army.container_id);
                if !valid {
                    to_remove.push((
                        army.id.clone(),
                        format!("Army {} had no carrying ship and was lost", army.id),
                    ));
                }
            }
            ArmyState::Deployed => {
                let valid = state
                    .planet(&army.container_id)
                    .is_some_and(|p| p.is_solid);
                if !valid {
                    to_remove.push((
                        army.id.clone(),
                        format!("Army {} was stranded on an invalid site and disbanded", army.id),
                    ));
                }
            }
        }
    }

    // Destruction threshold floor, plus the fielding minimum: an army too
    // small to have been raised cannot hold the field either.
    for army in &state.armies {
        if to_remove.iter().any(|(id, _)| *id == army.id) {
            continue;
        }
        if army.strength <= balance.destruction_threshold(army.max_strength)
            || army.strength < balance.min_army_strength
        {
            to_remove.push((
                army.id.clone(),
                format!("Army {} fell below fighting strength and dissolved", army.id),
            ));
        }
    }

    for (army_id, line) in &to_remove {
        state.armies.retain(|a| a.id != *army_id);
        for fleet in &mut state.fleets {
            for ship in &mut fleet.ships {
                if ship.carried_army_id.as_deref() == Some(army_id) {
                    ship.carried_army_id = None;
                }
            }
        }
        lines.push(line.clone());
    }

    for army in &mut state.armies {
        let clamped = balance.clamp_morale(army.morale);
        if (clamped - army.morale).abs() > f64::EPSILON {
            army.morale = clamped;
        }
        if army.strength > army.max_strength {
            army.strength = army.max_strength;
        }
    }

    lines
}
