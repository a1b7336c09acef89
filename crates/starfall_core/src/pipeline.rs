//! The day-tick turn pipeline.
//!
//! [`advance_day`] drives one simulation day through a fixed phase order:
//!
//! 1. Movement - fleets step toward their targets, burning fuel; arrivals
//!    execute their pending logistics order atomically.
//! 2. Detection - hostile contact schedules battles ([`crate::detect`]).
//! 3. Battle resolution - every scheduled battle resolves the same tick,
//!    each on its own derived RNG stream ([`crate::space`]).
//! 4. Ground resolution - contested planets fight ([`crate::ground`]) and
//!    ownership is re-derived from presence.
//! 5. Orbital bombardment - a faction with uncontested orbital dominance
//!    softens enemy ground forces, never destroying an army outright.
//! 6. AI planning - AI factions issue commands through the same command
//!    processor players use ([`crate::ai`]).
//! 7. Cleanup - battle pruning, reference repair, retreat stand-down,
//!    history trimming, and passive resource extraction.
//! 8. Victory evaluation ([`crate::victory`]).
//!
//! The pipeline is a pure transition: it never mutates its input and the
//! output state is canonical with a re-synced RNG cursor.

use tracing::debug;

use crate::canonical::{canonicalize, state_hash};
use crate::command::apply_command;
use crate::data::{ShipClassTable, ShipRole};
use crate::detect;
use crate::error::Result;
use crate::ground;
use crate::logistics;
use crate::rng::GameRng;
use crate::space;
use crate::state::{Fleet, FleetState, GameState};
use crate::victory;

/// Advance the simulation by one day.
///
/// A finished game (winner already decided) is returned unchanged.
///
/// # Errors
///
/// Propagates internal invariant failures such as a stale spatial index;
/// validation problems inside a phase repair-and-log instead of failing.
pub fn advance_day(prev: &GameState, table: &ShipClassTable) -> Result<GameState> {
    if prev.winner_faction_id.is_some() {
        return Ok(prev.clone());
    }

    let mut state = prev.clone();
    state.day += 1;
    let mut rng = GameRng::restore(state.rng_cursor);

    run_movement(&mut state, table, &mut rng);
    canonicalize(&mut state);

    detect::detect_battles(&mut state)?;
    canonicalize(&mut state);

    run_battles(&mut state, table, &mut rng)?;
    canonicalize(&mut state);

    run_ground(&mut state, &mut rng);
    crate::state::refresh_planet_ownership(&mut state);

    run_bombardment(&mut state, table, &mut rng);
    canonicalize(&mut state);

    // AI commands go through the command processor, which owns the cursor
    // while it runs.
    state.rng_cursor = rng.cursor();
    run_ai(&mut state, table);
    rng = GameRng::restore(state.rng_cursor);

    run_cleanup(&mut state, table, &mut rng);
    victory::evaluate(&mut state, &mut rng);

    state.rng_cursor = rng.cursor();
    canonicalize(&mut state);
    debug!(day = state.day, hash = state_hash(&state), "Day advanced");
    Ok(state)
}

/// Cruise speed of a fleet: the slowest ship sets the pace.
fn fleet_speed(state: &GameState, table: &ShipClassTable, fleet_id: &str) -> f64 {
    state
        .fleet(fleet_id)
        .map(|fleet| {
            fleet
                .ships
                .iter()
                .filter_map(|s| table.get(&s.class).map(|c| c.speed))
                .fold(f64::INFINITY, f64::min)
        })
        .filter(|s| s.is_finite())
        .unwrap_or(0.0)
}

fn run_movement(state: &mut GameState, table: &ShipClassTable, rng: &mut GameRng) {
    let moving: Vec<String> = state
        .fleets
        .iter()
        .filter(|f| f.state == FleetState::Moving)
        .map(|f| f.id.clone())
        .collect();

    for fleet_id in moving {
        let Some(fleet) = state.fleet(&fleet_id) else {
            continue;
        };
        let Some(target) = fleet.target_position else {
            // No destination to move toward; settle in place.
            if let Some(fleet) = state.fleet_mut(&fleet_id) {
                fleet.state = FleetState::Orbit;
            }
            continue;
        };

        let unlimited = state.rules.unlimited_fuel;
        let fueled = unlimited || fleet.ships.iter().all(|s| s.fuel > 0.0);
        if !fueled {
            let day = state.day;
            if let Some(fleet) = state.fleet_mut(&fleet_id) {
                fleet.state = FleetState::Orbit;
                fleet.state_start_day = day;
                fleet.target_system_id = None;
                fleet.target_position = None;
                fleet.order = None;
            }
            state.add_log(rng, format!("Fleet {fleet_id} is stranded without fuel"));
            continue;
        }

        let speed = fleet_speed(state, table, &fleet_id);
        let position = state
            .fleet(&fleet_id)
            .map(|f| f.position)
            .unwrap_or_default();
        let (next, arrived) = position.step_toward(&target, speed);

        let day = state.day;
        if let Some(fleet) = state.fleet_mut(&fleet_id) {
            fleet.position = next;
            if !unlimited {
                for ship in &mut fleet.ships {
                    let burn = table.get(&ship.class).map_or(0.0, |c| c.fuel_per_day);
                    ship.fuel = (ship.fuel - burn).max(0.0);
                }
            }
            if arrived {
                fleet.state = FleetState::Orbit;
                fleet.state_start_day = day;
                fleet.target_system_id = None;
                fleet.target_position = None;
            }
        }

        if arrived {
            // The pending order executes atomically with the arrival.
            let lines = logistics::execute_arrival(state, table, rng, &fleet_id);
            for line in lines {
                state.add_log(rng, line);
            }
        }
    }
}

fn run_battles(state: &mut GameState, table: &ShipClassTable, rng: &mut GameRng) -> Result<()> {
    let scheduled: Vec<String> = state
        .battles
        .iter()
        .filter(|b| b.status == crate::state::BattleStatus::Scheduled)
        .map(|b| b.id.clone())
        .collect();

    // Each battle forks its own stream from the parent cursor position, so
    // resolution order cannot leak randomness between battles.
    let fork = state.rng_cursor.word_lo;
    for battle_id in scheduled {
        let mut child = rng.derive(&format!("battle:{battle_id}:{fork}"));
        let report = space::resolve_battle(state, table, &battle_id, &mut child)?;

        for army_id in &report.destroyed_army_ids {
            state.armies.retain(|a| a.id != *army_id);
        }
        let summary = state
            .battle(&battle_id)
            .and_then(|b| b.log.last().cloned())
            .unwrap_or_else(|| format!("Battle {battle_id} resolved"));
        state.add_log(rng, summary);
    }
    Ok(())
}

fn run_ground(state: &mut GameState, rng: &mut GameRng) {
    let reports = ground::resolve_ground(state);
    for report in reports {
        for line in report.log {
            state.add_log(rng, line);
        }
    }
}

/// One faction with sole armed orbital presence bombards enemy ground
/// forces. Bombardment weakens but never destroys: strength floors just
/// above the destruction threshold.
fn run_bombardment(state: &mut GameState, table: &ShipClassTable, rng: &mut GameRng) {
    let balance = state.rules.balance.clone();
    let total_war = state.rules.total_war;
    let system_ids: Vec<String> = state.systems.iter().map(|s| s.id.clone()).collect();

    for system_id in system_ids {
        let Some(system) = state.system(&system_id) else {
            continue;
        };
        let position = system.position;

        // Dominance requires exactly one faction with bombardment-capable
        // ships in orbit: armed, and not a troop carrier.
        let mut dominant: Option<String> = None;
        let mut contested = false;
        for fleet in &state.fleets {
            if fleet.position.distance(&position) > balance.engagement_radius {
                continue;
            }
            let capable = fleet.ships.iter().any(|s| {
                table
                    .get(&s.class)
                    .is_some_and(|c| c.is_armed() && c.role != ShipRole::TroopTransport)
            });
            if !capable {
                continue;
            }
            match &dominant {
                None => dominant = Some(fleet.faction_id.clone()),
                Some(faction) if *faction != fleet.faction_id => {
                    contested = true;
                    break;
                }
                Some(_) => {}
            }
        }
        let Some(bombardier) = dominant.filter(|_| !contested) else {
            continue;
        };

        let planet_ids: Vec<String> = state
            .system(&system_id)
            .map(|s| s.planets.iter().filter(|p| p.is_solid).map(|p| p.id.clone()).collect())
            .unwrap_or_default();

        for planet_id in planet_ids {
            // Without total war, bombardment needs a ground stake: own the
            // planet or have armies committed on it.
            if !total_war {
                let owns = state
                    .planet(&planet_id)
                    .and_then(|p| p.owner_faction_id.as_deref())
                    == Some(bombardier.as_str());
                let committed = state
                    .armies_on_planet(&planet_id)
                    .iter()
                    .any(|a| a.faction_id == bombardier);
                if !owns && !committed {
                    continue;
                }
            }

            let targets: Vec<String> = state
                .armies_on_planet(&planet_id)
                .iter()
                .filter(|a| a.faction_id != bombardier)
                .map(|a| a.id.clone())
                .collect();

            for army_id in targets {
                let Some(army) = state.army_mut(&army_id) else {
                    continue;
                };
                let threshold = balance.destruction_threshold(army.max_strength);
                let loss =
                    (f64::from(army.strength) * balance.bombardment_strength_fraction).floor() as u32;
                let floor = threshold + 1;
                let new_strength = army.strength.saturating_sub(loss).max(floor);
                let actual = army.strength.saturating_sub(new_strength);
                if actual == 0 {
                    continue;
                }
                army.strength = new_strength;
                army.morale = balance.clamp_morale(army.morale - balance.bombardment_morale_loss);
                state.add_log(
                    rng,
                    format!(
                        "Orbital bombardment by {bombardier} inflicted {actual} casualties on army {army_id}"
                    ),
                );
            }
        }
    }
}

fn run_ai(state: &mut GameState, table: &ShipClassTable) {
    let commands = crate::ai::plan(state, table);
    for command in commands {
        let outcome = apply_command(state, table, &command);
        if outcome.ok {
            *state = outcome.state;
        } else {
            debug!(?command, error = ?outcome.error, "AI command rejected");
        }
    }
}

/// Whether any armed rival fleet sits within `radius` of `fleet`.
fn armed_rival_in_range(
    state: &GameState,
    table: &ShipClassTable,
    fleet: &Fleet,
    radius: f64,
) -> bool {
    state.fleets.iter().any(|other| {
        other.faction_id != fleet.faction_id
            && other.position.distance(&fleet.position) <= radius
            && other
                .ships
                .iter()
                .any(|s| table.get(&s.class).is_some_and(|c| c.is_armed()))
    })
}

fn run_cleanup(state: &mut GameState, table: &ShipClassTable, rng: &mut GameRng) {
    detect::prune_battles(state);

    let balance = state.rules.balance.clone();
    let repairs = logistics::sanitize(state, &balance);
    for line in repairs {
        state.add_log(rng, line);
    }

    // Beaten fleets stand down once every armed rival is out of range.
    let recovered: Vec<String> = state
        .fleets
        .iter()
        .filter(|f| {
            f.retreating && !armed_rival_in_range(state, table, f, balance.engagement_radius)
        })
        .map(|f| f.id.clone())
        .collect();
    for fleet_id in recovered {
        if let Some(fleet) = state.fleet_mut(&fleet_id) {
            fleet.retreating = false;
        }
    }

    // Passive extraction: support ships in orbit harvest for their faction,
    // but only while no armed rival sits within engagement range.
    let mut income: Vec<(String, f64)> = Vec::new();
    for fleet in &state.fleets {
        if fleet.state != FleetState::Orbit {
            continue;
        }
        if armed_rival_in_range(state, table, fleet, balance.engagement_radius) {
            continue;
        }
        let tenders = fleet
            .ships
            .iter()
            .filter(|s| {
                table
                    .get(&s.class)
                    .is_some_and(|c| c.role == ShipRole::Support)
            })
            .count();
        if tenders > 0 {
            income.push((
                fleet.faction_id.clone(),
                tenders as f64 * balance.extraction_per_ship,
            ));
        }
    }
    for (faction_id, amount) in income {
        if let Some(faction) = state.faction_mut(&faction_id) {
            faction.resources += amount;
        }
    }

    // History caps drop the oldest entries first.
    canonicalize(state);
    let log_cap = balance.log_history_cap;
    if state.logs.len() > log_cap {
        let excess = state.logs.len() - log_cap;
        state.logs.drain(..excess);
    }
    let msg_cap = balance.message_history_cap;
    if state.messages.len() > msg_cap {
        let excess = state.messages.len() - msg_cap;
        state.messages.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Command;
    use crate::math::Vec3;
    use crate::scenario::{new_game, ScenarioConfig};
    use crate::state::BattleStatus;

    fn setup() -> (GameState, ShipClassTable) {
        let table = ShipClassTable::builtin();
        let state = new_game(&ScenarioConfig::skirmish(31), &table).unwrap();
        (state, table)
    }

    fn fed_fleet(state: &GameState) -> String {
        state
            .fleets
            .iter()
            .find(|f| f.faction_id == "fed")
            .unwrap()
            .id
            .clone()
    }

    #[test]
    fn test_advance_day_increments_day() {
        let (state, table) = setup();
        let next = advance_day(&state, &table).unwrap();
        assert_eq!(next.day, state.day + 1);
        // The input state is untouched.
        assert_eq!(state.day, 0);
    }

    #[test]
    fn test_advance_day_is_deterministic() {
        let (state, table) = setup();
        let mut a = state.clone();
        let mut b = state;
        for _ in 0..5 {
            a = advance_day(&a, &table).unwrap();
            b = advance_day(&b, &table).unwrap();
        }
        assert_eq!(state_hash(&a), state_hash(&b));
    }

    #[test]
    fn test_moving_fleet_makes_progress_and_arrives() {
        let (mut state, table) = setup();
        state.rules.unlimited_fuel = true;
        let fleet_id = fed_fleet(&state);
        let outcome = apply_command(
            &state,
            &table,
            &Command::MoveFleet {
                fleet_id: fleet_id.clone(),
                target_system_id: "sys-03".to_string(),
                depart_day: None,
            },
        );
        assert!(outcome.ok);
        let mut state = outcome.state;

        let start = state.fleet(&fleet_id).unwrap().position;
        let target = state.system("sys-03").unwrap().position;
        let start_dist = start.distance(&target);

        state = advance_day(&state, &table).unwrap();
        let after = state.fleet(&fleet_id).unwrap().position.distance(&target);
        assert!(after < start_dist);

        for _ in 0..200 {
            if state.fleet(&fleet_id).unwrap().state == FleetState::Orbit {
                break;
            }
            state = advance_day(&state, &table).unwrap();
        }
        let fleet = state.fleet(&fleet_id).unwrap();
        assert_eq!(fleet.state, FleetState::Orbit);
        assert!(fleet.position.distance(&target) < 1e-9);
        assert!(fleet.target_system_id.is_none());
    }

    #[test]
    fn test_fuel_exhaustion_strands_fleet() {
        let (mut state, table) = setup();
        let fleet_id = fed_fleet(&state);
        for ship in &mut state.fleet_mut(&fleet_id).unwrap().ships {
            ship.fuel = 0.0;
        }
        let outcome = apply_command(
            &state,
            &table,
            &Command::MoveFleet {
                fleet_id: fleet_id.clone(),
                target_system_id: "sys-06".to_string(),
                depart_day: None,
            },
        );
        assert!(outcome.ok);

        let state = advance_day(&outcome.state, &table).unwrap();
        let fleet = state.fleet(&fleet_id).unwrap();
        assert_eq!(fleet.state, FleetState::Orbit);
        assert!(fleet.target_system_id.is_none());
        assert!(state.logs.iter().any(|l| l.text.contains("stranded")));
    }

    #[test]
    fn test_battles_resolve_the_same_tick() {
        let (mut state, table) = setup();
        // Park the enemy fleet in the federation home system.
        let fed = fed_fleet(&state);
        let home = state.fleet(&fed).unwrap().position;
        let kor = state
            .fleets
            .iter()
            .find(|f| f.faction_id == "kor")
            .unwrap()
            .id
            .clone();
        state.fleet_mut(&kor).unwrap().position = home;
        canonicalize(&mut state);

        let next = advance_day(&state, &table).unwrap();
        assert!(!next.battles.is_empty());
        for battle in &next.battles {
            assert_eq!(battle.status, BattleStatus::Resolved);
            assert_eq!(battle.day_resolved, Some(next.day));
            assert!(battle.verdict.is_some());
        }
    }

    #[test]
    fn test_retreating_fleet_stands_down_only_when_clear() {
        let (mut state, table) = setup();
        let fed = fed_fleet(&state);
        let kor = state
            .fleets
            .iter()
            .find(|f| f.faction_id == "kor")
            .unwrap()
            .id
            .clone();
        // Park the armed rival on top of the beaten fleet.
        let home = state.fleet(&fed).unwrap().position;
        state.fleet_mut(&kor).unwrap().position = home;
        state.fleet_mut(&fed).unwrap().retreating = true;
        canonicalize(&mut state);

        let mut rng = GameRng::restore(state.rng_cursor);
        run_cleanup(&mut state, &table, &mut rng);
        assert!(state.fleet(&fed).unwrap().retreating);

        // Once the rival withdraws, the posture clears.
        state.fleet_mut(&kor).unwrap().position = Vec3::new(1.0e6, 0.0, 1.0e6);
        canonicalize(&mut state);
        run_cleanup(&mut state, &table, &mut rng);
        assert!(!state.fleet(&fed).unwrap().retreating);
    }

    #[test]
    fn test_finished_game_does_not_advance() {
        let (mut state, table) = setup();
        state.winner_faction_id = Some("fed".to_string());
        let next = advance_day(&state, &table).unwrap();
        assert_eq!(next.day, state.day);
        assert_eq!(state_hash(&next), state_hash(&state));
    }

    #[test]
    fn test_bombardment_never_destroys_an_army() {
        let (mut state, table) = setup();
        state.rules.total_war = true;
        // Move the armed federation fleet over the enemy home world and
        // remove the enemy fleet so orbit dominance is uncontested.
        let kor_army_planet = state
            .armies
            .iter()
            .find(|a| a.faction_id == "kor")
            .unwrap()
            .container_id
            .clone();
        let system_id = state.planet(&kor_army_planet).unwrap().system_id.clone();
        let position = state.system(&system_id).unwrap().position;
        let fed = fed_fleet(&state);
        state.fleet_mut(&fed).unwrap().position = position;
        state.fleets.retain(|f| f.faction_id != "kor");
        canonicalize(&mut state);

        let mut state = state;
        let threshold = {
            let army = state.armies.iter().find(|a| a.faction_id == "kor").unwrap();
            state.rules.balance.destruction_threshold(army.max_strength)
        };
        for _ in 0..100 {
            state = advance_day(&state, &table).unwrap();
            if state.winner_faction_id.is_some() {
                break;
            }
        }
        if let Some(army) = state.armies.iter().find(|a| a.faction_id == "kor") {
            assert!(army.strength > threshold);
        }
    }
}
