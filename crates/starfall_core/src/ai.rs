//! Heuristic AI planning.
//!
//! AI factions issue intents through the same command processor players
//! use; the planner only decides *what* to ask for. Per idle fleet, in
//! canonical order:
//!
//! - carrying armies: invade the nearest system not held by the faction
//! - empty transports with friendly armies deployed somewhere: go load them
//! - aggressive stance with guns but nothing to carry: push toward the
//!   nearest enemy-held system
//!
//! Passive factions, combat-locked fleets, retreating fleets, and fleets
//! already moving or holding an order are all left alone. Planning reads
//! the state and consumes no randomness; ties resolve through the spatial
//! index's lowest-id rule, so two runs plan identical campaigns.

use tracing::debug;

use crate::command::Command;
use crate::data::ShipClassTable;
use crate::spatial::SpatialGrid;
use crate::state::{derive_system_owner, AiStance, ArmyState, Fleet, FleetState, GameState};

/// Plan commands for every AI faction.
#[must_use]
pub fn plan(state: &GameState, table: &ShipClassTable) -> Vec<Command> {
    let mut grid = SpatialGrid::new(state.day, state.rules.balance.engagement_radius.max(1.0));
    for system in &state.systems {
        grid.insert(system.id.clone(), system.position.x, system.position.z);
    }

    let mut commands = Vec::new();
    for faction in &state.factions {
        if !faction.is_ai || faction.ai_stance == AiStance::Passive {
            continue;
        }
        for fleet in &state.fleets {
            if fleet.faction_id != faction.id {
                continue;
            }
            if fleet.state != FleetState::Orbit || fleet.retreating || fleet.order.is_some() {
                continue;
            }
            if let Some(command) = plan_fleet(state, table, &grid, fleet, faction.ai_stance) {
                debug!(fleet = %fleet.id, ?command, "AI planned");
                commands.push(command);
            }
        }
    }
    commands
}

fn plan_fleet(
    state: &GameState,
    table: &ShipClassTable,
    grid: &SpatialGrid,
    fleet: &Fleet,
    stance: AiStance,
) -> Option<Command> {
    let carrying = fleet.ships.iter().any(|s| s.carried_army_id.is_some());
    let has_transport = fleet.ships.iter().any(|s| {
        s.carried_army_id.is_none() && table.get(&s.class).is_some_and(|c| c.can_carry_army())
    });
    let has_guns = fleet
        .ships
        .iter()
        .any(|s| table.get(&s.class).is_some_and(|c| c.is_armed()));

    if carrying {
        // Strike the nearest system the faction does not already hold.
        let target = nearest_system(state, grid, fleet, |state, system_id| {
            state
                .system(system_id)
                .is_some_and(|s| s.default_solid_planet().is_some())
                && derive_system_owner(state, system_id).as_deref() != Some(fleet.faction_id.as_str())
        })?;
        return Some(Command::OrderInvasion {
            fleet_id: fleet.id.clone(),
            system_id: target,
        });
    }

    if has_transport {
        // Pick up the nearest friendly garrison.
        let faction_id = fleet.faction_id.clone();
        let target = nearest_system(state, grid, fleet, |state, system_id| {
            state.armies.iter().any(|a| {
                a.state == ArmyState::Deployed
                    && a.faction_id == faction_id
                    && state
                        .planet(&a.container_id)
                        .is_some_and(|p| p.system_id == *system_id)
            })
        });
        if let Some(system_id) = target {
            return Some(Command::OrderLoad {
                fleet_id: fleet.id.clone(),
                system_id,
            });
        }
    }

    if stance == AiStance::Aggressive && has_guns {
        let faction_id = fleet.faction_id.clone();
        let target = nearest_system(state, grid, fleet, |state, system_id| {
            derive_system_owner(state, system_id)
                .is_some_and(|owner| owner != faction_id)
        })?;
        return Some(Command::MoveFleet {
            fleet_id: fleet.id.clone(),
            target_system_id: target,
            depart_day: None,
        });
    }

    None
}

fn nearest_system<P>(
    state: &GameState,
    grid: &SpatialGrid,
    fleet: &Fleet,
    predicate: P,
) -> Option<String>
where
    P: Fn(&GameState, &str) -> bool,
{
    grid.find_nearest(state.day, fleet.position.x, fleet.position.z, |id| {
        predicate(state, id)
    })
    .ok()
    .flatten()
    .map(|(id, _)| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logistics::load_army;
    use crate::scenario::{new_game, ScenarioConfig};

    fn setup() -> (GameState, ShipClassTable) {
        let table = ShipClassTable::builtin();
        let state = new_game(&ScenarioConfig::skirmish(41), &table).unwrap();
        (state, table)
    }

    fn kor_fleet(state: &GameState) -> String {
        state
            .fleets
            .iter()
            .find(|f| f.faction_id == "kor")
            .unwrap()
            .id
            .clone()
    }

    #[test]
    fn test_plan_only_covers_ai_factions() {
        let (state, table) = setup();
        let commands = plan(&state, &table);
        for command in &commands {
            let fleet_id = match command {
                Command::OrderLoad { fleet_id, .. }
                | Command::OrderInvasion { fleet_id, .. }
                | Command::MoveFleet { fleet_id, .. } => fleet_id,
                other => panic!("unexpected AI command: {other:?}"),
            };
            assert_eq!(state.fleet(fleet_id).unwrap().faction_id, "kor");
        }
    }

    #[test]
    fn test_balanced_fleet_loads_its_garrison_first() {
        let (state, table) = setup();
        let fleet_id = kor_fleet(&state);
        let commands = plan(&state, &table);
        // Empty transports next to a deployed garrison: go pick it up.
        assert!(commands.iter().any(|c| matches!(
            c,
            Command::OrderLoad { fleet_id: f, .. } if *f == fleet_id
        )));
    }

    #[test]
    fn test_loaded_fleet_plans_invasion() {
        let (mut state, table) = setup();
        let fleet_id = kor_fleet(&state);
        let army_id = state
            .armies
            .iter()
            .find(|a| a.faction_id == "kor")
            .unwrap()
            .id
            .clone();
        let ship_id = state
            .fleet(&fleet_id)
            .unwrap()
            .ships
            .iter()
            .find(|s| table.get(&s.class).unwrap().can_carry_army())
            .unwrap()
            .id
            .clone();
        load_army(&mut state, &table, &fleet_id, &ship_id, &army_id).unwrap();

        let commands = plan(&state, &table);
        let invasion = commands.iter().find_map(|c| match c {
            Command::OrderInvasion { fleet_id: f, system_id } if *f == fleet_id => {
                Some(system_id.clone())
            }
            _ => None,
        });
        let target = invasion.expect("loaded fleet must plan an invasion");
        // Never invades ground the faction already holds.
        assert_ne!(
            derive_system_owner(&state, &target).as_deref(),
            Some("kor")
        );
    }

    #[test]
    fn test_passive_stance_plans_nothing() {
        let (mut state, table) = setup();
        state.faction_mut("kor").unwrap().ai_stance = AiStance::Passive;
        assert!(plan(&state, &table).is_empty());
    }

    #[test]
    fn test_combat_locked_fleet_is_skipped() {
        let (mut state, table) = setup();
        let fleet_id = kor_fleet(&state);
        state.fleet_mut(&fleet_id).unwrap().state = FleetState::Combat;
        assert!(plan(&state, &table).is_empty());
    }

    #[test]
    fn test_plan_is_deterministic() {
        let (state, table) = setup();
        assert_eq!(plan(&state, &table), plan(&state, &table));
    }
}
