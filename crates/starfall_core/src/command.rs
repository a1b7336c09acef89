//! Command processing.
//!
//! Player and AI intents enter the simulation exclusively through
//! [`apply_command`], which follows the copy-on-write discipline: validate
//! against the previous state, clone, mutate the clone, canonicalize, and
//! re-sync the RNG cursor. A rejected command returns the previous state
//! untouched together with the error, so callers never see a half-applied
//! mutation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::canonical::canonicalize;
use crate::data::ShipClassTable;
use crate::error::{GameError, Result};
use crate::logistics;
use crate::rng::GameRng;
use crate::state::{AiStance, ArmyState, Fleet, FleetState, GameState, LogisticsOrder};

/// A player or AI intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Send a fleet toward a system.
    MoveFleet {
        /// Fleet to move.
        fleet_id: String,
        /// Destination system.
        target_system_id: String,
        /// Override for the departure day recorded on the fleet.
        depart_day: Option<u64>,
    },
    /// Move toward a system and drop all carried armies on arrival.
    OrderInvasion {
        /// Fleet to move.
        fleet_id: String,
        /// System to invade.
        system_id: String,
    },
    /// Move toward a system and embark deployed friendly armies on arrival.
    OrderLoad {
        /// Fleet to move.
        fleet_id: String,
        /// System to load at.
        system_id: String,
    },
    /// Move toward a system and disembark carried armies on arrival.
    OrderUnload {
        /// Fleet to move.
        fleet_id: String,
        /// System to unload at.
        system_id: String,
    },
    /// Embark one deployed army onto a transport, immediately, in orbit.
    LoadArmy {
        /// Fleet in orbit of the army's system.
        fleet_id: String,
        /// Transport ship.
        ship_id: String,
        /// Army to embark.
        army_id: String,
    },
    /// Land one carried army onto a solid planet, immediately, in orbit.
    UnloadArmy {
        /// Fleet in orbit of the planet's system.
        fleet_id: String,
        /// Carrying ship.
        ship_id: String,
        /// Landing site.
        planet_id: String,
    },
    /// Ferry a deployed army between two solid planets of one system.
    TransferArmy {
        /// Fleet providing the transport.
        fleet_id: String,
        /// Army to ferry.
        army_id: String,
        /// Source planet.
        from_planet_id: String,
        /// Destination planet.
        to_planet_id: String,
    },
    /// Detach ships into a new fleet at the same position.
    SplitFleet {
        /// Fleet to split.
        fleet_id: String,
        /// Ships to detach; must leave at least one ship behind.
        ship_ids: Vec<String>,
    },
    /// Fold one fleet's ships into another fleet at the same position.
    MergeFleets {
        /// Fleet absorbed and removed.
        source_fleet_id: String,
        /// Fleet receiving the ships.
        target_fleet_id: String,
    },
    /// Change a faction's AI stance.
    SetAiStance {
        /// Faction to adjust.
        faction_id: String,
        /// New stance.
        stance: AiStance,
    },
    /// Append a free-form entry to the game log.
    AppendLog {
        /// Entry text.
        text: String,
    },
}

/// Something a successfully applied command did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameEvent {
    /// A fleet started moving.
    FleetDeparted {
        /// Moving fleet.
        fleet_id: String,
        /// Destination system.
        target_system_id: String,
    },
    /// A logistics order was queued on a fleet.
    OrderQueued {
        /// Fleet carrying the order.
        fleet_id: String,
    },
    /// A logistics action produced a log line.
    Logistics {
        /// Human-readable line, also appended to the game log.
        line: String,
    },
    /// A new fleet was created by a split.
    FleetSplit {
        /// Source fleet.
        fleet_id: String,
        /// Newly created fleet.
        new_fleet_id: String,
    },
    /// A fleet was absorbed by another.
    FleetsMerged {
        /// Receiving fleet.
        target_fleet_id: String,
    },
    /// A faction's AI stance changed.
    StanceChanged {
        /// Adjusted faction.
        faction_id: String,
    },
    /// A log entry was appended.
    LogAppended,
}

/// Result of applying one command.
#[derive(Debug)]
pub struct CommandOutcome {
    /// Whether the command was accepted.
    pub ok: bool,
    /// The next state on success, the previous state unchanged on rejection.
    pub state: GameState,
    /// The rejection reason, if any.
    pub error: Option<GameError>,
    /// What the command did, empty on rejection.
    pub events: Vec<GameEvent>,
}

/// Apply one command against a state, producing the next state.
///
/// Never mutates `prev`. On rejection the outcome carries a clone of `prev`
/// and the error; on success the next state is canonical and its RNG cursor
/// reflects every draw the command consumed.
#[must_use]
pub fn apply_command(prev: &GameState, table: &ShipClassTable, command: &Command) -> CommandOutcome {
    let mut next = prev.clone();
    let mut rng = GameRng::restore(prev.rng_cursor);

    match dispatch(&mut next, table, &mut rng, command) {
        Ok(events) => {
            next.rng_cursor = rng.cursor();
            canonicalize(&mut next);
            CommandOutcome {
                ok: true,
                state: next,
                error: None,
                events,
            }
        }
        Err(error) => {
            debug!(%error, "Command rejected");
            CommandOutcome {
                ok: false,
                state: prev.clone(),
                error: Some(error),
                events: Vec::new(),
            }
        }
    }
}

fn dispatch(
    state: &mut GameState,
    table: &ShipClassTable,
    rng: &mut GameRng,
    command: &Command,
) -> Result<Vec<GameEvent>> {
    match command {
        Command::MoveFleet {
            fleet_id,
            target_system_id,
            depart_day,
        } => move_fleet(state, fleet_id, target_system_id, *depart_day, None),
        Command::OrderInvasion { fleet_id, system_id } => move_fleet(
            state,
            fleet_id,
            system_id,
            None,
            Some(LogisticsOrder::Invade {
                system_id: system_id.clone(),
            }),
        ),
        Command::OrderLoad { fleet_id, system_id } => move_fleet(
            state,
            fleet_id,
            system_id,
            None,
            Some(LogisticsOrder::LoadAt {
                system_id: system_id.clone(),
            }),
        ),
        Command::OrderUnload { fleet_id, system_id } => move_fleet(
            state,
            fleet_id,
            system_id,
            None,
            Some(LogisticsOrder::UnloadAt {
                system_id: system_id.clone(),
            }),
        ),
        Command::LoadArmy {
            fleet_id,
            ship_id,
            army_id,
        } => {
            let lines = logistics::load_army(state, table, fleet_id, ship_id, army_id)?;
            Ok(record_lines(state, rng, lines))
        }
        Command::UnloadArmy {
            fleet_id,
            ship_id,
            planet_id,
        } => {
            let lines = logistics::unload_army(state, table, rng, fleet_id, ship_id, planet_id)?;
            Ok(record_lines(state, rng, lines))
        }
        Command::TransferArmy {
            fleet_id,
            army_id,
            from_planet_id,
            to_planet_id,
        } => {
            let lines = logistics::transfer_army(
                state,
                table,
                fleet_id,
                army_id,
                from_planet_id,
                to_planet_id,
            )?;
            Ok(record_lines(state, rng, lines))
        }
        Command::SplitFleet { fleet_id, ship_ids } => split_fleet(state, rng, fleet_id, ship_ids),
        Command::MergeFleets {
            source_fleet_id,
            target_fleet_id,
        } => merge_fleets(state, source_fleet_id, target_fleet_id),
        Command::SetAiStance { faction_id, stance } => {
            let faction = state
                .faction_mut(faction_id)
                .ok_or_else(|| GameError::FactionNotFound(faction_id.clone()))?;
            faction.ai_stance = *stance;
            Ok(vec![GameEvent::StanceChanged {
                faction_id: faction_id.clone(),
            }])
        }
        Command::AppendLog { text } => {
            state.add_log(rng, text.clone());
            Ok(vec![GameEvent::LogAppended])
        }
    }
}

/// Append logistics lines to the game log and wrap them as events.
fn record_lines(state: &mut GameState, rng: &mut GameRng, lines: Vec<String>) -> Vec<GameEvent> {
    lines
        .into_iter()
        .map(|line| {
            state.add_log(rng, line.clone());
            GameEvent::Logistics { line }
        })
        .collect()
}

fn move_fleet(
    state: &mut GameState,
    fleet_id: &str,
    target_system_id: &str,
    depart_day: Option<u64>,
    order: Option<LogisticsOrder>,
) -> Result<Vec<GameEvent>> {
    let target = state
        .system(target_system_id)
        .ok_or_else(|| GameError::SystemNotFound(target_system_id.to_string()))?
        .position;
    let day = depart_day.unwrap_or(state.day);

    let fleet = state
        .fleet_mut(fleet_id)
        .ok_or_else(|| GameError::FleetNotFound(fleet_id.to_string()))?;
    if fleet.is_combat_locked() {
        return Err(GameError::CombatLock(fleet_id.to_string()));
    }

    let queued = order.is_some();
    fleet.state = FleetState::Moving;
    fleet.state_start_day = day;
    fleet.target_system_id = Some(target_system_id.to_string());
    fleet.target_position = Some(target);
    fleet.retreating = false;
    fleet.order = order;

    let mut events = vec![GameEvent::FleetDeparted {
        fleet_id: fleet_id.to_string(),
        target_system_id: target_system_id.to_string(),
    }];
    if queued {
        events.push(GameEvent::OrderQueued {
            fleet_id: fleet_id.to_string(),
        });
    }
    Ok(events)
}

fn split_fleet(
    state: &mut GameState,
    rng: &mut GameRng,
    fleet_id: &str,
    ship_ids: &[String],
) -> Result<Vec<GameEvent>> {
    if ship_ids.is_empty() {
        return Err(GameError::InvalidCommand(
            "Split requires at least one ship".to_string(),
        ));
    }
    let fleet = state
        .fleet(fleet_id)
        .ok_or_else(|| GameError::FleetNotFound(fleet_id.to_string()))?;
    if fleet.is_combat_locked() {
        return Err(GameError::CombatLock(fleet_id.to_string()));
    }
    if fleet.retreating {
        return Err(GameError::InvalidCommand(format!(
            "Fleet {fleet_id} is retreating and cannot be reorganized"
        )));
    }
    for ship_id in ship_ids {
        if fleet.ship(ship_id).is_none() {
            return Err(GameError::ShipNotFound(ship_id.clone()));
        }
    }
    if ship_ids.len() >= fleet.ships.len() {
        return Err(GameError::InvalidCommand(format!(
            "Split would leave fleet {fleet_id} empty"
        )));
    }

    let faction_id = fleet.faction_id.clone();
    let position = fleet.position;
    let new_fleet_id = state.unique_id(rng, "fleet");

    let fleet = state
        .fleet_mut(fleet_id)
        .ok_or_else(|| GameError::FleetNotFound(fleet_id.to_string()))?;
    let mut detached = Vec::new();
    fleet.ships.retain_mut(|ship| {
        if ship_ids.contains(&ship.id) {
            detached.push(ship.clone());
            false
        } else {
            true
        }
    });

    // Armies aboard detached transports follow their ship to the new fleet.
    let carried: Vec<String> = detached
        .iter()
        .filter_map(|s| s.carried_army_id.clone())
        .collect();
    for army_id in &carried {
        if let Some(army) = state.army_mut(army_id) {
            if army.state == ArmyState::Embarked {
                army.container_id = new_fleet_id.clone();
            }
        }
    }

    let day = state.day;
    state.fleets.push(Fleet {
        id: new_fleet_id.clone(),
        faction_id,
        ships: detached,
        position,
        state: FleetState::Orbit,
        target_system_id: None,
        target_position: None,
        retreating: false,
        order: None,
        state_start_day: day,
    });

    Ok(vec![GameEvent::FleetSplit {
        fleet_id: fleet_id.to_string(),
        new_fleet_id,
    }])
}

fn merge_fleets(
    state: &mut GameState,
    source_fleet_id: &str,
    target_fleet_id: &str,
) -> Result<Vec<GameEvent>> {
    if source_fleet_id == target_fleet_id {
        return Err(GameError::InvalidCommand(
            "Cannot merge a fleet into itself".to_string(),
        ));
    }
    let source = state
        .fleet(source_fleet_id)
        .ok_or_else(|| GameError::FleetNotFound(source_fleet_id.to_string()))?;
    let target = state
        .fleet(target_fleet_id)
        .ok_or_else(|| GameError::FleetNotFound(target_fleet_id.to_string()))?;
    if source.is_combat_locked() || target.is_combat_locked() {
        return Err(GameError::CombatLock(format!(
            "{source_fleet_id} or {target_fleet_id}"
        )));
    }
    if source.retreating || target.retreating {
        return Err(GameError::InvalidCommand(format!(
            "Fleet {source_fleet_id} or {target_fleet_id} is retreating and cannot be reorganized"
        )));
    }
    if source.faction_id != target.faction_id {
        return Err(GameError::FactionMismatch {
            entity: source_fleet_id.to_string(),
            actual: source.faction_id.clone(),
            expected: target.faction_id.clone(),
        });
    }
    let radius = state.rules.balance.engagement_radius;
    if source.position.distance(&target.position) > radius {
        return Err(GameError::InvalidCommand(format!(
            "Fleets {source_fleet_id} and {target_fleet_id} are not co-located"
        )));
    }

    let ships = source.ships.clone();
    let carried: Vec<String> = ships.iter().filter_map(|s| s.carried_army_id.clone()).collect();
    for army_id in &carried {
        if let Some(army) = state.army_mut(army_id) {
            if army.state == ArmyState::Embarked {
                army.container_id = target_fleet_id.to_string();
            }
        }
    }
    if let Some(target) = state.fleet_mut(target_fleet_id) {
        target.ships.extend(ships);
    }
    state.fleets.retain(|f| f.id != source_fleet_id);

    Ok(vec![GameEvent::FleetsMerged {
        target_fleet_id: target_fleet_id.to_string(),
    }])
}
