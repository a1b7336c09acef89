//! Battle detection.
//!
//! Scans the map once per tick: every fleet not already locked in combat
//! is assigned to its nearest system within the engagement radius, and
//! each system claimed by two or more factions gets one battle scheduled.
//! Battle ids are position-derived (`battle-{day}-{system}`), so detection
//! never consumes randomness and two runs of the same day schedule
//! byte-identical battles. Detected fleets are combat-locked: any pending
//! movement or logistics order is cancelled on the spot.

use std::collections::BTreeMap;

use tracing::debug;

use crate::error::Result;
use crate::spatial::SpatialGrid;
use crate::state::{Battle, BattleStatus, FleetState, GameState};

/// Detect and schedule battles for the current day.
///
/// Returns the scheduled battle ids in canonical (system id) order.
///
/// # Errors
///
/// Fails only on a spatial index epoch mismatch, which indicates a pipeline
/// bug rather than a data problem.
pub fn detect_battles(state: &mut GameState) -> Result<Vec<String>> {
    let day = state.day;
    let radius = state.rules.balance.engagement_radius;

    let mut grid = SpatialGrid::new(day, radius.max(1.0));
    for system in &state.systems {
        grid.insert(system.id.clone(), system.position.x, system.position.z);
    }

    // Group each eligible fleet under its nearest in-range system.
    let mut groups: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for fleet in &state.fleets {
        if fleet.is_combat_locked() || fleet.ships.is_empty() {
            continue;
        }
        let nearest = grid.find_nearest(day, fleet.position.x, fleet.position.z, |_| true)?;
        if let Some((system_id, dist)) = nearest {
            if dist <= radius {
                groups.entry(system_id).or_default().push(fleet.id.clone());
            }
        }
    }

    let mut scheduled: Vec<String> = Vec::new();
    for (system_id, mut involved) in groups {
        let battle_id = format!("battle-{day}-{system_id}");
        if state.battle(&battle_id).is_some() {
            continue;
        }

        let mut factions: Vec<&str> = involved
            .iter()
            .filter_map(|id| state.fleet(id).map(|f| f.faction_id.as_str()))
            .collect();
        factions.sort_unstable();
        factions.dedup();
        if factions.len() < 2 {
            continue;
        }

        involved.sort();
        for fleet_id in &involved {
            if let Some(fleet) = state.fleet_mut(fleet_id) {
                fleet.state = FleetState::Combat;
                fleet.state_start_day = day;
                fleet.target_system_id = None;
                fleet.target_position = None;
                fleet.order = None;
            }
        }

        debug!(battle = %battle_id, fleets = involved.len(), "Battle scheduled");
        state.battles.push(Battle {
            id: battle_id.clone(),
            system_id,
            day_created: day,
            day_resolved: None,
            status: BattleStatus::Scheduled,
            involved_fleet_ids: involved,
            verdict: None,
            stats: crate::state::BattleStats::default(),
            log: Vec::new(),
        });
        scheduled.push(battle_id);
    }

    Ok(scheduled)
}

/// Drop resolved battles older than the configured retention window.
pub fn prune_battles(state: &mut GameState) {
    let day = state.day;
    let retention = state.rules.balance.battle_retention_days;
    state.battles.retain(|b| {
        b.status == BattleStatus::Scheduled
            || b.day_resolved
                .map_or(true, |resolved| day.saturating_sub(resolved) <= retention)
    });
}
