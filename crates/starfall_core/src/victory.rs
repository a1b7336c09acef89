//! Victory evaluation.
//!
//! Runs at the end of every tick. The winner is written once and never
//! reassigned; a finished game ignores further objective checks.
//!
//! - `Conquest` resolves the moment a faction owns the required fraction
//!   of solid planets.
//! - `Survival` resolves exactly on its final day: the faction owning the
//!   most solid planets wins, ties broken by total army strength, then by
//!   lowest faction id.

use std::collections::BTreeMap;

use tracing::info;

use crate::rng::GameRng;
use crate::state::{GameState, Objective};

/// Solid planets owned per faction, plus the total count.
fn ownership(state: &GameState) -> (BTreeMap<String, usize>, usize) {
    let mut owned: BTreeMap<String, usize> = BTreeMap::new();
    let mut total = 0usize;
    for planet in state.systems.iter().flat_map(|s| s.planets.iter()) {
        if !planet.is_solid {
            continue;
        }
        total += 1;
        if let Some(owner) = &planet.owner_faction_id {
            *owned.entry(owner.clone()).or_default() += 1;
        }
    }
    (owned, total)
}

fn total_strength(state: &GameState, faction_id: &str) -> u64 {
    state
        .armies
        .iter()
        .filter(|a| a.faction_id == faction_id)
        .map(|a| u64::from(a.strength))
        .sum()
}

/// Evaluate every objective against the current state.
///
/// Sets `winner_faction_id` and records a log entry plus a message to every
/// faction when an objective resolves.
pub fn evaluate(state: &mut GameState, rng: &mut GameRng) {
    if state.winner_faction_id.is_some() {
        return;
    }

    let objectives = state.objectives.clone();
    for objective in &objectives {
        let winner = match objective {
            Objective::Conquest { fraction } => conquest_winner(state, *fraction),
            Objective::Survival { max_turns } => {
                if state.day >= *max_turns {
                    Some(survival_winner(state))
                } else {
                    None
                }
            }
        };

        if let Some(winner) = winner {
            declare(state, rng, &winner, objective);
            return;
        }
    }
}

fn conquest_winner(state: &GameState, fraction: f64) -> Option<String> {
    let (owned, total) = ownership(state);
    if total == 0 {
        return None;
    }
    // If several factions cross the line at once, the larger holding wins;
    // equal holdings fall to the lower faction id via BTreeMap order.
    let mut best: Option<(String, usize)> = None;
    for (faction_id, count) in owned {
        if (count as f64) / (total as f64) >= fraction {
            let better = best.as_ref().map_or(true, |(_, b)| count > *b);
            if better {
                best = Some((faction_id, count));
            }
        }
    }
    best.map(|(faction_id, _)| faction_id)
}

/// Leader on the final day: most owned solid planets, then total army
/// strength, then lowest faction id.
fn survival_winner(state: &GameState) -> String {
    let (owned, _) = ownership(state);
    let mut standings: Vec<(String, usize, u64)> = state
        .factions
        .iter()
        .map(|f| {
            (
                f.id.clone(),
                owned.get(&f.id).copied().unwrap_or(0),
                total_strength(state, &f.id),
            )
        })
        .collect();
    standings.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.2.cmp(&a.2))
            .then_with(|| a.0.cmp(&b.0))
    });
    standings
        .first()
        .map(|(id, _, _)| id.clone())
        .unwrap_or_default()
}

fn declare(state: &mut GameState, rng: &mut GameRng, winner: &str, objective: &Objective) {
    state.winner_faction_id = Some(winner.to_string());
    let reason = match objective {
        Objective::Conquest { .. } => "by conquest",
        Objective::Survival { .. } => "at the turn limit",
    };
    info!(winner, reason, day = state.day, "Game decided");
    state.add_log(rng, format!("{winner} wins the game {reason}"));
    let faction_ids: Vec<String> = state.factions.iter().map(|f| f.id.clone()).collect();
    for faction_id in faction_ids {
        state.add_message(rng, faction_id, format!("{winner} has won the war {reason}"));
    }
}
