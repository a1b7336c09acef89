//! Planetary ground combat.
//!
//! Attrition-based resolution per solid planet with deployed armies. A
//! faction's effective power is `Σ strength × clamp(morale)`. Two modes:
//!
//! - **Coalition vs defender** when the owning faction has armies present:
//!   all other factions pool into one attacking coalition.
//! - **Free-for-all** when no owner-held presence exists: every faction
//!   fights the sum of all others.
//!
//! Casualty fractions are capped per tick; losses distribute proportionally
//! across a side's armies in canonical id order with the rounding remainder
//! assigned to the last; morale drops with the loss fraction; armies at or
//! below the destruction threshold are removed. The resolver is fully
//! deterministic - it consumes no randomness.

use std::collections::BTreeMap;

use crate::data::BalanceConfig;
use crate::state::{ArmyState, GameState};

/// Outcome of one planet's ground resolution.
#[derive(Debug, Clone, Default)]
pub struct GroundReport {
    /// Planet resolved.
    pub planet_id: String,
    /// Destroyed army ids.
    pub destroyed_armies: Vec<String>,
    /// Strength lost per faction.
    pub casualties: BTreeMap<String, u32>,
    /// Faction that holds the planet after resolution, if any.
    pub winner_faction_id: Option<String>,
    /// Whether the planet's owner changed (including neutralization).
    pub owner_changed: bool,
    /// Human-readable lines naming the resolution rule used.
    pub log: Vec<String>,
}

struct SideArmy {
    id: String,
    faction_id: String,
    strength: u32,
    max_strength: u32,
    morale: f64,
}

fn power(armies: &[&SideArmy], balance: &BalanceConfig) -> f64 {
    armies
        .iter()
        .map(|a| f64::from(a.strength) * balance.clamp_morale(a.morale))
        .sum()
}

/// Distribute `frac` losses over a side's armies, proportional by strength
/// in canonical id order, remainder to the last army.
fn apply_losses(armies: &mut [&mut SideArmy], frac: f64, balance: &BalanceConfig) -> u32 {
    let total_strength: u64 = armies.iter().map(|a| u64::from(a.strength)).sum();
    if total_strength == 0 {
        return 0;
    }
    let total_loss = (total_strength as f64 * frac).floor() as u64;
    let mut assigned: u64 = 0;

    let count = armies.len();
    for (i, army) in armies.iter_mut().enumerate() {
        let share = if i + 1 == count {
            total_loss - assigned
        } else {
            total_loss * u64::from(army.strength) / total_strength
        };
        assigned += share;
        army.strength = army.strength.saturating_sub(share as u32);
        army.morale = balance.clamp_morale(army.morale * (1.0 - frac));
    }
    total_loss as u32
}

/// Resolve ground combat on every contested solid planet.
///
/// Applies strength/morale updates and army removals to `state`, updates
/// planet ownership per the winner rules, and returns one report per
/// resolved planet. Unopposed presence produces no report.
pub fn resolve_ground(state: &mut GameState) -> Vec<GroundReport> {
    let balance = state.rules.balance.clone();
    let planet_ids: Vec<(String, Option<String>)> = state
        .systems
        .iter()
        .flat_map(|s| s.planets.iter())
        .filter(|p| p.is_solid)
        .map(|p| (p.id.clone(), p.owner_faction_id.clone()))
        .collect();

    let mut reports = Vec::new();
    for (planet_id, owner) in planet_ids {
        if let Some(report) = resolve_planet(state, &planet_id, owner.as_deref(), &balance) {
            reports.push(report);
        }
    }
    reports
}

fn resolve_planet(
    state: &mut GameState,
    planet_id: &str,
    owner: Option<&str>,
    balance: &BalanceConfig,
) -> Option<GroundReport> {
    // Armies arrive in canonical order because state collections are sorted.
    let mut sides: Vec<SideArmy> = state
        .armies
        .iter()
        .filter(|a| a.state == ArmyState::Deployed && a.container_id == planet_id)
        .map(|a| SideArmy {
            id: a.id.clone(),
            faction_id: a.faction_id.clone(),
            strength: a.strength,
            max_strength: a.max_strength,
            morale: a.morale,
        })
        .collect();

    let mut factions: Vec<String> = sides.iter().map(|a| a.faction_id.clone()).collect();
    factions.sort();
    factions.dedup();
    if factions.len() < 2 {
        // Unopposed presence: conquest is handled by ownership derivation.
        return None;
    }

    let mut report = GroundReport {
        planet_id: planet_id.to_string(),
        ..GroundReport::default()
    };

    let defender = owner.filter(|o| factions.iter().any(|f| f == o));

    if let Some(defender) = defender {
        // Coalition vs defender: every non-owner faction pools against the owner.
        let (def_power, atk_power) = {
            let def: Vec<&SideArmy> = sides.iter().filter(|a| a.faction_id == defender).collect();
            let atk: Vec<&SideArmy> = sides.iter().filter(|a| a.faction_id != defender).collect();
            (power(&def, balance), power(&atk, balance))
        };
        let total = def_power + atk_power;
        let def_frac = (atk_power / total).min(balance.max_casualty_fraction);
        let atk_frac = (def_power / total).min(balance.max_casualty_fraction);

        report.log.push(format!(
            "Ground battle on {planet_id}: coalition assault against {defender}"
        ));

        {
            let mut def: Vec<&mut SideArmy> = sides
                .iter_mut()
                .filter(|a| a.faction_id == defender)
                .collect();
            apply_losses(&mut def, def_frac, balance);
        }
        {
            let mut atk: Vec<&mut SideArmy> =
                sides.iter_mut().filter(|a| a.faction_id != defender).collect();
            apply_losses(&mut atk, atk_frac, balance);
        }

        remove_destroyed(&mut sides, balance, &mut report);

        let def_remaining = {
            let def: Vec<&SideArmy> = sides.iter().filter(|a| a.faction_id == defender).collect();
            power(&def, balance)
        };
        let atk_remaining = {
            let atk: Vec<&SideArmy> = sides.iter().filter(|a| a.faction_id != defender).collect();
            power(&atk, balance)
        };

        // Defender wins ties.
        if def_remaining >= atk_remaining && def_remaining > 0.0 {
            report.winner_faction_id = Some(defender.to_string());
            report
                .log
                .push(format!("{defender} holds {planet_id} against the assault"));
        } else {
            // Strongest surviving attacker claims conquest.
            let mut best: Option<(String, f64)> = None;
            for faction in factions.iter().filter(|f| f.as_str() != defender) {
                let members: Vec<&SideArmy> =
                    sides.iter().filter(|a| &a.faction_id == faction).collect();
                if members.is_empty() {
                    continue;
                }
                let p = power(&members, balance);
                let better = match &best {
                    None => true,
                    Some((_, best_p)) => p > *best_p,
                };
                if better {
                    best = Some((faction.clone(), p));
                }
            }
            match best {
                Some((conqueror, _)) => {
                    report
                        .log
                        .push(format!("{conqueror} takes {planet_id} from {defender}"));
                    report.winner_faction_id = Some(conqueror);
                    report.owner_changed = true;
                }
                None => {
                    report
                        .log
                        .push(format!("All combatants on {planet_id} were wiped out"));
                    report.owner_changed = true;
                }
            }
        }
    } else {
        // Free-for-all: each faction's casualties scale with everyone else's power.
        report.log.push(format!(
            "Ground battle on {planet_id}: free-for-all between {} factions",
            factions.len()
        ));

        let mut fracs: BTreeMap<String, f64> = BTreeMap::new();
        let total_power = {
            let all: Vec<&SideArmy> = sides.iter().collect();
            power(&all, balance)
        };
        for faction in &factions {
            let own: Vec<&SideArmy> = sides.iter().filter(|a| &a.faction_id == faction).collect();
            let own_power = power(&own, balance);
            let enemy_power = total_power - own_power;
            let frac = (enemy_power / (own_power + enemy_power)).min(balance.max_casualty_fraction);
            fracs.insert(faction.clone(), frac);
        }
        for faction in &factions {
            let frac = fracs[faction];
            let mut members: Vec<&mut SideArmy> = sides
                .iter_mut()
                .filter(|a| &a.faction_id == faction)
                .collect();
            apply_losses(&mut members, frac, balance);
        }

        remove_destroyed(&mut sides, balance, &mut report);

        let mut standings: Vec<(String, f64)> = factions
            .iter()
            .filter_map(|faction| {
                let members: Vec<&SideArmy> =
                    sides.iter().filter(|a| &a.faction_id == faction).collect();
                if members.is_empty() {
                    None
                } else {
                    Some((faction.clone(), power(&members, balance)))
                }
            })
            .collect();
        standings.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        match standings.len() {
            0 => {
                report.log.push(format!("{planet_id} lies in ruins; no side survived"));
                report.owner_changed = true; // site neutralized
            }
            1 => {
                let winner = standings[0].0.clone();
                report.log.push(format!("{winner} is the last force standing on {planet_id}"));
                report.winner_faction_id = Some(winner);
                report.owner_changed = true;
            }
            _ => {
                if (standings[0].1 - standings[1].1).abs() < f64::EPSILON {
                    report.log.push(format!("The battle for {planet_id} ends in a draw"));
                } else {
                    let winner = standings[0].0.clone();
                    report.log.push(format!("{winner} gains the upper hand on {planet_id}"));
                    report.winner_faction_id = Some(winner);
                    report.owner_changed = true;
                }
            }
        }
    }

    // Per-faction casualty summary: initial minus surviving strength,
    // destroyed armies counting in full.
    for army in &state.armies {
        if army.state == ArmyState::Deployed && army.container_id == planet_id {
            let remaining = sides
                .iter()
                .find(|s| s.id == army.id)
                .map_or(0, |s| s.strength);
            let lost = army.strength.saturating_sub(remaining);
            if lost > 0 {
                *report.casualties.entry(army.faction_id.clone()).or_default() += lost;
            }
        }
    }

    apply_report_to_state(state, planet_id, &sides, &report, balance);
    Some(report)
}

fn remove_destroyed(
    sides: &mut Vec<SideArmy>,
    balance: &BalanceConfig,
    report: &mut GroundReport,
) -> usize {
    let before = sides.len();
    sides.retain(|army| {
        let dead = army.strength <= balance.destruction_threshold(army.max_strength);
        if dead {
            report.destroyed_armies.push(army.id.clone());
            report
                .log
                .push(format!("Army {} was destroyed in the fighting", army.id));
        }
        !dead
    });
    before - sides.len()
}

fn apply_report_to_state(
    state: &mut GameState,
    planet_id: &str,
    sides: &[SideArmy],
    report: &GroundReport,
    _balance: &BalanceConfig,
) {
    for destroyed in &report.destroyed_armies {
        state.armies.retain(|a| a.id != *destroyed);
    }
    for side in sides {
        if let Some(army) = state.army_mut(&side.id) {
            army.strength = side.strength;
            army.morale = side.morale;
        }
    }
    if report.owner_changed || report.winner_faction_id.is_some() {
        for system in &mut state.systems {
            if let Some(planet) = system.planets.iter_mut().find(|p| p.id == planet_id) {
                if report.owner_changed {
                    planet.owner_faction_id = report.winner_faction_id.clone();
                }
            }
        }
    }
}
