//! Space battle resolution.
//!
//! Deterministic round-based resolution of a scheduled battle. Each round:
//!
//! 1. In-flight guided munitions tick down their ETA; arrivals run the
//!    point-defense gauntlet before impacting.
//! 2. Every armed ship keeps its target with a configurable stickiness or
//!    re-acquires one in canonical ship order, with bias terms for focus
//!    fire on capitals, bomber preference for capitals, and a
//!    round-increasing pull toward transports.
//! 3. Kinetic fire resolves with base accuracy plus accumulated
//!    fire-control lock minus target evasion; guided munitions launch with
//!    a travel ETA.
//!
//! The winner is fixed from the factions with remaining combat-capable
//! ships *before* post-battle attrition, which then damages every survivor
//! proportionally to original hull size (with an enforced minimum) and may
//! still destroy ships. Destroyed transports surface their embarked army
//! ids to the caller. Survivors snap to the contested system's position in
//! orbit, defeated survivors flagged as retreating; emptied fleets are
//! removed.
//!
//! All randomness comes from a battle-local RNG derived by the caller from
//! the global cursor and the battle's identity, so the order battles
//! resolve in cannot perturb unrelated streams.

use std::collections::BTreeMap;

use tracing::debug;

use crate::data::{BalanceConfig, ShipClassData, ShipClassTable, ShipRole};
use crate::error::{GameError, Result};
use crate::rng::GameRng;
use crate::state::{AmmoLedger, BattleStatus, BattleVerdict, FleetState, GameState};

/// Outcome of one battle resolution, surfaced to the pipeline.
#[derive(Debug, Clone, Default)]
pub struct BattleReport {
    /// Resolved battle id.
    pub battle_id: String,
    /// Armies destroyed with their transports.
    pub destroyed_army_ids: Vec<String>,
    /// Fleets removed because every ship was lost.
    pub destroyed_fleet_ids: Vec<String>,
}

#[derive(Debug, Clone)]
struct Combatant {
    ship_id: String,
    faction_id: String,
    class: ShipClassData,
    hp: u32,
    max_hp: u32,
    missiles: u32,
    torpedoes: u32,
    carried_army_id: Option<String>,
    kills: u32,
    target: Option<String>,
    lock: f64,
}

impl Combatant {
    fn alive(&self) -> bool {
        self.hp > 0
    }

    fn combat_capable(&self) -> bool {
        self.alive() && self.class.is_armed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MunitionKind {
    Missile,
    Torpedo,
}

#[derive(Debug, Clone)]
struct Salvo {
    attacker_ship: String,
    target_ship: String,
    kind: MunitionKind,
    eta: u32,
    hp: u32,
    damage: u32,
}

/// Resolve a scheduled battle in place.
///
/// `rng` must be the battle-local generator derived from the global cursor
/// and the battle id. Returns the destroyed-army and destroyed-fleet ids
/// for the caller to propagate.
///
/// # Errors
///
/// Fails if the battle does not exist or is already resolved.
pub fn resolve_battle(
    state: &mut GameState,
    table: &ShipClassTable,
    battle_id: &str,
    rng: &mut GameRng,
) -> Result<BattleReport> {
    let battle = state
        .battle(battle_id)
        .ok_or_else(|| GameError::InvalidState(format!("Battle not found: {battle_id}")))?;
    if battle.status == BattleStatus::Resolved {
        return Err(GameError::InvalidState(format!(
            "Battle {battle_id} is already resolved"
        )));
    }
    let system_id = battle.system_id.clone();
    let involved = battle.involved_fleet_ids.clone();
    let system_position = state
        .system(&system_id)
        .map(|s| s.position)
        .ok_or_else(|| GameError::SystemNotFound(system_id.clone()))?;

    let balance = state.rules.balance.clone();
    let advanced = state.rules.advanced_combat;

    // Working roster in canonical ship order.
    let mut roster: Vec<Combatant> = Vec::new();
    for fleet_id in &involved {
        let Some(fleet) = state.fleet(fleet_id) else {
            continue;
        };
        for ship in &fleet.ships {
            let Some(class) = table.get(&ship.class) else {
                continue;
            };
            roster.push(Combatant {
                ship_id: ship.id.clone(),
                faction_id: fleet.faction_id.clone(),
                class: class.clone(),
                hp: ship.hp,
                max_hp: ship.max_hp,
                missiles: ship.missiles,
                torpedoes: ship.torpedoes,
                carried_army_id: ship.carried_army_id.clone(),
                kills: ship.kills,
                target: None,
                lock: 0.0,
            });
        }
    }
    roster.sort_by(|a, b| a.ship_id.cmp(&b.ship_id));

    // Ammunition ledger: initial stocks per faction.
    let mut ammo: BTreeMap<String, AmmoLedger> = BTreeMap::new();
    for combatant in &roster {
        let entry = ammo.entry(combatant.faction_id.clone()).or_default();
        entry.missiles_initial += combatant.missiles;
        entry.torpedoes_initial += combatant.torpedoes;
    }

    let mut salvos: Vec<Salvo> = Vec::new();
    let mut log: Vec<String> = Vec::new();
    let mut round = 0u32;

    while round < balance.max_battle_rounds {
        let alive_factions = distinct_factions(&roster, Combatant::alive);
        let capable_factions = distinct_factions(&roster, Combatant::combat_capable);
        if alive_factions.len() < 2 || capable_factions.is_empty() {
            break;
        }
        round += 1;

        run_impacts(&mut roster, &mut salvos, &balance, &mut log, round);
        run_targeting(&mut roster, rng, &balance, round);
        run_fire(
            &mut roster,
            &mut salvos,
            &mut ammo,
            rng,
            &balance,
            advanced,
            &mut log,
            round,
        );
    }

    // Let munitions already in flight land before judgement.
    while !salvos.is_empty() && round < balance.max_battle_rounds + balance.torpedo_eta_rounds {
        round += 1;
        run_impacts(&mut roster, &mut salvos, &balance, &mut log, round);
    }

    // Winner determination happens before post-battle attrition.
    let capable = distinct_factions(&roster, Combatant::combat_capable);
    let verdict = match capable.len() {
        0 => BattleVerdict::NoSurvivors,
        1 => BattleVerdict::Faction(capable[0].clone()),
        _ => BattleVerdict::Draw,
    };
    log.push(match &verdict {
        BattleVerdict::Faction(f) => format!("{f} controls the field after {round} rounds"),
        BattleVerdict::Draw => format!("Stalemate after {round} rounds"),
        BattleVerdict::NoSurvivors => format!("Mutual annihilation after {round} rounds"),
    });

    // Post-combat attrition: proportional to original hull size, with an
    // enforced minimum. This may still destroy ships.
    for combatant in &mut roster {
        if !combatant.alive() {
            continue;
        }
        let proportional = (f64::from(combatant.max_hp) * balance.attrition_fraction).round() as u32;
        let damage = proportional.max(balance.attrition_minimum);
        combatant.hp = combatant.hp.saturating_sub(damage);
        if !combatant.alive() {
            log.push(format!(
                "{} succumbed to battle damage after the engagement",
                combatant.ship_id
            ));
        }
    }

    // Statistics and army propagation.
    let mut report = BattleReport {
        battle_id: battle_id.to_string(),
        ..BattleReport::default()
    };
    let mut survivors: BTreeMap<String, u32> = BTreeMap::new();
    let mut losses: BTreeMap<String, u32> = BTreeMap::new();
    for combatant in &roster {
        if combatant.alive() {
            *survivors.entry(combatant.faction_id.clone()).or_default() += 1;
        } else {
            *losses.entry(combatant.faction_id.clone()).or_default() += 1;
            if let Some(army_id) = &combatant.carried_army_id {
                report.destroyed_army_ids.push(army_id.clone());
                log.push(format!(
                    "Army {army_id} was lost with transport {}",
                    combatant.ship_id
                ));
            }
        }
        // Remaining counts magazines aboard survivors and those lost with
        // their hulls, so initial == used + remaining holds exactly.
        let entry = ammo.entry(combatant.faction_id.clone()).or_default();
        entry.missiles_remaining += combatant.missiles;
        entry.torpedoes_remaining += combatant.torpedoes;
    }

    // Write the roster back into the fleets.
    for fleet_id in &involved {
        let Some(fleet) = state.fleet_mut(fleet_id) else {
            continue;
        };
        for ship in &mut fleet.ships {
            if let Some(combatant) = roster.iter().find(|c| c.ship_id == ship.id) {
                ship.hp = combatant.hp;
                ship.missiles = combatant.missiles;
                ship.torpedoes = combatant.torpedoes;
                ship.kills = combatant.kills;
                if !combatant.alive() {
                    ship.carried_army_id = None;
                }
            }
        }
        fleet.ships.retain(|s| s.hp > 0);
        if fleet.ships.is_empty() {
            report.destroyed_fleet_ids.push(fleet_id.clone());
        } else {
            fleet.position = system_position;
            fleet.state = FleetState::Orbit;
            // Survivors on the losing side withdraw in a retreating posture
            // until they disengage.
            fleet.retreating = match &verdict {
                BattleVerdict::Faction(winner) => fleet.faction_id != *winner,
                _ => false,
            };
            fleet.target_system_id = None;
            fleet.target_position = None;
        }
    }
    state
        .fleets
        .retain(|f| !report.destroyed_fleet_ids.contains(&f.id));

    let day = state.day;
    let battle = state
        .battle_mut(battle_id)
        .ok_or_else(|| GameError::InvalidState(format!("Battle not found: {battle_id}")))?;
    battle.status = BattleStatus::Resolved;
    battle.day_resolved = Some(day);
    battle.verdict = Some(verdict);
    battle.stats.survivors = survivors;
    battle.stats.losses = losses;
    battle.stats.ammunition = ammo;
    battle.log = log;

    debug!(battle = %battle_id, rounds = round, "Battle resolved");
    Ok(report)
}

fn distinct_factions<F>(roster: &[Combatant], mut filter: F) -> Vec<String>
where
    F: FnMut(&Combatant) -> bool,
{
    let mut factions: Vec<String> = roster
        .iter()
        .filter(|c| filter(c))
        .map(|c| c.faction_id.clone())
        .collect();
    factions.sort();
    factions.dedup();
    factions
}

/// Advance in-flight munitions; arrivals face point defense, then impact.
///
/// Point defense is a per-round capacity: each arriving munition drains the
/// target's remaining interception budget, and whatever the mounts cannot
/// service leaks through at full effect.
fn run_impacts(
    roster: &mut [Combatant],
    salvos: &mut Vec<Salvo>,
    balance: &BalanceConfig,
    log: &mut Vec<String>,
    round: u32,
) {
    let mut remaining: Vec<Salvo> = Vec::new();
    let mut pd_budget: BTreeMap<String, u32> = BTreeMap::new();
    for mut salvo in salvos.drain(..) {
        if salvo.eta > 0 {
            salvo.eta -= 1;
            remaining.push(salvo);
            continue;
        }
        let Some(target_index) = roster
            .iter()
            .position(|c| c.ship_id == salvo.target_ship && c.alive())
        else {
            continue; // target already gone; the munition self-destructs
        };

        let budget = pd_budget.entry(salvo.target_ship.clone()).or_insert_with(|| {
            roster[target_index].class.point_defense * balance.pd_damage_per_point
        });
        let spent = (*budget).min(salvo.hp);
        *budget -= spent;
        if spent >= salvo.hp {
            log.push(format!(
                "Round {round}: point defense intercepted a {} aimed at {}",
                munition_name(salvo.kind),
                salvo.target_ship
            ));
            continue;
        }

        let target = &mut roster[target_index];
        target.hp = target.hp.saturating_sub(salvo.damage);
        if !target.alive() {
            log.push(format!(
                "Round {round}: {} destroyed by a {} from {}",
                salvo.target_ship,
                munition_name(salvo.kind),
                salvo.attacker_ship
            ));
            let attacker_ship = salvo.attacker_ship.clone();
            if let Some(attacker) = roster
                .iter_mut()
                .find(|c| c.ship_id == attacker_ship && c.alive())
            {
                attacker.kills += 1;
            }
        }
    }
    *salvos = remaining;
}

/// Keep or re-acquire targets in canonical ship order.
fn run_targeting(roster: &mut [Combatant], rng: &mut GameRng, balance: &BalanceConfig, round: u32) {
    for i in 0..roster.len() {
        if !roster[i].combat_capable() {
            roster[i].target = None;
            continue;
        }

        let current_valid = roster[i].target.as_ref().is_some_and(|target_id| {
            roster
                .iter()
                .any(|c| c.ship_id == *target_id && c.alive() && c.faction_id != roster[i].faction_id)
        });
        if current_valid && rng.next_f64() < balance.target_stickiness {
            roster[i].lock = (roster[i].lock + balance.lock_gain_per_round).min(balance.lock_cap);
            continue;
        }

        // Re-acquire: weighted pick over enemies in canonical order.
        let shooter_role = roster[i].class.role;
        let shooter_faction = roster[i].faction_id.clone();
        let candidates: Vec<(String, f64)> = roster
            .iter()
            .filter(|c| c.alive() && c.faction_id != shooter_faction)
            .map(|c| {
                let mut weight = 1.0;
                if c.class.role == ShipRole::Capital {
                    weight += balance.capital_focus_bias;
                    if shooter_role == ShipRole::Bomber {
                        weight += balance.bomber_capital_bias;
                    }
                }
                if c.class.role == ShipRole::TroopTransport {
                    weight += f64::from(round) * balance.transport_bias_per_round;
                }
                (c.ship_id.clone(), weight)
            })
            .collect();

        roster[i].lock = 0.0;
        roster[i].target = weighted_pick(&candidates, rng);
    }
}

fn weighted_pick(candidates: &[(String, f64)], rng: &mut GameRng) -> Option<String> {
    let total: f64 = candidates.iter().map(|(_, w)| w).sum();
    if total <= 0.0 {
        return None;
    }
    let mut roll = rng.next_f64() * total;
    for (id, weight) in candidates {
        roll -= weight;
        if roll <= 0.0 {
            return Some(id.clone());
        }
    }
    candidates.last().map(|(id, _)| id.clone())
}

/// Kinetic fire and guided munition launches, in canonical ship order.
fn run_fire(
    roster: &mut [Combatant],
    salvos: &mut Vec<Salvo>,
    ammo: &mut BTreeMap<String, AmmoLedger>,
    rng: &mut GameRng,
    balance: &BalanceConfig,
    advanced: bool,
    log: &mut Vec<String>,
    round: u32,
) {
    for i in 0..roster.len() {
        if !roster[i].combat_capable() {
            continue;
        }
        let Some(target_id) = roster[i].target.clone() else {
            continue;
        };
        let Some(target_index) = roster
            .iter()
            .position(|c| c.ship_id == target_id && c.alive())
        else {
            continue;
        };

        // Kinetic pass.
        if roster[i].class.damage > 0 {
            let accuracy = (balance.base_accuracy + roster[i].lock
                - roster[target_index].class.evasion)
                .clamp(0.05, 0.95);
            if rng.next_f64() < accuracy {
                let damage = roster[i].class.damage;
                let target = &mut roster[target_index];
                target.hp = target.hp.saturating_sub(damage);
                if !target.alive() {
                    log.push(format!(
                        "Round {round}: {} destroyed by gunfire from {}",
                        target_id, roster[i].ship_id
                    ));
                    roster[i].kills += 1;
                }
            }
        }

        // Guided pass: one munition per round, torpedoes first.
        if advanced {
            let faction = roster[i].faction_id.clone();
            if roster[i].torpedoes > 0 {
                roster[i].torpedoes -= 1;
                ammo.entry(faction).or_default().torpedoes_used += 1;
                salvos.push(Salvo {
                    attacker_ship: roster[i].ship_id.clone(),
                    target_ship: target_id,
                    kind: MunitionKind::Torpedo,
                    eta: balance.torpedo_eta_rounds,
                    hp: balance.torpedo_hp,
                    damage: balance.torpedo_damage,
                });
            } else if roster[i].missiles > 0 {
                roster[i].missiles -= 1;
                ammo.entry(faction).or_default().missiles_used += 1;
                salvos.push(Salvo {
                    attacker_ship: roster[i].ship_id.clone(),
                    target_ship: target_id,
                    kind: MunitionKind::Missile,
                    eta: balance.missile_eta_rounds,
                    hp: balance.missile_hp,
                    damage: balance.missile_damage,
                });
            }
        }
    }
}

fn munition_name(kind: MunitionKind) -> &'static str {
    match kind {
        MunitionKind::Missile => "missile",
        MunitionKind::Torpedo => "torpedo",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonical::canonicalize;
    use crate::math::Vec3;
    use crate::state::{
        Army, ArmyState, Battle, Fleet, PlanetBody, Ship, StarSystem,
    };

    fn ship(id: &str, class: &str, table: &ShipClassTable) -> Ship {
        let data = table.get(class).unwrap();
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

    fn fleet(id: &str, faction: &str, ships: Vec<Ship>) -> Fleet {
        Fleet {
            id: id.to_string(),
            faction_id: faction.to_string(),
            ships,
            position: Vec3::ZERO,
            state: FleetState::Combat,
            target_system_id: None,
            target_position: None,
            retreating: false,
            order: None,
            state_start_day: 0,
        }
    }

    fn battle_state(table: &ShipClassTable) -> GameState {
        let mut state = GameState::empty(77);
        state.day = 3;
        state.systems.push(StarSystem {
            id: "sys-1".to_string(),
            name: "Flashpoint".to_string(),
            position: Vec3::new(10.0, 0.0, -4.0),
            planets: vec![PlanetBody {
                id: "sys-1-p1".to_string(),
                system_id: "sys-1".to_string(),
                is_solid: true,
                owner_faction_id: None,
            }],
        });
        state.fleets.push(fleet(
            "fleet-a",
            "red",
            vec![
                ship("ship-a1", "cruiser", table),
                ship("ship-a2", "corvette", table),
            ],
        ));
        state.fleets.push(fleet(
            "fleet-b",
            "blu",
            vec![
                ship("ship-b1", "cruiser", table),
                ship("ship-b2", "strike_bomber", table),
            ],
        ));
        state.battles.push(Battle {
            id: "battle-3-sys-1".to_string(),
            system_id: "sys-1".to_string(),
            day_created: 3,
            day_resolved: None,
            status: BattleStatus::Scheduled,
            involved_fleet_ids: vec!["fleet-a".to_string(), "fleet-b".to_string()],
            verdict: None,
            stats: crate::state::BattleStats::default(),
            log: Vec::new(),
        });
        canonicalize(&mut state);
        state
    }

    fn ammo_conserved(ledger: &AmmoLedger) -> bool {
        ledger.missiles_initial == ledger.missiles_used + ledger.missiles_remaining
            && ledger.torpedoes_initial == ledger.torpedoes_used + ledger.torpedoes_remaining
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let table = ShipClassTable::builtin();
        let mut a = battle_state(&table);
        let mut b = battle_state(&table);
        let mut rng_a = GameRng::new(1).derive("battle-3-sys-1");
        let mut rng_b = GameRng::new(1).derive("battle-3-sys-1");
        resolve_battle(&mut a, &table, "battle-3-sys-1", &mut rng_a).unwrap();
        resolve_battle(&mut b, &table, "battle-3-sys-1", &mut rng_b).unwrap();
        canonicalize(&mut a);
        canonicalize(&mut b);
        assert_eq!(crate::canonical::state_hash(&a), crate::canonical::state_hash(&b));
    }

    #[test]
    fn test_ammunition_conservation() {
        let table = ShipClassTable::builtin();
        for seed in 0..10u64 {
            let mut state = battle_state(&table);
            let mut rng = GameRng::new(seed).derive("battle-3-sys-1");
            resolve_battle(&mut state, &table, "battle-3-sys-1", &mut rng).unwrap();
            let battle = state.battle("battle-3-sys-1").unwrap();
            for (faction, ledger) in &battle.stats.ammunition {
                assert!(
                    ammo_conserved(ledger),
                    "seed {seed}: ammo ledger violated for {faction}: {ledger:?}"
                );
            }
        }
    }

    #[test]
    fn test_battle_resolves_with_verdict_and_orbit_snap() {
        let table = ShipClassTable::builtin();
        let mut state = battle_state(&table);
        let mut rng = GameRng::new(9).derive("battle-3-sys-1");
        resolve_battle(&mut state, &table, "battle-3-sys-1", &mut rng).unwrap();

        let battle = state.battle("battle-3-sys-1").unwrap();
        assert_eq!(battle.status, BattleStatus::Resolved);
        assert_eq!(battle.day_resolved, Some(3));
        assert!(battle.verdict.is_some());

        let system_pos = state.system("sys-1").unwrap().position;
        for fleet in &state.fleets {
            assert_eq!(fleet.state, FleetState::Orbit);
            assert!((fleet.position.distance(&system_pos)) < 1e-9);
        }
    }

    #[test]
    fn test_one_sided_battle_destroys_loser() {
        let table = ShipClassTable::builtin();
        let mut state = GameState::empty(5);
        state.day = 1;
        state.systems.push(StarSystem {
            id: "sys-1".to_string(),
            name: "Trap".to_string(),
            position: Vec3::ZERO,
            planets: Vec::new(),
        });
        state.fleets.push(fleet(
            "fleet-a",
            "red",
            vec![
                ship("ship-a1", "dreadnought", &table),
                ship("ship-a2", "cruiser", &table),
            ],
        ));
        state.fleets.push(fleet(
            "fleet-b",
            "blu",
            vec![ship("ship-b1", "tender", &table)],
        ));
        state.battles.push(Battle {
            id: "battle-1-sys-1".to_string(),
            system_id: "sys-1".to_string(),
            day_created: 1,
            day_resolved: None,
            status: BattleStatus::Scheduled,
            involved_fleet_ids: vec!["fleet-a".to_string(), "fleet-b".to_string()],
            verdict: None,
            stats: crate::state::BattleStats::default(),
            log: Vec::new(),
        });
        canonicalize(&mut state);

        let mut rng = GameRng::new(2).derive("battle-1-sys-1");
        let report = resolve_battle(&mut state, &table, "battle-1-sys-1", &mut rng).unwrap();

        let battle = state.battle("battle-1-sys-1").unwrap();
        assert_eq!(
            battle.verdict,
            Some(BattleVerdict::Faction("red".to_string()))
        );
        assert!(report.destroyed_fleet_ids.contains(&"fleet-b".to_string()));
        assert!(state.fleet("fleet-b").is_none());
    }

    #[test]
    fn test_lost_carrier_flags_embarked_army() {
        let table = ShipClassTable::builtin();
        let mut state = GameState::empty(5);
        state.day = 1;
        state.systems.push(StarSystem {
            id: "sys-1".to_string(),
            name: "Graveyard".to_string(),
            position: Vec3::ZERO,
            planets: Vec::new(),
        });

        // A 1-hp transport carrying an army, against overwhelming force.
        let mut transport = ship("ship-t1", "troopship", &table);
        transport.hp = 1;
        transport.carried_army_id = Some("army-1".to_string());
        state.fleets.push(fleet("fleet-b", "blu", vec![transport]));
        state.fleets.push(fleet(
            "fleet-a",
            "red",
            vec![ship("ship-a1", "dreadnought", &table)],
        ));
        state.armies.push(Army {
            id: "army-1".to_string(),
            faction_id: "blu".to_string(),
            strength: 5000,
            max_strength: 5000,
            morale: 1.0,
            state: ArmyState::Embarked,
            container_id: "fleet-b".to_string(),
        });
        state.battles.push(Battle {
            id: "battle-1-sys-1".to_string(),
            system_id: "sys-1".to_string(),
            day_created: 1,
            day_resolved: None,
            status: BattleStatus::Scheduled,
            involved_fleet_ids: vec!["fleet-a".to_string(), "fleet-b".to_string()],
            verdict: None,
            stats: crate::state::BattleStats::default(),
            log: Vec::new(),
        });
        canonicalize(&mut state);

        let mut rng = GameRng::new(3).derive("battle-1-sys-1");
        let report = resolve_battle(&mut state, &table, "battle-1-sys-1", &mut rng).unwrap();

        // The army took no direct damage, yet goes down with its carrier.
        assert!(report.destroyed_army_ids.contains(&"army-1".to_string()));
    }

    #[test]
    fn test_winner_fixed_before_attrition() {
        let table = ShipClassTable::builtin();
        let mut state = GameState::empty(5);
        state.day = 1;
        state.systems.push(StarSystem {
            id: "sys-1".to_string(),
            name: "Pyrrhic".to_string(),
            position: Vec3::ZERO,
            planets: Vec::new(),
        });

        // Winner's only ship is so battered that mandatory post-battle
        // attrition will finish it off.
        let mut battered = ship("ship-a1", "dreadnought", &table);
        battered.hp = 1;
        state.fleets.push(fleet("fleet-a", "red", vec![battered]));
        state.fleets.push(fleet(
            "fleet-b",
            "blu",
            vec![ship("ship-b1", "tender", &table)],
        ));
        state.battles.push(Battle {
            id: "battle-1-sys-1".to_string(),
            system_id: "sys-1".to_string(),
            day_created: 1,
            day_resolved: None,
            status: BattleStatus::Scheduled,
            involved_fleet_ids: vec!["fleet-a".to_string(), "fleet-b".to_string()],
            verdict: None,
            stats: crate::state::BattleStats::default(),
            log: Vec::new(),
        });
        canonicalize(&mut state);

        let mut rng = GameRng::new(4).derive("battle-1-sys-1");
        resolve_battle(&mut state, &table, "battle-1-sys-1", &mut rng).unwrap();

        let battle = state.battle("battle-1-sys-1").unwrap();
        // Red won on the field even though attrition later claimed the ship.
        assert_eq!(
            battle.verdict,
            Some(BattleVerdict::Faction("red".to_string()))
        );
    }

    #[test]
    fn test_point_defense_saturates_under_volley() {
        let table = ShipClassTable::builtin();
        let balance = BalanceConfig::default();
        let tender = table.get("tender").unwrap().clone();
        let mut roster = vec![Combatant {
            ship_id: "ship-t1".to_string(),
            faction_id: "blu".to_string(),
            class: tender.clone(),
            hp: tender.hp,
            max_hp: tender.hp,
            missiles: 0,
            torpedoes: 0,
            carried_army_id: None,
            kills: 0,
            target: None,
            lock: 0.0,
        }];
        let missile = |attacker: &str| Salvo {
            attacker_ship: attacker.to_string(),
            target_ship: "ship-t1".to_string(),
            kind: MunitionKind::Missile,
            eta: 0,
            hp: balance.missile_hp,
            damage: balance.missile_damage,
        };

        // The tender's single mount services the first missile; the second
        // leaks through at full effect.
        let mut salvos = vec![missile("ship-a1"), missile("ship-a2")];
        let mut log = Vec::new();
        run_impacts(&mut roster, &mut salvos, &balance, &mut log, 1);
        assert!(salvos.is_empty());
        assert_eq!(roster[0].hp, tender.hp - balance.missile_damage);
        assert!(log.iter().any(|l| l.contains("intercepted")));
    }

    #[test]
    fn test_defeated_survivors_retreat() {
        let table = ShipClassTable::builtin();
        let mut state = GameState::empty(5);
        state.day = 1;
        state.systems.push(StarSystem {
            id: "sys-1".to_string(),
            name: "Standoff".to_string(),
            position: Vec3::ZERO,
            planets: Vec::new(),
        });
        state.fleets.push(fleet(
            "fleet-a",
            "red",
            vec![
                ship("ship-a1", "dreadnought", &table),
                ship("ship-a2", "cruiser", &table),
            ],
        ));
        // An unarmed hull tough enough to outlast the whole engagement.
        let mut bulk = ship("ship-b1", "troopship", &table);
        bulk.hp = 1_000_000;
        bulk.max_hp = 1_000_000;
        state.fleets.push(fleet("fleet-b", "blu", vec![bulk]));
        state.battles.push(Battle {
            id: "battle-1-sys-1".to_string(),
            system_id: "sys-1".to_string(),
            day_created: 1,
            day_resolved: None,
            status: BattleStatus::Scheduled,
            involved_fleet_ids: vec!["fleet-a".to_string(), "fleet-b".to_string()],
            verdict: None,
            stats: crate::state::BattleStats::default(),
            log: Vec::new(),
        });
        canonicalize(&mut state);

        let mut rng = GameRng::new(6).derive("battle-1-sys-1");
        resolve_battle(&mut state, &table, "battle-1-sys-1", &mut rng).unwrap();

        let battle = state.battle("battle-1-sys-1").unwrap();
        assert_eq!(
            battle.verdict,
            Some(BattleVerdict::Faction("red".to_string()))
        );
        assert!(state.fleet("fleet-b").unwrap().retreating);
        assert!(!state.fleet("fleet-a").unwrap().retreating);
    }

    #[test]
    fn test_double_resolution_rejected() {
        let table = ShipClassTable::builtin();
        let mut state = battle_state(&table);
        let mut rng = GameRng::new(1).derive("battle-3-sys-1");
        resolve_battle(&mut state, &table, "battle-3-sys-1", &mut rng).unwrap();
        assert!(resolve_battle(&mut state, &table, "battle-3-sys-1", &mut rng).is_err());
    }
}
