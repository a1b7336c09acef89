//! Deterministic scenario bootstrap.
//!
//! Builds the initial canonical state for a new game: star systems on a
//! spiral layout, procedurally generated planet rosters, one home system
//! per faction with a starting fleet and garrison. Everything is derived
//! from the scenario seed, so two bootstraps with the same config are
//! canonically identical - and the persistence codec can regenerate a
//! system's planet roster from `(seed, system_id)` alone.

use crate::canonical::canonicalize;
use crate::data::ShipClassTable;
use crate::error::{GameError, Result};
use crate::math::Vec3;
use crate::rng::GameRng;
use crate::state::{
    Army, ArmyState, Faction, Fleet, FleetState, GameState, Objective, PlanetBody, Rules, Ship,
    StarSystem,
};

/// One faction entry in a scenario config.
#[derive(Debug, Clone)]
pub struct FactionSpec {
    /// Faction id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the AI planner controls this faction.
    pub is_ai: bool,
}

/// Configuration for a new game.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Game seed; drives every derived id and roster.
    pub seed: u64,
    /// Participating factions. Each gets a home system in order.
    pub factions: Vec<FactionSpec>,
    /// Number of star systems; must be at least the faction count.
    pub system_count: usize,
    /// Ruleset for the game.
    pub rules: Rules,
    /// Victory objectives.
    pub objectives: Vec<Objective>,
}

impl ScenarioConfig {
    /// A minimal two-faction skirmish config.
    #[must_use]
    pub fn skirmish(seed: u64) -> Self {
        Self {
            seed,
            factions: vec![
                FactionSpec {
                    id: "fed".to_string(),
                    name: "Federation".to_string(),
                    is_ai: false,
                },
                FactionSpec {
                    id: "kor".to_string(),
                    name: "Korath Imperium".to_string(),
                    is_ai: true,
                },
            ],
            system_count: 6,
            rules: Rules::default(),
            objectives: Vec::new(),
        }
    }
}

/// Generate a system's planet roster from the game seed and system id.
///
/// Pure: identical `(seed, system_id)` always yields an identical roster.
/// The first planet is always solid so every system can host an invasion.
#[must_use]
pub fn generate_planets(seed: u64, system_id: &str) -> Vec<PlanetBody> {
    let mut rng = GameRng::new(seed).derive(&format!("planets:{system_id}"));
    let count = 2 + rng.below(4);
    (0..count)
        .map(|i| PlanetBody {
            id: format!("{system_id}-p{}", i + 1),
            system_id: system_id.to_string(),
            is_solid: i == 0 || rng.next_f64() < 0.7,
            owner_faction_id: None,
        })
        .collect()
}

/// Build the initial canonical state for a new game.
///
/// # Errors
///
/// Fails if the config has no factions, fewer systems than factions, or
/// references ship classes missing from the table.
pub fn new_game(config: &ScenarioConfig, table: &ShipClassTable) -> Result<GameState> {
    if config.factions.is_empty() {
        return Err(GameError::InvalidState(
            "Scenario requires at least one faction".to_string(),
        ));
    }
    if config.system_count < config.factions.len() {
        return Err(GameError::InvalidState(format!(
            "Scenario needs at least {} systems for {} factions",
            config.factions.len(),
            config.factions.len()
        )));
    }

    let mut state = GameState::empty(config.seed);
    state.rules = config.rules.clone();
    state.objectives = config.objectives.clone();
    let mut rng = GameRng::new(config.seed);

    // Spiral layout: golden-angle spacing keeps neighbours apart without
    // any system landing inside another's engagement radius.
    for i in 0..config.system_count {
        let id = format!("sys-{:02}", i + 1);
        let angle = i as f64 * 2.399_963;
        let radius = 60.0 * ((i + 1) as f64).sqrt();
        state.systems.push(StarSystem {
            id: id.clone(),
            name: format!("System {}", i + 1),
            position: Vec3::new(radius * angle.cos(), 0.0, radius * angle.sin()),
            planets: generate_planets(config.seed, &id),
        });
    }

    for (index, spec) in config.factions.iter().enumerate() {
        state.factions.push(Faction {
            id: spec.id.clone(),
            name: spec.name.clone(),
            is_ai: spec.is_ai,
            resources: 0.0,
            ai_stance: crate::state::AiStance::default(),
        });

        let home = state.systems[index].clone();
        let home_planet = home
            .default_solid_planet()
            .ok_or_else(|| GameError::InvalidState(format!("System {} has no solid planet", home.id)))?
            .id
            .clone();

        let mut ships = Vec::new();
        for class_id in ["cruiser", "corvette", "corvette", "troopship", "tender"] {
            let class = table
                .get(class_id)
                .ok_or_else(|| GameError::InvalidState(format!("Unknown ship class: {class_id}")))?;
            ships.push(Ship {
                id: state.unique_id(&mut rng, "ship"),
                class: class.id.clone(),
                hp: class.hp,
                max_hp: class.hp,
                fuel: class.fuel_capacity,
                carried_army_id: None,
                missiles: class.missiles,
                torpedoes: class.torpedoes,
                kills: 0,
                busy_day: None,
            });
        }

        let fleet_id = state.unique_id(&mut rng, "fleet");
        state.fleets.push(Fleet {
            id: fleet_id,
            faction_id: spec.id.clone(),
            ships,
            position: home.position,
            state: FleetState::Orbit,
            target_system_id: None,
            target_position: None,
            retreating: false,
            order: None,
            state_start_day: 0,
        });

        let army_id = state.unique_id(&mut rng, "army");
        state.armies.push(Army {
            id: army_id,
            faction_id: spec.id.clone(),
            strength: 5000,
            max_strength: 5000,
            morale: 1.0,
            state: ArmyState::Deployed,
            container_id: home_planet.clone(),
        });

        for system in &mut state.systems {
            if system.id == home.id {
                for planet in &mut system.planets {
                    if planet.id == home_planet {
                        planet.owner_faction_id = Some(spec.id.clone());
                    }
                }
            }
        }
    }

    state.rng_cursor = rng.cursor();
    canonicalize(&mut state);
    Ok(state)
}
