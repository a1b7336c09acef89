//! # Starfall Core
//!
//! Deterministic strategic conflict engine for Starfall.
//!
//! This crate contains **only** deterministic logic:
//! - No rendering
//! - No network IO
//! - No system randomness (all randomness is seeded and cursor-persisted)
//!
//! A fixed seed plus an ordered command log replays into a byte-identical
//! sequence of world states: fleet movement, space combat, ground conquest,
//! army logistics and victory evaluation. This separation enables:
//! - Save/load and replay verification
//! - Headless batch simulation
//! - Determinism testing across processes
//!
//! ## Crate Structure
//!
//! - [`state`] - The copy-on-write [`state::GameState`] and entity types
//! - [`rng`] - Seeded RNG with a persistable cursor
//! - [`canonical`] - Canonical collection ordering and state hashing
//! - [`spatial`] - Grid-bucketed proximity index
//! - [`pipeline`] - The per-day turn pipeline
//! - [`detect`] - Hostile-contact battle scheduling
//! - [`command`] - Validated atomic command application
//! - [`space`] / [`ground`] - The two combat resolvers
//! - [`logistics`] - Army/transport logistics and the sanitize pass
//! - [`save`] - Versioned, self-healing persistence codec

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]

pub mod ai;
pub mod canonical;
pub mod command;
pub mod data;
pub mod detect;
pub mod error;
pub mod ground;
pub mod logistics;
pub mod math;
pub mod pipeline;
pub mod rng;
pub mod save;
pub mod scenario;
pub mod spatial;
pub mod space;
pub mod state;
pub mod victory;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::canonical::{canonicalize, state_hash};
    pub use crate::command::{apply_command, Command, CommandOutcome, GameEvent};
    pub use crate::data::{BalanceConfig, ShipClassTable, ShipRole};
    pub use crate::error::{GameError, Result};
    pub use crate::math::Vec3;
    pub use crate::pipeline::advance_day;
    pub use crate::rng::{GameRng, RngCursor};
    pub use crate::scenario::{new_game, ScenarioConfig};
    pub use crate::state::{
        Army, ArmyState, Battle, BattleStatus, BattleVerdict, Faction, Fleet, FleetState,
        GameState, PlanetBody, Ship, StarSystem,
    };
}
