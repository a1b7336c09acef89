//! Data-driven configuration for the engine.
//!
//! This module contains pure data structures: the ship class stat table
//! (deserialized from RON) and the balance configuration knobs. It performs
//! no IO - callers hand it RON text or use the builtin defaults.

mod balance;
mod ship_data;

pub use balance::BalanceConfig;
pub use ship_data::{ShipClassData, ShipClassTable, ShipRole, BUILTIN_SHIP_CLASSES};
