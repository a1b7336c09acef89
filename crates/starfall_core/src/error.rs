//! Error types for the simulation engine.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all engine errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Referenced fleet does not exist.
    #[error("Fleet not found: {0}")]
    FleetNotFound(String),

    /// Referenced army does not exist.
    #[error("Army not found: {0}")]
    ArmyNotFound(String),

    /// Referenced ship does not exist.
    #[error("Ship not found: {0}")]
    ShipNotFound(String),

    /// Referenced star system does not exist.
    #[error("System not found: {0}")]
    SystemNotFound(String),

    /// Referenced planet does not exist.
    #[error("Planet not found: {0}")]
    PlanetNotFound(String),

    /// Referenced faction does not exist.
    #[error("Faction not found: {0}")]
    FactionNotFound(String),

    /// An entity belongs to a different faction than the command requires.
    #[error("Faction mismatch: {entity} belongs to {actual}, expected {expected}")]
    FactionMismatch {
        /// The entity whose ownership was checked.
        entity: String,
        /// The faction that actually owns the entity.
        actual: String,
        /// The faction the command required.
        expected: String,
    },

    /// A fleet locked in combat rejects all movement/logistics commands.
    #[error("Fleet {0} is locked in combat")]
    CombatLock(String),

    /// Command failed precondition validation.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// Saved payload comes from a newer engine version.
    #[error("Save version {found} is newer than supported version {supported}")]
    SaveVersionTooNew {
        /// Version tag found in the payload.
        found: u32,
        /// Newest version this build can read.
        supported: u32,
    },

    /// Saved payload is structurally unreadable.
    #[error("Malformed save data: {0}")]
    MalformedSave(String),

    /// A spatial index built for one day was queried in another.
    #[error("Stale spatial index: built for day {built}, queried on day {queried}")]
    StaleSpatialIndex {
        /// Day the index was built for.
        built: u64,
        /// Day the query ran in.
        queried: u64,
    },

    /// Invalid engine state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),
}
