//! Ship class definitions for data-driven fleets.
//!
//! Every ship references a class id; the class carries the fixed stat block
//! (hull, damage, speed, fuel, munition stocks, role). Classes are loaded
//! from RON text and validated into a [`ShipClassTable`]; ships whose class
//! id is unknown are dropped softly during save repair.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};

/// Tactical role of a ship class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShipRole {
    /// Screening warship - cheap, fast, low damage.
    #[default]
    Fighter,
    /// Torpedo carrier - prefers capital targets.
    Bomber,
    /// Line warship - high hull, priority target for focus fire.
    Capital,
    /// Army carrier - the only role that may embark an army.
    TroopTransport,
    /// Auxiliary - no weapons, performs resource extraction in orbit.
    Support,
}

/// Data-driven ship class definition.
///
/// # Example RON
///
/// ```ron
/// ShipClassData(
///     id: "corvette",
///     name: "Corvette",
///     hp: 40,
///     damage: 6,
///     speed: 8.0,
///     fuel_capacity: 120.0,
///     fuel_per_day: 1.0,
///     missiles: 4,
///     torpedoes: 0,
///     point_defense: 2,
///     evasion: 0.25,
///     role: Fighter,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipClassData {
    /// Unique string identifier for this class.
    pub id: String,
    /// Display name (presentation layers may localize on top of it).
    pub name: String,
    /// Maximum hull points.
    pub hp: u32,
    /// Kinetic damage per round; 0 for unarmed classes.
    pub damage: u32,
    /// Strategic speed in world units per day.
    pub speed: f64,
    /// Fuel tank capacity.
    pub fuel_capacity: f64,
    /// Fuel burned per day in transit.
    pub fuel_per_day: f64,
    /// Guided missile stock at commissioning.
    #[serde(default)]
    pub missiles: u32,
    /// Torpedo stock at commissioning.
    #[serde(default)]
    pub torpedoes: u32,
    /// Point-defense strength against incoming guided munitions.
    #[serde(default)]
    pub point_defense: u32,
    /// Chance in `[0, 1)` to dodge incoming kinetic fire.
    #[serde(default)]
    pub evasion: f64,
    /// Tactical role.
    #[serde(default)]
    pub role: ShipRole,
}

impl ShipClassData {
    /// Whether ships of this class contribute weapons fire in battle.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.damage > 0 || self.missiles > 0 || self.torpedoes > 0
    }

    /// Whether ships of this class may carry an embarked army.
    #[must_use]
    pub fn can_carry_army(&self) -> bool {
        self.role == ShipRole::TroopTransport
    }
}

/// Validated lookup table of ship classes, keyed by class id.
#[derive(Debug, Clone, Default)]
pub struct ShipClassTable {
    classes: BTreeMap<String, ShipClassData>,
}

impl ShipClassTable {
    /// Parse a class table from RON text.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::InvalidState`] if the text does not parse or
    /// contains duplicate class ids.
    pub fn from_ron(text: &str) -> Result<Self> {
        let classes: Vec<ShipClassData> = ron::from_str(text)
            .map_err(|e| GameError::InvalidState(format!("Failed to parse ship classes: {e}")))?;

        let mut table = BTreeMap::new();
        for class in classes {
            if table.insert(class.id.clone(), class.clone()).is_some() {
                return Err(GameError::InvalidState(format!(
                    "Duplicate ship class id: {}",
                    class.id
                )));
            }
        }
        Ok(Self { classes: table })
    }

    /// The builtin class table shipped with the engine.
    ///
    /// # Panics
    ///
    /// Never panics: the builtin RON is validated by tests.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_ron(BUILTIN_SHIP_CLASSES).expect("builtin ship class table must parse")
    }

    /// Look up a class by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ShipClassData> {
        self.classes.get(id)
    }

    /// Whether a class id is known.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.classes.contains_key(id)
    }

    /// Iterate classes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ShipClassData> {
        self.classes.values()
    }

    /// Number of known classes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// True when the table has no classes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Builtin ship class stat table, RON-encoded.
pub const BUILTIN_SHIP_CLASSES: &str = r#"[
    ShipClassData(
        id: "corvette",
        name: "Corvette",
        hp: 40,
        damage: 6,
        speed: 8.0,
        fuel_capacity: 120.0,
        fuel_per_day: 1.0,
        missiles: 4,
        torpedoes: 0,
        point_defense: 2,
        evasion: 0.25,
        role: Fighter,
    ),
    ShipClassData(
        id: "strike_bomber",
        name: "Strike Bomber",
        hp: 30,
        damage: 3,
        speed: 7.0,
        fuel_capacity: 90.0,
        fuel_per_day: 1.2,
        missiles: 0,
        torpedoes: 6,
        point_defense: 0,
        evasion: 0.3,
        role: Bomber,
    ),
    ShipClassData(
        id: "cruiser",
        name: "Cruiser",
        hp: 160,
        damage: 14,
        speed: 6.0,
        fuel_capacity: 300.0,
        fuel_per_day: 2.5,
        missiles: 12,
        torpedoes: 0,
        point_defense: 6,
        evasion: 0.1,
        role: Capital,
    ),
    ShipClassData(
        id: "dreadnought",
        name: "Dreadnought",
        hp: 400,
        damage: 30,
        speed: 4.0,
        fuel_capacity: 600.0,
        fuel_per_day: 5.0,
        missiles: 24,
        torpedoes: 8,
        point_defense: 12,
        evasion: 0.05,
        role: Capital,
    ),
    ShipClassData(
        id: "troopship",
        name: "Troopship",
        hp: 80,
        damage: 0,
        speed: 5.0,
        fuel_capacity: 250.0,
        fuel_per_day: 2.0,
        missiles: 0,
        torpedoes: 0,
        point_defense: 2,
        evasion: 0.1,
        role: TroopTransport,
    ),
    ShipClassData(
        id: "tender",
        name: "Fleet Tender",
        hp: 60,
        damage: 0,
        speed: 5.0,
        fuel_capacity: 400.0,
        fuel_per_day: 1.5,
        missiles: 0,
        torpedoes: 0,
        point_defense: 1,
        evasion: 0.1,
        role: Support,
    ),
]"#;
