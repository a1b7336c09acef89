//! Balance configuration.
//!
//! Tuned constants of the combat resolvers and the pipeline are carried as
//! configuration inputs on the ruleset, not hard-coded in the resolvers.
//! The values below are the documented defaults; tests rely only on these.

use serde::{Deserialize, Serialize};

/// Tunable balance knobs consumed by the resolvers and the turn pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalanceConfig {
    /// Lower clamp of the morale power multiplier.
    pub morale_min: f64,
    /// Upper clamp of the morale power multiplier.
    pub morale_max: f64,
    /// Cap on the fraction of a side's strength lost per ground tick.
    pub max_casualty_fraction: f64,
    /// Fraction of max strength at or below which an army is destroyed.
    pub destruction_threshold_fraction: f64,
    /// Minimum strength at which an army can be raised or stay fielded.
    pub min_army_strength: u32,

    /// Maximum distance at which fleets contest a system.
    pub engagement_radius: f64,
    /// Days a resolved battle is retained before pruning.
    pub battle_retention_days: u64,
    /// Hard cap on space battle rounds.
    pub max_battle_rounds: u32,

    /// Probability a ship keeps a still-valid target between rounds.
    pub target_stickiness: f64,
    /// Base kinetic hit chance before fire-control lock.
    pub base_accuracy: f64,
    /// Fire-control lock gained per consecutive round on the same target.
    pub lock_gain_per_round: f64,
    /// Cap on accumulated fire-control lock.
    pub lock_cap: f64,
    /// Targeting weight bonus against capital ships (focus fire).
    pub capital_focus_bias: f64,
    /// Extra capital-target weight for bomber shooters.
    pub bomber_capital_bias: f64,
    /// Per-round growth of the weight bonus against transports.
    pub transport_bias_per_round: f64,

    /// Rounds a missile spends in flight before impact.
    pub missile_eta_rounds: u32,
    /// Rounds a torpedo spends in flight before impact.
    pub torpedo_eta_rounds: u32,
    /// Consumable hit points of a missile under point-defense fire.
    pub missile_hp: u32,
    /// Consumable hit points of a torpedo under point-defense fire.
    pub torpedo_hp: u32,
    /// Per-round interception capacity per point of point-defense rating.
    pub pd_damage_per_point: u32,
    /// Hull damage of a missile impact.
    pub missile_damage: u32,
    /// Hull damage of a torpedo impact.
    pub torpedo_damage: u32,

    /// Post-battle attrition as a fraction of original hull size.
    pub attrition_fraction: f64,
    /// Enforced minimum post-battle attrition damage.
    pub attrition_minimum: u32,

    /// Fraction of army strength lost to one bombardment tick.
    pub bombardment_strength_fraction: f64,
    /// Morale lost to one bombardment tick.
    pub bombardment_morale_loss: f64,

    /// Chance a contested-orbit landing attempt fails.
    pub contested_landing_risk: f64,
    /// Strength fraction lost by an army on a failed contested landing.
    pub contested_landing_loss: f64,

    /// Resources extracted per qualifying ship per day.
    pub extraction_per_ship: f64,

    /// Retained log entries (oldest-first truncation).
    pub log_history_cap: usize,
    /// Retained messages (oldest-first truncation).
    pub message_history_cap: usize,
    /// Hard cap on armies accepted from a save payload.
    pub army_cap: usize,
    /// Hard cap on battles accepted from a save payload.
    pub battle_cap: usize,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            morale_min: 0.5,
            morale_max: 1.5,
            max_casualty_fraction: 0.45,
            destruction_threshold_fraction: 0.1,
            min_army_strength: 100,

            engagement_radius: 25.0,
            battle_retention_days: 30,
            max_battle_rounds: 20,

            target_stickiness: 0.7,
            base_accuracy: 0.35,
            lock_gain_per_round: 0.08,
            lock_cap: 0.4,
            capital_focus_bias: 0.5,
            bomber_capital_bias: 1.0,
            transport_bias_per_round: 0.05,

            missile_eta_rounds: 1,
            torpedo_eta_rounds: 2,
            missile_hp: 1,
            torpedo_hp: 3,
            pd_damage_per_point: 1,
            missile_damage: 12,
            torpedo_damage: 40,

            attrition_fraction: 0.08,
            attrition_minimum: 5,

            bombardment_strength_fraction: 0.05,
            bombardment_morale_loss: 0.05,

            contested_landing_risk: 0.35,
            contested_landing_loss: 0.25,

            extraction_per_ship: 1.0,

            log_history_cap: 500,
            message_history_cap: 500,
            army_cap: 2000,
            battle_cap: 500,
        }
    }
}

impl BalanceConfig {
    /// Clamp a morale value into the configured multiplier range.
    #[must_use]
    pub fn clamp_morale(&self, morale: f64) -> f64 {
        if morale.is_finite() {
            morale.clamp(self.morale_min, self.morale_max)
        } else {
            1.0
        }
    }

    /// Strength floor at or below which an army is removed from play.
    #[must_use]
    pub fn destruction_threshold(&self, max_strength: u32) -> u32 {
        (f64::from(max_strength) * self.destruction_threshold_fraction).floor() as u32
    }
}
