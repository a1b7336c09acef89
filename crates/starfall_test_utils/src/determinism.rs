//! Determinism testing utilities.
//!
//! A harness for verifying that the engine produces identical results
//! given identical inputs.
//!
//! # Testing Strategy
//!
//! Replays and saved games only work if the simulation is 100%
//! deterministic. Sources of non-determinism include:
//!
//! - **Unordered iteration**: Rust's default hasher is randomized. The
//!   engine iterates every collection in canonical id order.
//!
//! - **System randomness**: No unseeded randomness anywhere. All draws go
//!   through the cursor-persisted seeded stream.
//!
//! - **Resolution order**: Battles fork locally-seeded child streams, so
//!   their relative order cannot leak randomness.
//!
//! # Test Levels
//!
//! 1. **Unit tests**: Individual phase determinism (movement, combat, etc.)
//! 2. **Property tests**: Random seeds must still produce deterministic runs
//! 3. **Integration tests**: Full campaigns are reproducible
//! 4. **Parallel tests**: Running N simulations in parallel all match

use std::thread;

use starfall_core::canonical::state_hash;
use starfall_core::data::ShipClassTable;
use starfall_core::pipeline::advance_day;
use starfall_core::scenario::{new_game, ScenarioConfig};
use starfall_core::state::GameState;

/// Result of a determinism test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeterminismResult {
    /// Whether all runs produced identical results.
    pub is_deterministic: bool,
    /// Final state hash from each run.
    pub hashes: Vec<u64>,
    /// Number of days simulated per run.
    pub days: u64,
}

impl DeterminismResult {
    /// All unique hashes (should be 1 for a deterministic simulation).
    #[must_use]
    pub fn unique_hashes(&self) -> Vec<u64> {
        let mut unique: Vec<u64> = self.hashes.clone();
        unique.sort_unstable();
        unique.dedup();
        unique
    }

    /// Assert the runs matched, with a detailed error message.
    ///
    /// # Panics
    ///
    /// Panics if the runs produced different hashes.
    pub fn assert_deterministic(&self) {
        if !self.is_deterministic {
            let unique = self.unique_hashes();
            panic!(
                "Simulation is non-deterministic!\n\
                 Runs: {}\n\
                 Days: {}\n\
                 Unique hashes: {} (expected 1)\n\
                 All hashes: {:?}",
                self.hashes.len(),
                self.days,
                unique.len(),
                self.hashes
            );
        }
    }
}

/// Advance a state by `days`, panicking on an internal invariant failure.
///
/// # Panics
///
/// Panics if a day transition fails; that is always a bug worth surfacing
/// loudly in tests.
#[must_use]
pub fn run_days(mut state: GameState, table: &ShipClassTable, days: u64) -> GameState {
    for _ in 0..days {
        state = advance_day(&state, table).expect("day transition failed");
    }
    state
}

/// Run the same seeded campaign `runs` times and compare final hashes.
#[must_use]
pub fn verify_campaign(seed: u64, days: u64, runs: usize) -> DeterminismResult {
    let table = ShipClassTable::builtin();
    let config = ScenarioConfig::skirmish(seed);

    let hashes: Vec<u64> = (0..runs)
        .map(|_| {
            let state = new_game(&config, &table).expect("scenario must build");
            state_hash(&run_days(state, &table, days))
        })
        .collect();

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        days,
    }
}

/// Run the same seeded campaign on `num_threads` OS threads and compare.
///
/// Exercises any accidental dependence on thread-local or global state.
#[must_use]
pub fn verify_campaign_parallel(seed: u64, days: u64, num_threads: usize) -> DeterminismResult {
    let handles: Vec<thread::JoinHandle<u64>> = (0..num_threads)
        .map(|_| {
            thread::spawn(move || {
                let table = ShipClassTable::builtin();
                let config = ScenarioConfig::skirmish(seed);
                let state = new_game(&config, &table).expect("scenario must build");
                state_hash(&run_days(state, &table, days))
            })
        })
        .collect();

    let hashes: Vec<u64> = handles
        .into_iter()
        .map(|h| h.join().expect("simulation thread panicked"))
        .collect();

    let is_deterministic = hashes.windows(2).all(|w| w[0] == w[1]);
    DeterminismResult {
        is_deterministic,
        hashes,
        days,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_campaign_is_deterministic() {
        verify_campaign(42, 3, 3).assert_deterministic();
    }

    #[test]
    fn test_parallel_runs_match() {
        verify_campaign_parallel(42, 3, 4).assert_deterministic();
    }
}
