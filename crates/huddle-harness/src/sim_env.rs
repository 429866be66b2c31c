//! Simulated environment.
//!
//! Time only moves when a test says so, and randomness is drawn from a
//! seeded ChaCha stream. Clones share the same clock and RNG.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use huddle_core::env::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Wall clock reading at simulation start (2024-01-01T00:00:00Z).
pub const SIM_EPOCH_MILLIS: u64 = 1_704_067_200_000;

struct SimState {
    rng: ChaCha8Rng,
    elapsed: Duration,
}

/// Deterministic [`Environment`] for tests.
#[derive(Clone)]
pub struct SimEnv {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with a specific RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { rng: ChaCha8Rng::seed_from_u64(seed), elapsed: Duration::ZERO };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.elapsed += duration;
    }

    /// Time since the simulation started.
    pub fn elapsed(&self) -> Duration {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).elapsed
    }
}

impl Environment for SimEnv {
    fn wall_clock_millis(&self) -> u64 {
        SIM_EPOCH_MILLIS + self.elapsed().as_millis() as u64
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.rng.fill_bytes(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_bytes() {
        let draw = |seed| {
            let mut bytes = [0u8; 16];
            SimEnv::with_seed(seed).random_bytes(&mut bytes);
            bytes
        };

        assert_eq!(draw(7), draw(7));
        assert_ne!(draw(8), draw(7));
    }

    #[test]
    fn clock_moves_only_when_advanced() {
        let env = SimEnv::new();
        assert_eq!(env.wall_clock_millis(), SIM_EPOCH_MILLIS);
        assert_eq!(env.wall_clock_millis(), SIM_EPOCH_MILLIS);

        env.advance(Duration::from_millis(1500));
        assert_eq!(env.elapsed(), Duration::from_millis(1500));
        assert_eq!(env.wall_clock_millis(), SIM_EPOCH_MILLIS + 1500);
    }

    #[test]
    fn clones_share_clock() {
        let env = SimEnv::new();
        let clone = env.clone();
        clone.advance(Duration::from_secs(1));

        assert_eq!(env.elapsed(), Duration::from_secs(1));
    }
}
