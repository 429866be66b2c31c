//! Production Environment implementation using system time and RNG.
//!
//! `SystemEnv` uses real system time and the OS cryptographic RNG, so its
//! behavior is not reproducible. Tests use the simulated environment from
//! `huddle-harness` instead.

use huddle_core::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// The RNG uses getrandom (OS-level randomness). Credential salts come from
/// here.
///
/// # Panics
///
/// Panics if the OS RNG fails or the system clock reads before the Unix
/// epoch. Neither can be recovered from: salts would be predictable and
/// timestamps meaningless.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    #[allow(clippy::expect_used)]
    fn wall_clock_millis(&self) -> u64 {
        let since_epoch = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)");
        since_epoch.as_millis() as u64
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
