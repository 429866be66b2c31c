//! Environment abstraction for deterministic testing.
//!
//! Decouples presence logic from system resources (wall clock, randomness).
//! Enables deterministic simulation (virtual clock, seeded RNG) and production
//! use with real system resources.

/// Abstract environment providing time and randomness.
///
/// # Invariants
///
/// Implementations MUST guarantee:
///
/// - `random_bytes()` uses cryptographically secure entropy in production
/// - Methods are infallible except in exceptional circumstances (e.g., OS
///   entropy exhaustion, incorrect simulation setup)
pub trait Environment: Clone + Send + Sync + 'static {
    /// Wall-clock time in Unix milliseconds.
    ///
    /// Used for timestamps shown to users, never for ordering. Ordering comes
    /// from sequence numbers because the wall clock may jump.
    fn wall_clock_millis(&self) -> u64;

    /// Fills the provided buffer with random bytes.
    ///
    /// Given the same seed, simulation environments produce the same bytes.
    fn random_bytes(&self, buffer: &mut [u8]);
}
