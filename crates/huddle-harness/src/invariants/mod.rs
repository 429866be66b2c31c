//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must hold in every reachable state. Unlike
//! example-based tests that check specific scenarios, they are checked after
//! every step of a random operation sequence.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.check_all(&server.snapshot())?;
//! ```

mod checks;

use huddle_server::PresenceSnapshot;

pub use checks::{
    DirectoryMatchesIndex, IndexMatchesDirectory, NoEmptyRooms, OnlyLiveConnections,
    TypingWithinRoom,
};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against coordinator state.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against a snapshot.
    fn check(&self, state: &PresenceSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with every presence invariant.
    ///
    /// Includes:
    /// - [`DirectoryMatchesIndex`]: each session is listed in its room
    /// - [`IndexMatchesDirectory`]: each room member has a session there
    /// - [`NoEmptyRooms`]: no empty room or typing entries
    /// - [`TypingWithinRoom`]: typists are members of the room
    /// - [`OnlyLiveConnections`]: sessions and pending joins belong to live
    ///   connections
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(DirectoryMatchesIndex);
        registry.add(IndexMatchesDirectory);
        registry.add(NoEmptyRooms);
        registry.add(TypingWithinRoom);
        registry.add(OnlyLiveConnections);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants, returning every violation found.
    pub fn check_all(&self, state: &PresenceSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking with every violation.
    ///
    /// Use this in tests where you want immediate failure with context.
    #[allow(clippy::panic)]
    pub fn assert_all(&self, state: &PresenceSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(ToString::to_string).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_has_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(!registry.is_empty());
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn empty_snapshot_passes_invariants() {
        let registry = InvariantRegistry::standard();
        assert!(registry.check_all(&PresenceSnapshot::empty()).is_ok());
    }
}
