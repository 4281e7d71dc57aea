//! # Entity Identifiers
//!
//! Entities are lightweight identifiers consisting of:
//! - An index into storage arrays
//! - A generation counter for safe reuse
//!
//! Destroyed indices are recycled; the generation counter is what makes
//! a recycled handle distinguishable from the handle it replaced.

use std::fmt;

/// Unique identifier for an entity.
///
/// The ID is split into two parts:
/// - Lower 32 bits: Index into storage arrays
/// - Upper 32 bits: Generation counter for detecting stale references
///
/// The all-ones value is the reserved invalid sentinel and is never
/// issued by the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct EntityId(u64);

impl EntityId {
    /// Creates a new entity ID from index and generation.
    #[inline]
    #[must_use]
    pub const fn new(index: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (index as u64))
    }

    /// Returns the index portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u32 {
        self.0 as u32
    }

    /// Returns the generation portion of the entity ID.
    #[inline]
    #[must_use]
    pub const fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Null/invalid entity ID. Never issued by the registry.
    pub const NULL: Self = Self(u64::MAX);

    /// Checks if this entity ID is the invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u64::MAX
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_null() {
            write!(f, "null")
        } else {
            write!(f, "{}v{}", self.index(), self.generation())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_id_roundtrip() {
        let id = EntityId::new(12345, 67890);
        assert_eq!(id.index(), 12345);
        assert_eq!(id.generation(), 67890);
    }

    #[test]
    fn test_null_sentinel() {
        assert!(EntityId::NULL.is_null());
        assert!(!EntityId::new(0, 0).is_null());
        assert_eq!(EntityId::default(), EntityId::NULL);
    }

    #[test]
    fn test_display() {
        assert_eq!(EntityId::new(7, 2).to_string(), "7v2");
        assert_eq!(EntityId::NULL.to_string(), "null");
    }
}
