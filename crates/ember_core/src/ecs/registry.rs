//! # Entity Registry
//!
//! Issues and recycles entity identifiers, tracks liveness, and owns the
//! per-entity component ownership mask.
//!
//! Creation draws from a free list before minting a new slot, so
//! destroy/create cycles are allocation-free in steady state. Each slot
//! carries a generation counter bumped on reuse; a handle with a stale
//! generation fails validation.
//!
//! ## Hierarchy and tags
//!
//! Parent/child links and tags are auxiliary relations keyed by entity
//! index - relation tables, never owning pointers, because the hierarchy
//! is a cyclic ownership graph expressed as back-references. `set_parent`
//! walks the ancestor chain and rejects any assignment that would make
//! an entity its own ancestor.

use std::collections::{BTreeSet, HashMap};

use super::entity::EntityId;
use crate::error::{CoreError, CoreResult};

/// One entity slot: liveness, reuse generation, ownership mask.
#[derive(Clone, Copy, Debug, Default)]
struct Slot {
    generation: u32,
    alive: bool,
    mask: u64,
}

/// Bytes of registry bookkeeping attributable to one live entity.
///
/// Used by the sandbox for per-extension memory accounting.
pub const ENTITY_SLOT_BYTES: usize = std::mem::size_of::<Slot>() + std::mem::size_of::<u32>();

/// Issues, validates and recycles entity identifiers.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    slots: Vec<Slot>,
    free: Vec<u32>,
    alive_count: usize,
    /// Slot indices below this are system-owned (reserved at bootstrap).
    system_watermark: u32,
    parents: HashMap<u32, EntityId>,
    children: HashMap<u32, Vec<EntityId>>,
    tags: HashMap<u32, BTreeSet<String>>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of currently live entities.
    #[inline]
    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.alive_count
    }

    /// Creates a new entity, reusing a recycled slot when one is free.
    pub fn create(&mut self) -> EntityId {
        self.alive_count += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            // Bump the generation so handles to the prior occupant go stale.
            slot.generation = slot.generation.wrapping_add(1);
            slot.alive = true;
            slot.mask = 0;
            return EntityId::new(index, slot.generation);
        }

        let index = u32::try_from(self.slots.len()).expect("entity slot index overflow");
        self.slots.push(Slot {
            generation: 0,
            alive: true,
            mask: 0,
        });
        EntityId::new(index, 0)
    }

    /// Creates `count` entities at once.
    pub fn create_batch(&mut self, count: usize) -> Vec<EntityId> {
        (0..count).map(|_| self.create()).collect()
    }

    /// Checks that a handle refers to a live, current-generation entity.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, id: EntityId) -> bool {
        if id.is_null() {
            return false;
        }
        self.slots
            .get(id.index() as usize)
            .is_some_and(|slot| slot.alive && slot.generation == id.generation())
    }

    /// Releases a live entity's slot back to the free list.
    ///
    /// This is the low-level recycling step: it severs hierarchy links
    /// and tags but knows nothing about component storage. Callers must
    /// strip components first (the `World` orchestrates this), otherwise
    /// a recycled index would resurrect the prior occupant's data.
    pub fn release(&mut self, id: EntityId) -> CoreResult<()> {
        if !self.is_valid(id) {
            return Err(CoreError::EntityNotFound(id));
        }

        let index = id.index();
        self.detach_relations(index);

        let slot = &mut self.slots[index as usize];
        slot.alive = false;
        slot.mask = 0;
        self.free.push(index);
        self.alive_count -= 1;
        Ok(())
    }

    /// Reserves the system-entity range: creates `count` entities whose
    /// slot indices form the reserved low range.
    ///
    /// Must be called once, at bootstrap, before any other entity is
    /// created. Sandboxed extensions are denied access to any entity
    /// below the watermark.
    pub fn reserve_system_entities(&mut self, count: u32) -> CoreResult<Vec<EntityId>> {
        if self.system_watermark != 0 || !self.slots.is_empty() {
            return Err(CoreError::SystemRangeReserved {
                watermark: self.system_watermark,
            });
        }
        let ids = self.create_batch(count as usize);
        self.system_watermark = count;
        Ok(ids)
    }

    /// True if the entity's slot index falls in the reserved system range.
    #[inline]
    #[must_use]
    pub fn is_system_entity(&self, id: EntityId) -> bool {
        id.index() < self.system_watermark
    }

    /// Ownership mask of a live entity.
    #[inline]
    #[must_use]
    pub fn mask(&self, id: EntityId) -> Option<u64> {
        if !self.is_valid(id) {
            return None;
        }
        Some(self.slots[id.index() as usize].mask)
    }

    /// Sets a component-type bit in the entity's ownership mask.
    pub(crate) fn set_mask_bit(&mut self, id: EntityId, bit: u64) {
        if self.is_valid(id) {
            self.slots[id.index() as usize].mask |= bit;
        }
    }

    /// Clears a component-type bit in the entity's ownership mask.
    pub(crate) fn clear_mask_bit(&mut self, id: EntityId, bit: u64) {
        if self.is_valid(id) {
            self.slots[id.index() as usize].mask &= !bit;
        }
    }

    // =========================================================================
    // Hierarchy - index-keyed relation tables with cycle rejection
    // =========================================================================

    /// Makes `child` a child of `parent`.
    ///
    /// Fails with [`CoreError::CyclicParentage`] if the assignment would
    /// make `child` its own ancestor; the relation tables are untouched
    /// on failure.
    pub fn set_parent(&mut self, child: EntityId, parent: EntityId) -> CoreResult<()> {
        if !self.is_valid(child) {
            return Err(CoreError::EntityNotFound(child));
        }
        if !self.is_valid(parent) {
            return Err(CoreError::EntityNotFound(parent));
        }

        // Walk up from the prospective parent; finding `child` there
        // (or child == parent) means the edge closes a cycle.
        let mut cursor = Some(parent);
        while let Some(ancestor) = cursor {
            if ancestor == child {
                return Err(CoreError::CyclicParentage { entity: child });
            }
            cursor = self.parents.get(&ancestor.index()).copied();
        }

        self.clear_parent_link(child.index());
        self.parents.insert(child.index(), parent);
        self.children.entry(parent.index()).or_default().push(child);
        Ok(())
    }

    /// Detaches `child` from its parent, if it has one.
    pub fn clear_parent(&mut self, child: EntityId) -> CoreResult<()> {
        if !self.is_valid(child) {
            return Err(CoreError::EntityNotFound(child));
        }
        self.clear_parent_link(child.index());
        Ok(())
    }

    /// Returns the parent of an entity, if any.
    #[must_use]
    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        if !self.is_valid(id) {
            return None;
        }
        self.parents.get(&id.index()).copied()
    }

    /// Returns the children of an entity (empty if none).
    #[must_use]
    pub fn children(&self, id: EntityId) -> Vec<EntityId> {
        if !self.is_valid(id) {
            return Vec::new();
        }
        self.children.get(&id.index()).cloned().unwrap_or_default()
    }

    // =========================================================================
    // Tags - index-keyed string sets
    // =========================================================================

    /// Attaches a tag to a live entity.
    pub fn add_tag(&mut self, id: EntityId, tag: &str) -> CoreResult<()> {
        if !self.is_valid(id) {
            return Err(CoreError::EntityNotFound(id));
        }
        self.tags
            .entry(id.index())
            .or_default()
            .insert(tag.to_string());
        Ok(())
    }

    /// Removes a tag from a live entity (no-op if absent).
    pub fn remove_tag(&mut self, id: EntityId, tag: &str) -> CoreResult<()> {
        if !self.is_valid(id) {
            return Err(CoreError::EntityNotFound(id));
        }
        if let Some(set) = self.tags.get_mut(&id.index()) {
            set.remove(tag);
        }
        Ok(())
    }

    /// Returns the tags of an entity, sorted.
    #[must_use]
    pub fn tags(&self, id: EntityId) -> Vec<String> {
        if !self.is_valid(id) {
            return Vec::new();
        }
        self.tags
            .get(&id.index())
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns every live entity carrying `tag`.
    #[must_use]
    pub fn entities_tagged(&self, tag: &str) -> Vec<EntityId> {
        let mut out: Vec<EntityId> = self
            .tags
            .iter()
            .filter(|(_, set)| set.contains(tag))
            .map(|(&index, _)| {
                let slot = &self.slots[index as usize];
                EntityId::new(index, slot.generation)
            })
            .filter(|&id| self.is_valid(id))
            .collect();
        out.sort_by_key(|id| id.index());
        out
    }

    /// Severs all relations of a slot being released.
    ///
    /// Children of the released entity become roots.
    fn detach_relations(&mut self, index: u32) {
        self.clear_parent_link(index);
        if let Some(orphans) = self.children.remove(&index) {
            for child in orphans {
                self.parents.remove(&child.index());
            }
        }
        self.tags.remove(&index);
    }

    fn clear_parent_link(&mut self, index: u32) {
        if let Some(old_parent) = self.parents.remove(&index) {
            if let Some(siblings) = self.children.get_mut(&old_parent.index()) {
                siblings.retain(|c| c.index() != index);
            }
        }
    }
}
