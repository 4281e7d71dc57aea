//! # Component Store
//!
//! One sparse-set per registered component type, addressed by
//! [`ComponentTypeId`]. The store is deliberately ignorant of entity
//! liveness - the [`World`](super::world::World) validates handles
//! before calling in, and keeps the per-entity ownership mask in sync.
//!
//! Batch operations validate every element before mutating any of them:
//! a returned error means no sparse/dense pair changed, so the packing
//! invariant can never be left half-applied.

use std::collections::HashSet;

use super::component::{ComponentKind, ComponentTypeId, ComponentValue};
use super::entity::EntityId;
use super::sparse::SparseSet;
use crate::error::{CoreError, CoreResult};

/// Storage for one registered component type.
#[derive(Debug)]
struct TypeStore {
    kind: ComponentKind,
    set: SparseSet,
}

/// Packed per-type component storage.
#[derive(Debug, Default)]
pub struct ComponentStore {
    /// Indexed by `ComponentTypeId.0`; `None` until registered.
    types: Vec<Option<TypeStore>>,
}

impl ComponentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component type with a declared shape and an initial
    /// dense-array capacity.
    ///
    /// Fails with [`CoreError::AlreadyRegistered`] on re-registration;
    /// the failed call changes nothing.
    pub fn register(
        &mut self,
        type_id: ComponentTypeId,
        kind: ComponentKind,
        initial_capacity: usize,
    ) -> CoreResult<()> {
        if type_id.0 >= ComponentTypeId::LIMIT {
            return Err(CoreError::TypeLimitExceeded {
                limit: ComponentTypeId::LIMIT,
            });
        }

        let slot = type_id.0 as usize;
        if slot >= self.types.len() {
            self.types.resize_with(slot + 1, || None);
        }
        if self.types[slot].is_some() {
            return Err(CoreError::AlreadyRegistered(type_id));
        }

        self.types[slot] = Some(TypeStore {
            kind,
            set: SparseSet::with_capacity(initial_capacity),
        });
        Ok(())
    }

    /// True if the type has been registered.
    #[inline]
    #[must_use]
    pub fn is_registered(&self, type_id: ComponentTypeId) -> bool {
        self.type_store(type_id).is_some()
    }

    /// The shape registered for a type.
    #[must_use]
    pub fn kind_of(&self, type_id: ComponentTypeId) -> Option<ComponentKind> {
        self.type_store(type_id).map(|ts| ts.kind)
    }

    /// Number of entities currently holding the type.
    #[inline]
    #[must_use]
    pub fn population(&self, type_id: ComponentTypeId) -> usize {
        self.type_store(type_id).map_or(0, |ts| ts.set.len())
    }

    /// Membership-change counter for the type (0 if unregistered or
    /// untouched) - the staleness stamp for cached queries.
    #[inline]
    #[must_use]
    pub fn generation(&self, type_id: ComponentTypeId) -> u64 {
        self.type_store(type_id).map_or(0, |ts| ts.set.generation())
    }

    /// Adds a component to an entity.
    pub fn add(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
        value: ComponentValue,
    ) -> CoreResult<()> {
        self.validate_add(entity, type_id, value)?;
        let ts = self
            .type_store_mut(type_id)
            .ok_or(CoreError::TypeNotRegistered(type_id))?;
        ts.set.insert(entity, value);
        Ok(())
    }

    /// Reads a component from an entity.
    pub fn get(&self, entity: EntityId, type_id: ComponentTypeId) -> CoreResult<&ComponentValue> {
        let ts = self
            .type_store(type_id)
            .ok_or(CoreError::TypeNotRegistered(type_id))?;
        ts.set
            .get(entity.index())
            .ok_or(CoreError::ComponentNotFound { entity, type_id })
    }

    /// Mutably reads a component from an entity.
    pub fn get_mut(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
    ) -> CoreResult<&mut ComponentValue> {
        let ts = self
            .type_store_mut(type_id)
            .ok_or(CoreError::TypeNotRegistered(type_id))?;
        ts.set
            .get_mut(entity.index())
            .ok_or(CoreError::ComponentNotFound { entity, type_id })
    }

    /// Removes a component from an entity, returning the removed value.
    pub fn remove(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
    ) -> CoreResult<ComponentValue> {
        let ts = self
            .type_store_mut(type_id)
            .ok_or(CoreError::TypeNotRegistered(type_id))?;
        ts.set
            .remove(entity.index())
            .ok_or(CoreError::ComponentNotFound { entity, type_id })
    }

    /// True if the entity holds the type. Unregistered types hold nothing.
    #[inline]
    #[must_use]
    pub fn has(&self, entity: EntityId, type_id: ComponentTypeId) -> bool {
        self.type_store(type_id)
            .is_some_and(|ts| ts.set.contains(entity.index()))
    }

    /// Adds a batch of components, all-or-nothing.
    ///
    /// Every element is validated (registration, shape, duplicates -
    /// including duplicates within the batch itself) before any insert
    /// happens.
    pub fn add_batch(
        &mut self,
        items: &[(EntityId, ComponentTypeId, ComponentValue)],
    ) -> CoreResult<()> {
        let mut seen: HashSet<(EntityId, ComponentTypeId)> = HashSet::with_capacity(items.len());
        for &(entity, type_id, value) in items {
            self.validate_add(entity, type_id, value)?;
            if !seen.insert((entity, type_id)) {
                return Err(CoreError::DuplicateComponent { entity, type_id });
            }
        }

        for &(entity, type_id, value) in items {
            let ts = self
                .type_store_mut(type_id)
                .ok_or(CoreError::TypeNotRegistered(type_id))?;
            ts.set.insert(entity, value);
        }
        Ok(())
    }

    /// Removes a batch of components, all-or-nothing.
    pub fn remove_batch(&mut self, items: &[(EntityId, ComponentTypeId)]) -> CoreResult<()> {
        let mut seen: HashSet<(EntityId, ComponentTypeId)> = HashSet::with_capacity(items.len());
        for &(entity, type_id) in items {
            if !self.has(entity, type_id) {
                return Err(CoreError::ComponentNotFound { entity, type_id });
            }
            if !seen.insert((entity, type_id)) {
                // A second removal of the same pair would fail mid-apply.
                return Err(CoreError::ComponentNotFound { entity, type_id });
            }
        }

        for &(entity, type_id) in items {
            let ts = self
                .type_store_mut(type_id)
                .ok_or(CoreError::TypeNotRegistered(type_id))?;
            let _ = ts.set.remove(entity.index());
        }
        Ok(())
    }

    /// Entities holding every listed type.
    ///
    /// The type with the smallest current population drives the
    /// candidate set, so cost is bounded by the smallest matching set
    /// rather than the product of all sets. Unregistered types hold
    /// nothing, so their presence empties the result.
    #[must_use]
    pub fn entities_with_all(&self, types: &[ComponentTypeId]) -> Vec<EntityId> {
        let Some(&driver) = types
            .iter()
            .min_by_key(|&&t| self.population(t))
        else {
            return Vec::new();
        };

        let Some(driver_store) = self.type_store(driver) else {
            return Vec::new();
        };

        driver_store
            .set
            .owners()
            .iter()
            .copied()
            .filter(|&e| {
                types
                    .iter()
                    .all(|&t| t == driver || self.has(e, t))
            })
            .collect()
    }

    /// Owners of one type's dense array, in packed order.
    ///
    /// Empty for unregistered types.
    #[must_use]
    pub fn owners_of(&self, type_id: ComponentTypeId) -> &[EntityId] {
        self.type_store(type_id).map_or(&[], |ts| ts.set.owners())
    }

    /// Removes every component the ownership mask says the entity holds.
    ///
    /// Called by the `World` during entity destruction, before the
    /// registry recycles the index.
    pub(crate) fn strip_all(&mut self, entity: EntityId, mask: u64) {
        let mut remaining = mask;
        while remaining != 0 {
            #[allow(clippy::cast_possible_truncation)]
            let bit = remaining.trailing_zeros() as u8;
            remaining &= remaining - 1;
            if let Some(ts) = self.type_store_mut(ComponentTypeId(bit)) {
                let _ = ts.set.remove(entity.index());
            }
        }
    }

    /// Bytes currently held by all dense and sparse arrays.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.types
            .iter()
            .flatten()
            .map(|ts| ts.set.memory_bytes())
            .sum()
    }

    /// Releases excess capacity in every type's storage.
    ///
    /// Storage grows geometrically and never shrinks on its own; this is
    /// the explicit opt-in compaction pass.
    pub fn compact(&mut self) {
        for ts in self.types.iter_mut().flatten() {
            ts.set.compact();
        }
    }

    /// Registered types with their shapes and populations.
    pub fn registered_types(
        &self,
    ) -> impl Iterator<Item = (ComponentTypeId, ComponentKind, usize)> + '_ {
        self.types.iter().enumerate().filter_map(|(i, slot)| {
            slot.as_ref().map(|ts| {
                #[allow(clippy::cast_possible_truncation)]
                let id = ComponentTypeId(i as u8);
                (id, ts.kind, ts.set.len())
            })
        })
    }

    fn validate_add(
        &self,
        entity: EntityId,
        type_id: ComponentTypeId,
        value: ComponentValue,
    ) -> CoreResult<()> {
        let ts = self
            .type_store(type_id)
            .ok_or(CoreError::TypeNotRegistered(type_id))?;
        if ts.kind != value.kind() {
            return Err(CoreError::KindMismatch {
                type_id,
                expected: ts.kind,
                actual: value.kind(),
            });
        }
        if ts.set.contains(entity.index()) {
            return Err(CoreError::DuplicateComponent { entity, type_id });
        }
        Ok(())
    }

    #[inline]
    fn type_store(&self, type_id: ComponentTypeId) -> Option<&TypeStore> {
        self.types.get(type_id.0 as usize)?.as_ref()
    }

    #[inline]
    fn type_store_mut(&mut self, type_id: ComponentTypeId) -> Option<&mut TypeStore> {
        self.types.get_mut(type_id.0 as usize)?.as_mut()
    }
}
