//! # ECS World
//!
//! The central container binding the entity registry, the component
//! store and the query engine, and the one place that keeps them
//! consistent.
//!
//! The registry owns liveness and the per-entity ownership mask; the
//! store owns the sparse/dense pairs. Every mutation that touches both
//! goes through the `World`, so for every live entity and registered
//! type: the ownership mask bit is set iff the sparse set has a value
//! iff `get` succeeds. Destruction strips all components *before* the
//! index is recycled - a resurrected index never sees its predecessor's
//! data.

use std::collections::HashSet;

use super::component::{ComponentKind, ComponentTypeId, ComponentValue};
use super::entity::EntityId;
use super::query::{Query, QueryEngine, QueryIter};
use super::registry::{EntityRegistry, ENTITY_SLOT_BYTES};
use super::store::ComponentStore;
use crate::error::{CoreError, CoreResult};

/// The ECS world: entity registry + component store + query engine.
#[derive(Debug, Default)]
pub struct World {
    registry: EntityRegistry,
    store: ComponentStore,
    queries: QueryEngine,
}

impl World {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Entity lifecycle
    // =========================================================================

    /// Creates a new entity.
    pub fn create_entity(&mut self) -> EntityId {
        self.registry.create()
    }

    /// Creates `count` entities at once.
    pub fn create_entities(&mut self, count: usize) -> Vec<EntityId> {
        self.registry.create_batch(count)
    }

    /// Destroys an entity: strips every component it holds, severs its
    /// relations, then recycles the index.
    pub fn destroy_entity(&mut self, id: EntityId) -> CoreResult<()> {
        let mask = self
            .registry
            .mask(id)
            .ok_or(CoreError::EntityNotFound(id))?;
        self.store.strip_all(id, mask);
        self.registry.release(id)
    }

    /// Destroys a batch of entities, all-or-nothing.
    ///
    /// Every handle is validated (including duplicates within the batch)
    /// before any entity is touched.
    pub fn destroy_entities(&mut self, ids: &[EntityId]) -> CoreResult<()> {
        let mut seen: HashSet<EntityId> = HashSet::with_capacity(ids.len());
        for &id in ids {
            if !self.registry.is_valid(id) || !seen.insert(id) {
                return Err(CoreError::EntityNotFound(id));
            }
        }
        for &id in ids {
            self.destroy_entity(id)?;
        }
        Ok(())
    }

    /// Checks that a handle refers to a live, current-generation entity.
    #[inline]
    #[must_use]
    pub fn is_valid(&self, id: EntityId) -> bool {
        self.registry.is_valid(id)
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.registry.alive_count()
    }

    /// Reserves the system-entity range at bootstrap. See
    /// [`EntityRegistry::reserve_system_entities`].
    pub fn reserve_system_entities(&mut self, count: u32) -> CoreResult<Vec<EntityId>> {
        self.registry.reserve_system_entities(count)
    }

    /// True if the entity's index falls in the reserved system range.
    #[inline]
    #[must_use]
    pub fn is_system_entity(&self, id: EntityId) -> bool {
        self.registry.is_system_entity(id)
    }

    // =========================================================================
    // Component operations
    // =========================================================================

    /// Registers a component type. See [`ComponentStore::register`].
    pub fn register_component(
        &mut self,
        type_id: ComponentTypeId,
        kind: ComponentKind,
        initial_capacity: usize,
    ) -> CoreResult<()> {
        self.store.register(type_id, kind, initial_capacity)
    }

    /// Adds a component to a live entity.
    pub fn add_component(
        &mut self,
        id: EntityId,
        type_id: ComponentTypeId,
        value: ComponentValue,
    ) -> CoreResult<()> {
        if !self.registry.is_valid(id) {
            return Err(CoreError::EntityNotFound(id));
        }
        self.store.add(id, type_id, value)?;
        self.registry.set_mask_bit(id, type_id.mask_bit());
        Ok(())
    }

    /// Reads a component from a live entity.
    pub fn get_component(
        &self,
        id: EntityId,
        type_id: ComponentTypeId,
    ) -> CoreResult<&ComponentValue> {
        if !self.registry.is_valid(id) {
            return Err(CoreError::EntityNotFound(id));
        }
        self.store.get(id, type_id)
    }

    /// Mutably reads a component from a live entity.
    pub fn get_component_mut(
        &mut self,
        id: EntityId,
        type_id: ComponentTypeId,
    ) -> CoreResult<&mut ComponentValue> {
        if !self.registry.is_valid(id) {
            return Err(CoreError::EntityNotFound(id));
        }
        self.store.get_mut(id, type_id)
    }

    /// Removes a component from a live entity, returning the value.
    pub fn remove_component(
        &mut self,
        id: EntityId,
        type_id: ComponentTypeId,
    ) -> CoreResult<ComponentValue> {
        if !self.registry.is_valid(id) {
            return Err(CoreError::EntityNotFound(id));
        }
        let removed = self.store.remove(id, type_id)?;
        self.registry.clear_mask_bit(id, type_id.mask_bit());
        Ok(removed)
    }

    /// True if the entity is live and holds the type.
    #[inline]
    #[must_use]
    pub fn has_component(&self, id: EntityId, type_id: ComponentTypeId) -> bool {
        self.registry.is_valid(id) && self.store.has(id, type_id)
    }

    /// Adds a batch of components, all-or-nothing.
    pub fn add_components(
        &mut self,
        items: &[(EntityId, ComponentTypeId, ComponentValue)],
    ) -> CoreResult<()> {
        for &(id, _, _) in items {
            if !self.registry.is_valid(id) {
                return Err(CoreError::EntityNotFound(id));
            }
        }
        self.store.add_batch(items)?;
        for &(id, type_id, _) in items {
            self.registry.set_mask_bit(id, type_id.mask_bit());
        }
        Ok(())
    }

    /// Removes a batch of components, all-or-nothing.
    pub fn remove_components(&mut self, items: &[(EntityId, ComponentTypeId)]) -> CoreResult<()> {
        for &(id, _) in items {
            if !self.registry.is_valid(id) {
                return Err(CoreError::EntityNotFound(id));
            }
        }
        self.store.remove_batch(items)?;
        for &(id, type_id) in items {
            self.registry.clear_mask_bit(id, type_id.mask_bit());
        }
        Ok(())
    }

    /// Entities holding every listed type. See
    /// [`ComponentStore::entities_with_all`].
    #[must_use]
    pub fn entities_with_all(&self, types: &[ComponentTypeId]) -> Vec<EntityId> {
        self.store.entities_with_all(types)
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Executes a query through the result cache.
    pub fn execute_query(&mut self, query: &Query) -> Vec<EntityId> {
        self.queries.execute_cached(&self.store, query)
    }

    /// Executes a query lazily, bypassing the cache.
    #[must_use]
    pub fn query_iter<'q>(&self, query: &'q Query) -> QueryIter<'_, 'q> {
        self.queries.execute(&self.store, query)
    }

    /// Counts matching entities without materializing the result.
    #[must_use]
    pub fn query_count(&self, query: &Query) -> usize {
        self.queries.count(&self.store, query)
    }

    // =========================================================================
    // Access and accounting
    // =========================================================================

    /// The entity registry (hierarchy, tags, system range).
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Mutable registry access for hierarchy and tag relations.
    ///
    /// Destroying entities directly through the registry skips component
    /// teardown - use [`World::destroy_entity`] for that.
    pub fn registry_mut(&mut self) -> &mut EntityRegistry {
        &mut self.registry
    }

    /// The component store (read-only).
    #[must_use]
    pub fn store(&self) -> &ComponentStore {
        &self.store
    }

    /// The query engine (cache statistics).
    #[must_use]
    pub fn query_engine(&self) -> &QueryEngine {
        &self.queries
    }

    /// Bytes held by component storage plus entity bookkeeping.
    #[must_use]
    pub fn memory_usage(&self) -> usize {
        self.store.memory_usage() + self.registry.alive_count() * ENTITY_SLOT_BYTES
    }

    /// Releases excess storage capacity. Explicit opt-in; storage never
    /// shrinks on its own.
    pub fn compact(&mut self) {
        self.store.compact();
    }
}
