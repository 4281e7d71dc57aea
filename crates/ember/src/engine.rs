//! # Engine Orchestration
//!
//! Wires the world, scheduler, metrics hub and sandbox into one value
//! the host frame loop drives:
//!
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────┐
//! │ 1. BEGIN TICK                                       │
//! │    └─ reset per-tick extension quotas, prune audit  │
//! │                                                     │
//! │ 2. UPDATE PASS                                      │
//! │    └─ every unit in resolved order, failures        │
//! │       isolated, timings into the metrics hub        │
//! │                                                     │
//! │ 3. SAMPLE GAUGES                                    │
//! │    └─ entity count, storage bytes, cache hits       │
//! │                                                     │
//! │ 4. RENDER PASS                                      │
//! │    └─ observes completed update output              │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Extension code reaches the engine only through
//! [`Engine::extension_api`], which binds the sandbox facade to the
//! world and scheduler for one caller.

use std::sync::Arc;

use ember_core::{
    ComponentKind, ComponentTypeId, ComponentValue, CoreResult, EntityId, Query, RenderSurface,
    SystemScheduler, TickStats, UpdateUnit, World,
};
use ember_metrics::{MetricsConfig, MetricsHub};
use ember_sandbox::{ExtensionPolicy, Sandbox, SandboxConfig, SandboxResult};

/// Engine construction settings.
#[derive(Clone, Copy, Debug)]
pub struct EngineConfig {
    /// Size of the reserved system-entity range.
    pub system_entities: u32,
    /// Metrics hub settings.
    pub metrics: MetricsConfig,
    /// Sandbox-wide enforcement settings.
    pub sandbox: SandboxConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            system_entities: 64,
            metrics: MetricsConfig::default(),
            sandbox: SandboxConfig::default(),
        }
    }
}

/// The assembled engine core.
pub struct Engine {
    world: World,
    scheduler: SystemScheduler,
    metrics: Arc<MetricsHub>,
    sandbox: Sandbox,
    system_entities: Vec<EntityId>,
}

impl Engine {
    /// Builds an engine, reserving the system-entity range first so the
    /// low indices are host-owned before any extension runs.
    pub fn new(config: EngineConfig) -> CoreResult<Self> {
        let metrics = Arc::new(MetricsHub::new(config.metrics));
        let mut world = World::new();
        let system_entities = world.reserve_system_entities(config.system_entities)?;

        tracing::info!(
            system_entities = system_entities.len(),
            "engine core initialized"
        );

        Ok(Self {
            world,
            scheduler: SystemScheduler::new(Arc::clone(&metrics)),
            sandbox: Sandbox::with_config(Arc::clone(&metrics), config.sandbox),
            metrics,
            system_entities,
        })
    }

    /// Runs one tick: sandbox housekeeping, the update pass, then gauge
    /// sampling. Render is a separate call so the host controls the
    /// frame boundary.
    pub fn update(&mut self, delta_time: f64) -> CoreResult<TickStats> {
        self.sandbox.begin_tick();
        let stats = self.scheduler.update(&mut self.world, delta_time)?;

        #[allow(clippy::cast_precision_loss)]
        {
            self.metrics
                .set_gauge("ecs.entities", self.world.entity_count() as f64);
            self.metrics
                .set_gauge("ecs.memory_bytes", self.world.memory_usage() as f64);
            self.metrics.set_gauge(
                "ecs.query_cache_hits",
                self.world.query_engine().cache_hits() as f64,
            );
        }
        Ok(stats)
    }

    /// Runs the render pass. Always call after [`Engine::update`] so
    /// render units observe the completed tick.
    pub fn render(&mut self, surface: &mut dyn RenderSurface) -> CoreResult<()> {
        self.scheduler.render(&self.world, surface)
    }

    // =========================================================================
    // Host-side surface (trusted code)
    // =========================================================================

    /// Registers a component type.
    pub fn register_component(
        &mut self,
        type_id: ComponentTypeId,
        kind: ComponentKind,
        initial_capacity: usize,
    ) -> CoreResult<()> {
        self.world.register_component(type_id, kind, initial_capacity)
    }

    /// Registers a trusted (host) update unit.
    pub fn register_unit(&mut self, unit: Box<dyn UpdateUnit>) -> CoreResult<()> {
        self.scheduler.register(unit)
    }

    /// Unregisters a host update unit.
    pub fn unregister_unit(&mut self, id: &str) -> CoreResult<()> {
        self.scheduler.unregister(id)
    }

    /// Declares that `unit` runs after `runs_after`.
    pub fn set_dependency(&mut self, unit: &str, runs_after: &str) -> CoreResult<()> {
        self.scheduler.set_dependency(unit, runs_after)
    }

    /// The world (trusted access).
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable world access for trusted host code.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &SystemScheduler {
        &self.scheduler
    }

    /// Mutable scheduler access for trusted host code.
    pub fn scheduler_mut(&mut self) -> &mut SystemScheduler {
        &mut self.scheduler
    }

    /// The metrics hub.
    #[must_use]
    pub fn metrics(&self) -> &Arc<MetricsHub> {
        &self.metrics
    }

    /// The sandbox (audit introspection).
    #[must_use]
    pub fn sandbox(&self) -> &Sandbox {
        &self.sandbox
    }

    /// Entities in the reserved system range.
    #[must_use]
    pub fn system_entities(&self) -> &[EntityId] {
        &self.system_entities
    }

    // =========================================================================
    // Extension surface (untrusted code)
    // =========================================================================

    /// Admits an extension under a declared policy.
    pub fn admit_extension(&mut self, ext: &str, policy: ExtensionPolicy) -> SandboxResult<()> {
        self.sandbox.admit(ext, policy)
    }

    /// Unloads an extension, rolling back everything it owns.
    pub fn unload_extension(&mut self, ext: &str) -> SandboxResult<()> {
        self.sandbox
            .unload(&mut self.world, &mut self.scheduler, ext)
    }

    /// Binds the sandbox facade to one extension for a series of calls.
    pub fn extension_api<'a>(&'a mut self, ext: &'a str) -> ExtensionApi<'a> {
        ExtensionApi {
            sandbox: &mut self.sandbox,
            world: &mut self.world,
            scheduler: &mut self.scheduler,
            ext,
        }
    }
}

/// The only API surface untrusted extension code may call.
///
/// Every method is synchronous, returns an explicit result, and is
/// audited when it fails a security or quota check. Quota and permission
/// failures are non-retryable until the underlying condition changes
/// (e.g. quota freed by destroying owned entities).
pub struct ExtensionApi<'a> {
    sandbox: &'a mut Sandbox,
    world: &'a mut World,
    scheduler: &'a mut SystemScheduler,
    ext: &'a str,
}

impl ExtensionApi<'_> {
    /// Creates an entity owned by the calling extension.
    pub fn create_entity(&mut self) -> SandboxResult<EntityId> {
        self.sandbox
            .create_entity(self.world, self.scheduler, self.ext)
    }

    /// Destroys an owned entity.
    pub fn destroy_entity(&mut self, entity: EntityId) -> SandboxResult<()> {
        self.sandbox
            .destroy_entity(self.world, self.scheduler, self.ext, entity)
    }

    /// Reads an owned entity's tags.
    pub fn entity_tags(&mut self, entity: EntityId) -> SandboxResult<Vec<String>> {
        self.sandbox
            .entity_tags(self.world, self.scheduler, self.ext, entity)
    }

    /// The caller's owned entities.
    pub fn owned_entities(&self) -> SandboxResult<Vec<EntityId>> {
        self.sandbox.owned_entities(self.ext)
    }

    /// Adds a whitelisted component to an owned entity.
    pub fn add_component(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
        value: ComponentValue,
    ) -> SandboxResult<()> {
        self.sandbox
            .add_component(self.world, self.scheduler, self.ext, entity, type_id, value)
    }

    /// Reads a component from an owned entity.
    pub fn get_component(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
    ) -> SandboxResult<ComponentValue> {
        self.sandbox
            .get_component(self.world, self.scheduler, self.ext, entity, type_id)
    }

    /// Removes a component from an owned entity.
    pub fn remove_component(
        &mut self,
        entity: EntityId,
        type_id: ComponentTypeId,
    ) -> SandboxResult<ComponentValue> {
        self.sandbox
            .remove_component(self.world, self.scheduler, self.ext, entity, type_id)
    }

    /// True if the component type is on the caller's whitelist.
    pub fn is_component_allowed(&self, type_id: ComponentTypeId) -> SandboxResult<bool> {
        self.sandbox.is_component_allowed(self.ext, type_id)
    }

    /// Finds owned entities matching a query (quota-charged).
    pub fn find_entities(&mut self, query: &Query) -> SandboxResult<Vec<EntityId>> {
        self.sandbox
            .find_entities(self.world, self.scheduler, self.ext, query)
    }

    /// Counts owned entities matching a query (quota-charged).
    pub fn count_entities(&mut self, query: &Query) -> SandboxResult<usize> {
        self.sandbox
            .count_entities(self.world, self.scheduler, self.ext, query)
    }

    /// Queries executed by the caller this tick.
    pub fn queries_used_this_tick(&self) -> SandboxResult<u32> {
        self.sandbox.queries_used_this_tick(self.ext)
    }

    /// Registers a screened update unit on the caller's behalf.
    pub fn register_system(
        &mut self,
        unit: Box<dyn UpdateUnit>,
        declared_budget: std::time::Duration,
    ) -> SandboxResult<()> {
        self.sandbox
            .register_system(self.world, self.scheduler, self.ext, unit, declared_budget)
    }

    /// Unregisters one of the caller's systems.
    pub fn unregister_system(&mut self, unit_id: &str) -> SandboxResult<()> {
        self.sandbox
            .unregister_system(self.world, self.scheduler, self.ext, unit_id)
    }

    /// Unit identifiers the caller has registered.
    pub fn registered_systems(&self) -> SandboxResult<Vec<String>> {
        self.sandbox.registered_systems(self.ext)
    }
}
