//! # Sandbox Facade
//!
//! The only API surface untrusted extension code may call. Every
//! operation is validated against the caller's [`ExtensionContext`],
//! accounted, and only then forwarded to the same `World` and
//! `SystemScheduler` first-party code uses. Extension code never touches
//! storage directly.
//!
//! ## Enforcement summary
//!
//! - Entity/query/memory quotas deny *at* the limit - a denied call
//!   leaves no partial state behind.
//! - Execution time cannot be pre-checked (calls are synchronous, there
//!   is no preemption): it is measured after each call returns. Budget
//!   overage flags the context and the next admission decision denies.
//!   Crossing the *hard* ceiling (budget x a configured factor) is the
//!   one error followed by an irreversible side effect: atomic teardown
//!   of the offending extension.
//! - Repeated security violations past the policy ceiling also force
//!   teardown.
//!
//! Teardown is all-or-nothing: systems unregistered, owned entities
//! destroyed, context dropped. A half-torn-down extension would leave
//! dangling ownership records, so there is no partial path.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ember_core::{
    ComponentTypeId, ComponentValue, EntityId, Query, SystemScheduler, UpdateUnit, World,
    component_value_size, ENTITY_SLOT_BYTES,
};
use ember_metrics::{AlertLevel, MetricsHub};

use crate::audit::AuditLog;
use crate::context::ExtensionContext;
use crate::error::{SandboxError, SandboxResult};
use crate::policy::ExtensionPolicy;
use crate::screening::ThreatScreener;

/// Sandbox-wide enforcement settings (not per-extension policy).
#[derive(Clone, Copy, Debug)]
pub struct SandboxConfig {
    /// Ceiling on the worst-case execution budget any candidate system
    /// may declare.
    pub execution_ceiling: Duration,
    /// Measured per-tick cpu beyond `budget * factor` forces teardown.
    pub hard_cpu_factor: u32,
    /// Audit ring capacity.
    pub audit_capacity: usize,
    /// Audit records older than this are purged.
    pub audit_retention: Duration,
    /// Most recent audit records immune to purging.
    pub audit_min_keep: usize,
    /// Minimum interval between alerts from one source.
    pub alert_window: Duration,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            execution_ceiling: Duration::from_millis(5),
            hard_cpu_factor: 4,
            audit_capacity: 4096,
            audit_retention: Duration::from_secs(600),
            audit_min_keep: 128,
            alert_window: Duration::from_secs(5),
        }
    }
}

/// The capability-checked facade over the storage kernel.
pub struct Sandbox {
    contexts: HashMap<String, ExtensionContext>,
    screener: ThreatScreener,
    audit: AuditLog,
    metrics: Arc<MetricsHub>,
    config: SandboxConfig,
}

impl Sandbox {
    /// Creates a sandbox with default enforcement settings.
    #[must_use]
    pub fn new(metrics: Arc<MetricsHub>) -> Self {
        Self::with_config(metrics, SandboxConfig::default())
    }

    /// Creates a sandbox with explicit enforcement settings.
    #[must_use]
    pub fn with_config(metrics: Arc<MetricsHub>, config: SandboxConfig) -> Self {
        Self {
            contexts: HashMap::new(),
            screener: ThreatScreener::new(),
            audit: AuditLog::new(
                config.audit_capacity,
                config.audit_retention,
                config.audit_min_keep,
                config.alert_window,
            ),
            metrics,
            config,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Admits an extension under a declared policy.
    pub fn admit(&mut self, ext: &str, policy: ExtensionPolicy) -> SandboxResult<()> {
        if self.contexts.contains_key(ext) {
            return Err(SandboxError::AlreadyAdmitted(ext.to_string()));
        }
        self.contexts
            .insert(ext.to_string(), ExtensionContext::new(ext, policy));
        self.metrics.increment("sandbox.admissions", 1);
        tracing::info!(extension = ext, "extension admitted");
        Ok(())
    }

    /// Unloads an extension, rolling back everything it owns.
    pub fn unload(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
    ) -> SandboxResult<()> {
        if !self.contexts.contains_key(ext) {
            return Err(SandboxError::UnknownExtension(ext.to_string()));
        }
        self.teardown(world, scheduler, ext, "unloaded by host");
        Ok(())
    }

    /// True if the extension is currently admitted.
    #[must_use]
    pub fn is_admitted(&self, ext: &str) -> bool {
        self.contexts.contains_key(ext)
    }

    /// Read access to an extension's context (introspection/tests).
    #[must_use]
    pub fn context(&self, ext: &str) -> Option<&ExtensionContext> {
        self.contexts.get(ext)
    }

    /// The audit trail.
    #[must_use]
    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    /// Per-tick housekeeping: resets per-tick quota counters and prunes
    /// expired audit records. The host calls this once at tick start.
    pub fn begin_tick(&mut self) {
        for ctx in self.contexts.values_mut() {
            ctx.begin_tick();
        }
        self.audit.purge_expired();
    }

    // =========================================================================
    // Entity operations
    // =========================================================================

    /// Creates an entity owned by the calling extension.
    ///
    /// The creation is auto-tagged `ext:<id>` and recorded as owned;
    /// only the creator may later touch it.
    pub fn create_entity(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
    ) -> SandboxResult<EntityId> {
        let started = Instant::now();
        self.admission_check(ext, "entity.create")?;

        let (at_entity_limit, entity_limit, at_memory_limit, memory_used, memory_limit) = {
            let ctx = self.context_ref(ext)?;
            (
                ctx.owned.len() >= ctx.policy.max_entities,
                ctx.policy.max_entities,
                ctx.usage.memory_bytes + ENTITY_SLOT_BYTES > ctx.policy.max_memory_bytes,
                ctx.usage.memory_bytes,
                ctx.policy.max_memory_bytes,
            )
        };
        if at_entity_limit {
            let err = SandboxError::EntityLimitExceeded {
                limit: entity_limit,
            };
            self.log_denial(ext, "entity.create", &err);
            return Err(err);
        }
        if at_memory_limit {
            let err = SandboxError::MemoryLimitExceeded {
                used: memory_used,
                limit: memory_limit,
            };
            self.log_denial(ext, "entity.create", &err);
            return Err(err);
        }

        let id = world.create_entity();
        world.registry_mut().add_tag(id, &format!("ext:{ext}"))?;

        let ctx = self.context_mut(ext)?;
        ctx.owned.push(id);
        ctx.usage.entities = ctx.owned.len();
        ctx.usage.memory_bytes += ENTITY_SLOT_BYTES;
        self.metrics.increment("sandbox.entities_created", 1);

        self.finish_call(world, scheduler, ext, "entity.create", started)?;
        Ok(id)
    }

    /// Destroys an entity the calling extension owns.
    pub fn destroy_entity(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        entity: EntityId,
    ) -> SandboxResult<()> {
        let started = Instant::now();
        self.admission_check(ext, "entity.destroy")?;
        self.guard_target(world, ext, entity, "entity.destroy")?;

        // Freed bytes: the slot plus every component the mask says it holds.
        let freed = ENTITY_SLOT_BYTES
            + world
                .registry()
                .mask(entity)
                .map_or(0, |m| m.count_ones() as usize)
                * component_value_size();

        world.destroy_entity(entity)?;

        let ctx = self.context_mut(ext)?;
        ctx.release_owned(entity);
        ctx.usage.memory_bytes = ctx.usage.memory_bytes.saturating_sub(freed);

        self.finish_call(world, scheduler, ext, "entity.destroy", started)
    }

    /// Reads the tags of an entity the calling extension owns.
    pub fn entity_tags(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        entity: EntityId,
    ) -> SandboxResult<Vec<String>> {
        let started = Instant::now();
        self.admission_check(ext, "entity.tags")?;
        self.guard_target(world, ext, entity, "entity.tags")?;

        let tags = world.registry().tags(entity);
        self.finish_call(world, scheduler, ext, "entity.tags", started)?;
        Ok(tags)
    }

    /// The entities the extension created and still owns.
    pub fn owned_entities(&self, ext: &str) -> SandboxResult<Vec<EntityId>> {
        Ok(self.context_ref(ext)?.owned.clone())
    }

    // =========================================================================
    // Component operations
    // =========================================================================

    /// Adds a component to an owned entity.
    ///
    /// The type must be on the extension's whitelist - ownership of the
    /// entity does not bypass the component permission.
    pub fn add_component(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        entity: EntityId,
        type_id: ComponentTypeId,
        value: ComponentValue,
    ) -> SandboxResult<()> {
        let started = Instant::now();
        self.admission_check(ext, "component.add")?;

        if !self.context_ref(ext)?.policy.is_component_allowed(type_id) {
            let err = SandboxError::ComponentNotAllowed { type_id };
            self.log_denial(ext, "component.add", &err);
            return Err(err);
        }
        self.guard_target(world, ext, entity, "component.add")?;

        let (used, limit) = {
            let ctx = self.context_ref(ext)?;
            (ctx.usage.memory_bytes, ctx.policy.max_memory_bytes)
        };
        if used + component_value_size() > limit {
            let err = SandboxError::MemoryLimitExceeded { used, limit };
            self.log_denial(ext, "component.add", &err);
            return Err(err);
        }

        world.add_component(entity, type_id, value)?;
        self.context_mut(ext)?.usage.memory_bytes += component_value_size();

        self.finish_call(world, scheduler, ext, "component.add", started)
    }

    /// Reads a component from an owned entity (copied out - extension
    /// code never holds references into storage).
    pub fn get_component(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        entity: EntityId,
        type_id: ComponentTypeId,
    ) -> SandboxResult<ComponentValue> {
        let started = Instant::now();
        self.admission_check(ext, "component.get")?;
        self.guard_target(world, ext, entity, "component.get")?;

        let value = *world.get_component(entity, type_id)?;
        self.finish_call(world, scheduler, ext, "component.get", started)?;
        Ok(value)
    }

    /// Removes a component from an owned entity.
    pub fn remove_component(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        entity: EntityId,
        type_id: ComponentTypeId,
    ) -> SandboxResult<ComponentValue> {
        let started = Instant::now();
        self.admission_check(ext, "component.remove")?;
        self.guard_target(world, ext, entity, "component.remove")?;

        let removed = world.remove_component(entity, type_id)?;
        let ctx = self.context_mut(ext)?;
        ctx.usage.memory_bytes = ctx
            .usage
            .memory_bytes
            .saturating_sub(component_value_size());

        self.finish_call(world, scheduler, ext, "component.remove", started)?;
        Ok(removed)
    }

    /// True if the component type is on the caller's whitelist.
    pub fn is_component_allowed(
        &self,
        ext: &str,
        type_id: ComponentTypeId,
    ) -> SandboxResult<bool> {
        Ok(self.context_ref(ext)?.policy.is_component_allowed(type_id))
    }

    // =========================================================================
    // Query operations
    // =========================================================================

    /// Executes a query, filtered to the caller's own entities.
    ///
    /// Counts against the per-tick query quota.
    pub fn find_entities(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        query: &Query,
    ) -> SandboxResult<Vec<EntityId>> {
        let started = Instant::now();
        self.admission_check(ext, "query.find")?;
        self.charge_query(ext, "query.find")?;

        let owned = self.context_ref(ext)?.owned.clone();
        let result: Vec<EntityId> = world
            .execute_query(query)
            .into_iter()
            .filter(|e| owned.contains(e))
            .collect();

        self.finish_call(world, scheduler, ext, "query.find", started)?;
        Ok(result)
    }

    /// Counts matching owned entities without materializing the result.
    ///
    /// Counts against the per-tick query quota.
    pub fn count_entities(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        query: &Query,
    ) -> SandboxResult<usize> {
        let started = Instant::now();
        self.admission_check(ext, "query.count")?;
        self.charge_query(ext, "query.count")?;

        let owned = self.context_ref(ext)?.owned.clone();
        let count = world
            .query_iter(query)
            .filter(|e| owned.contains(e))
            .count();

        self.finish_call(world, scheduler, ext, "query.count", started)?;
        Ok(count)
    }

    /// Queries the extension has executed this tick.
    pub fn queries_used_this_tick(&self, ext: &str) -> SandboxResult<u32> {
        Ok(self.context_ref(ext)?.usage.queries_this_tick)
    }

    // =========================================================================
    // System registration
    // =========================================================================

    /// Registers a candidate update unit on the extension's behalf.
    ///
    /// The unit's identifier and description are screened against the
    /// denylist; its declared worst-case budget must fit under the
    /// sandbox-wide ceiling.
    pub fn register_system(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        unit: Box<dyn UpdateUnit>,
        declared_budget: Duration,
    ) -> SandboxResult<()> {
        let started = Instant::now();
        self.admission_check(ext, "system.register")?;

        let extra = self.context_ref(ext)?.policy.denied_patterns.clone();
        let screener = if extra.is_empty() {
            self.screener.clone()
        } else {
            ThreatScreener::with_patterns(&extra)
        };
        if let Some(pattern) = screener.screen(unit.id(), unit.description()) {
            let pattern = pattern.to_string();
            return Err(self.security_violation(world, scheduler, ext, "system.register", pattern));
        }

        if declared_budget > self.config.execution_ceiling {
            let err = SandboxError::ExecutionTimeExceeded {
                used_ms: millis(declared_budget),
                limit_ms: millis(self.config.execution_ceiling),
            };
            self.log_denial(ext, "system.register", &err);
            return Err(err);
        }

        let unit_id = unit.id().to_string();
        scheduler.register(unit)?;
        self.context_mut(ext)?.systems.push(unit_id);
        self.metrics.increment("sandbox.systems_registered", 1);

        self.finish_call(world, scheduler, ext, "system.register", started)
    }

    /// Unregisters one of the extension's own systems.
    pub fn unregister_system(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        unit_id: &str,
    ) -> SandboxResult<()> {
        let started = Instant::now();
        self.admission_check(ext, "system.unregister")?;

        if !self.context_ref(ext)?.systems.iter().any(|s| s == unit_id) {
            let err = SandboxError::SystemNotOwned {
                unit: unit_id.to_string(),
            };
            self.log_denial(ext, "system.unregister", &err);
            return Err(err);
        }

        scheduler.unregister(unit_id)?;
        self.context_mut(ext)?.systems.retain(|s| s != unit_id);

        self.finish_call(world, scheduler, ext, "system.unregister", started)
    }

    /// Unit identifiers the extension has registered.
    pub fn registered_systems(&self, ext: &str) -> SandboxResult<Vec<String>> {
        Ok(self.context_ref(ext)?.systems.clone())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Pre-call admission decision.
    ///
    /// Denies when the previous call exhausted the tick's execution
    /// budget - overage is measured post-call, so enforcement lands on
    /// the *next* admission decision.
    fn admission_check(&mut self, ext: &str, op: &str) -> SandboxResult<()> {
        let overage = {
            let ctx = self
                .contexts
                .get_mut(ext)
                .ok_or_else(|| SandboxError::UnknownExtension(ext.to_string()))?;
            if ctx.overage_flagged {
                ctx.overage_flagged = false;
                Some((ctx.usage.cpu_time_this_tick, ctx.policy.execution_budget()))
            } else {
                None
            }
        };

        if let Some((used, limit)) = overage {
            let err = SandboxError::ExecutionTimeExceeded {
                used_ms: millis(used),
                limit_ms: millis(limit),
            };
            self.log_denial(ext, op, &err);
            return Err(err);
        }
        Ok(())
    }

    /// Post-call accounting: charge elapsed time, flag overage, and
    /// tear down on a hard-ceiling crossing.
    fn finish_call(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        op: &str,
        started: Instant,
    ) -> SandboxResult<()> {
        let elapsed = started.elapsed();
        let Some(ctx) = self.contexts.get_mut(ext) else {
            // Torn down mid-call; nothing left to account.
            return Ok(());
        };

        ctx.usage.cpu_time_this_tick += elapsed;
        let used = ctx.usage.cpu_time_this_tick;
        let budget = ctx.policy.execution_budget();
        let hard_ceiling = budget * self.config.hard_cpu_factor;

        if used > hard_ceiling {
            let err = SandboxError::ExecutionTimeExceeded {
                used_ms: millis(used),
                limit_ms: millis(hard_ceiling),
            };
            self.log_denial(ext, op, &err);
            self.teardown(world, scheduler, ext, "hard execution ceiling crossed");
            return Err(err);
        }
        if used > budget {
            ctx.overage_flagged = true;
        }
        Ok(())
    }

    /// Target validation shared by entity/component operations: system
    /// range first, then ownership.
    fn guard_target(
        &mut self,
        world: &World,
        ext: &str,
        entity: EntityId,
        op: &str,
    ) -> SandboxResult<()> {
        if world.is_system_entity(entity) {
            let err = SandboxError::SystemEntityAccessDenied { entity };
            self.log_denial(ext, op, &err);
            return Err(err);
        }
        if !self.context_ref(ext)?.owns(entity) {
            let err = SandboxError::PermissionDenied { entity };
            self.log_denial(ext, op, &err);
            return Err(err);
        }
        Ok(())
    }

    /// Charges one query against the per-tick quota.
    fn charge_query(&mut self, ext: &str, op: &str) -> SandboxResult<()> {
        let over = {
            let ctx = self.context_mut(ext)?;
            if ctx.usage.queries_this_tick >= ctx.policy.max_queries_per_tick {
                Some(ctx.policy.max_queries_per_tick)
            } else {
                ctx.usage.queries_this_tick += 1;
                None
            }
        };
        if let Some(limit) = over {
            let err = SandboxError::QueryLimitExceeded { limit };
            self.log_denial(ext, op, &err);
            return Err(err);
        }
        self.metrics.increment("sandbox.queries", 1);
        Ok(())
    }

    /// Records a security violation; repeated violations past the policy
    /// ceiling force teardown.
    fn security_violation(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        op: &str,
        pattern: String,
    ) -> SandboxError {
        let err = SandboxError::SecurityViolation { pattern };
        self.log_denial(ext, op, &err);

        let over_limit = self.contexts.get_mut(ext).is_some_and(|ctx| {
            ctx.violations += 1;
            ctx.violations > ctx.policy.max_violations
        });
        if over_limit {
            self.teardown(world, scheduler, ext, "repeated security violations");
        }
        err
    }

    /// Atomic teardown: unregister the extension's systems, destroy its
    /// owned entities, drop the context. All-or-nothing by construction -
    /// the context is removed first, so no further calls can observe a
    /// half-torn-down extension.
    fn teardown(
        &mut self,
        world: &mut World,
        scheduler: &mut SystemScheduler,
        ext: &str,
        reason: &str,
    ) {
        let Some(ctx) = self.contexts.remove(ext) else {
            return;
        };

        for unit in &ctx.systems {
            // A unit may already be gone if the host unregistered it.
            let _ = scheduler.unregister(unit);
        }
        for &entity in &ctx.owned {
            // Stale handles (host destroyed the entity) are fine to skip.
            let _ = world.destroy_entity(entity);
        }

        self.audit.record(ext, "teardown", reason);
        self.metrics.increment("sandbox.teardowns", 1);
        if self.audit.should_alert(&format!("sandbox.{ext}.teardown")) {
            self.metrics
                .raise(&format!("sandbox.{ext}"), AlertLevel::Critical, 1.0, 0.0);
        }
        tracing::warn!(extension = ext, reason, "extension torn down");
    }

    /// Audits a denial and bumps the denial counter.
    fn log_denial(&mut self, ext: &str, op: &str, err: &SandboxError) {
        self.audit.record(ext, op, &err.to_string());
        self.metrics.increment("sandbox.denials", 1);
        if self.audit.should_alert(&format!("sandbox.{ext}.denials")) {
            self.metrics
                .raise(&format!("sandbox.{ext}"), AlertLevel::Warning, 1.0, 0.0);
        }
        tracing::warn!(
            extension = ext,
            operation = op,
            error = %err,
            "sandboxed call denied"
        );
    }

    fn context_ref(&self, ext: &str) -> SandboxResult<&ExtensionContext> {
        self.contexts
            .get(ext)
            .ok_or_else(|| SandboxError::UnknownExtension(ext.to_string()))
    }

    fn context_mut(&mut self, ext: &str) -> SandboxResult<&mut ExtensionContext> {
        self.contexts
            .get_mut(ext)
            .ok_or_else(|| SandboxError::UnknownExtension(ext.to_string()))
    }
}

/// Saturating millisecond conversion for error payloads.
fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_core::{ComponentKind, CoreResult, Transform, UnitRun};

    const POSITION: ComponentTypeId = ComponentTypeId(0);
    const SPRITE: ComponentTypeId = ComponentTypeId(1);

    struct NoopUnit {
        id: String,
    }

    impl UpdateUnit for NoopUnit {
        fn id(&self) -> &str {
            &self.id
        }
        fn required_components(&self) -> Vec<ComponentTypeId> {
            Vec::new()
        }
        fn update(&mut self, _world: &mut World, _run: &UnitRun) -> CoreResult<()> {
            Ok(())
        }
    }

    struct Rig {
        world: World,
        scheduler: SystemScheduler,
        sandbox: Sandbox,
    }

    fn rig() -> Rig {
        let metrics = Arc::new(MetricsHub::default());
        let mut world = World::new();
        world
            .register_component(POSITION, ComponentKind::Transform, 64)
            .unwrap();
        world
            .register_component(SPRITE, ComponentKind::Sprite, 64)
            .unwrap();
        Rig {
            world,
            scheduler: SystemScheduler::new(Arc::clone(&metrics)),
            sandbox: Sandbox::new(metrics),
        }
    }

    fn policy() -> ExtensionPolicy {
        ExtensionPolicy {
            max_entities: 2,
            max_queries_per_tick: 2,
            allowed_components: vec![POSITION.0],
            ..ExtensionPolicy::default()
        }
    }

    fn transform() -> ComponentValue {
        ComponentValue::Transform(Transform::new(1.0, 2.0, 0.0))
    }

    #[test]
    fn test_admit_twice_fails() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();
        assert_eq!(
            r.sandbox.admit("mod_a", policy()),
            Err(SandboxError::AlreadyAdmitted("mod_a".to_string()))
        );
    }

    #[test]
    fn test_unknown_extension() {
        let mut r = rig();
        let err = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "ghost");
        assert_eq!(err, Err(SandboxError::UnknownExtension("ghost".to_string())));
    }

    #[test]
    fn test_entity_quota_scenario() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();

        let e1 = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "mod_a")
            .unwrap();
        let e2 = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "mod_a")
            .unwrap();
        let err = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "mod_a");
        assert_eq!(err, Err(SandboxError::EntityLimitExceeded { limit: 2 }));

        // No partial entity was left behind by the failed attempt.
        assert_eq!(
            r.sandbox.owned_entities("mod_a").unwrap(),
            vec![e1, e2]
        );
        assert_eq!(r.world.entity_count(), 2);

        // Creations were auto-tagged with the owner's identity.
        assert_eq!(r.world.registry().tags(e1), vec!["ext:mod_a".to_string()]);
    }

    #[test]
    fn test_cross_extension_isolation() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();
        r.sandbox.admit("mod_b", policy()).unwrap();

        let ea = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "mod_a")
            .unwrap();

        let err = r
            .sandbox
            .get_component(&mut r.world, &mut r.scheduler, "mod_b", ea, POSITION);
        assert_eq!(err, Err(SandboxError::PermissionDenied { entity: ea }));

        let err = r
            .sandbox
            .destroy_entity(&mut r.world, &mut r.scheduler, "mod_b", ea);
        assert_eq!(err, Err(SandboxError::PermissionDenied { entity: ea }));

        // Host-created entities are equally off limits.
        let host = r.world.create_entity();
        let err = r
            .sandbox
            .destroy_entity(&mut r.world, &mut r.scheduler, "mod_a", host);
        assert_eq!(err, Err(SandboxError::PermissionDenied { entity: host }));
        assert!(r.world.is_valid(ea));
        assert!(r.world.is_valid(host));
    }

    #[test]
    fn test_system_entity_range_denied() {
        let metrics = Arc::new(MetricsHub::default());
        let mut world = World::new();
        let system_ids = world.reserve_system_entities(4).unwrap();
        world
            .register_component(POSITION, ComponentKind::Transform, 64)
            .unwrap();
        let mut scheduler = SystemScheduler::new(Arc::clone(&metrics));
        let mut sandbox = Sandbox::new(metrics);
        sandbox.admit("mod_a", policy()).unwrap();

        let target = system_ids[0];
        let err = sandbox.destroy_entity(&mut world, &mut scheduler, "mod_a", target);
        assert_eq!(
            err,
            Err(SandboxError::SystemEntityAccessDenied { entity: target })
        );
    }

    #[test]
    fn test_component_whitelist() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();
        let e = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "mod_a")
            .unwrap();

        r.sandbox
            .add_component(&mut r.world, &mut r.scheduler, "mod_a", e, POSITION, transform())
            .unwrap();
        let got = r
            .sandbox
            .get_component(&mut r.world, &mut r.scheduler, "mod_a", e, POSITION)
            .unwrap();
        assert_eq!(got, transform());

        // Sprite is not whitelisted - ownership does not matter.
        let err = r.sandbox.add_component(
            &mut r.world,
            &mut r.scheduler,
            "mod_a",
            e,
            SPRITE,
            ComponentValue::Sprite(ember_core::Sprite::default()),
        );
        assert_eq!(err, Err(SandboxError::ComponentNotAllowed { type_id: SPRITE }));
        assert!(!r.sandbox.is_component_allowed("mod_a", SPRITE).unwrap());
        assert!(r.sandbox.is_component_allowed("mod_a", POSITION).unwrap());
    }

    #[test]
    fn test_query_quota_and_filtering() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();
        r.sandbox.admit("mod_b", policy()).unwrap();

        let ea = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "mod_a")
            .unwrap();
        let eb = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "mod_b")
            .unwrap();
        r.sandbox
            .add_component(&mut r.world, &mut r.scheduler, "mod_a", ea, POSITION, transform())
            .unwrap();
        r.sandbox
            .add_component(&mut r.world, &mut r.scheduler, "mod_b", eb, POSITION, transform())
            .unwrap();

        let q = Query::new().with_all(&[POSITION]);

        // Results are filtered to the caller's own entities.
        let found = r
            .sandbox
            .find_entities(&mut r.world, &mut r.scheduler, "mod_a", &q)
            .unwrap();
        assert_eq!(found, vec![ea]);

        let count = r
            .sandbox
            .count_entities(&mut r.world, &mut r.scheduler, "mod_a", &q)
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(r.sandbox.queries_used_this_tick("mod_a").unwrap(), 2);

        // Quota is two per tick.
        let err = r
            .sandbox
            .find_entities(&mut r.world, &mut r.scheduler, "mod_a", &q);
        assert_eq!(err, Err(SandboxError::QueryLimitExceeded { limit: 2 }));

        // A new tick resets the counter.
        r.sandbox.begin_tick();
        assert_eq!(r.sandbox.queries_used_this_tick("mod_a").unwrap(), 0);
        assert!(r
            .sandbox
            .find_entities(&mut r.world, &mut r.scheduler, "mod_a", &q)
            .is_ok());
    }

    #[test]
    fn test_screening_rejects_dangerous_unit() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();

        let err = r.sandbox.register_system(
            &mut r.world,
            &mut r.scheduler,
            "mod_a",
            Box::new(NoopUnit {
                id: "loot_../../etc/passwd".to_string(),
            }),
            Duration::from_millis(1),
        );
        assert!(matches!(err, Err(SandboxError::SecurityViolation { .. })));
        assert!(r.scheduler.is_empty());
        assert_eq!(r.sandbox.context("mod_a").unwrap().violations, 1);
        assert!(!r.sandbox.audit_log().records_for("mod_a").is_empty());
    }

    #[test]
    fn test_repeated_violations_force_teardown() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();
        let e = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "mod_a")
            .unwrap();
        r.sandbox
            .register_system(
                &mut r.world,
                &mut r.scheduler,
                "mod_a",
                Box::new(NoopUnit {
                    id: "honest_unit".to_string(),
                }),
                Duration::from_millis(1),
            )
            .unwrap();

        // Policy tolerates three violations; the fourth tears down.
        for _ in 0..4 {
            let _ = r.sandbox.register_system(
                &mut r.world,
                &mut r.scheduler,
                "mod_a",
                Box::new(NoopUnit {
                    id: "exec(evil)".to_string(),
                }),
                Duration::from_millis(1),
            );
        }

        // Atomic teardown: context gone, entities destroyed, systems
        // unregistered.
        assert!(!r.sandbox.is_admitted("mod_a"));
        assert!(!r.world.is_valid(e));
        assert!(!r.scheduler.contains("honest_unit"));
    }

    #[test]
    fn test_declared_budget_ceiling() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();

        let err = r.sandbox.register_system(
            &mut r.world,
            &mut r.scheduler,
            "mod_a",
            Box::new(NoopUnit {
                id: "slow_unit".to_string(),
            }),
            Duration::from_millis(50),
        );
        assert_eq!(
            err,
            Err(SandboxError::ExecutionTimeExceeded {
                used_ms: 50,
                limit_ms: 5,
            })
        );
        assert!(r.scheduler.is_empty());
    }

    #[test]
    fn test_system_registration_and_unregister() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();
        r.sandbox.admit("mod_b", policy()).unwrap();

        r.sandbox
            .register_system(
                &mut r.world,
                &mut r.scheduler,
                "mod_a",
                Box::new(NoopUnit {
                    id: "spark_decay".to_string(),
                }),
                Duration::from_millis(1),
            )
            .unwrap();
        assert_eq!(
            r.sandbox.registered_systems("mod_a").unwrap(),
            vec!["spark_decay".to_string()]
        );

        // Another extension cannot unregister it.
        let err = r.sandbox.unregister_system(
            &mut r.world,
            &mut r.scheduler,
            "mod_b",
            "spark_decay",
        );
        assert_eq!(
            err,
            Err(SandboxError::SystemNotOwned {
                unit: "spark_decay".to_string()
            })
        );
        assert!(r.scheduler.contains("spark_decay"));

        r.sandbox
            .unregister_system(&mut r.world, &mut r.scheduler, "mod_a", "spark_decay")
            .unwrap();
        assert!(!r.scheduler.contains("spark_decay"));
        assert!(r.sandbox.registered_systems("mod_a").unwrap().is_empty());
    }

    #[test]
    fn test_unload_rolls_back() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();
        let e = r
            .sandbox
            .create_entity(&mut r.world, &mut r.scheduler, "mod_a")
            .unwrap();
        r.sandbox
            .register_system(
                &mut r.world,
                &mut r.scheduler,
                "mod_a",
                Box::new(NoopUnit {
                    id: "fizzle".to_string(),
                }),
                Duration::from_millis(1),
            )
            .unwrap();

        r.sandbox
            .unload(&mut r.world, &mut r.scheduler, "mod_a")
            .unwrap();

        assert!(!r.sandbox.is_admitted("mod_a"));
        assert!(!r.world.is_valid(e));
        assert!(r.scheduler.is_empty());
        assert_eq!(
            r.sandbox.unload(&mut r.world, &mut r.scheduler, "mod_a"),
            Err(SandboxError::UnknownExtension("mod_a".to_string()))
        );
    }

    #[test]
    fn test_denials_are_audited() {
        let mut r = rig();
        r.sandbox.admit("mod_a", policy()).unwrap();

        let host = r.world.create_entity();
        let _ = r
            .sandbox
            .destroy_entity(&mut r.world, &mut r.scheduler, "mod_a", host);

        let records = r.sandbox.audit_log().records_for("mod_a");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "entity.destroy");
        assert!(records[0].reason.contains("permission denied"));
    }
}
