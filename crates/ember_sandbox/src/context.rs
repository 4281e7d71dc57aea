//! # Extension Context
//!
//! One explicit context value per admitted extension - created at
//! admission, mutated on every sandboxed call, destroyed (with full
//! rollback of owned state) at unload or forced teardown. Never a
//! process-wide singleton.

use std::time::Duration;

use ember_core::EntityId;

use crate::policy::ExtensionPolicy;

/// Live resource consumption counters for one extension.
#[derive(Clone, Copy, Debug, Default)]
pub struct ResourceUsage {
    /// Entities currently alive and owned by the extension.
    pub entities: usize,
    /// Bytes of storage attributed to the extension.
    pub memory_bytes: usize,
    /// Execution time consumed inside sandboxed calls this tick.
    pub cpu_time_this_tick: Duration,
    /// Queries executed this tick.
    pub queries_this_tick: u32,
}

/// Per-extension sandbox state.
#[derive(Clone, Debug)]
pub struct ExtensionContext {
    /// The owning extension's identifier.
    pub id: String,
    /// The admission policy this extension runs under.
    pub policy: ExtensionPolicy,
    /// Entities created by this extension - its exclusive deletion scope.
    pub owned: Vec<EntityId>,
    /// Current resource consumption.
    pub usage: ResourceUsage,
    /// Security violations recorded so far.
    pub violations: u32,
    /// Set when post-call time measurement found the tick budget
    /// exhausted; the next admission decision denies and clears it.
    pub overage_flagged: bool,
    /// Unit identifiers of systems this extension registered.
    pub systems: Vec<String>,
}

impl ExtensionContext {
    /// Creates the context for a newly admitted extension.
    #[must_use]
    pub fn new(id: &str, policy: ExtensionPolicy) -> Self {
        Self {
            id: id.to_string(),
            policy,
            owned: Vec::new(),
            usage: ResourceUsage::default(),
            violations: 0,
            overage_flagged: false,
            systems: Vec::new(),
        }
    }

    /// True if the extension created (and still owns) the entity.
    #[must_use]
    pub fn owns(&self, entity: EntityId) -> bool {
        self.owned.contains(&entity)
    }

    /// Resets the per-tick counters. Called at the start of every tick.
    pub fn begin_tick(&mut self) {
        self.usage.cpu_time_this_tick = Duration::ZERO;
        self.usage.queries_this_tick = 0;
    }

    /// Drops an entity from the owned set (after successful destroy).
    pub fn release_owned(&mut self, entity: EntityId) {
        self.owned.retain(|&e| e != entity);
        self.usage.entities = self.owned.len();
    }
}
