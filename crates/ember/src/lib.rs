//! # EMBER
//!
//! A moddable entity/component engine core:
//!
//! - **Storage kernel** ([`ember_core`]): packed sparse-set component
//!   storage with O(1) mutation, entity recycling with generation
//!   checks, generation-stamped query caching, and a deterministic
//!   system scheduler
//! - **Metrics** ([`ember_metrics`]): lock-light counters, gauges and
//!   histograms with threshold alerts
//! - **Sandbox** ([`ember_sandbox`]): the permission-checked facade
//!   every untrusted extension call passes through
//!
//! The [`Engine`] type assembles all three for the host frame loop:
//!
//! ```rust,ignore
//! use ember::{Engine, EngineConfig};
//!
//! let mut engine = Engine::new(EngineConfig::default())?;
//! loop {
//!     engine.update(delta_time)?;
//!     engine.render(&mut surface)?;
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod engine;

pub use engine::{Engine, EngineConfig, ExtensionApi};

pub use ember_core::{
    component_value_size, AudioEmitter, ComponentKind, ComponentStore, ComponentTypeId,
    ComponentValue, CoreError, CoreResult, EntityId, EntityRegistry, Query, QueryEngine,
    RenderSurface, RigidBody, ScriptState, SparseSet, Sprite, SystemScheduler, TickStats,
    Transform, UnitRun, UpdateUnit, World, ENTITY_SLOT_BYTES,
};
pub use ember_metrics::{
    Alert, AlertLevel, HistogramSummary, MetricsConfig, MetricsHub, MetricsSnapshot,
};
pub use ember_sandbox::{
    AuditLog, ExtensionContext, ExtensionPolicy, ResourceUsage, Sandbox, SandboxConfig,
    SandboxError, SandboxResult, ThreatScreener, ViolationRecord,
};
