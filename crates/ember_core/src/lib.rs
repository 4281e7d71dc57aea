//! # EMBER Core Engine
//!
//! Entity/component storage kernel and system scheduler, designed for:
//! - O(1) component add/remove/lookup through sparse-set indexing
//! - Fully contiguous component iteration (structure of arrays)
//! - Deterministic, reproducible system execution order
//!
//! ## Architecture Rules
//!
//! 1. **Packed storage** - dense arrays never have gaps; removal is
//!    swap-with-last
//! 2. **One orchestrator** - only the `World` mutates both the
//!    ownership mask and the sparse sets
//! 3. **Errors, not panics** - every fallible operation returns
//!    [`CoreResult`]
//!
//! ## Example
//!
//! ```rust,ignore
//! use ember_core::{World, ComponentTypeId, ComponentKind, ComponentValue, Transform};
//!
//! let mut world = World::new();
//! world.register_component(ComponentTypeId(0), ComponentKind::Transform, 1024)?;
//! let e = world.create_entity();
//! world.add_component(e, ComponentTypeId(0), ComponentValue::Transform(Transform::new(1.0, 2.0, 0.0)))?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod ecs;
pub mod error;
pub mod schedule;

pub use ecs::component::{
    component_value_size, AudioEmitter, ComponentKind, ComponentTypeId, ComponentValue, RigidBody,
    ScriptState, Sprite, Transform,
};
pub use ecs::entity::EntityId;
pub use ecs::query::{Query, QueryEngine, QueryIter};
pub use ecs::registry::{EntityRegistry, ENTITY_SLOT_BYTES};
pub use ecs::sparse::SparseSet;
pub use ecs::store::ComponentStore;
pub use ecs::world::World;
pub use error::{CoreError, CoreResult};
pub use schedule::{RenderSurface, SystemScheduler, TickStats, UnitRun, UpdateUnit};
