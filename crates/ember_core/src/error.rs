//! # Core Error Types
//!
//! All errors that can occur in the storage kernel and scheduler.
//!
//! These are returned synchronously to the caller and never abort the
//! process. Batch operations validate every element before mutating any,
//! so a returned error always means "nothing changed".

use thiserror::Error;

use crate::ecs::component::{ComponentKind, ComponentTypeId};
use crate::ecs::entity::EntityId;

/// Errors that can occur in the EMBER storage kernel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The entity handle is stale, destroyed, or was never issued.
    #[error("entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Attempted to register a component type twice.
    #[error("component type already registered: {0}")]
    AlreadyRegistered(ComponentTypeId),

    /// Operated on a component type that was never registered.
    #[error("component type not registered: {0}")]
    TypeNotRegistered(ComponentTypeId),

    /// The entity already holds this component type (no silent overwrite).
    #[error("entity {entity} already holds component type {type_id}")]
    DuplicateComponent {
        /// The entity that already holds the component.
        entity: EntityId,
        /// The component type that was added twice.
        type_id: ComponentTypeId,
    },

    /// The entity does not hold this component type.
    #[error("entity {entity} has no component of type {type_id}")]
    ComponentNotFound {
        /// The entity missing the component.
        entity: EntityId,
        /// The component type that was requested.
        type_id: ComponentTypeId,
    },

    /// The value's shape does not match the registered shape for the type.
    #[error("component type {type_id} stores {expected}, got {actual}")]
    KindMismatch {
        /// The component type being written to.
        type_id: ComponentTypeId,
        /// The shape declared at registration.
        expected: ComponentKind,
        /// The shape of the rejected value.
        actual: ComponentKind,
    },

    /// All component type slots are taken (one ownership-mask bit each).
    #[error("component type limit reached ({limit} types)")]
    TypeLimitExceeded {
        /// Maximum number of registrable component types.
        limit: u8,
    },

    /// The parent assignment would make an entity its own ancestor.
    #[error("parent assignment would create a cycle at entity {entity}")]
    CyclicParentage {
        /// The entity whose ancestry would contain itself.
        entity: EntityId,
    },

    /// The system-entity range can only be reserved once, at bootstrap.
    #[error("system entity range already reserved ({watermark} slots)")]
    SystemRangeReserved {
        /// The previously reserved watermark.
        watermark: u32,
    },

    /// An update unit with this identifier is already registered.
    #[error("update unit already registered: {0}")]
    DuplicateUnit(String),

    /// No update unit with this identifier is registered.
    #[error("unknown update unit: {0}")]
    UnknownUnit(String),

    /// The dependency edge would close a cycle in the unit graph.
    #[error("dependency cycle: {unit} cannot run after {runs_after}")]
    CyclicDependency {
        /// The unit the edge was declared for.
        unit: String,
        /// The unit it was declared to run after.
        runs_after: String,
    },
}

/// Result type for storage kernel operations.
pub type CoreResult<T> = Result<T, CoreError>;
