//! # Sandbox Error Types
//!
//! Every error the facade can return to extension code.
//!
//! All errors are returned synchronously and never abort the process.
//! Quota and permission failures leave no partial state behind. The one
//! documented exception: a breach of a *hard* ceiling returns
//! [`SandboxError::ExecutionTimeExceeded`] and is followed by the atomic
//! teardown of the offending extension.

use thiserror::Error;

use ember_core::{ComponentTypeId, CoreError, EntityId};

/// Errors that can occur at the sandbox facade.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    /// The calling extension was never admitted (or was torn down).
    #[error("unknown extension: {0}")]
    UnknownExtension(String),

    /// An extension with this identifier is already admitted.
    #[error("extension already admitted: {0}")]
    AlreadyAdmitted(String),

    /// The extension reached its entity-creation quota.
    #[error("entity limit exceeded: quota is {limit}")]
    EntityLimitExceeded {
        /// The extension's entity quota.
        limit: usize,
    },

    /// The operation would cross the extension's memory quota.
    #[error("memory limit exceeded: {used} of {limit} bytes used")]
    MemoryLimitExceeded {
        /// Bytes currently attributed to the extension.
        used: usize,
        /// The extension's memory quota in bytes.
        limit: usize,
    },

    /// The extension exhausted its per-tick execution budget.
    #[error("execution time exceeded: used {used_ms}ms of {limit_ms}ms budget")]
    ExecutionTimeExceeded {
        /// Milliseconds consumed this tick.
        used_ms: u64,
        /// The applicable budget in milliseconds.
        limit_ms: u64,
    },

    /// The extension exhausted its per-tick query quota.
    #[error("query limit exceeded: quota is {limit} per tick")]
    QueryLimitExceeded {
        /// The extension's per-tick query quota.
        limit: u32,
    },

    /// The target entity is owned by another extension or the host.
    #[error("permission denied for entity {entity}")]
    PermissionDenied {
        /// The entity the caller does not own.
        entity: EntityId,
    },

    /// The target entity is in the reserved system range.
    #[error("system entity access denied: {entity}")]
    SystemEntityAccessDenied {
        /// The system-owned entity.
        entity: EntityId,
    },

    /// The system unit belongs to another extension (or to the host).
    #[error("system unit not owned by caller: {unit}")]
    SystemNotOwned {
        /// The unit the caller tried to manage.
        unit: String,
    },

    /// The component type is outside the extension's whitelist.
    #[error("component type not allowed: {type_id}")]
    ComponentNotAllowed {
        /// The disallowed component type.
        type_id: ComponentTypeId,
    },

    /// Static screening matched a denylisted pattern.
    #[error("security violation: matched denylisted pattern {pattern:?}")]
    SecurityViolation {
        /// The pattern that matched.
        pattern: String,
    },

    /// The admission policy could not be parsed.
    #[error("invalid extension policy: {0}")]
    InvalidPolicy(String),

    /// An error surfaced from the storage kernel.
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for sandboxed operations.
pub type SandboxResult<T> = Result<T, SandboxError>;
