//! # EMBER Sandbox
//!
//! The security boundary between untrusted extension ("mod") code and
//! the EMBER storage kernel.
//!
//! ## Philosophy
//!
//! NEVER trust the extension. Extension code arrives as a sequence of
//! typed API calls - it is never executed as unrestricted native code -
//! and every call passes through the [`Sandbox`] facade, which:
//!
//! 1. Validates the call against the caller's [`ExtensionContext`]
//!    (ownership, component whitelist, system-entity range)
//! 2. Accounts resources (entities, memory, execution time, queries)
//!    against the admission [`ExtensionPolicy`]
//! 3. Screens candidate systems against a static threat denylist
//! 4. Forwards admitted calls to the same `World` and scheduler
//!    first-party code uses
//! 5. Appends every denial to a bounded [`AuditLog`]
//!
//! Hard-ceiling breaches and repeated security violations trigger the
//! atomic teardown of the offending extension - systems unregistered,
//! owned entities released, context destroyed, all-or-nothing.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod audit;
pub mod context;
pub mod error;
pub mod facade;
pub mod policy;
pub mod screening;

pub use audit::{AuditLog, ViolationRecord};
pub use context::{ExtensionContext, ResourceUsage};
pub use error::{SandboxError, SandboxResult};
pub use facade::{Sandbox, SandboxConfig};
pub use policy::ExtensionPolicy;
pub use screening::ThreatScreener;
