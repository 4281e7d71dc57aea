//! # Extension Admission Policy
//!
//! The declarative resource and permission envelope an extension is
//! admitted under. Loaded once, at admission time, from TOML - changing
//! a policy means re-admitting the extension. There is no runtime API
//! for loosening a live extension's envelope.

use std::time::Duration;

use serde::Deserialize;

use ember_core::ComponentTypeId;

use crate::error::{SandboxError, SandboxResult};

/// Per-extension resource quotas and component permissions.
///
/// ## Example policy file
///
/// ```toml
/// max_entities = 128
/// max_memory_bytes = 262144
/// max_execution_ms = 2
/// max_queries_per_tick = 32
/// allowed_components = [0, 2]
/// max_violations = 3
/// denied_patterns = ["net_raw"]
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExtensionPolicy {
    /// Maximum entities the extension may have alive at once.
    pub max_entities: usize,
    /// Maximum bytes of storage attributable to the extension.
    pub max_memory_bytes: usize,
    /// Per-tick execution budget, in milliseconds.
    pub max_execution_ms: u64,
    /// Maximum queries the extension may run per tick.
    pub max_queries_per_tick: u32,
    /// Component type ids the extension may touch.
    pub allowed_components: Vec<u8>,
    /// Security violations tolerated before forced teardown.
    pub max_violations: u32,
    /// Extra denylist patterns appended to the built-in screening set.
    pub denied_patterns: Vec<String>,
}

impl Default for ExtensionPolicy {
    fn default() -> Self {
        Self {
            max_entities: 256,
            max_memory_bytes: 1024 * 1024,
            max_execution_ms: 2,
            max_queries_per_tick: 64,
            allowed_components: Vec::new(),
            max_violations: 3,
            denied_patterns: Vec::new(),
        }
    }
}

impl ExtensionPolicy {
    /// Parses a policy from TOML text.
    pub fn from_toml_str(text: &str) -> SandboxResult<Self> {
        toml::from_str(text).map_err(|e| SandboxError::InvalidPolicy(e.to_string()))
    }

    /// The per-tick execution budget as a [`Duration`].
    #[must_use]
    pub const fn execution_budget(&self) -> Duration {
        Duration::from_millis(self.max_execution_ms)
    }

    /// True if the component type is on the extension's whitelist.
    #[must_use]
    pub fn is_component_allowed(&self, type_id: ComponentTypeId) -> bool {
        self.allowed_components.contains(&type_id.0)
    }
}
