//! # Static Threat Screening
//!
//! NEVER trust the extension. A candidate system's identifier and
//! declared behavior are screened against a denylist of dangerous
//! patterns before it is allowed anywhere near the scheduler:
//!
//! - Path traversal sequences (an extension has no business near paths)
//! - Process/command-execution markers
//! - Raw network primitives
//!
//! Matching is case-insensitive substring search; the screener reports
//! the first matched pattern for the audit trail.

/// Built-in denylist applied to every extension.
const BUILTIN_PATTERNS: &[&str] = &[
    // Path traversal
    "../",
    "..\\",
    "/etc/",
    "/bin/",
    "%2e%2e",
    // Process / command execution
    "cmd.exe",
    "powershell",
    "system(",
    "exec(",
    "popen(",
    "fork(",
    "/bin/sh",
    // Raw network primitives
    "socket(",
    "connect(",
    "bind(",
    "raw_socket",
    "af_inet",
];

/// Screens candidate system identifiers and descriptions.
#[derive(Clone, Debug)]
pub struct ThreatScreener {
    patterns: Vec<String>,
}

impl ThreatScreener {
    /// Creates a screener with the built-in denylist.
    #[must_use]
    pub fn new() -> Self {
        Self {
            patterns: BUILTIN_PATTERNS.iter().map(|p| (*p).to_string()).collect(),
        }
    }

    /// Creates a screener with extra patterns appended to the built-ins.
    #[must_use]
    pub fn with_patterns(extra: &[String]) -> Self {
        let mut screener = Self::new();
        screener
            .patterns
            .extend(extra.iter().map(|p| p.to_lowercase()));
        screener
    }

    /// Screens a candidate. Returns the first matched denylist pattern,
    /// or `None` if the candidate is clean.
    #[must_use]
    pub fn screen(&self, id: &str, description: &str) -> Option<&str> {
        let haystack = format!("{} {}", id.to_lowercase(), description.to_lowercase());
        self.patterns
            .iter()
            .find(|p| haystack.contains(p.as_str()))
            .map(String::as_str)
    }
}

impl Default for ThreatScreener {
    fn default() -> Self {
        Self::new()
    }
}
