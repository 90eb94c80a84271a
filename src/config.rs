//! Sandbox configuration - loaded once at construction, immutable thereafter

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default maximum execution timeout in milliseconds
pub const DEFAULT_EXEC_TIMEOUT_MS: u64 = 30_000;

/// Floor applied to caller-requested timeouts
pub const MIN_EXEC_TIMEOUT_MS: u64 = 250;

/// Default output budget shared across stdout and stderr (1 MiB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Commands permitted by default (case-insensitive)
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] = &[
    "ls", "cat", "head", "tail", "wc", "grep", "find", "echo", "pwd", "mkdir", "touch", "sort",
    "uniq", "date", "which", "git",
];

/// Configuration for the sandbox engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Logical root exposed to the planner; virtual paths resolve under it
    pub virtual_root: PathBuf,
    /// Real directories the engine is permitted to touch
    pub allowed_workspaces: Vec<PathBuf>,
    /// Executables permitted under `exec` (case-insensitive)
    pub allowed_commands: Vec<String>,
    /// Ceiling for command wall-clock time, in milliseconds
    pub exec_timeout_ms: u64,
    /// Byte budget shared across a command's stdout and stderr
    pub max_output_bytes: usize,
    /// Whether audit records are persisted
    pub audit_log_enabled: bool,
    /// Append-only NDJSON audit log location
    pub audit_log_path: PathBuf,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            virtual_root: PathBuf::from("."),
            allowed_workspaces: Vec::new(),
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            exec_timeout_ms: DEFAULT_EXEC_TIMEOUT_MS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            audit_log_enabled: true,
            audit_log_path: PathBuf::from("logs/sandbox-audit.jsonl"),
        }
    }
}

impl SandboxConfig {
    /// Create a config rooted at `workspace`, which is also the sole allowed workspace
    #[must_use]
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        Self {
            virtual_root: workspace.clone(),
            allowed_workspaces: vec![workspace],
            ..Self::default()
        }
    }

    /// Replace the command allowlist
    #[must_use]
    pub fn with_allowed_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_commands = commands.into_iter().map(Into::into).collect();
        self
    }

    /// Set the execution timeout ceiling
    #[must_use]
    pub fn with_exec_timeout_ms(mut self, ms: u64) -> Self {
        self.exec_timeout_ms = ms;
        self
    }

    /// Set the output byte budget
    #[must_use]
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Set the audit log destination
    #[must_use]
    pub fn with_audit_log(mut self, enabled: bool, path: impl Into<PathBuf>) -> Self {
        self.audit_log_enabled = enabled;
        self.audit_log_path = path.into();
        self
    }

    /// Clamp a caller-requested timeout into the permitted window:
    /// `min(exec_timeout_ms, max(250, requested))`, defaulting to the ceiling.
    #[must_use]
    pub fn clamp_exec_timeout(&self, requested_ms: Option<u64>) -> Duration {
        let requested = requested_ms.unwrap_or(self.exec_timeout_ms);
        let effective = requested.max(MIN_EXEC_TIMEOUT_MS).min(self.exec_timeout_ms);
        Duration::from_millis(effective)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_clamping() {
        let config = SandboxConfig::default().with_exec_timeout_ms(10_000);

        // No request falls back to the ceiling
        assert_eq!(config.clamp_exec_timeout(None), Duration::from_millis(10_000));
        // Requests below the floor are raised to it
        assert_eq!(config.clamp_exec_timeout(Some(10)), Duration::from_millis(250));
        // Requests above the ceiling are capped
        assert_eq!(config.clamp_exec_timeout(Some(60_000)), Duration::from_millis(10_000));
        // In-window requests pass through
        assert_eq!(config.clamp_exec_timeout(Some(5_000)), Duration::from_millis(5_000));
    }

    #[test]
    fn workspace_constructor() {
        let config = SandboxConfig::for_workspace("/srv/tasks/alpha");
        assert_eq!(config.virtual_root, PathBuf::from("/srv/tasks/alpha"));
        assert_eq!(config.allowed_workspaces, vec![PathBuf::from("/srv/tasks/alpha")]);
        assert!(config.allowed_commands.iter().any(|c| c == "ls"));
    }
}
