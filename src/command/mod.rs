//! CommandAuthorizer - allowlist and argument sanitization for `exec`
//!
//! Authorization never spawns anything; it either denies or returns the
//! sanitized command/args pair the runner may execute.

use crate::config::SandboxConfig;
use crate::error::{Result, Violation, ViolationCode};
use crate::guard::{AccessMode, PathGuard};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};


/// Argument substrings that indicate shell injection attempts
pub const UNSAFE_ARG_TOKENS: &[&str] = &["&&", "||", "|", ";", "`", "$("];

/// Commands whose positional arguments are paths opened for reading
pub const READ_PATH_COMMANDS: &[&str] = &["ls", "cat", "head", "tail"];

/// Commands whose positional arguments are paths created or written
pub const WRITE_PATH_COMMANDS: &[&str] = &["mkdir", "touch"];

/// A command/args pair that passed every authorization step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedCommand {
    /// Lowercased executable name, guaranteed on the allowlist
    pub command: String,
    /// Sanitized arguments; path positionals rewritten to real paths
    pub args: Vec<String>,
}

/// Validates executables and arguments before any process is spawned.
#[derive(Debug, Clone)]
pub struct CommandAuthorizer {
    allowed: HashSet<String>,
}

impl CommandAuthorizer {
    /// Build an authorizer from the configured allowlist (case-insensitive).
    #[must_use]
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            allowed: config
                .allowed_commands
                .iter()
                .map(|c| c.to_lowercase())
                .collect(),
        }
    }

    /// Validate `command` and `args`, stopping at the first failure.
    ///
    /// Path-taking commands get their positional arguments routed through the
    /// guard (resolved under `root` when a workspace context is active) and
    /// replaced with real paths; flag-like arguments pass through unchanged.
    pub fn authorize(
        &self,
        guard: &PathGuard,
        root: Option<&Path>,
        command: &str,
        args: &[String],
    ) -> Result<AuthorizedCommand> {
        let trimmed = command.trim();
        if trimmed.is_empty() || trimmed.split_whitespace().count() != 1 {
            warn!(command = %command, "rejected multi-token or empty command");
            return Err(denied(command, "command must be a single executable name"));
        }
        if trimmed.contains('/') || trimmed.contains('\\') {
            warn!(command = %command, "rejected path-qualified executable");
            return Err(denied(command, "path-qualified executables are not allowed"));
        }

        let lowered = trimmed.to_lowercase();
        if !self.allowed.contains(&lowered) {
            warn!(command = %lowered, "command not on allowlist");
            return Err(denied(&lowered, "command is not on the allowlist"));
        }

        for arg in args {
            if let Some(token) = UNSAFE_ARG_TOKENS.iter().find(|t| arg.contains(*t)) {
                warn!(command = %lowered, arg = %arg, token = %token, "shell metacharacter in argument");
                return Err(Violation::new(
                    ViolationCode::UnsafeArgument,
                    format!("argument contains blocked shell token '{token}'"),
                )
                .with_details(serde_json::json!({ "command": lowered, "arg": arg }))
                .into());
            }
        }

        let path_mode = path_mode_for(&lowered);
        let mut sanitized = Vec::with_capacity(args.len());
        for arg in args {
            match path_mode {
                Some(mode) if !arg.starts_with('-') => {
                    let resolved = guard.resolve_in(root, arg, mode)?;
                    sanitized.push(resolved.real_path.display().to_string());
                }
                _ => sanitized.push(arg.clone()),
            }
        }

        debug!(command = %lowered, args = ?sanitized, "command authorized");
        Ok(AuthorizedCommand {
            command: lowered,
            args: sanitized,
        })
    }
}

fn denied(command: &str, message: &str) -> crate::error::Error {
    Violation::new(ViolationCode::CommandNotAllowed, message)
        .with_details(serde_json::json!({ "command": command }))
        .into()
}

fn path_mode_for(command: &str) -> Option<AccessMode> {
    if READ_PATH_COMMANDS.contains(&command) {
        Some(AccessMode::Read)
    } else if WRITE_PATH_COMMANDS.contains(&command) {
        Some(AccessMode::Write)
    } else {
        None
    }
}
