//! PathGuard - confines caller-supplied virtual paths to allowed workspaces
//!
//! Every filesystem-touching operation goes through [`PathGuard::resolve`];
//! nothing in this module performs I/O, resolution is pure path arithmetic.

use crate::config::SandboxConfig;
use crate::error::{Result, Violation, ViolationCode};
use serde::Serialize;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};


/// How the resolved path will be used.
///
/// Accepted for future differentiation (e.g. read-only roots); every mode
/// revalidates containment, no mode is exempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// File content will be read
    Read,
    /// File content will be written
    Write,
    /// Directory entries will be enumerated
    List,
    /// Path becomes a child process working directory
    Cwd,
}

impl AccessMode {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::List => "list",
            Self::Cwd => "cwd",
        }
    }
}

/// Output of path resolution. Transient: produced per call, never cached.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedPath {
    /// Canonical virtual form of the caller's path
    pub virtual_path: String,
    /// Real filesystem path, guaranteed under an allowed workspace
    pub real_path: PathBuf,
}

/// The sole gate between caller-supplied paths and the real filesystem.
#[derive(Debug, Clone)]
pub struct PathGuard {
    virtual_root: PathBuf,
    allowed_workspaces: Vec<PathBuf>,
}

impl PathGuard {
    /// Build a guard from the engine configuration.
    ///
    /// The virtual root is always part of the allowed workspace set.
    #[must_use]
    pub fn new(config: &SandboxConfig) -> Self {
        let mut allowed: Vec<PathBuf> = config.allowed_workspaces.clone();
        if !allowed.contains(&config.virtual_root) {
            allowed.push(config.virtual_root.clone());
        }
        Self {
            virtual_root: config.virtual_root.clone(),
            allowed_workspaces: allowed,
        }
    }

    /// Resolve a virtual path against the configured virtual root.
    pub fn resolve(&self, virtual_path: &str, mode: AccessMode) -> Result<ResolvedPath> {
        self.resolve_in(None, virtual_path, mode)
    }

    /// Resolve a virtual path against `root` when given, else the virtual root.
    ///
    /// The override is how a per-task workspace context narrows resolution; the
    /// containment check against the allowed workspaces still applies.
    pub fn resolve_in(
        &self,
        root: Option<&Path>,
        virtual_path: &str,
        mode: AccessMode,
    ) -> Result<ResolvedPath> {
        let root = root.unwrap_or(&self.virtual_root);

        if virtual_path.is_empty() || virtual_path.contains('\0') {
            warn!(path = %virtual_path.escape_debug(), mode = %mode.as_str(), "rejected unnormalizable path");
            return Err(Violation::new(
                ViolationCode::InvalidPath,
                "path is empty or cannot be normalized",
            )
            .with_details(serde_json::json!({ "mode": mode.as_str() }))
            .into());
        }

        let components = normalize_components(virtual_path).ok_or_else(|| {
            warn!(path = %virtual_path, mode = %mode.as_str(), "path traversal escapes virtual root");
            Violation::new(
                ViolationCode::PathOutsideVirtualRoot,
                format!("'{virtual_path}' resolves above the virtual root"),
            )
            .with_details(serde_json::json!({ "path": virtual_path, "mode": mode.as_str() }))
        })?;

        let mut real_path = root.to_path_buf();
        for part in &components {
            real_path.push(part);
        }

        if !self
            .allowed_workspaces
            .iter()
            .any(|ws| real_path.starts_with(ws))
        {
            warn!(
                path = %virtual_path,
                resolved = %real_path.display(),
                mode = %mode.as_str(),
                "resolved path lies outside every allowed workspace"
            );
            return Err(Violation::new(
                ViolationCode::PathOutsideWorkspace,
                format!("'{virtual_path}' is outside the allowed workspaces"),
            )
            .with_details(serde_json::json!({ "path": virtual_path, "mode": mode.as_str() }))
            .into());
        }

        let virtual_path = canonical_virtual(&components);
        debug!(virtual = %virtual_path, real = %real_path.display(), mode = %mode.as_str(), "path resolved");
        Ok(ResolvedPath {
            virtual_path,
            real_path,
        })
    }
}

/// Lexically normalize a virtual path into safe components.
///
/// Leading separators anchor at the virtual root; `.` is dropped; `..` pops.
/// Returns `None` when `..` would pop past the root.
fn normalize_components(virtual_path: &str) -> Option<Vec<String>> {
    let mut stack: Vec<String> = Vec::new();
    for component in Path::new(virtual_path).components() {
        match component {
            Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
            Component::ParentDir => {
                stack.pop()?;
            }
            Component::Normal(part) => stack.push(part.to_string_lossy().into_owned()),
        }
    }
    Some(stack)
}

fn canonical_virtual(components: &[String]) -> String {
    if components.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", components.join("/"))
    }
}
