//! Error types for corral

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of policy denial codes surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViolationCode {
    /// Input path was empty or could not be normalized
    InvalidPath,
    /// Normalized path escapes the virtual root
    PathOutsideVirtualRoot,
    /// Resolved real path lies outside every allowed workspace
    PathOutsideWorkspace,
    /// Executable is not on the allowlist or is malformed
    CommandNotAllowed,
    /// Argument contains shell metacharacters or an unsupported value
    UnsafeArgument,
    /// Write target already exists and overwrite was not requested
    FileExists,
    /// Command exceeded its wall-clock timeout
    Timeout,
    /// Command output exceeded the configured byte budget
    OutputLimit,
}

impl ViolationCode {
    /// Returns the wire representation of the code
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidPath => "INVALID_PATH",
            Self::PathOutsideVirtualRoot => "PATH_OUTSIDE_VIRTUAL_ROOT",
            Self::PathOutsideWorkspace => "PATH_OUTSIDE_WORKSPACE",
            Self::CommandNotAllowed => "COMMAND_NOT_ALLOWED",
            Self::UnsafeArgument => "UNSAFE_ARGUMENT",
            Self::FileExists => "FILE_EXISTS",
            Self::Timeout => "TIMEOUT",
            Self::OutputLimit => "OUTPUT_LIMIT",
        }
    }
}

impl std::fmt::Display for ViolationCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A deterministic policy denial: the operation was understood and refused.
///
/// Violations are never retried; they carry a closed [`ViolationCode`], a
/// human-readable message, and structured details for the caller to act on.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{message}")]
pub struct Violation {
    /// Denial code
    pub code: ViolationCode,
    /// Human-readable explanation
    pub message: String,
    /// Structured context (virtual path, offending argument, ...)
    pub details: serde_json::Value,
}

impl Violation {
    /// Create a violation with empty details
    #[must_use]
    pub fn new(code: ViolationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    /// Attach structured details
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Engine error type: a policy denial or an unexpected fault.
///
/// Callers pattern-match on the variants; only [`Error::Violation`] is a
/// policy denial, everything else is a fault that propagates unchanged.
#[derive(Debug, Error)]
pub enum Error {
    /// Recognized security/policy denial
    #[error("sandbox violation: {0}")]
    Violation(#[from] Violation),

    /// Filesystem fault outside the handled existence probe
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Process could not be spawned
    #[error("spawn failed: {0}")]
    Spawn(String),
}

impl Error {
    /// The violation carried by this error, if it is a policy denial
    #[must_use]
    pub fn violation(&self) -> Option<&Violation> {
        match self {
            Self::Violation(v) => Some(v),
            _ => None,
        }
    }

    /// Whether this error is a policy denial rather than a fault
    #[must_use]
    pub fn is_violation(&self) -> bool {
        matches!(self, Self::Violation(_))
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_code_wire_format() {
        assert_eq!(ViolationCode::PathOutsideVirtualRoot.as_str(), "PATH_OUTSIDE_VIRTUAL_ROOT");
        let json = serde_json::to_string(&ViolationCode::OutputLimit).unwrap();
        assert_eq!(json, "\"OUTPUT_LIMIT\"");
    }

    #[test]
    fn violation_dispatch() {
        let denied: Error = Violation::new(ViolationCode::FileExists, "exists").into();
        assert!(denied.is_violation());
        assert_eq!(denied.violation().unwrap().code, ViolationCode::FileExists);

        let fault: Error = std::io::Error::other("disk on fire").into();
        assert!(!fault.is_violation());
        assert!(fault.violation().is_none());
    }
}
