//! AuditLogger - redacted, append-only operation log
//!
//! Every public operation is wrapped by [`AuditLogger::with_audit`], which
//! times the call and appends one immutable NDJSON record. Details are
//! sanitized before persistence: workspace paths become `$WORKSPACE`, secret
//! key material becomes `key-redacted`.

use crate::config::SandboxConfig;
use crate::error::{Result, ViolationCode};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[cfg(test)]
mod tests;

/// Replacement token for allowed-workspace absolute paths
pub const WORKSPACE_TOKEN: &str = "$WORKSPACE";

/// Replacement token for secret key material
pub const KEY_REDACTED: &str = "key-redacted";

/// Provider key shapes: known prefix followed by at least 8 key characters
static SECRET_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:sk|tvly|jina)[A-Za-z0-9_-]{8,}").expect("secret pattern is valid")
});

/// The four operations the engine exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SandboxOperation {
    /// Directory listing
    ListDir,
    /// File read
    ReadFile,
    /// File write
    WriteFile,
    /// Command execution
    Exec,
}

impl SandboxOperation {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListDir => "list_dir",
            Self::ReadFile => "read_file",
            Self::WriteFile => "write_file",
            Self::Exec => "exec",
        }
    }
}

impl std::fmt::Display for SandboxOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One immutable line in the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// When the operation finished
    pub timestamp: DateTime<Utc>,
    /// Which operation ran
    pub operation: SandboxOperation,
    /// Whether the operation returned a result
    pub success: bool,
    /// False only for policy denials; unexpected faults stay true
    pub allowed: bool,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Sanitized operation details
    pub details: Value,
    /// Denial code, when the failure was a violation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ViolationCode>,
    /// Error message, sanitized like the details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Wraps operations with timing/outcome recording and redacted persistence.
pub struct AuditLogger {
    enabled: bool,
    log_path: PathBuf,
    workspace_paths: Vec<String>,
    // Serializes appends so concurrent operations never interleave lines
    write_lock: tokio::sync::Mutex<()>,
}

impl AuditLogger {
    /// Build a logger from the engine configuration.
    #[must_use]
    pub fn new(config: &SandboxConfig) -> Self {
        let mut workspace_paths: Vec<String> = config
            .allowed_workspaces
            .iter()
            .chain(std::iter::once(&config.virtual_root))
            .map(|p| p.display().to_string())
            .filter(|p| !p.is_empty() && p != "." && p != "/")
            .collect();
        workspace_paths.sort();
        workspace_paths.dedup();
        // Longest first so nested workspace roots redact fully
        workspace_paths.sort_by_key(|p| std::cmp::Reverse(p.len()));

        Self {
            enabled: config.audit_log_enabled,
            log_path: config.audit_log_path.clone(),
            workspace_paths,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run `fut`, then append one record describing its outcome.
    ///
    /// `allowed` is false only when the error is a recognized violation; any
    /// other failure is an unexpected fault, not a policy denial. The outcome
    /// is returned unchanged either way.
    pub async fn with_audit<T, F>(
        &self,
        operation: SandboxOperation,
        details: Value,
        fut: F,
    ) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let outcome = fut.await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let record = match &outcome {
            Ok(_) => AuditRecord {
                timestamp: Utc::now(),
                operation,
                success: true,
                allowed: true,
                duration_ms,
                details: self.sanitize(&details),
                error_code: None,
                error_message: None,
            },
            Err(err) => {
                let violation = err.violation();
                AuditRecord {
                    timestamp: Utc::now(),
                    operation,
                    success: false,
                    allowed: violation.is_none(),
                    duration_ms,
                    details: self.sanitize(&details),
                    error_code: violation.map(|v| v.code),
                    error_message: Some(self.sanitize_str(&err.to_string())),
                }
            }
        };

        if let Err(e) = self.append(&record).await {
            warn!(error = %e, path = %self.log_path.display(), "failed to append audit record");
        }

        outcome
    }

    /// Recursively redact a detail tree.
    ///
    /// Strings get workspace paths replaced with [`WORKSPACE_TOKEN`], then
    /// secret key material replaced with [`KEY_REDACTED`]; arrays and objects
    /// are visited element-wise, everything else passes through.
    #[must_use]
    pub fn sanitize(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.sanitize_str(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.sanitize(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.sanitize(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    fn sanitize_str(&self, s: &str) -> String {
        let mut out = s.to_string();
        for workspace in &self.workspace_paths {
            out = out.replace(workspace, WORKSPACE_TOKEN);
        }
        SECRET_PATTERN.replace_all(&out, KEY_REDACTED).into_owned()
    }

    async fn append(&self, record: &AuditRecord) -> std::io::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let mut line = serde_json::to_string(record).map_err(std::io::Error::other)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.log_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
