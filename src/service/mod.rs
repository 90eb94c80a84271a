//! SandboxService - the four-operation façade
//!
//! Composes the guard, authorizer, runner and audit logger. Every operation is
//! independently awaitable; the only shared mutable state is the optional
//! per-task workspace context.

use crate::audit::{AuditLogger, SandboxOperation};
use crate::command::CommandAuthorizer;
use crate::config::SandboxConfig;
use crate::error::{Result, Violation, ViolationCode};
use crate::exec::runner;
use crate::guard::{AccessMode, PathGuard};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::debug;


/// Input for `list_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDirInput {
    /// Virtual directory path
    pub path: String,
}

/// Kind of a directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symlink, socket, device, or unknown
    Other,
}

/// One entry returned by `list_dir`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntryInfo {
    /// Entry file name
    pub name: String,
    /// Virtual path of the entry
    pub virtual_path: String,
    /// Entry kind
    #[serde(rename = "type")]
    pub entry_type: EntryType,
}

/// Output of `list_dir`; entries sorted by name ascending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListDirOutput {
    /// Canonical virtual path of the listed directory
    pub path: String,
    /// Sorted entries
    pub entries: Vec<DirEntryInfo>,
}

/// Input for `read_file`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileInput {
    /// Virtual file path
    pub path: String,
    /// Only `"utf8"` is accepted
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Output of `read_file`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadFileOutput {
    /// Canonical virtual path of the file
    pub path: String,
    /// File content, UTF-8
    pub content: String,
}

/// Input for `write_file`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFileInput {
    /// Virtual file path
    pub path: String,
    /// Content to write, UTF-8
    pub content: String,
    /// Create parent directories recursively (default true)
    #[serde(default = "default_create_dirs")]
    pub create_dirs: bool,
    /// Replace an existing file (default false)
    #[serde(default)]
    pub overwrite: bool,
}

fn default_create_dirs() -> bool {
    true
}

impl WriteFileInput {
    /// Create a write request with the default flags
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            create_dirs: true,
            overwrite: false,
        }
    }

    /// Permit replacing an existing file
    #[must_use]
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Control parent directory creation
    #[must_use]
    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }
}

/// Output of `write_file`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFileOutput {
    /// Canonical virtual path of the file
    pub path: String,
    /// UTF-8 byte length written
    pub bytes_written: usize,
}

/// Input for `exec`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecInput {
    /// Executable name; must be on the allowlist
    pub command: String,
    /// Arguments, passed verbatim after sanitization
    #[serde(default)]
    pub args: Vec<String>,
    /// Virtual working directory (default: virtual root)
    #[serde(default)]
    pub cwd: Option<String>,
    /// Requested timeout in milliseconds, clamped into the permitted window
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl ExecInput {
    /// Create an exec request with no arguments
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            cwd: None,
            timeout_ms: None,
        }
    }

    /// Set the argument list
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the virtual working directory
    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Set the requested timeout
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }
}

/// Output of `exec`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Executable that was invoked (lowercased)
    pub command: String,
    /// Sanitized arguments that were passed
    pub args: Vec<String>,
    /// Child exit code
    pub exit_code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Always false: a timed-out run is rejected, not resolved
    pub timed_out: bool,
    /// Always false: a truncated run is rejected, not resolved
    pub output_truncated: bool,
}

/// Binds a service instance to one task's workspace.
///
/// Instance-level state, not a per-call parameter: interleaved calls from
/// different tasks sharing one instance can observe each other's context.
/// Instantiate one service per task when that matters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceContext {
    /// Task this context belongs to
    pub task_id: String,
    /// Real workspace directory the task is confined to
    pub workspace_path: PathBuf,
}

/// The sandboxed tool-execution engine façade.
pub struct SandboxService {
    config: SandboxConfig,
    guard: PathGuard,
    authorizer: CommandAuthorizer,
    audit: AuditLogger,
    context: RwLock<Option<WorkspaceContext>>,
}

impl SandboxService {
    /// Build the engine from its configuration.
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        let guard = PathGuard::new(&config);
        let authorizer = CommandAuthorizer::new(&config);
        let audit = AuditLogger::new(&config);
        Self {
            config,
            guard,
            authorizer,
            audit,
            context: RwLock::new(None),
        }
    }

    /// The engine configuration
    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Bind this instance to a task workspace.
    pub async fn set_workspace_context(&self, context: WorkspaceContext) {
        debug!(task_id = %context.task_id, workspace = %context.workspace_path.display(), "workspace context set");
        *self.context.write().await = Some(context);
    }

    /// Clear the task binding.
    pub async fn clear_workspace_context(&self) {
        *self.context.write().await = None;
    }

    /// The current task binding, if any.
    pub async fn workspace_context(&self) -> Option<WorkspaceContext> {
        self.context.read().await.clone()
    }

    async fn effective_root(&self) -> Option<PathBuf> {
        self.context
            .read()
            .await
            .as_ref()
            .map(|ctx| ctx.workspace_path.clone())
    }

    /// List a directory; entries come back sorted by name ascending.
    pub async fn list_dir(&self, input: ListDirInput) -> Result<ListDirOutput> {
        let details = json!({ "path": &input.path });
        self.audit
            .with_audit(SandboxOperation::ListDir, details, async {
                let root = self.effective_root().await;
                let resolved = self
                    .guard
                    .resolve_in(root.as_deref(), &input.path, AccessMode::List)?;

                let mut dir = tokio::fs::read_dir(&resolved.real_path).await?;
                let mut entries = Vec::new();
                while let Some(entry) = dir.next_entry().await? {
                    let name = entry.file_name().to_string_lossy().into_owned();
                    let entry_type = match entry.file_type().await {
                        Ok(t) if t.is_dir() => EntryType::Directory,
                        Ok(t) if t.is_file() => EntryType::File,
                        _ => EntryType::Other,
                    };
                    let virtual_path = if resolved.virtual_path == "/" {
                        format!("/{name}")
                    } else {
                        format!("{}/{name}", resolved.virtual_path)
                    };
                    entries.push(DirEntryInfo {
                        name,
                        virtual_path,
                        entry_type,
                    });
                }
                entries.sort_by(|a, b| a.name.cmp(&b.name));

                Ok(ListDirOutput {
                    path: resolved.virtual_path,
                    entries,
                })
            })
            .await
    }

    /// Read a UTF-8 file.
    pub async fn read_file(&self, input: ReadFileInput) -> Result<ReadFileOutput> {
        let details = json!({ "path": &input.path, "encoding": &input.encoding });
        self.audit
            .with_audit(SandboxOperation::ReadFile, details, async {
                if let Some(encoding) = input.encoding.as_deref() {
                    if encoding != "utf8" {
                        return Err(Violation::new(
                            ViolationCode::UnsafeArgument,
                            format!("unsupported encoding '{encoding}', only utf8 is accepted"),
                        )
                        .with_details(json!({ "encoding": encoding }))
                        .into());
                    }
                }

                let root = self.effective_root().await;
                let resolved = self
                    .guard
                    .resolve_in(root.as_deref(), &input.path, AccessMode::Read)?;

                let content = tokio::fs::read_to_string(&resolved.real_path).await?;
                Ok(ReadFileOutput {
                    path: resolved.virtual_path,
                    content,
                })
            })
            .await
    }

    /// Write a UTF-8 file; refuses to replace an existing file unless
    /// `overwrite` is set.
    pub async fn write_file(&self, input: WriteFileInput) -> Result<WriteFileOutput> {
        let details = json!({
            "path": &input.path,
            "bytes": input.content.len(),
            "create_dirs": input.create_dirs,
            "overwrite": input.overwrite,
        });
        self.audit
            .with_audit(SandboxOperation::WriteFile, details, async {
                let root = self.effective_root().await;
                let resolved = self
                    .guard
                    .resolve_in(root.as_deref(), &input.path, AccessMode::Write)?;

                if !input.overwrite {
                    match tokio::fs::metadata(&resolved.real_path).await {
                        Ok(_) => {
                            return Err(Violation::new(
                                ViolationCode::FileExists,
                                format!("file already exists: {}", resolved.virtual_path),
                            )
                            .with_details(json!({ "path": resolved.virtual_path }))
                            .into());
                        }
                        Err(e) if e.kind() == ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }

                if input.create_dirs {
                    if let Some(parent) = resolved.real_path.parent() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }

                tokio::fs::write(&resolved.real_path, input.content.as_bytes()).await?;
                Ok(WriteFileOutput {
                    path: resolved.virtual_path,
                    bytes_written: input.content.len(),
                })
            })
            .await
    }

    /// Execute an allowlisted command under the output and time limits.
    pub async fn exec(&self, input: ExecInput) -> Result<ExecOutput> {
        let details = json!({
            "command": &input.command,
            "args": &input.args,
            "cwd": &input.cwd,
            "timeout_ms": input.timeout_ms,
        });
        self.audit
            .with_audit(SandboxOperation::Exec, details, async {
                let root = self.effective_root().await;
                let authorized = self.authorizer.authorize(
                    &self.guard,
                    root.as_deref(),
                    &input.command,
                    &input.args,
                )?;

                let cwd_virtual = input.cwd.as_deref().unwrap_or("/");
                let cwd = self
                    .guard
                    .resolve_in(root.as_deref(), cwd_virtual, AccessMode::Cwd)?;

                let timeout = self.config.clamp_exec_timeout(input.timeout_ms);
                let start = Instant::now();
                let outcome = runner::run(
                    &authorized.command,
                    &authorized.args,
                    &cwd.real_path,
                    timeout,
                    self.config.max_output_bytes,
                )
                .await?;

                Ok(ExecOutput {
                    command: authorized.command,
                    args: authorized.args,
                    exit_code: outcome.exit_code,
                    stdout: outcome.stdout,
                    stderr: outcome.stderr,
                    duration_ms: start.elapsed().as_millis() as u64,
                    timed_out: outcome.timed_out,
                    output_truncated: outcome.output_truncated,
                })
            })
            .await
    }
}
