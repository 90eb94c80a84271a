//! Corral - Sandboxed Tool-Execution Engine
//!
//! This crate provides the execution sandbox for LLM-driven agents:
//! - Guard: virtual path resolution confined to allowed workspaces
//! - Command: executable allowlist and argument sanitization
//! - Exec: shell-free subprocess execution with output and time limits
//! - Audit: redacted, append-only NDJSON operation log
//! - Service: the `list_dir`/`read_file`/`write_file`/`exec` façade

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod command;
pub mod config;
pub mod error;
pub mod exec;
pub mod guard;
pub mod service;

pub use audit::{AuditLogger, AuditRecord, SandboxOperation};
pub use command::{AuthorizedCommand, CommandAuthorizer};
pub use config::SandboxConfig;
pub use error::{Error, Result, Violation, ViolationCode};
pub use exec::ExecOutcome;
pub use guard::{AccessMode, PathGuard, ResolvedPath};
pub use service::{
    DirEntryInfo, EntryType, ExecInput, ExecOutput, ListDirInput, ListDirOutput, ReadFileInput,
    ReadFileOutput, SandboxService, WorkspaceContext, WriteFileInput, WriteFileOutput,
};
