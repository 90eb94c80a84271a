use super::*;
use crate::error::{Error, Violation};
use serde_json::json;

fn logger_at(log_path: PathBuf) -> AuditLogger {
    let mut config = SandboxConfig::for_workspace("/srv/tasks/alpha");
    config.audit_log_path = log_path;
    AuditLogger::new(&config)
}

fn disabled_logger() -> AuditLogger {
    let mut config = SandboxConfig::for_workspace("/srv/tasks/alpha");
    config.audit_log_enabled = false;
    AuditLogger::new(&config)
}

async fn read_records(path: &std::path::Path) -> Vec<AuditRecord> {
    let raw = tokio::fs::read_to_string(path).await.unwrap();
    raw.lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[test]
fn workspace_paths_are_replaced() {
    let logger = disabled_logger();
    let sanitized = logger.sanitize(&json!({
        "path": "/srv/tasks/alpha/notes.txt",
        "nested": { "cwd": "/srv/tasks/alpha" },
        "args": ["/srv/tasks/alpha/a", "plain"],
        "count": 3,
    }));

    assert_eq!(sanitized["path"], "$WORKSPACE/notes.txt");
    assert_eq!(sanitized["nested"]["cwd"], "$WORKSPACE");
    assert_eq!(sanitized["args"][0], "$WORKSPACE/a");
    assert_eq!(sanitized["args"][1], "plain");
    assert_eq!(sanitized["count"], 3);
}

#[test]
fn secret_keys_are_redacted() {
    let logger = disabled_logger();
    let sanitized = logger.sanitize(&json!({
        "openai": "sk-proj_1234567890",
        "tavily": "tvly-abcdefghij",
        "jina": "jina_0000000000",
        "short": "sk-abc",
    }));

    assert_eq!(sanitized["openai"], "key-redacted");
    assert_eq!(sanitized["tavily"], "key-redacted");
    assert_eq!(sanitized["jina"], "key-redacted");
    // Fewer than 8 key characters after the prefix is not a match
    assert_eq!(sanitized["short"], "sk-abc");
}

#[test]
fn workspace_substitution_runs_before_secret_scan() {
    let logger = disabled_logger();
    let sanitized = logger.sanitize(&json!("/srv/tasks/alpha/sk-secret_value_here.txt"));
    assert_eq!(sanitized, json!("$WORKSPACE/key-redacted.txt"));
}

#[tokio::test]
async fn success_record_shape() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("audit.jsonl");
    let logger = logger_at(log.clone());

    let value = logger
        .with_audit(SandboxOperation::ReadFile, json!({"path": "/notes.txt"}), async {
            Ok::<_, Error>(42)
        })
        .await
        .unwrap();
    assert_eq!(value, 42);

    let records = read_records(&log).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].operation, SandboxOperation::ReadFile);
    assert!(records[0].success);
    assert!(records[0].allowed);
    assert!(records[0].error_code.is_none());
    assert!(records[0].error_message.is_none());
}

#[tokio::test]
async fn violation_record_is_marked_disallowed() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("audit.jsonl");
    let logger = logger_at(log.clone());

    let result: Result<()> = logger
        .with_audit(SandboxOperation::Exec, json!({"command": "rm"}), async {
            Err(Violation::new(ViolationCode::CommandNotAllowed, "denied").into())
        })
        .await;
    assert!(result.is_err());

    let records = read_records(&log).await;
    assert!(!records[0].success);
    assert!(!records[0].allowed);
    assert_eq!(records[0].error_code, Some(ViolationCode::CommandNotAllowed));
}

#[tokio::test]
async fn fault_record_stays_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("audit.jsonl");
    let logger = logger_at(log.clone());

    let result: Result<()> = logger
        .with_audit(SandboxOperation::WriteFile, json!({}), async {
            Err(Error::Io(std::io::Error::other("disk full")))
        })
        .await;
    assert!(result.is_err());

    let records = read_records(&log).await;
    assert!(!records[0].success);
    // A fault is not a policy denial
    assert!(records[0].allowed);
    assert!(records[0].error_code.is_none());
    assert!(records[0].error_message.as_deref().unwrap().contains("disk full"));
}

#[tokio::test]
async fn persisted_record_contains_no_raw_workspace_path() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("audit.jsonl");
    let mut config = SandboxConfig::for_workspace("/srv/tasks/alpha");
    config.audit_log_path = log.clone();
    let logger = AuditLogger::new(&config);

    logger
        .with_audit(
            SandboxOperation::Exec,
            json!({"args": ["/srv/tasks/alpha/data.csv", "sk-live_abcdef123456"]}),
            async { Ok::<_, Error>(()) },
        )
        .await
        .unwrap();

    let raw = tokio::fs::read_to_string(&log).await.unwrap();
    assert!(!raw.contains("/srv/tasks/alpha"));
    assert!(!raw.contains("sk-live_abcdef123456"));
    assert!(raw.contains("$WORKSPACE/data.csv"));
    assert!(raw.contains("key-redacted"));
}

#[tokio::test]
async fn disabled_logger_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("audit.jsonl");
    let mut config = SandboxConfig::for_workspace("/srv/tasks/alpha");
    config.audit_log_enabled = false;
    config.audit_log_path = log.clone();
    let logger = AuditLogger::new(&config);

    logger
        .with_audit(SandboxOperation::ListDir, json!({}), async { Ok::<_, Error>(()) })
        .await
        .unwrap();

    assert!(!log.exists());
}

#[tokio::test]
async fn log_parent_directories_are_created_lazily() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("logs/deep/audit.jsonl");
    let logger = logger_at(log.clone());

    logger
        .with_audit(SandboxOperation::ListDir, json!({}), async { Ok::<_, Error>(()) })
        .await
        .unwrap();

    assert_eq!(read_records(&log).await.len(), 1);
}
