//! Audit logging for rule changes
//!
//! Every mutation made through the command line is recorded here, successful or not.
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Types of auditable events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AddRule,
    RemoveRule,
    EnableRule,
    DisableRule,
}

/// A single audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When the event occurred (UTC)
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub event_type: EventType,

    pub success: bool,

    /// Additional structured data about the event
    pub details: serde_json::Value,

    /// Error message if operation failed
    pub error: Option<String>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        success: bool,
        details: serde_json::Value,
        error: Option<String>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now(),
            event_type,
            success,
            details,
            error,
        }
    }
}

/// Audit log writer
pub struct AuditLog {
    log_path: PathBuf,
}

impl AuditLog {
    /// Opens the audit log in the platform data directory
    ///
    /// # Errors
    ///
    /// Returns `Err` if data directory cannot be determined
    pub fn new() -> std::io::Result<Self> {
        let dir = crate::utils::get_data_dir().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "Data directory not found")
        })?;
        Ok(Self::in_dir(&dir))
    }

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            log_path: dir.join("audit.log"),
        }
    }

    /// Appends an event as one JSON line
    pub fn log(&self, event: &AuditEvent) -> std::io::Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        if let Some(dir) = self.log_path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.write_all(line.as_bytes())?;
        file.sync_all()
    }

    /// Reads up to `count` events, newest first; unparsable lines are skipped
    pub fn read_recent(&self, count: usize) -> std::io::Result<Vec<AuditEvent>> {
        let content = std::fs::read_to_string(&self.log_path)?;
        Ok(content
            .lines()
            .rev()
            .filter_map(|line| serde_json::from_str(line).ok())
            .take(count)
            .collect())
    }

    pub fn path(&self) -> &Path {
        &self.log_path
    }
}

/// Records one rule mutation, logging rather than failing when the audit log is unwritable
pub fn log_rule_change(event_type: EventType, rule_name: &str, result: &crate::Result<()>) {
    let Ok(audit) = AuditLog::new() else {
        return;
    };
    let event = AuditEvent::new(
        event_type,
        result.is_ok(),
        serde_json::json!({ "rule": rule_name }),
        result.as_ref().err().map(ToString::to_string),
    );
    if let Err(e) = audit.log(&event) {
        tracing::warn!("Failed to write audit log: {}", e);
    }
}
