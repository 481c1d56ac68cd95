//! Audit trail — request lifecycle events.
//!
//! Events go two places: the approval channel (so the humans who
//! approve also see usage) and a local SQLite trail at
//! `~/.2kc/audit.db`. Neither path may ever fail the main flow:
//! channel failures become stderr warnings, and the local trail
//! degrades silently when the database is unavailable.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use tracing::info;

use crate::approval::ApprovalChannel;
use crate::errors::{BrokerError, Result};

/// Render one audit line: `[2kc] [<ISO timestamp>] [<requestId>] <event>: <details>`.
pub fn format_event(request_id: &str, event: &str, details: &str) -> String {
    let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    format!("[2kc] [{timestamp}] [{request_id}] {event}: {details}")
}

/// A single audit trail entry.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
    pub event: String,
    pub details: Option<String>,
}

/// SQLite-backed local audit trail.
pub struct AuditTrail {
    conn: Connection,
}

impl AuditTrail {
    /// Open (or create) the audit database at `<dir>/audit.db`.
    ///
    /// Returns `None` if the database can't be opened — callers treat
    /// this as "audit trail unavailable" and continue normally.
    pub fn open(dir: &Path) -> Option<Self> {
        let db_path = dir.join("audit.db");
        std::fs::create_dir_all(dir).ok()?;
        let conn = Connection::open(&db_path).ok()?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&db_path, perms);
        }

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS audit_log (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp  TEXT NOT NULL,
                request_id TEXT NOT NULL,
                event      TEXT NOT NULL,
                details    TEXT
            );",
        )
        .ok()?;

        Some(Self { conn })
    }

    /// Record an event. Fire-and-forget — errors are silently ignored.
    pub fn log(&self, request_id: &str, event: &str, details: Option<&str>) {
        let now = Utc::now().to_rfc3339();
        let _ = self.conn.execute(
            "INSERT INTO audit_log (timestamp, request_id, event, details)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![now, request_id, event, details],
        );
    }

    /// Query recent entries, most recent first.
    pub fn query(&self, limit: usize, since: Option<DateTime<Utc>>) -> Result<Vec<AuditEntry>> {
        let limit_i64 = i64::try_from(limit).unwrap_or(i64::MAX);
        let (sql, params): (&str, Vec<Box<dyn rusqlite::types::ToSql>>) = match since {
            Some(ref ts) => (
                "SELECT id, timestamp, request_id, event, details
                 FROM audit_log
                 WHERE timestamp >= ?1
                 ORDER BY id DESC
                 LIMIT ?2",
                vec![
                    Box::new(ts.to_rfc3339()) as Box<dyn rusqlite::types::ToSql>,
                    Box::new(limit_i64),
                ],
            ),
            None => (
                "SELECT id, timestamp, request_id, event, details
                 FROM audit_log
                 ORDER BY id DESC
                 LIMIT ?1",
                vec![Box::new(limit_i64) as Box<dyn rusqlite::types::ToSql>],
            ),
        };

        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| BrokerError::AuditError(format!("query prepare: {e}")))?;

        let params_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| &**p).collect();

        let rows = stmt
            .query_map(params_refs.as_slice(), |row| {
                let ts_str: String = row.get(1)?;
                let timestamp = DateTime::parse_from_rfc3339(&ts_str)
                    .map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc));

                Ok(AuditEntry {
                    id: row.get(0)?,
                    timestamp,
                    request_id: row.get(2)?,
                    event: row.get(3)?,
                    details: row.get(4)?,
                })
            })
            .map_err(|e| BrokerError::AuditError(format!("query exec: {e}")))?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row.map_err(|e| BrokerError::AuditError(format!("row parse: {e}")))?);
        }

        Ok(entries)
    }

    /// Path of the audit database under `dir`.
    pub fn db_path(dir: &Path) -> PathBuf {
        dir.join("audit.db")
    }
}

/// Fans one event out to the channel and the local trail.
///
/// Delivery failures surface as `[audit] Warning:` lines on stderr and
/// never abort the caller.
pub struct AuditEmitter {
    channel: Option<Arc<dyn ApprovalChannel>>,
    trail: Option<AuditTrail>,
}

impl AuditEmitter {
    pub fn new(channel: Option<Arc<dyn ApprovalChannel>>, trail_dir: Option<&Path>) -> Self {
        Self {
            channel,
            trail: trail_dir.and_then(AuditTrail::open),
        }
    }

    /// Emit one event, best-effort on every sink.
    pub fn emit(&self, request_id: &str, event: &str, details: &str) {
        let line = format_event(request_id, event, details);
        info!(request_id, event, "audit event");

        if let Some(channel) = &self.channel {
            if let Err(e) = channel.send_notification(&line) {
                eprintln!("[audit] Warning: {e}");
            }
        }

        if let Some(trail) = &self.trail {
            trail.log(request_id, event, Some(details));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn format_has_prefix_timestamp_and_request_id() {
        let line = format_event("req-1", "Request created", "2 secrets");
        assert!(line.starts_with("[2kc] ["));
        assert!(line.contains("] [req-1] Request created: 2 secrets"));
        // The timestamp is Zulu ISO-8601.
        let ts = line.split(']').nth(1).unwrap().trim_start_matches(" [");
        assert!(ts.ends_with('Z'), "timestamp {ts} should be Zulu");
    }

    #[test]
    fn open_creates_database_with_table() {
        let dir = TempDir::new().unwrap();
        let trail = AuditTrail::open(dir.path());
        assert!(trail.is_some());
        assert!(AuditTrail::db_path(dir.path()).exists());
    }

    #[test]
    fn log_and_query_roundtrip_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let trail = AuditTrail::open(dir.path()).unwrap();

        trail.log("req-1", "Request created", Some("1 secret"));
        trail.log("req-1", "Approval approved", None);
        trail.log("req-1", "Grant used", Some("exit 0"));

        let entries = trail.query(10, None).unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].event, "Grant used");
        assert_eq!(entries[2].event, "Request created");
        assert_eq!(entries[2].details.as_deref(), Some("1 secret"));
    }

    #[test]
    fn query_respects_limit_and_since() {
        let dir = TempDir::new().unwrap();
        let trail = AuditTrail::open(dir.path()).unwrap();

        for i in 0..5 {
            trail.log("req-1", &format!("event-{i}"), None);
        }

        assert_eq!(trail.query(2, None).unwrap().len(), 2);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(trail.query(10, Some(future)).unwrap().is_empty());

        let past = Utc::now() - chrono::Duration::hours(1);
        assert_eq!(trail.query(10, Some(past)).unwrap().len(), 5);
    }

    #[test]
    fn emitter_survives_missing_sinks() {
        let emitter = AuditEmitter::new(None, None);
        emitter.emit("req-1", "Request created", "no sinks configured");
    }

    #[cfg(unix)]
    #[test]
    fn audit_db_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let _trail = AuditTrail::open(dir.path()).unwrap();

        let mode = std::fs::metadata(AuditTrail::db_path(dir.path()))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
