//! Append-only audit store for model round-trips and workflow outcomes.
//!
//! A pure side channel: the coordinator writes here and never reads back.
//! Two tables in a single SQLite database:
//! - `responses`: every prompt/response round-trip
//! - `workflows`: one row per refinement run (task, model, final artifacts,
//!   success flag)
//!
//! Audit failures are the caller's choice to ignore; nothing in the loop
//! depends on a successful write.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use log::debug;
use rusqlite::{Connection, params};

use crate::error::{CodeloopError, Result};

/// One refinement run's outcome, as persisted.
#[derive(Debug, Clone)]
pub struct WorkflowRecord {
    pub task: String,
    pub model: String,
    pub max_retries: u32,
    pub final_code: Option<String>,
    pub final_test_code: Option<String>,
    pub success: bool,
}

/// Append-only SQLite audit store.
pub struct AuditStore {
    db: Mutex<Connection>,
}

impl AuditStore {
    /// Open or create the audit store at the default location,
    /// `<data_local_dir>/codeloop/audit.db`.
    pub fn open_default() -> Result<Self> {
        let dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("codeloop");
        Self::open(&dir.join("audit.db"))
    }

    /// Open or create the audit store at an explicit path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Connection::open(path)
            .map_err(|e| CodeloopError::Storage(format!("Failed to open audit db: {}", e)))?;

        Self::init_schema(&db)?;

        Ok(Self { db: Mutex::new(db) })
    }

    /// In-memory store, for tests.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()
            .map_err(|e| CodeloopError::Storage(format!("Failed to open audit db: {}", e)))?;
        Self::init_schema(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn init_schema(db: &Connection) -> Result<()> {
        db.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS responses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                model TEXT NOT NULL,
                prompt TEXT NOT NULL,
                response TEXT NOT NULL,
                datetime_utc TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS workflows (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task TEXT NOT NULL,
                model TEXT NOT NULL,
                max_retries INTEGER NOT NULL,
                final_code TEXT,
                final_test_code TEXT,
                success INTEGER NOT NULL,
                timestamp TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| CodeloopError::Storage(format!("Failed to initialize audit schema: {}", e)))
    }

    /// Append one prompt/response round-trip.
    pub fn record_response(&self, model: &str, prompt: &str, response: &str) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO responses (model, prompt, response, datetime_utc) VALUES (?1, ?2, ?3, ?4)",
            params![model, prompt, response, Utc::now().to_rfc3339()],
        )
        .map_err(|e| CodeloopError::Storage(format!("Failed to record response: {}", e)))?;

        debug!("audited response from {}", model);
        Ok(())
    }

    /// Append one workflow outcome.
    pub fn record_workflow(&self, record: &WorkflowRecord) -> Result<()> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO workflows (task, model, max_retries, final_code, final_test_code, success, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.task,
                record.model,
                record.max_retries,
                record.final_code,
                record.final_test_code,
                record.success,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(|e| CodeloopError::Storage(format!("Failed to record workflow: {}", e)))?;
        Ok(())
    }

    /// Number of recorded responses.
    pub fn response_count(&self) -> Result<u64> {
        let db = self.lock()?;
        db.query_row("SELECT COUNT(*) FROM responses", [], |row| {
            row.get::<_, i64>(0).map(|n| n as u64)
        })
        .map_err(|e| CodeloopError::Storage(format!("Failed to count responses: {}", e)))
    }

    /// Number of recorded workflows.
    pub fn workflow_count(&self) -> Result<u64> {
        let db = self.lock()?;
        db.query_row("SELECT COUNT(*) FROM workflows", [], |row| {
            row.get::<_, i64>(0).map(|n| n as u64)
        })
        .map_err(|e| CodeloopError::Storage(format!("Failed to count workflows: {}", e)))
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|e| CodeloopError::Storage(format!("Audit store lock poisoned: {}", e)))
    }
}
