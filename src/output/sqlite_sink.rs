//! SQLite sink
//!
//! Each batch becomes one row in `runs` plus its announcements and issues,
//! written in a single transaction.

use super::traits::{DeliveryReceipt, RecordSink, SinkResult};
use crate::batch::CrawlBatch;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};

/// SQL schema for the announcement database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    site TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    pages_visited INTEGER NOT NULL,
    status TEXT NOT NULL,
    failure_reason TEXT,
    config_hash TEXT
);

CREATE TABLE IF NOT EXISTS announcements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    position INTEGER NOT NULL,
    title TEXT NOT NULL,
    date TEXT NOT NULL,
    source TEXT NOT NULL,
    content TEXT NOT NULL,
    tags TEXT NOT NULL,
    url TEXT NOT NULL,
    UNIQUE(run_id, position)
);

CREATE INDEX IF NOT EXISTS idx_announcements_url ON announcements(url);

CREATE TABLE IF NOT EXISTS run_issues (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    page_number INTEGER NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL
);
"#;

/// Appends batches to a SQLite database
#[derive(Debug, Clone)]
pub struct SqliteSink {
    path: PathBuf,
}

impl SqliteSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSink for SqliteSink {
    fn describe(&self) -> String {
        format!("sqlite {}", self.path.display())
    }

    async fn persist(&self, batch: &CrawlBatch) -> SinkResult<DeliveryReceipt> {
        let path = self.path.clone();
        let owned = batch.clone();

        let run_id = tokio::task::spawn_blocking(move || insert_batch(&path, &owned))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(DeliveryReceipt::new(
            "sqlite",
            format!("{}#run={}", self.path.display(), run_id),
            batch.len(),
        ))
    }
}

/// Opens the database and creates the schema if needed
pub fn open_database(path: &Path) -> SinkResult<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(conn)
}

fn insert_batch(path: &Path, batch: &CrawlBatch) -> SinkResult<i64> {
    let mut conn = open_database(path)?;
    let tx = conn.transaction()?;
    let metadata = batch.metadata();

    tx.execute(
        "INSERT INTO runs (site, started_at, finished_at, pages_visited, status, failure_reason, config_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            metadata.site,
            metadata.started_at.to_rfc3339(),
            metadata.finished_at.to_rfc3339(),
            metadata.pages_visited,
            if metadata.status.is_done() { "done" } else { "failed" },
            metadata.status.failure_reason(),
            metadata.config_hash,
        ],
    )?;
    let run_id = tx.last_insert_rowid();

    {
        let mut insert = tx.prepare(
            "INSERT INTO announcements (run_id, position, title, date, source, content, tags, url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for (position, record) in batch.records().iter().enumerate() {
            insert.execute(params![
                run_id,
                position as i64,
                record.title(),
                record.date(),
                record.source(),
                record.content(),
                serde_json::to_string(record.tags())?,
                record.url(),
            ])?;
        }

        let mut issue = tx.prepare(
            "INSERT INTO run_issues (run_id, page_number, severity, message) VALUES (?1, ?2, ?3, ?4)",
        )?;
        for entry in &metadata.errors {
            issue.execute(params![
                run_id,
                entry.page_number,
                entry.severity.to_string(),
                entry.message,
            ])?;
        }
    }

    tx.commit()?;
    Ok(run_id)
}
