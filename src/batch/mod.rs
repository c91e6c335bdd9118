//! Records and the batch that carries them to a sink
//!
//! - `PartialRecord`: the list-page fields of one announcement
//! - `Record`: a complete, immutable announcement
//! - `BatchBuilder`: the append-only batch owned by a running session
//! - `CrawlBatch`: the frozen batch handed to a `RecordSink` by value
//! - `RunSummary`: counts and issues kept after the batch has been delivered

use crate::url::dedup_key;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// The list-page view of an announcement, before detail content and tags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialRecord {
    pub title: String,
    pub date: String,
    pub source: String,
    /// Absolute detail URL; empty when the item had no link
    pub url: String,
}

/// One normalized announcement
///
/// Fields are private so a record cannot change after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    title: String,
    date: String,
    source: String,
    content: String,
    tags: Vec<String>,
    url: String,
}

impl Record {
    pub fn new(partial: PartialRecord, content: String, tags: Vec<String>) -> Self {
        Self {
            title: partial.title,
            date: partial.date,
            source: partial.source,
            content,
            tags,
            url: partial.url,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// How serious a recorded issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    /// A field or record was degraded; the page was still collected
    Warning,
    /// A page could not be collected
    Error,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// A problem recorded against a list page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlIssue {
    pub page_number: u32,
    pub severity: IssueSeverity,
    pub message: String,
}

/// Final status of a crawl run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum BatchStatus {
    Done,
    Failed { reason: String },
}

impl BatchStatus {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Self::Done => None,
            Self::Failed { reason } => Some(reason),
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Failed { reason } => write!(f, "failed ({})", reason),
        }
    }
}

/// Run metadata carried alongside the records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMetadata {
    pub site: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_visited: u32,
    #[serde(flatten)]
    pub status: BatchStatus,
    pub errors: Vec<CrawlIssue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_hash: Option<String>,
}

/// The frozen, ordered result of one crawl run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlBatch {
    records: Vec<Record>,
    metadata: BatchMetadata,
}

impl CrawlBatch {
    /// Reassembles a batch read back from a sink
    pub fn from_parts(records: Vec<Record>, metadata: BatchMetadata) -> Self {
        Self { records, metadata }
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn metadata(&self) -> &BatchMetadata {
        &self.metadata
    }

    pub fn status(&self) -> &BatchStatus {
        &self.metadata.status
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The in-progress batch of a running session
///
/// Records are append-only and deduplicated by normalized URL; the first
/// occurrence of a URL wins.
#[derive(Debug)]
pub struct BatchBuilder {
    site: String,
    started_at: DateTime<Utc>,
    config_hash: Option<String>,
    records: Vec<Record>,
    seen: HashSet<String>,
    pages_visited: u32,
    errors: Vec<CrawlIssue>,
}

impl BatchBuilder {
    pub fn new(site: impl Into<String>) -> Self {
        Self {
            site: site.into(),
            started_at: Utc::now(),
            config_hash: None,
            records: Vec::new(),
            seen: HashSet::new(),
            pages_visited: 0,
            errors: Vec::new(),
        }
    }

    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Reserves a URL for this batch
    ///
    /// Returns false when a record with the same normalized URL was already
    /// claimed. Records without a URL are never considered duplicates.
    pub fn claim(&mut self, url: &str) -> bool {
        if url.trim().is_empty() {
            return true;
        }

        let key = dedup_key(url).unwrap_or_else(|_| url.trim().to_string());
        self.seen.insert(key)
    }

    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    pub fn page_visited(&mut self) {
        self.pages_visited += 1;
    }

    pub fn record_warning(&mut self, page_number: u32, message: impl Into<String>) {
        self.record_issue(page_number, IssueSeverity::Warning, message.into());
    }

    pub fn record_error(&mut self, page_number: u32, message: impl Into<String>) {
        self.record_issue(page_number, IssueSeverity::Error, message.into());
    }

    fn record_issue(&mut self, page_number: u32, severity: IssueSeverity, message: String) {
        self.errors.push(CrawlIssue {
            page_number,
            severity,
            message,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn pages_visited(&self) -> u32 {
        self.pages_visited
    }

    pub fn issues(&self) -> &[CrawlIssue] {
        &self.errors
    }

    /// Freezes the batch with its final status
    pub fn freeze(self, status: BatchStatus) -> CrawlBatch {
        CrawlBatch {
            records: self.records,
            metadata: BatchMetadata {
                site: self.site,
                started_at: self.started_at,
                finished_at: Utc::now(),
                pages_visited: self.pages_visited,
                status,
                errors: self.errors,
                config_hash: self.config_hash,
            },
        }
    }
}

/// What remains known about a run after its batch has left the process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub site: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_visited: u32,
    pub records: usize,
    pub records_without_content: usize,
    pub status: BatchStatus,
    pub issues: Vec<CrawlIssue>,
    pub config_hash: Option<String>,
}

impl RunSummary {
    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Warning)
            .count()
    }

    pub fn error_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Error)
            .count()
    }
}

impl From<&CrawlBatch> for RunSummary {
    fn from(batch: &CrawlBatch) -> Self {
        let metadata = batch.metadata();
        Self {
            site: metadata.site.clone(),
            started_at: metadata.started_at,
            finished_at: metadata.finished_at,
            pages_visited: metadata.pages_visited,
            records: batch.len(),
            records_without_content: batch
                .records()
                .iter()
                .filter(|record| record.content().is_empty())
                .count(),
            status: metadata.status.clone(),
            issues: metadata.errors.clone(),
            config_hash: metadata.config_hash.clone(),
        }
    }
}
