//! Sink trait and delivery types
//!
//! A `RecordSink` receives the frozen batch of a run exactly once. When
//! delivery fails the batch travels back inside the error, so the caller can
//! retry delivery without crawling again.

use crate::batch::CrawlBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while persisting a batch
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode batch: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Object store rejected {url} with status {status}")]
    Rejected { url: String, status: u16 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Proof that a batch reached durable storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    /// Sink kind, e.g. `file`
    pub sink: &'static str,
    /// Path, key or row id the batch was written to
    pub location: String,
    pub records: usize,
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    pub fn new(sink: &'static str, location: impl Into<String>, records: usize) -> Self {
        Self {
            sink,
            location: location.into(),
            records,
            delivered_at: Utc::now(),
        }
    }
}

/// A failed delivery; owns the undelivered batch
#[derive(Debug, Error)]
#[error("{error}")]
pub struct DeliveryFailure {
    #[source]
    pub error: SinkError,
    batch: Box<CrawlBatch>,
}

impl DeliveryFailure {
    pub fn new(error: SinkError, batch: CrawlBatch) -> Self {
        Self {
            error,
            batch: Box::new(batch),
        }
    }

    pub fn batch(&self) -> &CrawlBatch {
        &self.batch
    }

    /// Takes the batch back for another delivery attempt
    pub fn into_batch(self) -> CrawlBatch {
        *self.batch
    }
}

/// Durable destination for crawl batches
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Short description for logs, e.g. `file out/fsra.json`
    fn describe(&self) -> String;

    /// Writes the batch; implementations must not keep partial output on error
    async fn persist(&self, batch: &CrawlBatch) -> SinkResult<DeliveryReceipt>;

    /// Delivers the batch, handing it back on failure
    async fn write(&self, batch: CrawlBatch) -> Result<DeliveryReceipt, DeliveryFailure> {
        match self.persist(&batch).await {
            Ok(receipt) => {
                tracing::info!(
                    "Delivered {} records to {} ({})",
                    receipt.records,
                    self.describe(),
                    receipt.location
                );
                Ok(receipt)
            }
            Err(error) => {
                tracing::error!("Delivery to {} failed: {}", self.describe(), error);
                Err(DeliveryFailure::new(error, batch))
            }
        }
    }
}
