//! Sink writing the batch as one JSON file

use super::json::to_json;
use super::traits::{DeliveryReceipt, RecordSink, SinkResult};
use crate::batch::CrawlBatch;
use async_trait::async_trait;
use std::path::PathBuf;

/// Writes `{"announcements": [...], "run": {...}}` to a fixed path
///
/// The document is written next to the target and renamed into place, so a
/// failed write never leaves a truncated file behind.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RecordSink for FileSink {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn persist(&self, batch: &CrawlBatch) -> SinkResult<DeliveryReceipt> {
        let bytes = to_json(batch)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut staging = self.path.clone().into_os_string();
        staging.push(".partial");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&staging, &self.path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        Ok(DeliveryReceipt::new(
            "file",
            self.path.display().to_string(),
            batch.len(),
        ))
    }
}
