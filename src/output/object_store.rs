//! Object store sink
//!
//! The batch is written as one JSON object under a timestamped key,
//! `{prefix}_{YYYYmmdd_HHMMSS}.json`. Two stores are provided:
//! - `DirectoryStore`: a local directory standing in for a bucket
//! - `HttpObjectStore`: `PUT {endpoint}/{key}` against an S3-compatible endpoint

use super::json::to_json;
use super::traits::{DeliveryReceipt, RecordSink, SinkError, SinkResult};
use crate::batch::CrawlBatch;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::path::PathBuf;

/// Key/value storage for whole objects
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `body` under `key` and returns where it landed
    async fn put(&self, key: &str, body: Vec<u8>) -> SinkResult<String>;

    fn describe(&self) -> String;
}

/// Object store backed by a local directory
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    root: PathBuf,
}

impl DirectoryStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> SinkResult<String> {
        tokio::fs::create_dir_all(&self.root).await?;
        let path = self.root.join(key);
        tokio::fs::write(&path, body).await?;
        Ok(path.display().to_string())
    }

    fn describe(&self) -> String {
        format!("directory {}", self.root.display())
    }
}

/// Object store reached over HTTP `PUT`
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: Client,
    endpoint: String,
}

impl HttpObjectStore {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn put(&self, key: &str, body: Vec<u8>) -> SinkResult<String> {
        let url = format!("{}/{}", self.endpoint, key);
        let response = self
            .client
            .put(&url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SinkError::Rejected {
                url,
                status: status.as_u16(),
            });
        }
        Ok(url)
    }

    fn describe(&self) -> String {
        format!("endpoint {}", self.endpoint)
    }
}

/// Builds the object key for a batch finished at `finished_at`
pub fn object_key(prefix: &str, finished_at: DateTime<Utc>) -> String {
    format!("{}_{}.json", prefix, finished_at.format("%Y%m%d_%H%M%S"))
}

/// Sink writing each batch as a new object
pub struct ObjectStoreSink {
    store: Box<dyn ObjectStore>,
    key_prefix: String,
}

impl ObjectStoreSink {
    pub fn new(store: Box<dyn ObjectStore>, key_prefix: impl Into<String>) -> Self {
        Self {
            store,
            key_prefix: key_prefix.into(),
        }
    }
}

#[async_trait]
impl RecordSink for ObjectStoreSink {
    fn describe(&self) -> String {
        format!("object store {} ({}_*)", self.store.describe(), self.key_prefix)
    }

    async fn persist(&self, batch: &CrawlBatch) -> SinkResult<DeliveryReceipt> {
        let key = object_key(&self.key_prefix, batch.metadata().finished_at);
        let body = to_json(batch)?;
        let location = self.store.put(&key, body).await?;
        Ok(DeliveryReceipt::new("object-store", location, batch.len()))
    }
}
