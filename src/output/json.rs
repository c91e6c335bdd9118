//! JSON document format shared by the file and object store sinks
//!
//! ```json
//! { "announcements": [ { "title": ..., "tags": [...], ... } ],
//!   "run": { "site": ..., "status": "done", "errors": [...] } }
//! ```

use crate::batch::{BatchMetadata, CrawlBatch, Record};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct DocumentRef<'a> {
    announcements: &'a [Record],
    run: &'a BatchMetadata,
}

#[derive(Deserialize)]
struct Document {
    announcements: Vec<Record>,
    run: BatchMetadata,
}

/// Encodes a batch as a pretty-printed JSON document
pub fn to_json(batch: &CrawlBatch) -> serde_json::Result<Vec<u8>> {
    serde_json::to_vec_pretty(&DocumentRef {
        announcements: batch.records(),
        run: batch.metadata(),
    })
}

/// Decodes a document written by `to_json`
pub fn from_json(bytes: &[u8]) -> serde_json::Result<CrawlBatch> {
    let document: Document = serde_json::from_slice(bytes)?;
    Ok(CrawlBatch::from_parts(document.announcements, document.run))
}
