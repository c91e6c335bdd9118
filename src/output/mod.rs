//! Batch delivery and run reporting
//!
//! This module handles:
//! - The `RecordSink` contract and its file, object store and SQLite bindings
//! - The JSON document format written by the file and object store sinks
//! - The markdown run report

mod file_sink;
pub mod json;
mod markdown;
mod object_store;
mod sqlite_sink;
mod traits;

pub use file_sink::FileSink;
pub use markdown::{format_run_report, write_run_report};
pub use object_store::{object_key, DirectoryStore, HttpObjectStore, ObjectStore, ObjectStoreSink};
pub use sqlite_sink::{open_database, SqliteSink};
pub use traits::{DeliveryFailure, DeliveryReceipt, RecordSink, SinkError, SinkResult};

use crate::config::{OutputConfig, SinkConfig};
use crate::robots::build_http_client;
use crate::GleanError;

/// Builds the sink described by the output configuration
///
/// # Arguments
///
/// * `config` - The `[output]` section
///
/// # Returns
///
/// * `Ok(Box<dyn RecordSink>)` - The configured sink
/// * `Err(GleanError)` - The object store configuration is incomplete or the
///   HTTP client could not be built
pub fn build_sink(config: &OutputConfig) -> Result<Box<dyn RecordSink>, GleanError> {
    let sink: Box<dyn RecordSink> = match &config.sink {
        SinkConfig::File { path } => Box::new(FileSink::new(path)),
        SinkConfig::ObjectStore {
            directory,
            endpoint,
            key_prefix,
        } => {
            let store: Box<dyn ObjectStore> = match (directory, endpoint) {
                (Some(directory), None) => Box::new(DirectoryStore::new(directory)),
                (None, Some(endpoint)) => {
                    Box::new(HttpObjectStore::new(build_http_client(None)?, endpoint))
                }
                _ => {
                    return Err(crate::ConfigError::Validation(
                        "object-store sink needs exactly one of directory or endpoint".to_string(),
                    )
                    .into())
                }
            };
            Box::new(ObjectStoreSink::new(store, key_prefix))
        }
        SinkConfig::Sqlite { database_path } => Box::new(SqliteSink::new(database_path)),
    };

    tracing::info!("Records will be delivered to {}", sink.describe());
    Ok(sink)
}
