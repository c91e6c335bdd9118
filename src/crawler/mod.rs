//! Crawl-and-extract pipeline
//!
//! This module contains the core crawling logic, including:
//! - Field and detail content extraction from rendered pages
//! - The pagination state machine
//! - Bounded retry with identity rotation
//! - The session that ties them together and delivers the batch

pub mod extractor;
mod identity;
mod pagination;
mod retry;
mod session;

pub use extractor::{
    extract_detail_content, extract_list_items, next_control, Extraction, ExtractionError,
    NextControl,
};
pub use identity::IdentityPool;
pub use pagination::{PageCursor, PaginationDriver};
pub use retry::{Backoff, RetryError, RetryPolicy};
pub use session::{CrawlEvent, CrawlOutcome, CrawlSession};
