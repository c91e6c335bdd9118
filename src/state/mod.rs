//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `DriverState`: where the pagination driver is in its fetch/extract/advance loop

mod driver_state;

// Re-export main types
pub use driver_state::DriverState;
