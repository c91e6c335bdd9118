//! Gleaner: a resilient announcement harvester
//!
//! This crate drives paginated, script-rendered regulatory and corporate
//! websites through a headless browser, extracts structured announcement
//! records from inconsistent markup, tags them, and hands a deduplicated,
//! ordered batch to a durable sink.

pub mod batch;
pub mod browser;
pub mod config;
pub mod crawler;
pub mod output;
pub mod robots;
pub mod state;
pub mod tagger;
pub mod url;

use std::fmt;
use thiserror::Error;

/// Main error type for Gleaner runs
#[derive(Debug, Error)]
pub enum GleanError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Browser error: {0}")]
    Browser(#[from] browser::BrowserError),

    #[error("{0}")]
    Navigation(#[from] NavigationError),

    #[error("Landing URL disallowed by robots.txt: {url}")]
    RobotsDenied { url: String },

    #[error("HTTP error for {url}: {source}")]
    Http { url: String, source: reqwest::Error },

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Batch delivery failed: {0}")]
    Delivery(#[from] output::DeliveryFailure),

    #[error("Invalid state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: state::DriverState,
        to: state::DriverState,
    },

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid selector in config: {0}")]
    InvalidSelector(String),

    #[error("Unknown site: {0}")]
    UnknownSite(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,
}

/// Why a page could not be rendered
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationFailure {
    /// The ready selector never appeared within the timeout
    Timeout,

    /// The site served an access-denial page
    Blocked,

    /// Any other browser or protocol failure
    Unknown(String),
}

impl NavigationFailure {
    /// Returns true when the failure suggests changing outbound identity
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked)
    }
}

impl fmt::Display for NavigationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::Blocked => write!(f, "blocked"),
            Self::Unknown(message) => write!(f, "{}", message),
        }
    }
}

/// A transient failure to open or advance a page
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Navigation to {url} failed: {reason}")]
pub struct NavigationError {
    pub reason: NavigationFailure,
    pub url: String,
}

impl NavigationError {
    pub fn timeout(url: impl Into<String>) -> Self {
        Self {
            reason: NavigationFailure::Timeout,
            url: url.into(),
        }
    }

    pub fn blocked(url: impl Into<String>) -> Self {
        Self {
            reason: NavigationFailure::Blocked,
            url: url.into(),
        }
    }

    pub fn unknown(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self {
            reason: NavigationFailure::Unknown(message.to_string()),
            url: url.into(),
        }
    }
}

/// Result type alias for Gleaner operations
pub type Result<T> = std::result::Result<T, GleanError>;

// Re-export commonly used types
pub use batch::{BatchStatus, CrawlBatch, CrawlIssue, PartialRecord, Record};
pub use config::Config;
pub use crawler::{CrawlOutcome, CrawlSession};
pub use state::DriverState;
pub use tagger::{HeuristicBackend, LinguisticBackend, Tagger};
