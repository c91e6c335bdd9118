/// Pagination driver states
///
/// This module defines the states a crawl passes through while walking a
/// paginated listing.
use std::fmt;

/// Represents where the pagination driver is in its page loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverState {
    // ===== Active States =====
    /// A list page is being opened and rendered
    Fetching,

    /// Records of the current page are being extracted and enriched
    Extracting,

    /// Deciding whether and how to reach the next page
    Advancing,

    // ===== Terminal States =====
    /// No next page, or the page ceiling was reached
    Done,

    /// An unrecoverable error ended the crawl; collected records are kept
    Failed,
}

impl DriverState {
    /// Returns true if no further transitions are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the transition `self -> next` is legal
    ///
    /// Any active state may fail; the forward loop is
    /// Fetching -> Extracting -> Advancing -> (Fetching | Done).
    pub fn can_transition_to(&self, next: DriverState) -> bool {
        match (self, next) {
            (Self::Fetching, Self::Extracting) => true,
            (Self::Extracting, Self::Advancing) => true,
            (Self::Advancing, Self::Fetching) => true,
            (Self::Advancing, Self::Done) => true,
            (current, Self::Failed) => !current.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetching => "fetching",
            Self::Extracting => "extracting",
            Self::Advancing => "advancing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns all driver states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Fetching,
            Self::Extracting,
            Self::Advancing,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
