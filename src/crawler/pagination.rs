//! Pagination state machine
//!
//! The driver tracks which list page the crawl is on and which transitions
//! are legal. It owns the cursor to the current rendered page; the session
//! performs the actual I/O between transitions.

use crate::state::DriverState;
use crate::GleanError;

/// The current list page and the tab showing it
#[derive(Debug)]
pub struct PageCursor<H> {
    pub page_number: u32,
    pub handle: H,
}

/// Drives Fetching -> Extracting -> Advancing -> (Fetching | Done)
#[derive(Debug)]
pub struct PaginationDriver<H> {
    state: DriverState,
    page_number: u32,
    max_pages: u32,
    cursor: Option<PageCursor<H>>,
}

impl<H> PaginationDriver<H> {
    /// Starts in `Fetching` on page 1
    pub fn new(max_pages: u32) -> Self {
        Self {
            state: DriverState::Fetching,
            page_number: 1,
            max_pages: max_pages.max(1),
            cursor: None,
        }
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    /// 1-based number of the page being fetched or processed
    pub fn page_number(&self) -> u32 {
        self.page_number
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn cursor(&self) -> Option<&PageCursor<H>> {
        self.cursor.as_ref()
    }

    /// Removes the cursor, typically to reuse or close its tab
    pub fn take_cursor(&mut self) -> Option<PageCursor<H>> {
        self.cursor.take()
    }

    fn transition(&mut self, next: DriverState) -> Result<(), GleanError> {
        if !self.state.can_transition_to(next) {
            return Err(GleanError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(
            "Page {}: {} -> {}",
            self.page_number,
            self.state,
            next
        );
        self.state = next;
        Ok(())
    }

    /// The current page rendered; `Fetching -> Extracting`
    ///
    /// Returns the previous cursor's handle, if any, for the caller to close.
    pub fn rendered(&mut self, handle: H) -> Result<Option<H>, GleanError> {
        self.transition(DriverState::Extracting)?;
        let previous = self.cursor.replace(PageCursor {
            page_number: self.page_number,
            handle,
        });
        Ok(previous.map(|cursor| cursor.handle))
    }

    /// All records of the current page are in the batch; `Extracting -> Advancing`
    pub fn extracted(&mut self) -> Result<(), GleanError> {
        self.transition(DriverState::Advancing)
    }

    /// Decides where to go after a page
    ///
    /// Moves to `Fetching` on the next page when `has_next` holds and the
    /// page ceiling has not been reached, to `Done` otherwise.
    pub fn advance(&mut self, has_next: bool) -> Result<DriverState, GleanError> {
        if has_next && self.page_number < self.max_pages {
            self.transition(DriverState::Fetching)?;
            self.page_number += 1;
        } else {
            self.transition(DriverState::Done)?;
            if has_next {
                tracing::info!("Page ceiling of {} reached", self.max_pages);
            }
        }
        Ok(self.state)
    }

    /// An unrecoverable error ended the crawl
    pub fn fail(&mut self) -> Result<(), GleanError> {
        self.transition(DriverState::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling_stops_endless_site() {
        let mut driver: PaginationDriver<u32> = PaginationDriver::new(3);
        let mut pages = 0;

        while driver.state() == DriverState::Fetching {
            pages += 1;
            driver.rendered(driver.page_number()).unwrap();
            driver.extracted().unwrap();
            driver.advance(true).unwrap();
        }

        assert_eq!(pages, 3);
        assert_eq!(driver.state(), DriverState::Done);
        assert_eq!(driver.page_number(), 3);
    }

    #[test]
    fn test_no_next_page_is_done() {
        let mut driver: PaginationDriver<()> = PaginationDriver::new(10);
        driver.rendered(()).unwrap();
        driver.extracted().unwrap();

        assert_eq!(driver.advance(false).unwrap(), DriverState::Done);
        assert_eq!(driver.page_number(), 1);
    }

    #[test]
    fn test_rendered_returns_previous_handle() {
        let mut driver: PaginationDriver<&str> = PaginationDriver::new(5);

        assert_eq!(driver.rendered("tab-1").unwrap(), None);
        driver.extracted().unwrap();
        driver.advance(true).unwrap();

        assert_eq!(driver.cursor().map(|c| c.page_number), Some(1));
        assert_eq!(driver.rendered("tab-2").unwrap(), Some("tab-1"));
        assert_eq!(driver.cursor().map(|c| c.page_number), Some(2));
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let mut driver: PaginationDriver<()> = PaginationDriver::new(5);

        let err = driver.extracted().unwrap_err();
        assert!(matches!(
            err,
            GleanError::InvalidTransition {
                from: DriverState::Fetching,
                to: DriverState::Advancing
            }
        ));
        assert_eq!(driver.state(), DriverState::Fetching);
    }

    #[test]
    fn test_fail_keeps_page_number() {
        let mut driver: PaginationDriver<()> = PaginationDriver::new(5);
        driver.rendered(()).unwrap();
        driver.extracted().unwrap();
        driver.advance(true).unwrap();

        driver.fail().unwrap();
        assert_eq!(driver.state(), DriverState::Failed);
        assert_eq!(driver.page_number(), 2);
        assert!(driver.fail().is_err());
    }
}
