//! Seams to the automation side: authentication, navigation and section lookup.
//!
//! The orchestrator and pipeline only ever see these traits. The HTTP-backed
//! implementations live in [`crate::scraper`]; tests plug in fakes.

use log::info;

use crate::error::{LocateError, SessionError};
use crate::profile::SectionName;

/// An opened target page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageHandle {
    pub target_id: String,
    /// Final URL after redirects.
    pub url: String,
    /// Driver-specific page content (HTML for the HTTP driver).
    pub content: String,
}

/// Text found for one section: one block per entry, one line per text node.
/// Single-valued sections use a single block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSection {
    pub blocks: Vec<Vec<String>>,
}

impl RawSection {
    pub fn single<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RawSection { blocks: vec![lines.into_iter().map(Into::into).collect()] }
    }

    pub fn from_blocks(blocks: Vec<Vec<String>>) -> Self {
        RawSection { blocks }
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.iter().all(|b| b.iter().all(|l| l.trim().is_empty()))
    }
}

pub trait NavigationDriver {
    fn open(&mut self, target_id: &str) -> Result<PageHandle, SessionError>;

    /// Scrolls by `pixels`. Returns `false` once the page has nothing further to load.
    fn scroll_by(&mut self, page: &mut PageHandle, pixels: i64) -> Result<bool, SessionError>;

    /// Clicks the first element matching `selector`. `Ok(false)` when there is
    /// nothing clickable there.
    fn click_element(&mut self, page: &mut PageHandle, selector: &str) -> Result<bool, SessionError>;

    fn close(&mut self) {}
}

pub trait SectionLocator {
    /// `Ok(None)` when the page has no such section.
    fn locate(&self, page: &PageHandle, section: SectionName) -> Result<Option<RawSection>, LocateError>;

    /// Selector of a "show all" / "see more" control worth clicking before
    /// reading `section`.
    fn expander(&self, _section: SectionName) -> Option<&str> {
        None
    }
}

pub trait Authenticator {
    fn login(&self) -> Result<Session, SessionError>;
}

/// An authenticated automation session. The driver is closed when the
/// session is dropped, whichever way the run ends.
pub struct Session {
    driver: Box<dyn NavigationDriver>,
}

impl Session {
    pub fn new(driver: Box<dyn NavigationDriver>) -> Self {
        Session { driver }
    }

    pub fn driver(&mut self) -> &mut dyn NavigationDriver {
        self.driver.as_mut()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        info!("Closing automation session");
        self.driver.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct ClosingDriver {
        closed: Rc<Cell<bool>>,
    }

    impl NavigationDriver for ClosingDriver {
        fn open(&mut self, target_id: &str) -> Result<PageHandle, SessionError> {
            Err(SessionError::Unreachable { target: target_id.into(), reason: "offline".into() })
        }
        fn scroll_by(&mut self, _: &mut PageHandle, _: i64) -> Result<bool, SessionError> {
            Ok(false)
        }
        fn click_element(&mut self, _: &mut PageHandle, _: &str) -> Result<bool, SessionError> {
            Ok(false)
        }
        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    #[test]
    fn dropping_a_session_closes_the_driver() {
        let closed = Rc::new(Cell::new(false));
        {
            let mut session = Session::new(Box::new(ClosingDriver { closed: closed.clone() }));
            assert!(session.driver().open("x").is_err());
        }
        assert!(closed.get());
    }

    #[test]
    fn whitespace_only_sections_are_empty() {
        assert!(RawSection::single(["  ", ""]).is_empty());
        assert!(!RawSection::single(["Rust"]).is_empty());
        assert!(RawSection::default().is_empty());
    }
}
