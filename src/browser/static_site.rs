//! In-memory renderer serving pre-rendered pages
//!
//! Pages, click targets and failure budgets are registered up front. Every
//! navigation is logged with the identity that made it, so rotation and
//! retry behavior can be replayed without a browser.

use super::{BrowserError, Identity, RenderContext, Renderer};
use async_trait::async_trait;
use scraper::{Html, Selector};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// A pre-rendered page
#[derive(Debug, Clone)]
pub struct StaticPage {
    pub title: String,
    pub html: String,
    /// Simulated navigation latency
    pub delay: Duration,
}

impl StaticPage {
    pub fn new(title: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            html: html.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// How a registered failure presents itself
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticFailure {
    /// Navigation commits but the page never renders anything
    Hang,
    /// An access-denial page is served instead
    Blocked,
    /// Navigation itself errors
    Error(String),
}

/// One navigation made through a `StaticRenderer`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Visit {
    pub url: String,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
}

#[derive(Debug, Default)]
struct SiteState {
    pages: HashMap<String, StaticPage>,
    links: HashMap<(String, String), String>,
    failures: Mutex<HashMap<String, (u32, StaticFailure)>>,
    blocked_agents: Vec<String>,
    visits: Mutex<Vec<Visit>>,
    open_contexts: AtomicUsize,
}

impl SiteState {
    /// Consumes one unit of the failure budget registered for `url`
    fn take_failure(&self, url: &str) -> Option<StaticFailure> {
        let mut failures = self.failures.lock().unwrap_or_else(PoisonError::into_inner);
        let (remaining, failure) = failures.get_mut(url)?;
        if *remaining == 0 {
            return None;
        }
        *remaining -= 1;
        Some(failure.clone())
    }

    fn is_blocked_agent(&self, identity: &Identity) -> bool {
        identity.user_agent.as_deref().map_or(false, |agent| {
            self.blocked_agents
                .iter()
                .any(|blocked| agent.contains(blocked.as_str()))
        })
    }
}

/// A `Renderer` backed by an in-memory site
#[derive(Debug, Clone, Default)]
pub struct StaticRenderer {
    site: Arc<SiteState>,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder access; copies the site if a context still shares it
    fn state_mut(&mut self) -> &mut SiteState {
        Arc::make_mut(&mut self.site)
    }

    /// Registers a page under its URL
    pub fn page(mut self, url: impl Into<String>, page: StaticPage) -> Self {
        self.state_mut().pages.insert(url.into(), page);
        self
    }

    /// Clicking `selector` on `from` loads `to`
    pub fn link(
        mut self,
        from: impl Into<String>,
        selector: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        self.state_mut()
            .links
            .insert((from.into(), selector.into()), to.into());
        self
    }

    /// The next `times` navigations to `url` fail with `failure`
    pub fn fail(mut self, url: impl Into<String>, times: u32, failure: StaticFailure) -> Self {
        self.state_mut()
            .failures
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.into(), (times, failure));
        self
    }

    /// Identities whose user agent contains `fragment` only see denial pages
    pub fn block_agent(mut self, fragment: impl Into<String>) -> Self {
        self.state_mut().blocked_agents.push(fragment.into());
        self
    }

    /// Every navigation made so far, in order
    pub fn visits(&self) -> Vec<Visit> {
        self.site
            .visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Tabs opened and not yet closed
    pub fn open_contexts(&self) -> usize {
        self.site.open_contexts.load(Ordering::SeqCst)
    }
}

impl Clone for SiteState {
    fn clone(&self) -> Self {
        Self {
            pages: self.pages.clone(),
            links: self.links.clone(),
            failures: Mutex::new(
                self.failures
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
            ),
            blocked_agents: self.blocked_agents.clone(),
            visits: Mutex::new(
                self.visits
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone(),
            ),
            open_contexts: AtomicUsize::new(self.open_contexts.load(Ordering::SeqCst)),
        }
    }
}

#[async_trait]
impl Renderer for StaticRenderer {
    async fn new_context(&self, identity: &Identity) -> Result<Box<dyn RenderContext>, BrowserError> {
        self.site.open_contexts.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(StaticContext {
            site: Arc::clone(&self.site),
            identity: identity.clone(),
            current: Loaded::Blank,
        }))
    }

    async fn shutdown(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum Loaded {
    Blank,
    Hung { url: String },
    Page { url: String, page: StaticPage },
}

struct StaticContext {
    site: Arc<SiteState>,
    identity: Identity,
    current: Loaded,
}

fn denial_page() -> StaticPage {
    StaticPage::new(
        "Access Denied",
        "<html><head><title>Access Denied</title></head><body><h1>Access Denied</h1></body></html>",
    )
}

impl StaticContext {
    async fn load(&mut self, url: &str) -> Result<(), BrowserError> {
        self.site
            .visits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Visit {
                url: url.to_string(),
                user_agent: self.identity.user_agent.clone(),
                proxy: self.identity.proxy.clone(),
            });

        if self.site.is_blocked_agent(&self.identity) {
            self.current = Loaded::Page {
                url: url.to_string(),
                page: denial_page(),
            };
            return Ok(());
        }

        match self.site.take_failure(url) {
            Some(StaticFailure::Hang) => {
                self.current = Loaded::Hung {
                    url: url.to_string(),
                };
                return Ok(());
            }
            Some(StaticFailure::Blocked) => {
                self.current = Loaded::Page {
                    url: url.to_string(),
                    page: denial_page(),
                };
                return Ok(());
            }
            Some(StaticFailure::Error(message)) => {
                self.current = Loaded::Blank;
                return Err(BrowserError::Protocol(message));
            }
            None => {}
        }

        let page = self
            .site
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| BrowserError::Protocol(format!("net::ERR_NAME_NOT_RESOLVED {}", url)))?;

        if !page.delay.is_zero() {
            tokio::time::sleep(page.delay).await;
        }

        self.current = Loaded::Page {
            url: url.to_string(),
            page,
        };
        Ok(())
    }

    fn matches(&self, selector: &str) -> Result<bool, BrowserError> {
        let parsed = Selector::parse(selector)
            .map_err(|e| BrowserError::InvalidSelector(format!("{}: {:?}", selector, e)))?;

        match &self.current {
            Loaded::Page { page, .. } => {
                let document = Html::parse_document(&page.html);
                let found = document.select(&parsed).next().is_some();
                Ok(found)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl RenderContext for StaticContext {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.load(url).await
    }

    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError> {
        self.matches(selector)
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        if !self.matches(selector)? {
            return Err(BrowserError::ElementNotFound(selector.to_string()));
        }

        let from = match &self.current {
            Loaded::Page { url, .. } => url.clone(),
            _ => return Err(BrowserError::ElementNotFound(selector.to_string())),
        };

        // Controls without a registered target do nothing, like a dead button
        let target = self
            .site
            .links
            .get(&(from, selector.to_string()))
            .cloned();

        match target {
            Some(target) => self.load(&target).await,
            None => Ok(()),
        }
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(match &self.current {
            Loaded::Page { page, .. } => page.title.clone(),
            _ => String::new(),
        })
    }

    async fn html(&self) -> Result<String, BrowserError> {
        Ok(match &self.current {
            Loaded::Page { page, .. } => page.html.clone(),
            _ => String::new(),
        })
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(match &self.current {
            Loaded::Blank => "about:blank".to_string(),
            Loaded::Hung { url } | Loaded::Page { url, .. } => url.clone(),
        })
    }

    /// Writes the current HTML in place of image data
    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        let html = self.html().await?;
        tokio::fs::write(path, html)
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.site.open_contexts.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}
