//! Browser automation layer
//!
//! This module abstracts the headless browser behind two traits so the
//! crawl loop never depends on a specific engine:
//! - `Renderer`: creates isolated browser contexts (tabs) for an identity
//! - `RenderContext`: one tab that can navigate, query, click and snapshot
//!
//! `PageRenderer` builds the readiness and access-denial logic on top of
//! those traits. Two bindings are provided: `ChromiumRenderer` drives a real
//! Chromium through chromiumoxide, `StaticRenderer` serves pre-rendered HTML
//! from memory for replay and tests.

mod chromium;
mod page_renderer;
mod static_site;

pub use chromium::ChromiumRenderer;
pub use page_renderer::{DocumentHandle, PageRenderer, ReadinessProbe};
pub use static_site::{StaticFailure, StaticPage, StaticRenderer, Visit};

use async_trait::async_trait;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Browser-level failures, before they are classified for retry
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Browser protocol error: {0}")]
    Protocol(String),

    #[error("No element matches selector: {0}")]
    ElementNotFound(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),
}

/// Outbound identity used for one browser context
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Identity {
    pub user_agent: Option<String>,
    /// Proxy server in `scheme://host:port` form
    pub proxy: Option<String>,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let agent = self.user_agent.as_deref().unwrap_or("default agent");
        match &self.proxy {
            Some(proxy) => write!(f, "{} via {}", agent, proxy),
            None => write!(f, "{}", agent),
        }
    }
}

/// A rendered page captured at a point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Final URL after redirects
    pub url: String,
    pub title: String,
    /// Serialized DOM after scripts have run
    pub html: String,
}

/// A browser engine that can create rendering contexts
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Opens a new tab presenting the given identity
    async fn new_context(&self, identity: &Identity) -> Result<Box<dyn RenderContext>, BrowserError>;

    /// Shuts down every browser process started by this renderer
    async fn shutdown(&self) -> Result<(), BrowserError>;
}

/// A single browser tab
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Starts loading a URL; returns once the navigation has committed
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Returns true when the selector matches at least one element
    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError>;

    /// Clicks the first element matching the selector
    async fn click(&mut self, selector: &str) -> Result<(), BrowserError>;

    async fn title(&self) -> Result<String, BrowserError>;

    async fn html(&self) -> Result<String, BrowserError>;

    async fn current_url(&self) -> Result<String, BrowserError>;

    /// Writes a full-page PNG screenshot to `path`
    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError>;

    async fn close(self: Box<Self>) -> Result<(), BrowserError>;
}
