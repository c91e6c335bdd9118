//! Page opening with readiness and access-denial detection
//!
//! A page counts as rendered once its ready selector is present. Until then
//! the tab is polled; an access-denial page is reported as `blocked` so the
//! caller can rotate identity instead of simply retrying.

use super::{BrowserError, Document, Identity, RenderContext, Renderer};
use crate::config::BrowserSettings;
use crate::NavigationError;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Readiness rules shared by a renderer and the handles it produces
#[derive(Debug, Clone)]
pub struct ReadinessProbe {
    denial_markers: Vec<String>,
    poll_interval: Duration,
    snapshot_dir: Option<PathBuf>,
}

impl ReadinessProbe {
    pub fn new(denial_markers: &[String], poll_interval: Duration) -> Self {
        Self {
            denial_markers: denial_markers.iter().map(|m| m.to_lowercase()).collect(),
            poll_interval,
            snapshot_dir: None,
        }
    }

    pub fn from_settings(settings: &BrowserSettings, snapshot_dir: Option<&str>) -> Self {
        let probe = Self::new(
            &settings.denial_markers,
            Duration::from_millis(settings.ready_poll_ms),
        );
        match snapshot_dir {
            Some(dir) => probe.with_snapshot_dir(dir),
            None => probe,
        }
    }

    /// Enables diagnostic screenshots of failed renders
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    /// Returns true when the text carries one of the denial markers
    pub fn is_denial(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.denial_markers
            .iter()
            .any(|marker| text.contains(marker.as_str()))
    }

    /// Polls the tab until the ready selector appears or the deadline passes
    ///
    /// When `stale_html` is given the page must also differ from it, so a
    /// click that has not yet replaced the previous page is not mistaken
    /// for the next one. A tab that stops answering is cut off at the
    /// deadline as a timeout.
    async fn wait_ready(
        &self,
        context: &dyn RenderContext,
        url: &str,
        ready_selector: &str,
        deadline: Instant,
        stale_html: Option<&str>,
    ) -> Result<Document, NavigationError> {
        let polling = self.poll_ready(context, url, ready_selector, deadline, stale_html);
        match tokio::time::timeout_at(deadline, polling).await {
            Ok(result) => result,
            Err(_) => {
                tracing::debug!("Tab for {} stopped answering before the deadline", url);
                Err(NavigationError::timeout(url))
            }
        }
    }

    async fn poll_ready(
        &self,
        context: &dyn RenderContext,
        url: &str,
        ready_selector: &str,
        deadline: Instant,
        stale_html: Option<&str>,
    ) -> Result<Document, NavigationError> {
        loop {
            let title = context.title().await.unwrap_or_default();
            if self.is_denial(&title) {
                return Err(NavigationError::blocked(url));
            }

            match context.has_element(ready_selector).await {
                Ok(true) => {
                    let html = context
                        .html()
                        .await
                        .map_err(|e| NavigationError::unknown(url, e))?;

                    if stale_html.map_or(true, |stale| stale != html) {
                        let final_url = context
                            .current_url()
                            .await
                            .ok()
                            .filter(|u| !u.is_empty())
                            .unwrap_or_else(|| url.to_string());

                        return Ok(Document {
                            url: final_url,
                            title,
                            html,
                        });
                    }
                }
                Ok(false) => {}
                Err(e @ BrowserError::InvalidSelector(_)) => {
                    return Err(NavigationError::unknown(url, e));
                }
                Err(e) => {
                    tracing::debug!("Readiness check failed for {}: {}", url, e);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                let body = context.html().await.unwrap_or_default();
                return if self.is_denial(&body) {
                    Err(NavigationError::blocked(url))
                } else {
                    Err(NavigationError::timeout(url))
                };
            }

            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Best-effort screenshot of a failed render; errors are only logged
    async fn capture(&self, context: &dyn RenderContext, url: &str) {
        let Some(dir) = &self.snapshot_dir else {
            return;
        };

        if let Err(e) = tokio::fs::create_dir_all(dir).await {
            tracing::debug!("Cannot create snapshot directory {}: {}", dir.display(), e);
            return;
        }

        let path = dir.join(snapshot_file_name(url));
        match context.screenshot(&path).await {
            Ok(()) => tracing::info!("Saved failure snapshot: {}", path.display()),
            Err(e) => tracing::debug!("Snapshot of {} failed: {}", url, e),
        }
    }
}

fn snapshot_file_name(url: &str) -> String {
    let slug: String = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .take(80)
        .collect();

    format!(
        "{}_{}.png",
        chrono::Utc::now().format("%Y%m%d_%H%M%S%3f"),
        slug
    )
}

/// Opens pages through a `Renderer` and waits for them to become usable
#[derive(Clone)]
pub struct PageRenderer {
    renderer: Arc<dyn Renderer>,
    probe: Arc<ReadinessProbe>,
}

impl PageRenderer {
    pub fn new(renderer: Arc<dyn Renderer>, probe: ReadinessProbe) -> Self {
        Self {
            renderer,
            probe: Arc::new(probe),
        }
    }

    /// Opens `url` in a fresh tab and waits for `ready_selector`
    ///
    /// # Arguments
    ///
    /// * `url` - Page to load
    /// * `ready_selector` - Selector whose presence marks the page as rendered
    /// * `timeout` - Upper bound for navigation plus readiness
    /// * `identity` - User agent and proxy presented by the tab
    ///
    /// # Returns
    ///
    /// * `Ok(DocumentHandle)` - The live tab with a snapshot of the rendered page
    /// * `Err(NavigationError)` - `timeout`, `blocked` or `unknown`; the tab is closed
    pub async fn open(
        &self,
        url: &str,
        ready_selector: &str,
        timeout: Duration,
        identity: &Identity,
    ) -> Result<DocumentHandle, NavigationError> {
        let deadline = Instant::now() + timeout;

        let mut context = self
            .renderer
            .new_context(identity)
            .await
            .map_err(|e| NavigationError::unknown(url, e))?;

        let navigated = match tokio::time::timeout_at(deadline, context.navigate(url)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(NavigationError::unknown(url, e)),
            Err(_) => Err(NavigationError::timeout(url)),
        };

        let result = match navigated {
            Ok(()) => {
                self.probe
                    .wait_ready(context.as_ref(), url, ready_selector, deadline, None)
                    .await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(document) => Ok(DocumentHandle {
                context,
                document,
                pending_advance: None,
                probe: Arc::clone(&self.probe),
            }),
            Err(e) => {
                self.probe.capture(context.as_ref(), url).await;
                if let Err(close_err) = context.close().await {
                    tracing::debug!("Closing tab for {} failed: {}", url, close_err);
                }
                Err(e)
            }
        }
    }

    pub fn probe(&self) -> &ReadinessProbe {
        &self.probe
    }

    /// Shuts down the underlying browser engine
    pub async fn shutdown(&self) -> Result<(), BrowserError> {
        self.renderer.shutdown().await
    }
}

/// A live tab together with the last rendered snapshot of its page
pub struct DocumentHandle {
    context: Box<dyn RenderContext>,
    document: Document,
    /// Snapshot the tab must move away from after an unfinished advance
    pending_advance: Option<String>,
    probe: Arc<ReadinessProbe>,
}

impl DocumentHandle {
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// True after a click whose next page has not rendered yet
    pub fn is_advancing(&self) -> bool {
        self.pending_advance.is_some()
    }

    /// Clicks the next-page control and waits for the next page to render
    ///
    /// On failure the handle keeps its previous snapshot and stays open, so
    /// the caller may keep waiting for the same click with `refresh`.
    pub async fn advance(
        &mut self,
        next_selector: &str,
        ready_selector: &str,
        timeout: Duration,
    ) -> Result<(), NavigationError> {
        let deadline = Instant::now() + timeout;

        match tokio::time::timeout_at(deadline, self.context.click(next_selector)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(NavigationError::unknown(self.document.url.clone(), e)),
            Err(_) => return Err(NavigationError::timeout(self.document.url.clone())),
        }

        self.pending_advance = Some(self.document.html.clone());
        self.settle(ready_selector, deadline).await
    }

    /// Waits for readiness again and re-snapshots the tab
    ///
    /// After a failed `advance` this keeps waiting for the page to differ
    /// from the one the click was made on; it never clicks again.
    pub async fn refresh(
        &mut self,
        ready_selector: &str,
        timeout: Duration,
    ) -> Result<(), NavigationError> {
        let deadline = Instant::now() + timeout;
        self.settle(ready_selector, deadline).await
    }

    async fn settle(&mut self, ready_selector: &str, deadline: Instant) -> Result<(), NavigationError> {
        let url = self.document.url.clone();

        match self
            .probe
            .wait_ready(
                self.context.as_ref(),
                &url,
                ready_selector,
                deadline,
                self.pending_advance.as_deref(),
            )
            .await
        {
            Ok(document) => {
                self.document = document;
                self.pending_advance = None;
                Ok(())
            }
            Err(e) => {
                self.probe.capture(self.context.as_ref(), &url).await;
                Err(e)
            }
        }
    }

    pub async fn close(self) {
        let url = self.document.url;
        if let Err(e) = self.context.close().await {
            tracing::debug!("Closing tab for {} failed: {}", url, e);
        }
    }
}
