//! Chromium binding via chromiumoxide
//!
//! One browser process is launched lazily per proxy, since Chromium only
//! takes a proxy at launch time. User agents are applied per tab.

use super::{BrowserError, Identity, RenderContext, Renderer};
use crate::config::BrowserSettings;
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

struct RunningBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Chromium-based renderer
pub struct ChromiumRenderer {
    settings: BrowserSettings,
    browsers: Mutex<HashMap<Option<String>, RunningBrowser>>,
}

impl ChromiumRenderer {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            browsers: Mutex::new(HashMap::new()),
        }
    }

    async fn launch(&self, proxy: Option<&str>) -> Result<RunningBrowser, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions");

        if let Some(executable) = &self.settings.executable {
            builder = builder.chrome_executable(executable);
        }
        if let Some(proxy) = proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }
        if !self.settings.headless {
            builder = builder.with_head();
        }

        let config = builder.build().map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!("Browser handler event error: {}", e);
                }
            }
        });

        tracing::info!(
            "Launched Chromium{}",
            proxy.map(|p| format!(" via {}", p)).unwrap_or_default()
        );

        Ok(RunningBrowser { browser, handler })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self, identity: &Identity) -> Result<Box<dyn RenderContext>, BrowserError> {
        let mut browsers = self.browsers.lock().await;

        if !browsers.contains_key(&identity.proxy) {
            let running = self.launch(identity.proxy.as_deref()).await?;
            browsers.insert(identity.proxy.clone(), running);
        }

        let running = browsers
            .get(&identity.proxy)
            .ok_or_else(|| BrowserError::Launch("browser vanished after launch".to_string()))?;

        let page = running
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;

        if let Some(user_agent) = &identity.user_agent {
            page.execute(SetUserAgentOverrideParams {
                user_agent: user_agent.clone(),
                accept_language: None,
                platform: None,
                user_agent_metadata: None,
            })
            .await
            .map_err(|e| BrowserError::Protocol(e.to_string()))?;
        }

        Ok(Box::new(ChromiumContext { page }))
    }

    async fn shutdown(&self) -> Result<(), BrowserError> {
        let mut browsers = self.browsers.lock().await;

        for (proxy, mut running) in browsers.drain() {
            if let Err(e) = running.browser.close().await {
                tracing::warn!(
                    "Failed to close browser{}: {}",
                    proxy.map(|p| format!(" via {}", p)).unwrap_or_default(),
                    e
                );
            }
            running.handler.abort();
        }

        Ok(())
    }
}

/// A single Chromium tab
struct ChromiumContext {
    page: Page,
}

fn protocol(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::Protocol(e.to_string())
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.page.goto(url).await.map_err(protocol)?;
        Ok(())
    }

    async fn has_element(&self, selector: &str) -> Result<bool, BrowserError> {
        Ok(self.page.find_element(selector).await.is_ok())
    }

    async fn click(&mut self, selector: &str) -> Result<(), BrowserError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|_| BrowserError::ElementNotFound(selector.to_string()))?;

        element.click().await.map_err(protocol)?;
        Ok(())
    }

    async fn title(&self) -> Result<String, BrowserError> {
        Ok(self
            .page
            .get_title()
            .await
            .map_err(protocol)?
            .unwrap_or_default())
    }

    async fn html(&self) -> Result<String, BrowserError> {
        self.page.content().await.map_err(protocol)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.page.url().await.map_err(protocol)?.unwrap_or_default())
    }

    async fn screenshot(&self, path: &Path) -> Result<(), BrowserError> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .map_err(protocol)?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), BrowserError> {
        self.page.close().await.map_err(protocol)
    }
}
