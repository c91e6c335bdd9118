//! Crawl session - orchestration of one run against one site
//!
//! The session drives the pagination state machine and performs the I/O
//! between its transitions:
//! - Rendering list pages with bounded retry and identity rotation
//! - Extracting items, fanning out detail fetches, tagging records
//! - Enforcing the page ceiling and the inter-page pause
//! - Honouring cancellation and robots.txt
//! - Freezing the batch and delivering it to the sink exactly once

use super::extractor::{extract_detail_content, extract_list_items, next_control};
use super::identity::IdentityPool;
use super::pagination::PaginationDriver;
use super::retry::{RetryError, RetryPolicy};
use crate::batch::{BatchBuilder, BatchStatus, CrawlBatch, PartialRecord, Record, RunSummary};
use crate::browser::{Document, DocumentHandle, PageRenderer};
use crate::config::{Config, CrawlerConfig, PaginationConfig, SiteProfile};
use crate::output::{DeliveryReceipt, RecordSink};
use crate::robots::{build_http_client, fetch_robots, is_allowed, RobotsRules, ROBOTS_AGENT};
use crate::state::DriverState;
use crate::tagger::Tagger;
use crate::url::expand_template;
use crate::{GleanError, NavigationError};
use futures::stream::{self, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Progress notifications emitted while a session runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    PageStarted {
        page_number: u32,
    },
    PageExtracted {
        page_number: u32,
        items: usize,
    },
    RecordExtracted {
        page_number: u32,
        title: String,
        url: String,
    },
    Warning {
        page_number: u32,
        message: String,
    },
    PageFailed {
        page_number: u32,
        message: String,
    },
    Finished {
        status: BatchStatus,
        records: usize,
        pages_visited: u32,
    },
}

/// Result of a delivered run
#[derive(Debug, Clone)]
pub struct CrawlOutcome {
    pub summary: RunSummary,
    pub receipt: DeliveryReceipt,
}

/// Detail content of one record with the warnings raised fetching it
#[derive(Debug, Clone, Default)]
struct DetailSlot {
    content: String,
    warnings: Vec<String>,
}

impl DetailSlot {
    fn degraded(warning: String) -> Self {
        Self {
            content: String::new(),
            warnings: vec![warning],
        }
    }
}

/// One crawl run against one site
pub struct CrawlSession {
    site: SiteProfile,
    crawler: CrawlerConfig,
    pages: PageRenderer,
    tagger: Tagger,
    max_tags: usize,
    retry: RetryPolicy,
    identities: IdentityPool,
    cancel: CancellationToken,
    events: Option<mpsc::UnboundedSender<CrawlEvent>>,
    robots: Option<RobotsRules>,
    config_hash: Option<String>,
}

impl CrawlSession {
    /// Creates a session for `site`
    ///
    /// # Arguments
    ///
    /// * `config` - Crawler, retry, identity and tagger settings
    /// * `site` - Profile of the site to crawl
    /// * `pages` - Renderer used for list and detail pages
    /// * `tagger` - Tagger shared by every record of the run
    pub fn new(config: &Config, site: SiteProfile, pages: PageRenderer, tagger: Tagger) -> Self {
        Self {
            site,
            crawler: config.crawler.clone(),
            pages,
            tagger,
            max_tags: config.tagger.max_tags,
            retry: RetryPolicy::from_config(&config.retry),
            identities: IdentityPool::from_config(&config.identity),
            cancel: CancellationToken::new(),
            events: None,
            robots: None,
            config_hash: None,
        }
    }

    /// Uses `cancel` to stop the run early
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Streams progress events into `events`
    pub fn with_events(mut self, events: mpsc::UnboundedSender<CrawlEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Records the configuration hash in the batch metadata
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = Some(hash.into());
        self
    }

    /// Uses these robots.txt rules instead of fetching them
    pub fn with_robots(mut self, rules: RobotsRules) -> Self {
        self.robots = Some(rules);
        self
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Crawls the site and delivers the batch
    ///
    /// # Arguments
    ///
    /// * `sink` - Destination of the frozen batch; written exactly once
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - The batch was delivered, whatever its status
    /// * `Err(GleanError::RobotsDenied)` - Robots.txt forbids the landing URL;
    ///   nothing was browsed or delivered
    /// * `Err(GleanError::Delivery)` - The sink failed; the error owns the batch
    pub async fn run(self, sink: &dyn RecordSink) -> Result<CrawlOutcome, GleanError> {
        let batch = self.collect().await?;
        let summary = RunSummary::from(&batch);

        tracing::info!(
            "Run on {} finished with status {}: {} records from {} pages",
            summary.site,
            summary.status,
            summary.records,
            summary.pages_visited
        );

        let receipt = sink.write(batch).await?;
        Ok(CrawlOutcome { summary, receipt })
    }

    /// Crawls the site and returns the frozen batch without delivering it
    pub async fn collect(&self) -> Result<CrawlBatch, GleanError> {
        let robots = self.load_robots().await?;
        if let Some(rules) = &robots {
            if !is_allowed(rules, &self.site.landing_url) {
                tracing::warn!("Robots.txt disallows {}", self.site.landing_url);
                return Err(GleanError::RobotsDenied {
                    url: self.site.landing_url.clone(),
                });
            }
        }
        let crawl_delay = robots.as_ref().and_then(|rules| rules.crawl_delay(ROBOTS_AGENT));
        let landing = Url::parse(&self.site.landing_url)?;

        let mut batch = BatchBuilder::new(self.site.id.as_str());
        if let Some(hash) = &self.config_hash {
            batch = batch.with_config_hash(hash.as_str());
        }

        tracing::info!(
            "Crawling {} from {} (at most {} pages)",
            self.site.label,
            self.site.landing_url,
            self.crawler.max_pages
        );

        let mut driver = PaginationDriver::new(self.crawler.max_pages);
        let status = match self
            .drive(&mut driver, &mut batch, &landing, robots.as_ref(), crawl_delay)
            .await
        {
            Ok(status) => status,
            Err(e) => {
                tracing::error!("Crawl of {} aborted: {}", self.site.id, e);
                batch.record_error(driver.page_number(), e.to_string());
                BatchStatus::failed(e.to_string())
            }
        };

        if let Some(cursor) = driver.take_cursor() {
            cursor.handle.close().await;
        }

        let frozen = batch.freeze(status);
        self.emit(CrawlEvent::Finished {
            status: frozen.status().clone(),
            records: frozen.len(),
            pages_visited: frozen.metadata().pages_visited,
        });
        Ok(frozen)
    }

    async fn drive(
        &self,
        driver: &mut PaginationDriver<DocumentHandle>,
        batch: &mut BatchBuilder,
        landing: &Url,
        robots: Option<&RobotsRules>,
        crawl_delay: Option<Duration>,
    ) -> Result<BatchStatus, GleanError> {
        let mut items_on_page = 0;

        loop {
            let page = driver.page_number();

            match driver.state() {
                DriverState::Fetching => {
                    if self.cancel.is_cancelled() {
                        return self.stop_cancelled(driver);
                    }

                    self.emit(CrawlEvent::PageStarted { page_number: page });

                    match self.fetch_page(driver).await {
                        Ok(handle) => {
                            if let Some(previous) = driver.rendered(handle)? {
                                previous.close().await;
                            }
                        }
                        Err(RetryError::Cancelled) => return self.stop_cancelled(driver),
                        Err(RetryError::Exhausted { attempts, last }) => {
                            let message = format!(
                                "page {} could not be loaded after {} attempts: {}",
                                page, attempts, last
                            );
                            tracing::error!("{}", message);
                            batch.record_error(page, message.clone());
                            self.emit(CrawlEvent::PageFailed {
                                page_number: page,
                                message: message.clone(),
                            });
                            driver.fail()?;
                            return Ok(BatchStatus::failed(message));
                        }
                    }
                }
                DriverState::Extracting => {
                    let Some(cursor) = driver.cursor() else {
                        return Err(GleanError::InvalidTransition {
                            from: DriverState::Extracting,
                            to: DriverState::Advancing,
                        });
                    };
                    items_on_page = self
                        .extract_page(page, cursor.handle.document(), batch, landing, robots)
                        .await;
                    driver.extracted()?;
                }
                DriverState::Advancing => {
                    // Details of the last page may have been skipped on cancellation
                    if self.cancel.is_cancelled() {
                        return self.stop_cancelled(driver);
                    }

                    let has_next = driver
                        .cursor()
                        .map_or(false, |cursor| self.has_next(cursor.handle.document(), items_on_page));

                    if driver.advance(has_next)? == DriverState::Fetching {
                        self.pause(crawl_delay).await;
                    }
                }
                DriverState::Done => {
                    tracing::info!("No further pages after page {}", page);
                    return Ok(BatchStatus::Done);
                }
                DriverState::Failed => return Ok(BatchStatus::failed(format!("page {} failed", page))),
            }
        }
    }

    fn stop_cancelled(
        &self,
        driver: &mut PaginationDriver<DocumentHandle>,
    ) -> Result<BatchStatus, GleanError> {
        tracing::warn!("Run cancelled on page {}", driver.page_number());
        driver.fail()?;
        Ok(BatchStatus::failed("cancelled"))
    }

    /// Renders the driver's current page
    async fn fetch_page(
        &self,
        driver: &mut PaginationDriver<DocumentHandle>,
    ) -> Result<DocumentHandle, RetryError> {
        let page = driver.page_number();
        let label = format!("page {}", page);

        if let (true, PaginationConfig::Click { next_selector }) = (page > 1, &self.site.pagination)
        {
            return match driver.take_cursor() {
                Some(cursor) => self.advance_in_place(cursor.handle, next_selector, &label).await,
                None => Err(RetryError::Exhausted {
                    attempts: 0,
                    last: NavigationError::unknown(&self.site.landing_url, "no page to advance from"),
                }),
            };
        }

        if let Some(previous) = driver.take_cursor() {
            previous.handle.close().await;
        }

        let url = self.page_url(page);
        self.open_with_retry(&url, &self.site.ready_selector, self.page_timeout(), &label)
            .await
    }

    /// Clicks through to the next page in the same tab
    ///
    /// A retry after a successful click keeps waiting for the new page
    /// instead of clicking again, so a slow page is never skipped.
    async fn advance_in_place(
        &self,
        handle: DocumentHandle,
        next_selector: &str,
        label: &str,
    ) -> Result<DocumentHandle, RetryError> {
        let tab = Mutex::new(handle);
        let tab_ref = &tab;
        let ready = self.site.ready_selector.as_str();
        let timeout = self.page_timeout();

        let result = self
            .retry
            .run(&self.cancel, &self.identities, label, |_, _| async move {
                let mut handle = tab_ref.lock().await;
                if handle.is_advancing() {
                    handle.refresh(ready, timeout).await
                } else {
                    handle.advance(next_selector, ready, timeout).await
                }
            })
            .await;

        let handle = tab.into_inner();
        match result {
            Ok(()) => Ok(handle),
            Err(e) => {
                handle.close().await;
                Err(e)
            }
        }
    }

    async fn open_with_retry(
        &self,
        url: &str,
        ready: &str,
        timeout: Duration,
        label: &str,
    ) -> Result<DocumentHandle, RetryError> {
        let pages = &self.pages;
        self.retry
            .run(&self.cancel, &self.identities, label, |_, identity| async move {
                pages.open(url, ready, timeout, &identity).await
            })
            .await
    }

    /// Extracts, enriches and appends the records of one list page
    ///
    /// Returns the number of items found on the page, duplicates included.
    async fn extract_page(
        &self,
        page: u32,
        doc: &Document,
        batch: &mut BatchBuilder,
        landing: &Url,
        robots: Option<&RobotsRules>,
    ) -> usize {
        batch.page_visited();

        let base = self.base_url(doc, landing);
        let extraction = extract_list_items(
            doc,
            &self.site.item_selector,
            &self.site.fields,
            &self.site.label,
            &base,
        );
        for warning in &extraction.warnings {
            self.warn(batch, page, warning.to_string());
        }

        let found = extraction.value.len();
        self.emit(CrawlEvent::PageExtracted {
            page_number: page,
            items: found,
        });
        tracing::info!("Page {}: {} items", page, found);

        let mut fresh: Vec<PartialRecord> = Vec::with_capacity(found);
        for item in extraction.value {
            if batch.claim(&item.url) {
                fresh.push(item);
            } else {
                self.warn(batch, page, format!("duplicate record skipped: {}", item.url));
            }
        }

        let details = self.fetch_details(&fresh, robots).await;

        for (item, detail) in fresh.into_iter().zip(details) {
            for warning in detail.warnings {
                self.warn(batch, page, warning);
            }

            let tags = self
                .tagger
                .tag(&format!("{} {}", item.title, detail.content), self.max_tags);
            let record = Record::new(item, detail.content, tags);

            self.emit(CrawlEvent::RecordExtracted {
                page_number: page,
                title: record.title().to_string(),
                url: record.url().to_string(),
            });
            batch.push(record);
        }

        found
    }

    /// Fetches detail content for every item, at most `detail-concurrency` at a time
    ///
    /// Results land in per-item slots, so the output order is the list order
    /// whatever order the fetches complete in.
    async fn fetch_details(
        &self,
        items: &[PartialRecord],
        robots: Option<&RobotsRules>,
    ) -> Vec<DetailSlot> {
        let mut slots = vec![DetailSlot::default(); items.len()];

        let mut completed = stream::iter(items.iter().enumerate())
            .map(|(index, item)| async move { (index, self.fetch_detail(item, robots).await) })
            .buffer_unordered(self.crawler.detail_concurrency.max(1));

        while let Some((index, slot)) = completed.next().await {
            slots[index] = slot;
        }

        slots
    }

    async fn fetch_detail(&self, item: &PartialRecord, robots: Option<&RobotsRules>) -> DetailSlot {
        // A missing link was already reported by the list extraction
        if item.url.is_empty() {
            return DetailSlot::default();
        }

        if self.cancel.is_cancelled() {
            return DetailSlot::degraded(format!("detail {} skipped: cancelled", item.url));
        }

        if robots.map_or(false, |rules| !is_allowed(rules, &item.url)) {
            return DetailSlot::degraded(format!(
                "detail {} skipped: disallowed by robots.txt",
                item.url
            ));
        }

        let label = format!("detail {}", item.url);
        let opened = self
            .open_with_retry(
                &item.url,
                &self.site.detail_ready_selector,
                Duration::from_millis(self.crawler.detail_timeout_ms),
                &label,
            )
            .await;

        match opened {
            Ok(handle) => {
                let extraction = extract_detail_content(handle.document(), &self.site.detail_selectors);
                handle.close().await;
                DetailSlot {
                    content: extraction.value,
                    warnings: extraction.warnings.iter().map(ToString::to_string).collect(),
                }
            }
            Err(RetryError::Cancelled) => {
                DetailSlot::degraded(format!("detail {} skipped: cancelled", item.url))
            }
            Err(e) => DetailSlot::degraded(format!("detail {}: {}", item.url, e)),
        }
    }

    fn has_next(&self, doc: &Document, items_on_page: usize) -> bool {
        match &self.site.pagination {
            PaginationConfig::Single => false,
            PaginationConfig::Click { next_selector } => next_control(doc, next_selector).is_enabled(),
            PaginationConfig::UrlTemplate { next_selector, .. } => {
                items_on_page > 0
                    && next_selector
                        .as_deref()
                        .map_or(true, |selector| next_control(doc, selector).is_enabled())
            }
        }
    }

    /// Randomized pause before the next page; returns early on cancellation
    async fn pause(&self, crawl_delay: Option<Duration>) {
        let min = self.crawler.inter_page_delay_min_ms;
        let max = self.crawler.inter_page_delay_max_ms.max(min);
        let jittered = Duration::from_millis(rand::thread_rng().gen_range(min..=max));
        let delay = crawl_delay.map_or(jittered, |floor| jittered.max(floor));

        if delay.is_zero() {
            return;
        }

        tracing::debug!("Pausing {:?} before the next page", delay);
        tokio::select! {
            _ = self.cancel.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    async fn load_robots(&self) -> Result<Option<RobotsRules>, GleanError> {
        if let Some(rules) = &self.robots {
            return Ok(Some(rules.clone()));
        }
        if !self.crawler.respect_robots {
            return Ok(None);
        }

        let client = build_http_client(self.identities.current().user_agent.as_deref())?;
        Ok(Some(fetch_robots(&client, &self.site.landing_url).await?))
    }

    fn page_url(&self, page: u32) -> String {
        match &self.site.pagination {
            PaginationConfig::UrlTemplate { template, .. } if page > 1 => {
                expand_template(template, page)
            }
            _ => self.site.landing_url.clone(),
        }
    }

    /// Base for relative links: the configured base, else the page, else the landing URL
    fn base_url(&self, doc: &Document, landing: &Url) -> Url {
        self.site
            .base_url
            .as_deref()
            .and_then(|base| Url::parse(base).ok())
            .or_else(|| Url::parse(&doc.url).ok())
            .unwrap_or_else(|| landing.clone())
    }

    fn page_timeout(&self) -> Duration {
        Duration::from_millis(self.crawler.page_timeout_ms)
    }

    fn warn(&self, batch: &mut BatchBuilder, page: u32, message: String) {
        tracing::warn!("Page {}: {}", page, message);
        self.emit(CrawlEvent::Warning {
            page_number: page,
            message: message.clone(),
        });
        batch.record_warning(page, message);
    }

    fn emit(&self, event: CrawlEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is listening
            let _ = events.send(event);
        }
    }
}
