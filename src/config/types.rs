use serde::Deserialize;

/// Main configuration structure for Gleaner
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub tagger: TaggerConfig,
    pub output: OutputConfig,
    #[serde(rename = "site", default)]
    pub sites: Vec<SiteProfile>,
}

impl Config {
    /// Resolves the site profile to crawl
    ///
    /// An explicit `id` wins, then `crawler.site`, then the only configured
    /// site when there is exactly one.
    pub fn site(&self, id: Option<&str>) -> Result<&SiteProfile, crate::ConfigError> {
        let wanted = id.or(self.crawler.site.as_deref());

        match wanted {
            Some(id) => self
                .sites
                .iter()
                .find(|site| site.id == id)
                .ok_or_else(|| crate::ConfigError::UnknownSite(id.to_string())),
            None if self.sites.len() == 1 => Ok(&self.sites[0]),
            None => Err(crate::ConfigError::Validation(format!(
                "{} sites configured; choose one with crawler.site or --site",
                self.sites.len()
            ))),
        }
    }
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Default site id to crawl
    #[serde(default)]
    pub site: Option<String>,

    /// Hard ceiling on list pages visited in one run
    #[serde(rename = "max-pages")]
    pub max_pages: u32,

    /// Time allowed for a list page to become ready (milliseconds)
    #[serde(rename = "page-timeout-ms", default = "default_timeout_ms")]
    pub page_timeout_ms: u64,

    /// Time allowed for a detail page to become ready (milliseconds)
    #[serde(rename = "detail-timeout-ms", default = "default_timeout_ms")]
    pub detail_timeout_ms: u64,

    /// Lower bound of the randomized pause before advancing (milliseconds)
    #[serde(rename = "inter-page-delay-min-ms", default = "default_delay_min_ms")]
    pub inter_page_delay_min_ms: u64,

    /// Upper bound of the randomized pause before advancing (milliseconds)
    #[serde(rename = "inter-page-delay-max-ms", default = "default_delay_max_ms")]
    pub inter_page_delay_max_ms: u64,

    /// Number of detail pages fetched in parallel for one list page
    #[serde(rename = "detail-concurrency", default = "default_detail_concurrency")]
    pub detail_concurrency: usize,

    /// Whether robots.txt is consulted before browsing
    #[serde(rename = "respect-robots", default)]
    pub respect_robots: bool,

    /// Directory for diagnostic screenshots of failed renders
    #[serde(rename = "snapshot-dir", default)]
    pub snapshot_dir: Option<String>,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_delay_min_ms() -> u64 {
    3_000
}

fn default_delay_max_ms() -> u64 {
    7_000
}

fn default_detail_concurrency() -> usize {
    1
}

/// Bounded retry policy applied around every network step
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default)]
    pub backoff: BackoffKind,

    /// Base delay between attempts (milliseconds)
    #[serde(rename = "delay-ms", default = "default_retry_delay_ms")]
    pub delay_ms: u64,

    /// Cap for exponential backoff (milliseconds)
    #[serde(rename = "max-delay-ms", default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff: BackoffKind::default(),
            delay_ms: default_retry_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    5_000
}

fn default_retry_max_delay_ms() -> u64 {
    60_000
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackoffKind {
    #[default]
    Fixed,
    Exponential,
}

/// Outbound identity pool
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IdentityConfig {
    #[serde(rename = "user-agents", default)]
    pub user_agents: Vec<String>,

    /// Proxy servers in `scheme://host:port` form
    #[serde(default)]
    pub proxies: Vec<String>,

    #[serde(default)]
    pub rotate: RotationMode,
}

/// When the identity pool advances to its next entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RotationMode {
    /// Only after an access-denial page
    #[default]
    OnBlocked,
    /// Before every retry attempt
    EveryAttempt,
}

/// Headless browser settings
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserSettings {
    #[serde(default = "default_true")]
    pub headless: bool,

    /// Path to a Chrome/Chromium binary; auto-detected when absent
    #[serde(default)]
    pub executable: Option<String>,

    /// Title or body text that identifies an access-denial page
    #[serde(rename = "denial-markers", default = "default_denial_markers")]
    pub denial_markers: Vec<String>,

    /// Interval between readiness checks (milliseconds)
    #[serde(rename = "ready-poll-ms", default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            executable: None,
            denial_markers: default_denial_markers(),
            ready_poll_ms: default_ready_poll_ms(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_denial_markers() -> Vec<String> {
    vec!["Access Denied".to_string(), "403 Forbidden".to_string()]
}

fn default_ready_poll_ms() -> u64 {
    250
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaggerConfig {
    #[serde(rename = "max-tags", default = "default_max_tags")]
    pub max_tags: usize,
}

impl Default for TaggerConfig {
    fn default() -> Self {
        Self {
            max_tags: default_max_tags(),
        }
    }
}

fn default_max_tags() -> usize {
    5
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(flatten)]
    pub sink: SinkConfig,

    /// Path to the markdown run report
    #[serde(rename = "summary-path", default)]
    pub summary_path: Option<String>,
}

/// Where the frozen batch is delivered
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "sink", rename_all = "kebab-case")]
pub enum SinkConfig {
    File {
        path: String,
    },
    ObjectStore {
        /// Local directory standing in for a bucket
        #[serde(default)]
        directory: Option<String>,
        /// HTTP endpoint accepting `PUT {endpoint}/{key}`
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(rename = "key-prefix")]
        key_prefix: String,
    },
    Sqlite {
        #[serde(rename = "database-path")]
        database_path: String,
    },
}

/// Per-site extraction profile
#[derive(Debug, Clone, Deserialize)]
pub struct SiteProfile {
    pub id: String,

    /// Source label used when a record carries no source of its own
    pub label: String,

    #[serde(rename = "landing-url")]
    pub landing_url: String,

    /// Base for resolving relative detail links; the page URL otherwise
    #[serde(rename = "base-url", default)]
    pub base_url: Option<String>,

    /// Selector whose presence marks a list page as rendered
    #[serde(rename = "ready-selector")]
    pub ready_selector: String,

    #[serde(rename = "item-selector")]
    pub item_selector: String,

    #[serde(default)]
    pub fields: FieldSelectors,

    /// Ordered fallback chain for detail page body text
    #[serde(rename = "detail-selectors", default = "default_detail_selectors")]
    pub detail_selectors: Vec<String>,

    #[serde(rename = "detail-ready-selector", default = "default_detail_ready")]
    pub detail_ready_selector: String,

    #[serde(default)]
    pub pagination: PaginationConfig,
}

fn default_detail_selectors() -> Vec<String> {
    ["main", "article", "body"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_detail_ready() -> String {
    "body".to_string()
}

/// Selectors evaluated relative to each list item
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldSelectors {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    /// Link element; the item's own `href` (or first `a[href]`) when absent
    #[serde(default)]
    pub link: Option<String>,
}

/// How the crawler reaches the next list page
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PaginationConfig {
    /// Only the landing page is visited
    #[default]
    #[serde(rename = "none")]
    Single,
    Click {
        #[serde(rename = "next-selector")]
        next_selector: String,
    },
    UrlTemplate {
        /// URL containing a `{page}` placeholder
        template: String,
        #[serde(rename = "next-selector", default)]
        next_selector: Option<String>,
    },
}
