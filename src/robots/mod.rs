//! Robots.txt handling
//!
//! Robots.txt is fetched once per run from the site's origin and consulted
//! for the landing URL and every detail link.

mod parser;

pub use parser::RobotsRules;

use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Product token matched against robots.txt user-agent groups
pub const ROBOTS_AGENT: &str = "gleaner";

/// Builds the HTTP client used for robots.txt and object store requests
pub fn build_http_client(user_agent: Option<&str>) -> Result<Client, reqwest::Error> {
    let agent = user_agent
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}/{}", ROBOTS_AGENT, env!("CARGO_PKG_VERSION")));

    Client::builder()
        .user_agent(agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches robots.txt for the origin of `site_url`
///
/// # Arguments
///
/// * `client` - HTTP client to use
/// * `site_url` - Any URL on the site; only its origin is used
///
/// # Returns
///
/// * `Ok(RobotsRules)` - The served rules. A missing file, a client error
///   status, a server error or an unreachable host all yield rules that
///   allow everything; the latter two are logged as warnings.
/// * `Err(GleanError)` - `site_url` has no usable origin
pub async fn fetch_robots(client: &Client, site_url: &str) -> crate::Result<RobotsRules> {
    let robots_url = Url::parse(site_url)?.join("/robots.txt")?;

    let response = match client.get(robots_url.as_str()).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("Could not fetch {}: {}; assuming no rules", robots_url, e);
            return Ok(RobotsRules::allow_all());
        }
    };

    let status = response.status();
    if status.is_success() {
        let body = response.text().await.map_err(|source| crate::GleanError::Http {
            url: robots_url.to_string(),
            source,
        })?;
        tracing::info!("Loaded robots.txt from {}", robots_url);
        return Ok(RobotsRules::from_content(&body));
    }

    if status.is_server_error() {
        tracing::warn!("{} returned {}; assuming no rules", robots_url, status);
    } else if status != StatusCode::NOT_FOUND {
        tracing::info!("{} returned {}; assuming no rules", robots_url, status);
    }
    Ok(RobotsRules::allow_all())
}

/// Checks whether the crawler may fetch `url`
pub fn is_allowed(rules: &RobotsRules, url: &str) -> bool {
    rules.is_allowed(url, ROBOTS_AGENT)
}
