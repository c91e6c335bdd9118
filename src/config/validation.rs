use crate::config::types::{
    Config, CrawlerConfig, IdentityConfig, OutputConfig, PaginationConfig, RetryConfig,
    SinkConfig, SiteProfile,
};
use crate::ConfigError;
use scraper::Selector;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_retry_config(&config.retry)?;
    validate_identity_config(&config.identity)?;
    validate_output_config(&config.output)?;

    if config.tagger.max_tags < 1 {
        return Err(ConfigError::Validation(
            "tagger.max-tags must be >= 1".to_string(),
        ));
    }

    if config.browser.ready_poll_ms < 10 {
        return Err(ConfigError::Validation(format!(
            "browser.ready-poll-ms must be >= 10ms, got {}ms",
            config.browser.ready_poll_ms
        )));
    }

    validate_sites(&config.sites)?;

    if let Some(site) = &config.crawler.site {
        if !config.sites.iter().any(|s| &s.id == site) {
            return Err(ConfigError::UnknownSite(site.clone()));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.max_pages < 1 {
        return Err(ConfigError::Validation(format!(
            "max-pages must be >= 1, got {}",
            config.max_pages
        )));
    }

    if config.page_timeout_ms < 100 || config.detail_timeout_ms < 100 {
        return Err(ConfigError::Validation(format!(
            "page and detail timeouts must be >= 100ms, got {}ms and {}ms",
            config.page_timeout_ms, config.detail_timeout_ms
        )));
    }

    if config.inter_page_delay_min_ms > config.inter_page_delay_max_ms {
        return Err(ConfigError::Validation(format!(
            "inter-page-delay-min-ms ({}) exceeds inter-page-delay-max-ms ({})",
            config.inter_page_delay_min_ms, config.inter_page_delay_max_ms
        )));
    }

    if config.detail_concurrency < 1 || config.detail_concurrency > 16 {
        return Err(ConfigError::Validation(format!(
            "detail-concurrency must be between 1 and 16, got {}",
            config.detail_concurrency
        )));
    }

    Ok(())
}

fn validate_retry_config(config: &RetryConfig) -> Result<(), ConfigError> {
    if config.max_attempts < 1 || config.max_attempts > 10 {
        return Err(ConfigError::Validation(format!(
            "retry.max-attempts must be between 1 and 10, got {}",
            config.max_attempts
        )));
    }

    if config.max_delay_ms < config.delay_ms {
        return Err(ConfigError::Validation(format!(
            "retry.max-delay-ms ({}) is below retry.delay-ms ({})",
            config.max_delay_ms, config.delay_ms
        )));
    }

    Ok(())
}

fn validate_identity_config(config: &IdentityConfig) -> Result<(), ConfigError> {
    if config.user_agents.iter().any(|ua| ua.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "identity.user-agents cannot contain empty entries".to_string(),
        ));
    }

    for proxy in &config.proxies {
        Url::parse(proxy)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid proxy '{}': {}", proxy, e)))?;
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    match &config.sink {
        SinkConfig::File { path } if path.is_empty() => {
            return Err(ConfigError::Validation(
                "output.path cannot be empty".to_string(),
            ));
        }
        SinkConfig::ObjectStore {
            directory,
            endpoint,
            key_prefix,
        } => {
            if directory.is_some() == endpoint.is_some() {
                return Err(ConfigError::Validation(
                    "object-store output needs exactly one of directory or endpoint".to_string(),
                ));
            }
            if key_prefix.is_empty() {
                return Err(ConfigError::Validation(
                    "output.key-prefix cannot be empty".to_string(),
                ));
            }
            if let Some(endpoint) = endpoint {
                validate_http_url(endpoint, "output.endpoint")?;
            }
        }
        SinkConfig::Sqlite { database_path } if database_path.is_empty() => {
            return Err(ConfigError::Validation(
                "output.database-path cannot be empty".to_string(),
            ));
        }
        _ => {}
    }

    if matches!(&config.summary_path, Some(path) if path.is_empty()) {
        return Err(ConfigError::Validation(
            "output.summary-path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_sites(sites: &[SiteProfile]) -> Result<(), ConfigError> {
    if sites.is_empty() {
        return Err(ConfigError::Validation(
            "At least one [[site]] must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for site in sites {
        if site.id.is_empty() {
            return Err(ConfigError::Validation("site id cannot be empty".to_string()));
        }
        if !seen.insert(site.id.as_str()) {
            return Err(ConfigError::Validation(format!(
                "Duplicate site id '{}'",
                site.id
            )));
        }
        validate_site(site)?;
    }

    Ok(())
}

/// Validates one site profile: URLs, selectors and pagination
fn validate_site(site: &SiteProfile) -> Result<(), ConfigError> {
    validate_http_url(&site.landing_url, "landing-url")?;
    if let Some(base) = &site.base_url {
        validate_http_url(base, "base-url")?;
    }

    validate_selector(&site.ready_selector)?;
    validate_selector(&site.item_selector)?;
    validate_selector(&site.detail_ready_selector)?;

    let fields = &site.fields;
    for selector in [&fields.title, &fields.date, &fields.source, &fields.link]
        .into_iter()
        .flatten()
    {
        validate_selector(selector)?;
    }

    if site.detail_selectors.is_empty() {
        return Err(ConfigError::Validation(format!(
            "Site '{}' must have at least one detail selector",
            site.id
        )));
    }
    for selector in &site.detail_selectors {
        validate_selector(selector)?;
    }

    match &site.pagination {
        PaginationConfig::Single => {}
        PaginationConfig::Click { next_selector } => validate_selector(next_selector)?,
        PaginationConfig::UrlTemplate {
            template,
            next_selector,
        } => {
            if !template.contains("{page}") {
                return Err(ConfigError::Validation(format!(
                    "Pagination template '{}' must contain a {{page}} placeholder",
                    template
                )));
            }
            validate_http_url(&template.replace("{page}", "1"), "pagination template")?;
            if let Some(selector) = next_selector {
                validate_selector(selector)?;
            }
        }
    }

    Ok(())
}

fn validate_http_url(value: &str, field: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} '{}' must use http or https",
            field, value
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;

    const MINIMAL: &str = r#"
[crawler]
max-pages = 3

[output]
sink = "file"
path = "out.json"

[[site]]
id = "fsra"
label = "FSRA"
landing-url = "https://example.com/news"
ready-selector = ".item"
item-selector = ".item"
"#;

    #[test]
    fn test_minimal_config_is_valid() {
        assert!(parse_config(MINIMAL).is_ok());
    }

    #[test]
    fn test_validate_selector() {
        assert!(validate_selector(".element.level3").is_ok());
        assert!(validate_selector("a[href]").is_ok());
        assert!(validate_selector(".bottom-nav:not(.disabled)").is_ok());

        assert!(validate_selector("").is_err());
        assert!(validate_selector("[[[").is_err());
    }

    #[test]
    fn test_validate_http_url() {
        assert!(validate_http_url("https://www.adgm.com/", "url").is_ok());
        assert!(validate_http_url("http://localhost:8080/x", "url").is_ok());

        assert!(validate_http_url("ftp://example.com", "url").is_err());
        assert!(validate_http_url("not a url", "url").is_err());
    }

    #[test]
    fn test_rejects_bad_selector() {
        let content = MINIMAL.replace("item-selector = \".item\"", "item-selector = \"[[\"");
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::InvalidSelector(_))
        ));
    }

    #[test]
    fn test_rejects_delay_range() {
        let content = MINIMAL.replace(
            "max-pages = 3",
            "max-pages = 3\ninter-page-delay-min-ms = 9000\ninter-page-delay-max-ms = 1000",
        );
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_rejects_template_without_placeholder() {
        let content = format!(
            "{}\n[site.pagination]\nmode = \"url-template\"\ntemplate = \"https://example.com/news\"\n",
            MINIMAL
        );
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));

        let content = format!(
            "{}\n[site.pagination]\nmode = \"url-template\"\ntemplate = \"https://example.com/news?page={{page}}\"\n",
            MINIMAL
        );
        assert!(parse_config(&content).is_ok());
    }

    #[test]
    fn test_rejects_unknown_default_site() {
        let content = MINIMAL.replace("max-pages = 3", "max-pages = 3\nsite = \"vara\"");
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::UnknownSite(_))
        ));
    }

    #[test]
    fn test_rejects_duplicate_site_ids() {
        let second = &MINIMAL[MINIMAL.find("[[site]]").unwrap()..];
        let content = format!("{}{}", MINIMAL, second);
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_object_store_needs_one_target() {
        let content = MINIMAL.replace(
            "sink = \"file\"\npath = \"out.json\"",
            "sink = \"object-store\"\nkey-prefix = \"announcements/adgm\"",
        );
        assert!(matches!(
            parse_config(&content),
            Err(ConfigError::Validation(_))
        ));

        let content = MINIMAL.replace(
            "sink = \"file\"\npath = \"out.json\"",
            "sink = \"object-store\"\nkey-prefix = \"announcements/adgm\"\ndirectory = \"/tmp/bucket\"",
        );
        assert!(parse_config(&content).is_ok());
    }
}
