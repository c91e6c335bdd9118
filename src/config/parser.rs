use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Reads, parses and validates the TOML file at `path`
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use gleaner::config::load_config;
///
/// let config = load_config(Path::new("gleaner.toml")).unwrap();
/// println!("Max pages: {}", config.crawler.max_pages);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_hash(path).map(|(config, _)| config)
}

/// Parses and validates configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    Ok(config)
}

/// Hex SHA-256 of the file at `path`, as stamped on every batch
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(hash_content(&std::fs::read_to_string(path)?))
}

/// Loads a configuration together with the hash of the exact text parsed
///
/// # Returns
///
/// * `Ok((Config, String))` - Validated configuration and its hex SHA-256
/// * `Err(ConfigError)` - The file could not be read, parsed or validated
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    Ok((config, hash_content(&content)))
}

fn hash_content(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PaginationConfig, SinkConfig};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    const VALID_CONFIG: &str = r#"
[crawler]
site = "adgm"
max-pages = 5
page-timeout-ms = 60000
detail-concurrency = 4

[retry]
max-attempts = 3
backoff = "exponential"
delay-ms = 2000

[identity]
user-agents = ["Mozilla/5.0 (Windows NT 10.0; Win64; x64)"]
rotate = "every-attempt"

[output]
sink = "file"
path = "./adgm_announcements.json"
summary-path = "./summary.md"

[[site]]
id = "adgm"
label = "ADGM"
landing-url = "https://www.adgm.com/media/announcements"
base-url = "https://www.adgm.com"
ready-selector = ".element.level3"
item-selector = ".element.level3"
detail-selectors = [".announcement-content", ".content-area", "main", "article", "body"]

[site.fields]
title = ".subhead-2.cl-black.level3"
date = ".date-1.cl-gray9"
source = ".title .helvetica-light"

[site.pagination]
mode = "click"
next-selector = ".bottom-nav__item_revert:not(.disabled)"

[[site]]
id = "vara"
label = "VARA"
landing-url = "https://www.vara.ae/en/news/"
ready-selector = "body"
item-selector = ".news-item"

[site.fields]
title = "h3"
date = ".date"
link = "a"
"#;

    #[test]
    fn test_load_valid_config() {
        let file = create_temp_config(VALID_CONFIG);
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.crawler.max_pages, 5);
        assert_eq!(config.crawler.detail_concurrency, 4);
        assert_eq!(config.crawler.detail_timeout_ms, 30_000);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.sites.len(), 2);
        assert!(matches!(config.output.sink, SinkConfig::File { .. }));
        assert_eq!(config.output.summary_path.as_deref(), Some("./summary.md"));
        assert_eq!(config.browser.denial_markers.len(), 2);
    }

    #[test]
    fn test_site_selection() {
        let config = parse_config(VALID_CONFIG).unwrap();

        let default_site = config.site(None).unwrap();
        assert_eq!(default_site.id, "adgm");
        assert!(matches!(
            default_site.pagination,
            PaginationConfig::Click { .. }
        ));

        let vara = config.site(Some("vara")).unwrap();
        assert_eq!(vara.label, "VARA");
        assert!(matches!(vara.pagination, PaginationConfig::Single));
        assert_eq!(vara.detail_selectors, vec!["main", "article", "body"]);

        assert!(matches!(
            config.site(Some("fab")),
            Err(ConfigError::UnknownSite(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config(Path::new("/nonexistent/gleaner.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let file = create_temp_config("[crawler\nmax-pages = ");
        assert!(matches!(load_config(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_page_ceiling_rejected() {
        let file = create_temp_config(&VALID_CONFIG.replace("max-pages = 5", "max-pages = 0"));
        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_hash_tracks_file_text() {
        let file = create_temp_config(VALID_CONFIG);
        let (_, hash) = load_config_with_hash(file.path()).unwrap();

        assert_eq!(hash.len(), 64);
        assert_eq!(hash, compute_config_hash(file.path()).unwrap());

        // Any edit to the selector set changes the stamp
        let edited = create_temp_config(&VALID_CONFIG.replace("h3", "h2"));
        assert_ne!(hash, compute_config_hash(edited.path()).unwrap());
    }
}
