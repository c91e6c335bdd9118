use crate::UrlError;
use url::Url;

/// Query parameters that never identify an announcement
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "mc_eid", "_ga"];

/// Computes the key under which a record URL is deduplicated within a batch
///
/// # Normalization Steps
///
/// 1. Parse the URL; only http and https are accepted
/// 2. Fold the scheme to https and lowercase the host without `www.`
/// 3. Drop dot segments, repeated slashes and the trailing slash
/// 4. Drop the fragment and tracking parameters, sort the remaining query
///
/// # Examples
///
/// ```
/// use gleaner::url::dedup_key;
///
/// let a = dedup_key("http://WWW.ADGM.com/media/item/?utm_source=x#top").unwrap();
/// let b = dedup_key("https://adgm.com/media/item").unwrap();
/// assert_eq!(a, b);
/// ```
pub fn dedup_key(raw: &str) -> Result<String, UrlError> {
    let url = Url::parse(raw.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .map(|h| h.to_lowercase())
        .ok_or(UrlError::MissingDomain)?;
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let mut key = format!("https://{}", host);
    if let Some(port) = url.port() {
        key.push_str(&format!(":{}", port));
    }
    key.push_str(&collapse_path(url.path()));

    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();

    if !params.is_empty() {
        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        key.push('?');
        key.push_str(&query);
    }

    Ok(key)
}

/// Resolves a possibly relative link against a base URL
///
/// Returns `None` for empty links and for targets that are not web pages
/// (`javascript:`, `mailto:`, `tel:`, bare fragments).
pub fn resolve_link(base: &Url, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

fn collapse_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("/{}", segments.join("/"))
}

fn is_tracking_param(key: &str) -> bool {
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key)
}
