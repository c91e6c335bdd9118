//! Robots.txt rules for a single site
//!
//! Matching is delegated to the robotstxt crate. The crawl delay directive,
//! which that crate does not expose, is read directly from the text.

use robotstxt::DefaultMatcher;
use std::time::Duration;

/// Robots.txt rules as served by one site
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    /// Raw robots.txt body; empty allows everything
    body: String,
}

impl RobotsRules {
    /// Rules parsed from a robots.txt body
    pub fn from_content(body: &str) -> Self {
        Self {
            body: body.to_string(),
        }
    }

    /// Rules that allow every URL, used when a site has no robots.txt
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Checks whether `agent` may fetch the absolute `url`
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.is_empty() {
            return true;
        }
        DefaultMatcher::default().one_agent_allowed_by_robots(&self.body, agent, url)
    }

    /// Crawl delay that applies to `agent`
    ///
    /// A group naming the agent takes precedence over the `*` group.
    pub fn crawl_delay(&self, agent: &str) -> Option<Duration> {
        let agent = agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut specific = None;
        let mut wildcard = None;

        for line in self.body.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "user-agent" => {
                    // A user-agent line after rules opens a new group
                    if in_rules {
                        group.clear();
                        in_rules = false;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Ok(seconds) = value.parse::<f64>() else {
                        continue;
                    };
                    if !seconds.is_finite() || seconds < 0.0 {
                        continue;
                    }
                    let delay = Duration::from_secs_f64(seconds);
                    if group.iter().any(|name| *name == agent) {
                        specific = Some(delay);
                    } else if group.iter().any(|name| name == "*") {
                        wildcard = Some(delay);
                    }
                }
                _ => in_rules = true,
            }
        }

        specific.or(wildcard)
    }
}
