use crate::{
    data::{SourceKind, SourceType},
    error::HarvestError,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path, path::PathBuf, time::Duration};

pub const DEFAULT_QUERY: &str = "data scientist";
pub const DEFAULT_LOCATION: &str = "United States";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0";

/// Pagination, retry and throttle settings of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePolicy {
    pub max_pages: u32,
    pub max_retries: u32,
    pub inter_page_delay_ms: u64,
    pub retry_backoff_ms: u64,
    pub concurrency: usize,
}

impl SourcePolicy {
    pub fn for_kind(kind: SourceKind) -> Self {
        match kind.source_type() {
            SourceType::StaticHtml => SourcePolicy {
                max_pages: 10,
                max_retries: 2,
                inter_page_delay_ms: 0,
                retry_backoff_ms: 500,
                concurrency: 4,
            },
            SourceType::Browser => SourcePolicy {
                max_pages: 5,
                max_retries: 2,
                inter_page_delay_ms: 3000,
                retry_backoff_ms: 500,
                concurrency: 1,
            },
            SourceType::Feed => SourcePolicy {
                max_pages: 1,
                max_retries: 2,
                inter_page_delay_ms: 0,
                retry_backoff_ms: 500,
                concurrency: 2,
            },
        }
    }

    /// No delays at all; what unit tests run with.
    pub fn immediate(max_pages: u32, max_retries: u32, concurrency: usize) -> Self {
        SourcePolicy {
            max_pages,
            max_retries,
            inter_page_delay_ms: 0,
            retry_backoff_ms: 0,
            concurrency,
        }
    }

    pub fn inter_page_delay(&self) -> Duration {
        Duration::from_millis(self.inter_page_delay_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    /// Total fetch attempts for one page.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for SourcePolicy {
    fn default() -> Self {
        SourcePolicy::for_kind(SourceKind::Bayt)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_agent: String,
    pub wait_timeout_ms: u64,
    /// Marker the site renders instead of listings when a search has no results.
    pub no_results_selector: Option<String>,
    /// Treat a listing wait timeout as the end of results rather than a failed page.
    pub timeout_is_empty: bool,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        BrowserSettings {
            headless: true,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            wait_timeout_ms: 10_000,
            no_results_selector: None,
            timeout_is_empty: true,
        }
    }
}

impl BrowserSettings {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub results_per_page: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        FeedSettings {
            endpoint: "http://localhost:8000".to_string(),
            api_key: None,
            results_per_page: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub queries: Vec<String>,
    pub sources: Vec<SourceKind>,
    pub location: String,
    pub deadline_secs: Option<u64>,
    pub policies: BTreeMap<SourceKind, SourcePolicy>,
    pub browser: BrowserSettings,
    pub feed: FeedSettings,
    pub csv: Option<PathBuf>,
    pub sqlite: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            queries: vec![DEFAULT_QUERY.to_string()],
            sources: SourceKind::ALL.to_vec(),
            location: DEFAULT_LOCATION.to_string(),
            deadline_secs: None,
            policies: BTreeMap::new(),
            browser: BrowserSettings::default(),
            feed: FeedSettings::default(),
            csv: None,
            sqlite: None,
        }
    }
}

/// Values given on the command line; each one set replaces the file value.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub queries: Vec<String>,
    pub sources: Vec<SourceKind>,
    pub max_pages: Option<u32>,
    pub concurrency: Option<usize>,
    pub retries: Option<u32>,
    pub deadline_secs: Option<u64>,
    pub location: Option<String>,
    pub csv: Option<PathBuf>,
    pub sqlite: Option<PathBuf>,
    pub feed_endpoint: Option<String>,
}

impl RunConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, HarvestError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn policy(&self, kind: SourceKind) -> SourcePolicy {
        self.policies
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| SourcePolicy::for_kind(kind))
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    pub fn apply(mut self, o: Overrides) -> Self {
        if !o.queries.is_empty() {
            self.queries = o.queries;
        }
        if !o.sources.is_empty() {
            self.sources = o.sources;
        }
        for kind in SourceKind::ALL {
            if o.max_pages.is_none() && o.concurrency.is_none() && o.retries.is_none() {
                break;
            }
            let mut policy = self.policy(kind);
            if let Some(n) = o.max_pages {
                policy.max_pages = n;
            }
            if let Some(n) = o.concurrency {
                policy.concurrency = n;
            }
            if let Some(n) = o.retries {
                policy.max_retries = n;
            }
            self.policies.insert(kind, policy);
        }
        if o.deadline_secs.is_some() {
            self.deadline_secs = o.deadline_secs;
        }
        if let Some(location) = o.location {
            self.location = location;
        }
        if o.csv.is_some() {
            self.csv = o.csv;
        }
        if o.sqlite.is_some() {
            self.sqlite = o.sqlite;
        }
        if let Some(endpoint) = o.feed_endpoint {
            self.feed.endpoint = endpoint;
        }
        self
    }

    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.queries.iter().all(|q| q.trim().is_empty()) {
            return Err(HarvestError::Config("no search queries given".into()));
        }
        if self.sources.is_empty() {
            return Err(HarvestError::Config("no sources enabled".into()));
        }
        for kind in &self.sources {
            if self.policy(*kind).concurrency == 0 {
                return Err(HarvestError::Config(format!(
                    "concurrency for {} must be greater than 0",
                    kind
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn browser_source_is_throttled_hardest() {
        let browser = SourcePolicy::for_kind(SourceKind::Naukrigulf);
        let html = SourcePolicy::for_kind(SourceKind::Bayt);
        let feed = SourcePolicy::for_kind(SourceKind::Indeed);
        assert!(browser.inter_page_delay() > html.inter_page_delay());
        assert!(browser.concurrency < html.concurrency);
        assert_eq!(feed.inter_page_delay(), Duration::ZERO);
        assert_eq!(html.attempts(), 3);
    }

    #[test]
    fn huge_retry_count_saturates() {
        let policy = SourcePolicy::immediate(1, u32::MAX, 1);
        assert_eq!(policy.attempts(), u32::MAX);
    }

    #[test]
    fn partial_config_file_keeps_defaults() {
        let config: RunConfig = serde_json::from_str(
            r#"{
                "queries": ["AI Engineer", "HR Manager"],
                "sources": ["bayt", "linkedin"],
                "policies": { "bayt": { "max_pages": 3 } },
                "browser": { "no_results_selector": ".srp-zero" }
            }"#,
        )
        .unwrap();

        assert_eq!(config.queries, vec!["AI Engineer", "HR Manager"]);
        assert_eq!(config.sources, vec![SourceKind::Bayt, SourceKind::LinkedIn]);
        assert_eq!(config.location, DEFAULT_LOCATION);
        assert_eq!(config.policy(SourceKind::Bayt).max_pages, 3);
        assert_eq!(config.policy(SourceKind::Bayt).concurrency, 4);
        assert_eq!(
            config.policy(SourceKind::Naukrigulf),
            SourcePolicy::for_kind(SourceKind::Naukrigulf)
        );
        assert_eq!(config.browser.no_results_selector.as_deref(), Some(".srp-zero"));
        assert!(config.browser.timeout_is_empty);
    }

    #[test]
    fn overrides_replace_file_values() {
        let config = RunConfig::default().apply(Overrides {
            queries: vec!["devops engineer".into()],
            retries: Some(0),
            deadline_secs: Some(60),
            ..Default::default()
        });

        assert_eq!(config.queries, vec!["devops engineer"]);
        assert_eq!(config.sources, SourceKind::ALL.to_vec());
        for kind in SourceKind::ALL {
            assert_eq!(config.policy(kind).max_retries, 0);
            assert_eq!(
                config.policy(kind).max_pages,
                SourcePolicy::for_kind(kind).max_pages
            );
        }
        assert_eq!(config.deadline(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn validate_rejects_empty_runs() {
        let mut config = RunConfig::default();
        assert!(config.validate().is_ok());

        config.queries = vec!["  ".into()];
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));

        let config = RunConfig::default().apply(Overrides {
            concurrency: Some(0),
            ..Default::default()
        });
        assert!(matches!(config.validate(), Err(HarvestError::Config(_))));
    }
}
