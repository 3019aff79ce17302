//! Run configuration.
//!
//! Values come from built-in defaults, then an optional TOML file
//! (`~/.config/trawl/config.toml` unless another path is given), then command-line overrides.
//!
//! ```toml
//! [extractor]
//! max-transient-retries = 2
//! transient-retry-delay = 5.0
//! expand-related = false
//! rate-limit-wait-source = "header"
//!
//! [session]
//! cookies = { c_user = "100000000000000", xs = "..." }
//!
//! [archive]
//! path = "~/.local/share/trawl/archive.sqlite3"
//! ```

use crate::error::{CoreError, Result};
use crate::session::Session;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, trace};
use trawl_scanner::{AccessPolicy, Client, RateLimitWait, TraversalOptions};

/// Default location of the configuration file, before tilde expansion.
pub const DEFAULT_CONFIG_PATH: &str = "~/.config/trawl/config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TrawlConfig {
    pub extractor: ExtractorConfig,
    pub session: SessionConfig,
    pub archive: ArchiveConfig,
    pub set: SetConfig,
    pub feed: FeedConfig,
}

/// Where the wait before retrying a rate-limited request comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitSource {
    /// The response header named by `rate-limit-header`, falling back to the fixed delay.
    #[default]
    Header,
    /// Always `transient-retry-delay`.
    Fixed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExtractorConfig {
    pub max_transient_retries: u32,
    /// Seconds.
    pub transient_retry_delay: f64,
    pub expand_related: bool,
    pub rate_limit_wait_source: WaitSource,
    pub rate_limit_header: String,
    /// Request timeout in seconds.
    pub timeout: u64,
    /// Minimum seconds between two requests.
    pub request_interval: f64,
    pub user_agent: Option<String>,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_transient_retries: 2,
            transient_retry_delay: 5.0,
            expand_related: false,
            rate_limit_wait_source: WaitSource::Header,
            rate_limit_header: "Retry-After".to_string(),
            timeout: 30,
            request_interval: 0.0,
            user_agent: None,
        }
    }
}

impl ExtractorConfig {
    pub fn retry_delay(&self) -> Result<Duration> {
        seconds("transient-retry-delay", self.transient_retry_delay)
    }

    pub fn traversal_options(&self) -> Result<TraversalOptions> {
        Ok(TraversalOptions::default()
            .with_max_transient_retries(self.max_transient_retries)
            .with_transient_retry_delay(self.retry_delay()?)
            .with_expand_related(self.expand_related))
    }

    /// Builds an HTTP client from these settings. `header` overrides the rate-limit header name.
    pub fn client(&self, session: Option<&Session>, header: Option<&str>) -> Result<Client> {
        let wait = match self.rate_limit_wait_source {
            WaitSource::Header => {
                RateLimitWait::Header(header.unwrap_or(&self.rate_limit_header).to_string())
            }
            WaitSource::Fixed => RateLimitWait::Fixed,
        };

        let mut builder = Client::builder()
            .timeout(self.timeout)
            .rate_limit_wait(wait)
            .retry_delay(self.retry_delay()?)
            .request_interval(seconds("request-interval", self.request_interval)?);
        if let Some(user_agent) = &self.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        if let Some(session) = session {
            builder = builder.cookie_jar(session.jar());
        }
        Ok(builder.build()?)
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| CoreError::Config(format!("{} must be a non-negative number of seconds, got {}", key, value)))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Cookie name to value.
    pub cookies: BTreeMap<String, String>,
    /// Domain the cookies are scoped to. Defaults to the host of the source being read.
    pub cookie_domain: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    pub path: Option<String>,
}

impl ArchiveConfig {
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(expand_path)
    }
}

/// Media set pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SetConfig {
    pub root: String,
    /// `{root}` and `{context}` are substituted.
    pub set_url: String,
    /// `{root}`, `{node}` and `{context}` are substituted.
    pub node_url: String,
    pub login_path: String,
    pub block_markers: Vec<String>,
    /// Cookie whose absence means the run is anonymous.
    pub session_cookie: Option<String>,
}

impl Default for SetConfig {
    fn default() -> Self {
        Self {
            root: "https://www.facebook.com".to_string(),
            set_url: "{root}/media/set/?set={context}".to_string(),
            node_url: "{root}/photo/?fbid={node}&set={context}".to_string(),
            login_path: "/login".to_string(),
            block_markers: vec![r#"{"__dr":"CometErrorRoot.react"}"#.to_string()],
            session_cookie: Some("c_user".to_string()),
        }
    }
}

impl SetConfig {
    pub fn set_url(&self) -> String {
        self.set_url.replace("{root}", self.root.trim_end_matches('/'))
    }

    pub fn node_url(&self) -> String {
        self.node_url.replace("{root}", self.root.trim_end_matches('/'))
    }

    pub fn access_policy(&self) -> AccessPolicy {
        let mut policy = AccessPolicy::new()
            .with_login_prefix(format!("{}{}", self.root.trim_end_matches('/'), self.login_path));
        for marker in &self.block_markers {
            policy = policy.with_block_marker(marker.clone());
        }
        policy
    }
}

/// Offset-paginated chapter feeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FeedConfig {
    pub api_root: String,
    /// Translated languages to keep. Empty means all.
    pub lang: Vec<String>,
    /// Resolve author, artist and group names.
    pub metadata: bool,
    /// Newest chapters first.
    pub reverse: bool,
    pub rate_limit_header: String,
    pub page_size: u32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_root: "https://api.mangadex.org".to_string(),
            lang: Vec::new(),
            metadata: false,
            reverse: false,
            rate_limit_header: "X-RateLimit-Retry-After".to_string(),
            page_size: 100,
        }
    }
}

/// Command-line values that win over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub max_transient_retries: Option<u32>,
    pub transient_retry_delay: Option<f64>,
    pub expand_related: Option<bool>,
    pub archive: Option<String>,
    pub lang: Option<Vec<String>>,
    pub metadata: Option<bool>,
    pub reverse: Option<bool>,
}

impl TrawlConfig {
    /// Loads the file at `path`, or the default location when `path` is `None`.
    ///
    /// A missing default file yields the defaults. A missing explicit file is an error.
    pub fn load(path: Option<&str>, overrides: Option<&ConfigOverrides>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let path = expand_path(path);
                if !path.exists() {
                    return Err(CoreError::Config(format!("config file {} not found", path.display())));
                }
                load_config_file(&path)?
            }
            None => {
                let path = expand_path(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    load_config_file(&path)?
                } else {
                    trace!("No config file at {:?}, using defaults", path);
                    TrawlConfig::default()
                }
            }
        };

        if let Some(overrides) = overrides {
            config.apply_overrides(overrides);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(retries) = overrides.max_transient_retries {
            self.extractor.max_transient_retries = retries;
        }
        if let Some(delay) = overrides.transient_retry_delay {
            self.extractor.transient_retry_delay = delay;
        }
        if let Some(expand) = overrides.expand_related {
            self.extractor.expand_related = expand;
        }
        if let Some(archive) = &overrides.archive {
            self.archive.path = Some(archive.clone());
        }
        if let Some(lang) = &overrides.lang {
            self.feed.lang = lang.clone();
        }
        if let Some(metadata) = overrides.metadata {
            self.feed.metadata = metadata;
        }
        if let Some(reverse) = overrides.reverse {
            self.feed.reverse = reverse;
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.extractor.retry_delay()?;
        seconds("request-interval", self.extractor.request_interval)?;
        if self.feed.page_size == 0 {
            return Err(CoreError::Config("feed page-size must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Expands `~` and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::full(path).map(|p| p.into_owned()).unwrap_or_else(|_| path.to_string()))
}

fn load_config_file(path: &Path) -> Result<TrawlConfig> {
    debug!("Loading config from {:?}", path);
    let content = std::fs::read_to_string(path)?;
    toml::from_str(&content)
        .map_err(|e| CoreError::Config(format!("failed to parse {}: {}", path.display(), e)))
}
