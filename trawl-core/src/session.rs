use crate::config::SessionConfig;
use crate::error::{CoreError, Result};
use reqwest::cookie::Jar;
use std::sync::{Arc, Once};
use tracing::{debug, warn};
use url::Url;

/// A warning that is logged at most once per process, however many runs trigger it.
pub struct WarnOnce(Once);

impl WarnOnce {
    pub const fn new() -> Self {
        WarnOnce(Once::new())
    }

    pub fn warn(&self, message: impl FnOnce() -> String) {
        self.0.call_once(|| warn!("{}", message()));
    }

    pub fn fired(&self) -> bool {
        self.0.is_completed()
    }
}

impl Default for WarnOnce {
    fn default() -> Self {
        Self::new()
    }
}

/// Cookies shared by every request of a run.
#[derive(Debug, Clone)]
pub struct Session {
    jar: Arc<Jar>,
    cookie_names: Vec<String>,
}

impl Session {
    /// Loads the configured cookies for `root`, scoped to `cookie-domain` when set.
    pub fn from_config(config: &SessionConfig, root: &str) -> Result<Self> {
        let url = Url::parse(root).map_err(|e| CoreError::Config(format!("invalid root URL {}: {}", root, e)))?;
        let domain = match &config.cookie_domain {
            Some(domain) => domain.clone(),
            None => url.host_str().unwrap_or_default().to_string(),
        };

        let jar = Jar::default();
        for (name, value) in &config.cookies {
            jar.add_cookie_str(&format!("{}={}; Domain={}; Path=/", name, value, domain), &url);
        }
        debug!("Loaded {} session cookies for {}", config.cookies.len(), domain);

        Ok(Session {
            jar: Arc::new(jar),
            cookie_names: config.cookies.keys().cloned().collect(),
        })
    }

    pub fn jar(&self) -> Arc<Jar> {
        self.jar.clone()
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookie_names.iter().any(|n| n == name)
    }

    /// Warns through `once` when the cookie that marks a logged-in session is absent.
    pub fn check_login(&self, cookie: Option<&str>, once: &WarnOnce) {
        if let Some(cookie) = cookie
            && !self.has_cookie(cookie)
        {
            once.warn(|| {
                format!(
                    "no '{}' cookie set, running anonymously; some items may be unavailable",
                    cookie
                )
            });
        }
    }
}
