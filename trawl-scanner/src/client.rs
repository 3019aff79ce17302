use crate::error::{Result, ScanError};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::cookie::Jar;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

const DEFAULT_USER_AGENT: &str = "Trawl/0.1 (https://github.com/trapdoorsec/trawl)";

/// Hints at or above this many seconds are UNIX timestamps, not durations.
const ABSOLUTE_HINT_THRESHOLD: f64 = 1_000_000_000.0;

/// Where the rate-limit backoff comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitWait {
    /// Read the named response header, falling back to the fixed delay when it is absent.
    Header(String),
    /// Always wait the fixed delay.
    Fixed,
}

impl Default for RateLimitWait {
    fn default() -> Self {
        RateLimitWait::Header("Retry-After".to_string())
    }
}

/// Site-specific checks applied to fetched pages.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    /// A final URL under this prefix means the site bounced us to its login form.
    pub login_prefix: Option<String>,
    /// Body fragments the site serves instead of content while it is blocking us.
    pub block_markers: Vec<String>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_login_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.login_prefix = Some(prefix.into());
        self
    }

    pub fn with_block_marker(mut self, marker: impl Into<String>) -> Self {
        self.block_markers.push(marker.into());
        self
    }

    pub fn check(&self, page: &Page) -> Result<()> {
        if let Some(ref prefix) = self.login_prefix
            && page.url.starts_with(prefix.as_str())
        {
            return Err(ScanError::Authentication {
                message: "You must be logged in to continue viewing images.".to_string(),
                resume: None,
            });
        }

        if let Some(marker) = self
            .block_markers
            .iter()
            .find(|marker| page.body.contains(marker.as_str()))
        {
            debug!("Block marker {} found in {}", marker, page.url);
            return Err(ScanError::TemporaryBlock {
                message: "You've been temporarily blocked from viewing images.\n\
                          Please try using a different account, using a VPN or waiting before you retry."
                    .to_string(),
                resume: None,
            });
        }

        Ok(())
    }
}

/// A fetched document.
#[derive(Debug, Clone)]
pub struct Page {
    /// Final URL after redirects.
    pub url: String,
    pub status: u16,
    pub body: String,
}

#[derive(Deserialize)]
struct ErrorDocument {
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

pub struct ClientBuilder {
    timeout_secs: u64,
    user_agent: String,
    cookie_jar: Option<Arc<Jar>>,
    headers: HeaderMap,
    rate_limit_wait: RateLimitWait,
    retry_delay: Duration,
    request_interval: Duration,
}

impl ClientBuilder {
    pub fn timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn cookie_jar(mut self, jar: Arc<Jar>) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn rate_limit_wait(mut self, wait: RateLimitWait) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    /// Backoff used on rate limiting when no server hint is available.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Minimum spacing between two requests.
    pub fn request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    pub fn build(self) -> Result<Client> {
        let mut builder = reqwest::Client::builder()
            .user_agent(self.user_agent)
            .default_headers(self.headers)
            .timeout(Duration::from_secs(self.timeout_secs))
            .connect_timeout(Duration::from_secs(self.timeout_secs.div_ceil(2)))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(reqwest::redirect::Policy::limited(5));

        builder = match self.cookie_jar {
            Some(jar) => builder.cookie_provider(jar),
            None => builder.cookie_store(true),
        };

        Ok(Client {
            http: builder.build()?,
            rate_limit_wait: self.rate_limit_wait,
            retry_delay: self.retry_delay,
            request_interval: self.request_interval,
            last_request: Arc::new(Mutex::new(None)),
        })
    }
}

/// Issues remote calls, waiting out rate limits and classifying failures.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    rate_limit_wait: RateLimitWait,
    retry_delay: Duration,
    request_interval: Duration,
    last_request: Arc<Mutex<Option<Instant>>>,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder {
            timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            cookie_jar: None,
            headers: HeaderMap::new(),
            rate_limit_wait: RateLimitWait::default(),
            retry_delay: Duration::from_secs(5),
            request_interval: Duration::ZERO,
        }
    }

    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Calls a JSON endpoint and deserializes the response body.
    pub async fn call<T: DeserializeOwned>(&self, url: &str, params: &[(String, String)]) -> Result<T> {
        let response = self.send(url, params).await?;
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| ScanError::ParseError(format!("Unexpected response from {}: {}", url, e)))
    }

    /// Fetches a document and runs the access checks on it.
    pub async fn fetch_page(&self, url: &str, policy: &AccessPolicy) -> Result<Page> {
        let response = self.send(url, &[]).await?;
        let final_url = response.url().to_string();
        let status = response.status().as_u16();
        let body = response.text().await?;

        let page = Page {
            url: final_url,
            status,
            body,
        };
        policy.check(&page)?;
        Ok(page)
    }

    async fn send(&self, url: &str, params: &[(String, String)]) -> Result<reqwest::Response> {
        loop {
            self.throttle().await;

            debug!("Fetching {}", url);
            let response = self.http.get(url).query(params).send().await?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = self.rate_limit_delay(response.headers());
                info!(
                    "Rate limited by {}, retrying in {:.1}s",
                    url,
                    wait.as_secs_f64()
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            if status.is_client_error() || status.is_server_error() {
                return Err(terminal_error(response).await);
            }

            return Ok(response);
        }
    }

    fn rate_limit_delay(&self, headers: &HeaderMap) -> Duration {
        match self.rate_limit_wait {
            RateLimitWait::Header(ref name) => headers
                .get(name.as_str())
                .and_then(|v| v.to_str().ok())
                .and_then(|v| parse_retry_after(v, Utc::now()))
                .unwrap_or(self.retry_delay),
            RateLimitWait::Fixed => self.retry_delay,
        }
    }

    async fn throttle(&self) {
        if self.request_interval.is_zero() {
            return;
        }

        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.request_interval {
                tokio::time::sleep(self.request_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

async fn terminal_error(response: reqwest::Response) -> ScanError {
    let status = response.status();
    let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
    let body = response.text().await.unwrap_or_default();

    ScanError::Terminal {
        status: status.as_u16(),
        reason,
        detail: error_detail(&body),
    }
}

fn error_detail(body: &str) -> String {
    if let Ok(document) = serde_json::from_str::<ErrorDocument>(body)
        && !document.errors.is_empty()
    {
        return document
            .errors
            .iter()
            .map(|e| {
                format!(
                    "{}: {}",
                    e.title.as_deref().unwrap_or_default(),
                    e.detail.as_deref().unwrap_or_default()
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
    }

    body.trim().chars().take(200).collect()
}

/// Parses a retry-after hint: seconds, a UNIX timestamp, or an HTTP date.
///
/// Hints too large for a `Duration` are rejected like unparseable ones.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();

    if let Ok(seconds) = value.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return None;
        }
        if seconds >= ABSOLUTE_HINT_THRESHOLD {
            let remaining = seconds - now.timestamp_millis() as f64 / 1000.0;
            return Duration::try_from_secs_f64(remaining.max(0.0)).ok();
        }
        return Duration::try_from_secs_f64(seconds).ok();
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?;
    Some(
        (at.with_timezone(&Utc) - now)
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_retry_after_seconds() {
        assert_eq!(parse_retry_after("5", now()), Some(Duration::from_secs(5)));
        assert_eq!(
            parse_retry_after(" 1.5 ", now()),
            Some(Duration::from_millis(1500))
        );
    }

    #[test]
    fn test_retry_after_unix_timestamp() {
        let until = (now().timestamp() + 30).to_string();
        assert_eq!(parse_retry_after(&until, now()), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_retry_after_in_the_past_is_zero() {
        let until = (now().timestamp() - 30).to_string();
        assert_eq!(parse_retry_after(&until, now()), Some(Duration::ZERO));
    }

    #[test]
    fn test_retry_after_http_date() {
        assert_eq!(
            parse_retry_after("Fri, 01 Mar 2024 12:01:00 GMT", now()),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn test_retry_after_beyond_duration_range() {
        assert_eq!(parse_retry_after("1e20", now()), None);
        assert_eq!(parse_retry_after("1e300", now()), None);
    }

    #[test]
    fn test_retry_after_garbage() {
        assert_eq!(parse_retry_after("soon", now()), None);
        assert_eq!(parse_retry_after("-3", now()), None);
    }

    #[test]
    fn test_error_detail_from_error_document() {
        let body = r#"{"result":"error","errors":[
            {"title":"Not Found","detail":"Chapter could not be found"},
            {"title":"Gone","detail":null}
        ]}"#;
        assert_eq!(
            error_detail(body),
            "Not Found: Chapter could not be found, Gone: "
        );
    }

    #[test]
    fn test_error_detail_falls_back_to_body() {
        assert_eq!(error_detail("  upstream exploded \n"), "upstream exploded");
        assert_eq!(error_detail(&"x".repeat(500)).len(), 200);
    }

    #[test]
    fn test_access_policy_login_redirect() {
        let policy = AccessPolicy::new().with_login_prefix("https://site.example/login");
        let page = Page {
            url: "https://site.example/login/?next=photo".to_string(),
            status: 200,
            body: String::new(),
        };
        assert!(matches!(
            policy.check(&page),
            Err(ScanError::Authentication { .. })
        ));
    }

    #[test]
    fn test_access_policy_block_marker() {
        let policy = AccessPolicy::new().with_block_marker(r#"{"__dr":"CometErrorRoot.react"}"#);
        let page = Page {
            url: "https://site.example/photo/?fbid=1".to_string(),
            status: 200,
            body: r#"<script>{"__dr":"CometErrorRoot.react"}</script>"#.to_string(),
        };
        assert!(matches!(
            policy.check(&page),
            Err(ScanError::TemporaryBlock { .. })
        ));
    }
}
