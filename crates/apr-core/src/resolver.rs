//! Redirect resolution for shortened / tracking links.
//!
//! Resolution is best-effort: every failure degrades to the original URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect;

use crate::{errors::Error, Result};

/// Hard ceiling on redirect hops, whatever the configuration says.
pub const MAX_REDIRECT_HOPS: usize = 5;

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Outcome of a resolution attempt. Both variants carry a usable URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The HTTP client reached a 2xx terminal location.
    Resolved(String),
    /// Resolution failed or was skipped; the original URL is returned.
    Fallback(String),
}

impl Resolution {
    pub fn url(&self) -> &str {
        match self {
            Resolution::Resolved(u) | Resolution::Fallback(u) => u,
        }
    }
}

/// Port for turning a possibly shortened URL into its canonical form.
#[async_trait]
pub trait UrlResolver: Send + Sync {
    async fn resolve(&self, url: &str) -> Resolution;
}

#[derive(Clone, Debug)]
pub struct ResolverConfig {
    pub timeout: Duration,
    pub max_redirects: usize,
    pub user_agent: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_redirects: MAX_REDIRECT_HOPS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

/// `reqwest`-backed resolver: HEAD first, GET when the server refuses HEAD.
#[derive(Clone, Debug)]
pub struct HttpResolver {
    http: reqwest::Client,
}

impl HttpResolver {
    pub fn new(cfg: &ResolverConfig) -> Result<Self> {
        let max = cfg.max_redirects.min(MAX_REDIRECT_HOPS);
        let policy = redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() > max {
                attempt.error("too many redirects")
            } else if attempt.previous().contains(attempt.url()) {
                attempt.error("redirect loop")
            } else {
                attempt.follow()
            }
        });

        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .redirect(policy)
            .user_agent(cfg.user_agent.clone())
            .build()
            .map_err(|e| Error::External(format!("http client build failed: {e}")))?;

        Ok(Self { http })
    }

    async fn follow(&self, url: &str) -> std::result::Result<String, String> {
        match self.http.head(url).send().await {
            Ok(resp) if resp.status().is_success() => return Ok(resp.url().to_string()),
            Ok(resp) => {
                tracing::debug!(url, status = %resp.status(), "HEAD refused, retrying with GET");
            }
            // A GET would walk the same chain or wait just as long.
            Err(e) if e.is_redirect() || e.is_timeout() => return Err(e.to_string()),
            Err(e) => {
                tracing::debug!(url, error = %e, "HEAD failed, retrying with GET");
            }
        }

        let resp = self.http.get(url).send().await.map_err(|e| e.to_string())?;
        if !resp.status().is_success() {
            return Err(format!("terminal status {}", resp.status()));
        }
        Ok(resp.url().to_string())
    }
}

#[async_trait]
impl UrlResolver for HttpResolver {
    async fn resolve(&self, url: &str) -> Resolution {
        match self.follow(url).await {
            Ok(canonical) => {
                if canonical != url {
                    tracing::debug!(url, canonical = %canonical, "resolved redirect");
                }
                Resolution::Resolved(canonical)
            }
            Err(reason) => {
                tracing::warn!(url, %reason, "redirect resolution failed, keeping original URL");
                Resolution::Fallback(url.to_string())
            }
        }
    }
}
