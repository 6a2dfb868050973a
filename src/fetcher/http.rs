use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use super::{PageQuery, RatingsPage, ReviewSource, SourceSession};
use crate::config::SourceConfig;
use crate::error::FetchError;

/// One record of an exported browser cookie bundle
#[derive(Debug, Clone, Deserialize)]
pub struct CookieRecord {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default = "default_cookie_path")]
    pub path: String,
}

fn default_cookie_path() -> String {
    "/".to_string()
}

impl CookieRecord {
    /// `Set-Cookie` style string understood by the cookie jar
    fn set_cookie_value(&self) -> String {
        let mut value = format!("{}={}; Path={}", self.name, self.value, self.path);
        if !self.domain.is_empty() {
            value.push_str(&format!("; Domain={}", self.domain));
        }
        value
    }

    /// URL the cookie is registered against: its own domain, else `base`
    fn origin(&self, base: &Url) -> Url {
        let domain = self.domain.trim_start_matches('.');
        if domain.is_empty() {
            return base.clone();
        }
        Url::parse(&format!("{}://{}/", base.scheme(), domain)).unwrap_or_else(|_| base.clone())
    }
}

/// Read a JSON cookie bundle exported from a logged-in browser
pub fn load_cookie_bundle(path: &Path) -> Result<Vec<CookieRecord>, FetchError> {
    let content = fs::read_to_string(path).map_err(|e| {
        FetchError::Credentials(format!("failed to read {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        FetchError::Credentials(format!("failed to parse {}: {}", path.display(), e))
    })
}

/// Ratings endpoint reached over HTTP with a cookie-authenticated session
pub struct HttpReviewSource {
    base_url: Url,
    ratings_url: Url,
    cookies_path: PathBuf,
    user_agents: Vec<String>,
    request_timeout: Duration,
}

impl HttpReviewSource {
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid source base_url: {}", config.base_url))?;
        let ratings_url = base_url
            .join(&config.ratings_path)
            .with_context(|| format!("Invalid source ratings_path: {}", config.ratings_path))?;

        Ok(Self {
            base_url,
            ratings_url,
            cookies_path: config.cookies_path.clone(),
            user_agents: config.user_agents.clone(),
            request_timeout: config.request_timeout(),
        })
    }

    fn pick_user_agent(&self) -> Option<&str> {
        if self.user_agents.is_empty() {
            return None;
        }
        let index = fastrand::usize(..self.user_agents.len());
        Some(self.user_agents[index].as_str())
    }
}

#[async_trait]
impl ReviewSource for HttpReviewSource {
    type Session = HttpSession;

    async fn open_session(&self) -> Result<Self::Session, FetchError> {
        let cookies = load_cookie_bundle(&self.cookies_path)?;

        let jar = Arc::new(Jar::default());
        for cookie in &cookies {
            jar.add_cookie_str(&cookie.set_cookie_value(), &cookie.origin(&self.base_url));
        }

        let mut builder = Client::builder()
            .cookie_provider(jar)
            .timeout(self.request_timeout);
        if let Some(agent) = self.pick_user_agent() {
            builder = builder.user_agent(agent);
        }
        let client = builder.build()?;

        // Visit the storefront first so the session picks up its own cookies
        let response = client.get(self.base_url.clone()).send().await?;
        if !response.status().is_success() {
            warn!(status = %response.status(), url = %self.base_url, "Priming request was not successful");
        }

        info!(cookies = cookies.len(), base = %self.base_url, "Opened review session");

        Ok(HttpSession {
            client: Some(client),
            base_url: self.base_url.clone(),
            ratings_url: self.ratings_url.clone(),
        })
    }
}

/// Live HTTP session; the client is dropped on `close`
#[derive(Debug)]
pub struct HttpSession {
    client: Option<Client>,
    base_url: Url,
    ratings_url: Url,
}

#[async_trait]
impl SourceSession for HttpSession {
    async fn fetch_page(&mut self, query: &PageQuery) -> Result<RatingsPage, FetchError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| FetchError::Other(anyhow::anyhow!("session already closed")))?;

        let response = client
            .get(self.ratings_url.clone())
            .query(&[
                ("itemid", query.ids.entity_id.to_string()),
                ("shopid", query.ids.group_id.to_string()),
                ("limit", query.limit.to_string()),
                ("offset", query.offset.to_string()),
                ("type", query.rating.to_string()),
            ])
            .header("referer", self.base_url.as_str())
            .header("x-api-source", "pc")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let snippet: String = body.chars().take(200).collect();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body: snippet,
            });
        }

        let page: RatingsPage = serde_json::from_str(&body)?;

        debug!(
            rating = %query.rating,
            offset = query.offset,
            returned = page.ratings().len(),
            "Ratings page received"
        );

        Ok(page)
    }

    async fn close(&mut self) {
        if self.client.take().is_some() {
            debug!(base = %self.base_url, "Closed review session");
        }
    }
}
