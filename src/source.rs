use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{header, Client, Url};
use thiserror::Error;
use tracing::debug;

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http error: {0}")]
    Http(String),
    #[error("event source returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("io error reading {path}: {message}")]
    Io { path: String, message: String },
    #[error("invalid event source location: {0}")]
    Location(String),
}

/// Where the event source document comes from.
#[async_trait]
pub trait EventSource: Send + Sync {
    fn describe(&self) -> String;

    /// Returns the raw document body. `bypass_cache` asks the transport to skip
    /// any intermediate caches.
    async fn fetch(&self, bypass_cache: bool) -> Result<String, SourceError>;
}

pub struct HttpSource {
    url: Url,
    client: Client,
}

impl HttpSource {
    pub fn new(url: Url) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(20))
            .user_agent(concat!(
                "community-events/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()
            .map_err(|err| SourceError::Http(err.to_string()))?;
        Ok(Self { url, client })
    }

    /// Request URL for a fetch, with a cache-busting token when bypassing caches.
    pub fn request_url(&self, bypass_cache: bool) -> Url {
        let mut url = self.url.clone();
        if bypass_cache {
            url.query_pairs_mut()
                .append_pair("_t", &Utc::now().timestamp_millis().to_string());
        }
        url
    }
}

#[async_trait]
impl EventSource for HttpSource {
    fn describe(&self) -> String {
        self.url.to_string()
    }

    async fn fetch(&self, bypass_cache: bool) -> Result<String, SourceError> {
        let url = self.request_url(bypass_cache);
        debug!("fetching event source {url}");

        let mut request = self.client.get(url);
        if bypass_cache {
            request = request
                .header(header::CACHE_CONTROL, "no-cache")
                .header(header::PRAGMA, "no-cache");
        }

        let response = request
            .send()
            .await
            .map_err(|err| SourceError::Http(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| SourceError::Http(err.to_string()))?;

        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn fetch(&self, _bypass_cache: bool) -> Result<String, SourceError> {
        let path = self.path.clone();
        let read = tokio::task::spawn_blocking(move || std::fs::read_to_string(&path))
            .await
            .map_err(|err| SourceError::Io {
                path: self.describe(),
                message: err.to_string(),
            })?;
        read.map_err(|err| SourceError::Io {
            path: self.describe(),
            message: err.to_string(),
        })
    }
}

/// Picks the transport for the configured source: absolute http(s) URLs and
/// paths relative to `site_base_url` go over HTTP, anything else is a file.
pub fn from_config(config: &AppConfig) -> Result<Box<dyn EventSource>, SourceError> {
    let location = config.event_source.trim();
    if location.is_empty() {
        return Err(SourceError::Location("event source is empty".to_string()));
    }

    if location.starts_with("http://") || location.starts_with("https://") {
        let url = Url::parse(location).map_err(|err| SourceError::Location(err.to_string()))?;
        return Ok(Box::new(HttpSource::new(url)?));
    }

    if let Some(base) = config.site_base_url.as_deref() {
        let base = Url::parse(base).map_err(|err| SourceError::Location(err.to_string()))?;
        let url = base
            .join(location)
            .map_err(|err| SourceError::Location(err.to_string()))?;
        return Ok(Box::new(HttpSource::new(url)?));
    }

    Ok(Box::new(FileSource::new(location)))
}
