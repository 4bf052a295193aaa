//! Asset fetching

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::error::FetchError;
use crate::config::LoaderConfig;

/// Which half of a fragment an asset is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Code,
    Style,
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code => write!(f, "code"),
            Self::Style => write!(f, "style"),
        }
    }
}

/// A fetched artifact
#[derive(Debug, Clone)]
pub struct Asset {
    pub url: String,
    pub kind: AssetKind,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Asset {
    pub fn new(url: impl Into<String>, kind: AssetKind, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            kind,
            content_type: String::new(),
            body: body.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Retrieves assets by URL
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str, kind: AssetKind) -> Result<Asset, FetchError>;
}

/// HTTP(S) fetcher backed by reqwest
pub struct HttpFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(config: &LoaderConfig) -> Result<Self, FetchError> {
        debug!(timeout_ms = config.timeout_ms, "HttpFetcher::new: called");
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: config.max_asset_bytes,
        })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, kind: AssetKind) -> Result<Asset, FetchError> {
        debug!(%url, %kind, "HttpFetcher::fetch: called");

        if !url.starts_with("http://") && !url.starts_with("https://") {
            debug!("HttpFetcher::fetch: invalid URL protocol");
            return Err(FetchError::InvalidUrl { url: url.to_string() });
        }

        let response = self.client.get(url).send().await.map_err(|e| {
            debug!(%e, "HttpFetcher::fetch: HTTP request failed");
            FetchError::Network {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            debug!(%status, "HttpFetcher::fetch: HTTP error status");
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(length) = response.content_length()
            && length as usize > self.max_bytes
        {
            debug!(length, "HttpFetcher::fetch: declared length over limit");
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                size: length as usize,
                limit: self.max_bytes,
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = response.bytes().await.map_err(|e| {
            debug!(%e, "HttpFetcher::fetch: failed to read response body");
            FetchError::Network {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        if body.len() > self.max_bytes {
            debug!(len = body.len(), "HttpFetcher::fetch: response too large");
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                size: body.len(),
                limit: self.max_bytes,
            });
        }

        debug!(len = body.len(), %content_type, "HttpFetcher::fetch: asset received");
        Ok(Asset {
            url: url.to_string(),
            kind,
            content_type,
            body: body.to_vec(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_kind_display() {
        assert_eq!(AssetKind::Code.to_string(), "code");
        assert_eq!(AssetKind::Style.to_string(), "style");
    }

    #[tokio::test]
    async fn test_http_fetcher_rejects_non_http_scheme() {
        let fetcher = HttpFetcher::new(&LoaderConfig::default()).unwrap();
        let err = fetcher.fetch("file:///etc/passwd", AssetKind::Code).await.unwrap_err();
        assert!(matches!(err, FetchError::InvalidUrl { .. }));
    }

    #[tokio::test]
    async fn test_mock_fetcher_counts_calls() {
        let fetcher = mock::MockFetcher::new().with_asset("https://x/main.js", "init()");

        assert!(fetcher.fetch("https://x/main.js", AssetKind::Code).await.is_ok());
        assert!(fetcher.fetch("https://x/missing.js", AssetKind::Code).await.is_err());
        assert_eq!(fetcher.call_count(), 2);
        assert_eq!(fetcher.requested(), vec!["https://x/main.js", "https://x/missing.js"]);
    }
}
