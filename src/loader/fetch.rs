//! Resource fetchers: the load/error event behind an injected element.

use anyhow::{Context, Result};
use futures_util::future::BoxFuture;
use reqwest::Url;
use std::time::Duration;

/// Kinds of resource loading errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceErrorKind {
    /// The url could not be parsed or resolved against the base url.
    InvalidUrl,
    /// The request failed before a response arrived.
    Network,
    /// The server answered with a non-success status.
    Status(u16),
    /// A readiness poll ran out of attempts.
    TimedOut { attempts: u32 },
}

/// Error when a script or stylesheet fails to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceError {
    pub url: String,
    pub kind: ResourceErrorKind,
    pub message: String,
}

impl ResourceError {
    pub fn new(url: &str, kind: ResourceErrorKind, message: impl Into<String>) -> Self {
        Self {
            url: url.to_string(),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ResourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.url, self.message)
    }
}

impl std::error::Error for ResourceError {}

/// Loads one resource; resolving `Ok` is the element's load event.
pub trait ResourceFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<(), ResourceError>>;
}

/// Fetches resources over HTTP(S), resolving relative urls against a base.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl HttpFetcher {
    pub fn new(base_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        let base_url = base_url
            .map(Url::parse)
            .transpose()
            .context("Invalid resource base URL")?;
        Ok(Self { client, base_url })
    }

    fn resolve(&self, url: &str) -> Result<Url, ResourceError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(_) => match &self.base_url {
                Some(base) => base.join(url).map_err(|e| {
                    ResourceError::new(url, ResourceErrorKind::InvalidUrl, e.to_string())
                }),
                None => Err(ResourceError::new(
                    url,
                    ResourceErrorKind::InvalidUrl,
                    "relative url with no base url configured",
                )),
            },
        }
    }
}

impl ResourceFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> BoxFuture<'static, Result<(), ResourceError>> {
        let client = self.client.clone();
        let resolved = self.resolve(url);
        let url = url.to_string();

        Box::pin(async move {
            let target = resolved?;
            let response = client.get(target).send().await.map_err(|e| {
                ResourceError::new(&url, ResourceErrorKind::Network, e.to_string())
            })?;

            let status = response.status();
            if !status.is_success() {
                return Err(ResourceError::new(
                    &url,
                    ResourceErrorKind::Status(status.as_u16()),
                    format!("server responded {}", status),
                ));
            }
            Ok(())
        })
    }
}

/// Treats every resource as already available. Used for dry runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineFetcher;

impl ResourceFetcher for OfflineFetcher {
    fn fetch(&self, _url: &str) -> BoxFuture<'static, Result<(), ResourceError>> {
        Box::pin(async { Ok(()) })
    }
}
