//! Resource loading boundary
//!
//! The pipeline only sees [`ResourceLoader`]. `HttpLoader` is the concrete
//! transport:
//! - `http`, `https`: reqwest, body streamed chunk by chunk
//! - `file`: read from disk, emitted as a single chunk
//! - `about:blank`: empty HTML document
//! - anything else: `LoadError::UnsupportedScheme`

use crate::error::{LoadError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Response body as a stream of chunks
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// What to fetch, and on whose behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub url: Url,
    pub referer: Option<Url>,
}

impl ResourceRequest {
    pub fn new(url: Url) -> Self {
        Self { url, referer: None }
    }

    pub fn with_referer(mut self, referer: Url) -> Self {
        self.referer = Some(referer);
        self
    }
}

/// Status, headers and a streamed body. `url` is the final address after
/// redirects.
pub struct Response {
    pub url: Url,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    body: ByteStream,
}

impl Response {
    pub fn new(url: Url, status: u16, headers: Vec<(String, String)>, body: ByteStream) -> Self {
        Self {
            url,
            status,
            headers,
            body,
        }
    }

    /// Fully buffered response
    pub fn from_bytes(url: Url, status: u16, content_type: &str, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let chunks: ByteStream = if body.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok(body) }).boxed()
        };
        Self::new(
            url,
            status,
            vec![("content-type".to_string(), content_type.to_string())],
            chunks,
        )
    }

    /// First header named `name`, ASCII case-insensitive
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// MIME essence of the `Content-Type` header, e.g. `text/html`
    pub fn content_type(&self) -> Option<String> {
        let value = self.header("content-type")?;
        let essence = value.split(';').next().unwrap_or("").trim();
        (!essence.is_empty()).then(|| essence.to_ascii_lowercase())
    }

    /// `charset` parameter of the `Content-Type` header
    pub fn charset(&self) -> Option<&str> {
        self.header("content-type")?
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(key, _)| key.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, value)| value.trim().trim_matches(|c| c == '"' || c == '\''))
            .filter(|value| !value.is_empty())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_body(self) -> ByteStream {
        self.body
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Response")
            .field("url", &self.url.as_str())
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn fetch(&self, request: ResourceRequest) -> Result<Response>;
}

/// HTTP loader configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub user_agent: String,
    pub timeout: Duration,
    pub send_referer: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("browser/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            send_referer: true,
        }
    }
}

pub struct HttpLoader {
    client: reqwest::Client,
    config: LoaderConfig,
}

impl HttpLoader {
    pub fn new() -> Result<Self> {
        Self::with_config(LoaderConfig::default())
    }

    pub fn with_config(config: LoaderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    async fn fetch_http(&self, request: ResourceRequest) -> Result<Response> {
        let mut builder = self.client.get(request.url.clone());
        if self.config.send_referer {
            if let Some(referer) = request.referer.as_ref().and_then(referrer_value) {
                builder = builder.header(reqwest::header::REFERER, referer);
            }
        }

        let response = builder.send().await?;
        let url = response.url().clone();
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();

        tracing::debug!("Fetched {} -> {} ({})", request.url, url, status);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(LoadError::from))
            .boxed();
        Ok(Response::new(url, status, headers, body))
    }

    async fn fetch_file(&self, request: ResourceRequest) -> Result<Response> {
        let path = request.url.to_file_path().map_err(|()| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid file path for file url: {}", request.url),
            )
        })?;
        let data = tokio::fs::read(&path).await?;
        let content_type = match path.extension().and_then(|ext| ext.to_str()) {
            Some("html") | Some("htm") => "text/html",
            Some("xhtml") => "application/xhtml+xml",
            _ => "text/plain",
        };
        Ok(Response::from_bytes(request.url, 200, content_type, data))
    }
}

#[async_trait]
impl ResourceLoader for HttpLoader {
    async fn fetch(&self, request: ResourceRequest) -> Result<Response> {
        match request.url.scheme() {
            "http" | "https" => self.fetch_http(request).await,
            "file" => self.fetch_file(request).await,
            "about" if request.url.path() == "blank" => Ok(Response::from_bytes(
                request.url,
                200,
                "text/html",
                Bytes::new(),
            )),
            other => Err(LoadError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Referer header value: http(s) only, without credentials or fragment
fn referrer_value(referer: &Url) -> Option<String> {
    if !matches!(referer.scheme(), "http" | "https") {
        return None;
    }
    let mut referer = referer.clone();
    referer.set_fragment(None);
    let _ = referer.set_username("");
    let _ = referer.set_password(None);
    Some(referer.to_string())
}
