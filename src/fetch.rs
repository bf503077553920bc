//! Fetch and decode collaborators.
//!
//! The inlining phases never talk to the network directly. They go through a
//! [`Fetcher`] for bytes and an [`ImageDecoder`] for turning image bytes into
//! an embeddable reference, so tests can swap in deterministic fakes.

use crate::util::{data_uri, uncachable_url};
use crate::{Error, Result};
use base64::Engine as _;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io::Cursor;

/// Per-request options.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    /// When false, the request must bypass every caching layer.
    pub use_cache: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self { use_cache: true }
    }
}

/// Byte source for every resource the pipeline pulls in.
///
/// A fetch succeeds once or fails; implementations must not retry.
pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str, options: FetchOptions) -> BoxFuture<'a, Result<Vec<u8>>>;
}

/// Turns fetched image bytes into a `data:` reference.
pub trait ImageDecoder: Send + Sync {
    fn decode<'a>(&'a self, url: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<String>>;
}

/// Decodes any format the `image` crate knows and re-encodes it as PNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct PngReencoder;

impl PngReencoder {
    pub fn reencode(url: &str, bytes: &[u8]) -> Result<String> {
        let img = image::load_from_memory(bytes).map_err(|e| Error::decode(url, e))?;
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| Error::decode(url, e))?;
        Ok(data_uri("image/png", &png))
    }
}

impl ImageDecoder for PngReencoder {
    fn decode<'a>(&'a self, url: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<String>> {
        async move { Self::reencode(url, &bytes) }.boxed()
    }
}

/// Resolve `data:` and `file:` references without a network client.
///
/// Returns `None` when the URL needs a real fetch.
pub async fn fetch_local(url: &str) -> Option<Result<Vec<u8>>> {
    if crate::util::is_data_uri(url) {
        return Some(decode_data_uri(url));
    }
    let parsed = url::Url::parse(url).ok()?;
    if parsed.scheme() != "file" {
        return None;
    }
    let path = match parsed.to_file_path() {
        Ok(p) => p,
        Err(()) => return Some(Err(Error::fetch(url, "not a local path"))),
    };
    Some(
        tokio::fs::read(&path)
            .await
            .map_err(|e| Error::fetch(url, e)),
    )
}

fn decode_data_uri(url: &str) -> Result<Vec<u8>> {
    let (header, payload) = url[5..]
        .split_once(',')
        .ok_or_else(|| Error::Format(format!("malformed data URI: {}", url)))?;
    if header.to_ascii_lowercase().ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::fetch(url, e))
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}

/// `reqwest`-backed fetcher; also serves `file:` and `data:` references.
#[cfg(feature = "http")]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[cfg(feature = "http")]
impl HttpFetcher {
    /// Build a client with the configured user agent, headers and timeout.
    pub fn new(config: &crate::RasterizeConfig) -> Result<Self> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
        use std::time::Duration;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| Error::Config(format!("Invalid header name {}: {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("Invalid header value for {}: {}", name, e)))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[cfg(feature = "http")]
impl Fetcher for HttpFetcher {
    fn fetch<'a>(&'a self, url: &'a str, options: FetchOptions) -> BoxFuture<'a, Result<Vec<u8>>> {
        async move {
            if let Some(local) = fetch_local(url).await {
                return local;
            }
            let target = if options.use_cache {
                url.to_string()
            } else {
                uncachable_url(url)
            };
            log::debug!("GET {}", target);

            let resp = self
                .client
                .get(&target)
                .send()
                .await
                .map_err(|e| Error::fetch(url, e))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(Error::fetch(url, format!("HTTP {}", status)));
            }
            let body = resp.bytes().await.map_err(|e| Error::fetch(url, e))?;
            Ok(body.to_vec())
        }
        .boxed()
    }
}
