//! Deterministic collaborators for phase tests.

use crate::fetch::{FetchOptions, Fetcher, ImageDecoder};
use crate::util::data_uri;
use crate::{Error, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

struct Stub {
    body: Option<Vec<u8>>,
    delay_ms: u64,
}

/// In-memory fetcher. Unregistered URLs fail; every call is recorded.
#[derive(Default)]
pub(crate) struct StubFetcher {
    responses: HashMap<String, Stub>,
    calls: Mutex<Vec<(String, FetchOptions)>>,
}

impl StubFetcher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(self, url: &str, body: &str) -> Self {
        self.with_delay(url, body, 0)
    }

    pub(crate) fn with_bytes(mut self, url: &str, body: Vec<u8>) -> Self {
        self.responses.insert(
            url.to_string(),
            Stub {
                body: Some(body),
                delay_ms: 0,
            },
        );
        self
    }

    pub(crate) fn with_delay(mut self, url: &str, body: &str, delay_ms: u64) -> Self {
        self.responses.insert(
            url.to_string(),
            Stub {
                body: Some(body.as_bytes().to_vec()),
                delay_ms,
            },
        );
        self
    }

    pub(crate) fn failing_after(mut self, url: &str, delay_ms: u64) -> Self {
        self.responses
            .insert(url.to_string(), Stub { body: None, delay_ms });
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }

    pub(crate) fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| *u == url).count()
    }

    pub(crate) fn options(&self) -> Vec<FetchOptions> {
        self.calls.lock().unwrap().iter().map(|(_, o)| *o).collect()
    }
}

impl Fetcher for StubFetcher {
    fn fetch<'a>(&'a self, url: &'a str, options: FetchOptions) -> BoxFuture<'a, Result<Vec<u8>>> {
        async move {
            self.calls.lock().unwrap().push((url.to_string(), options));
            let Some(stub) = self.responses.get(url) else {
                return Err(Error::fetch(url, "404"));
            };
            if stub.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(stub.delay_ms)).await;
            }
            stub.body.clone().ok_or_else(|| Error::fetch(url, "404"))
        }
        .boxed()
    }
}

/// Wraps the raw bytes into a PNG data URI; bytes starting with `broken` fail.
pub(crate) struct StubDecoder;

impl ImageDecoder for StubDecoder {
    fn decode<'a>(&'a self, url: &'a str, bytes: Vec<u8>) -> BoxFuture<'a, Result<String>> {
        async move {
            if bytes.starts_with(b"broken") {
                return Err(Error::decode(url, "not an image"));
            }
            Ok(data_uri("image/png", &bytes))
        }
        .boxed()
    }
}
