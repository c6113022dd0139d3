use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Url;
use tracing::debug;

use crate::domain::{Payload, RequestOutcome, TransportError, TransportErrorKind};

/// Bodies handed to checks are cut to this many bytes.
const MAX_BODY_BYTES: usize = 4 * 1024;

/// Delivers one payload to the target and reports what happened. Never
/// fails: transport problems are part of the outcome.
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send(&self, payload: &Payload) -> RequestOutcome;
}

/// POSTs JSON payloads over a single pooled `reqwest::Client`.
#[derive(Clone)]
pub struct HttpSender {
    client: reqwest::Client,
    url: Url,
}

impl HttpSender {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("metric-loadgen/", env!("CARGO_PKG_VERSION"))),
        );
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .default_headers(headers)
            .build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RequestSender for HttpSender {
    async fn send(&self, payload: &Payload) -> RequestOutcome {
        let started = Instant::now();
        // `.json` sets `Content-Type: application/json`.
        let resp = match self.client.post(self.url.clone()).json(payload).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let elapsed = started.elapsed();
                debug!(error = %e, "request failed");
                return RequestOutcome::transport_error(elapsed, classify(&e));
            }
        };

        let status = resp.status().as_u16();
        let body = match resp.text().await {
            Ok(text) => Some(truncate_body(text)),
            Err(e) => {
                debug!(error = %e, status, "failed to read response body");
                None
            }
        };
        RequestOutcome::response(status, started.elapsed(), body)
    }
}

fn classify(err: &reqwest::Error) -> TransportError {
    let kind = if err.is_timeout() {
        TransportErrorKind::Timeout
    } else if err.is_connect() {
        TransportErrorKind::Connect
    } else {
        TransportErrorKind::Other
    };
    TransportError::new(kind, err.to_string())
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_BODY_BYTES {
        let mut cut = MAX_BODY_BYTES;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    body
}
