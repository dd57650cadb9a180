//! HTTP delivery of messages and blocking requests.

use std::io::Write;
use std::time::Duration;

use chrono::Utc;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};

use meterline_core::{Message, RetryPolicy};

use crate::error::ClientError;

/// User agent sent with every request.
pub(crate) const USER_AGENT: &str = concat!("meterline-rust/", env!("CARGO_PKG_VERSION"));

/// Serializes payloads and performs the HTTP calls.
///
/// One `Delivery` is shared by all consumers and the blocking call surface.
#[derive(Debug)]
pub(crate) struct Delivery {
    http: reqwest::Client,
    api_key: String,
    gzip: bool,
    debug: bool,
}

impl Delivery {
    /// Build a delivery function with a fixed per-request timeout.
    pub(crate) fn new(
        api_key: impl Into<String>,
        timeout: Duration,
        gzip: bool,
        debug: bool,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            gzip,
            debug,
        })
    }

    /// Deliver a batch under the retry policy.
    ///
    /// The `sentAt` timestamp is injected immediately before each attempt,
    /// not at enqueue time. Retryable failures back off and retry until the
    /// policy's attempt budget runs out; the last error is returned.
    pub(crate) async fn send_batch(
        &self,
        url: &str,
        messages: &[Message],
        retry: &RetryPolicy,
    ) -> Result<Value, ClientError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let body = json!({
                "batch": messages,
                "sentAt": Utc::now().to_rfc3339(),
            });
            match self.request(Method::POST, url, Some(&body), &[]).await {
                Ok(value) => {
                    tracing::debug!(count = messages.len(), "batch uploaded");
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && retry.allows_retry(attempt) => {
                    let delay = retry.backoff(attempt);
                    tracing::warn!(
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "batch delivery failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Perform a single request and classify the response.
    ///
    /// HTTP 200/201/204 is success; the JSON body is returned when present,
    /// `Value::Null` otherwise. Any other status becomes
    /// [`ClientError::Api`] with the JSON error payload if it parses, else
    /// the raw response text.
    pub(crate) async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> Result<Value, ClientError> {
        let mut request = self
            .http
            .request(method, url)
            .header("X-API-KEY", &self.api_key);

        if !query.is_empty() {
            request = request.query(query);
        }

        if let Some(body) = body {
            let encoded = serde_json::to_vec(body)?;
            if self.debug {
                tracing::debug!(url, payload = %body, "making request");
            }
            request = request.header("Content-Type", "application/json");
            if self.gzip {
                request = request
                    .header("Content-Encoding", "gzip")
                    .body(gzip_encode(&encoded)?);
            } else {
                request = request.body(encoded);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if matches!(
            status,
            StatusCode::OK | StatusCode::CREATED | StatusCode::NO_CONTENT
        ) {
            if text.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }

        let payload = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Err(ClientError::Api {
            status: status.as_u16(),
            payload,
        })
    }
}

/// Gzip-compress a serialized request body.
fn gzip_encode(data: &[u8]) -> Result<Vec<u8>, ClientError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;

    #[test]
    fn gzip_round_trip() {
        let data = br#"{"batch":[{"$type":"track_event"}]}"#;
        let compressed = gzip_encode(data).unwrap();

        let mut decoder = GzDecoder::new(&compressed[..]);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn user_agent_carries_version() {
        assert!(USER_AGENT.starts_with("meterline-rust/"));
        assert!(USER_AGENT.len() > "meterline-rust/".len());
    }
}
