//! Client configuration.

use std::fmt;
use std::time::Duration;

use crate::consumer::ErrorCallback;
use crate::error::ClientError;

/// Hosted API endpoint used when no host is configured.
pub const DEFAULT_HOST: &str = "https://api.meterline.io";

/// Configuration for a [`MeterClient`](crate::MeterClient).
///
/// All fields have working defaults except `api_key`.
#[derive(Clone)]
pub struct ClientConfig {
    /// API key sent with every request. Required, non-empty.
    pub api_key: String,

    /// Base URL of the metering service. A trailing slash is stripped.
    pub host: String,

    /// Log request payloads at debug level.
    pub debug: bool,

    /// When `false`, nothing is ever delivered: consumers never start and
    /// every enqueue reports trivially successful.
    pub send: bool,

    /// Bypass the queue and consumers entirely: every tracked event is
    /// delivered immediately as a single-message batch and the call returns
    /// its result.
    pub sync_mode: bool,

    /// Queue capacity; enqueues beyond it are rejected (default: 10 000).
    pub max_queue_size: usize,

    /// Batch count threshold that triggers a delivery (default: 100).
    pub flush_at: usize,

    /// Maximum time a partially filled batch waits before delivery
    /// (default: 500 ms).
    pub flush_interval: Duration,

    /// Gzip-compress request bodies.
    pub gzip: bool,

    /// Total delivery attempts per batch, including the first (default: 3).
    pub max_retries: u32,

    /// Per-request network timeout (default: 15 s). Exceeding it counts as
    /// a retryable transport error.
    pub timeout: Duration,

    /// Number of background consumers draining the queue (default: 1).
    ///
    /// With more than one worker, delivery order is only guaranteed within
    /// a single consumer, not across them.
    pub workers: usize,

    /// Called with the failed batch and error when a delivery fails fatally
    /// (non-retryable status or retries exhausted).
    pub on_error: Option<ErrorCallback>,
}

impl ClientConfig {
    /// Create a configuration with defaults for the given API key.
    #[must_use]
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            host: DEFAULT_HOST.to_string(),
            debug: false,
            send: true,
            sync_mode: false,
            max_queue_size: 10_000,
            flush_at: 100,
            flush_interval: Duration::from_millis(500),
            gzip: false,
            max_retries: 3,
            timeout: Duration::from_secs(15),
            workers: 1,
            on_error: None,
        }
    }

    /// Set the service host.
    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the batch count threshold.
    #[must_use]
    pub fn with_flush_at(mut self, flush_at: usize) -> Self {
        self.flush_at = flush_at;
        self
    }

    /// Set the flush interval.
    #[must_use]
    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set the queue capacity.
    #[must_use]
    pub fn with_max_queue_size(mut self, size: usize) -> Self {
        self.max_queue_size = size;
        self
    }

    /// Set the total delivery attempts per batch.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the number of background consumers.
    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Enable gzip request bodies.
    #[must_use]
    pub fn with_gzip(mut self, gzip: bool) -> Self {
        self.gzip = gzip;
        self
    }

    /// Enable synchronous delivery.
    #[must_use]
    pub fn with_sync_mode(mut self, sync_mode: bool) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Enable or disable sending.
    #[must_use]
    pub fn with_send(mut self, send: bool) -> Self {
        self.send = send;
        self
    }

    /// Enable payload-level debug logging.
    #[must_use]
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the fatal-delivery error callback.
    #[must_use]
    pub fn with_on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Configuration`] when the API key is empty, no
    /// workers are configured, or `flush_at` is zero.
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.api_key.trim().is_empty() {
            return Err(ClientError::Configuration(
                "api_key must be a non-empty string".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(ClientError::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.flush_at == 0 {
            return Err(ClientError::Configuration(
                "flush_at must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("host", &self.host)
            .field("debug", &self.debug)
            .field("send", &self.send)
            .field("sync_mode", &self.sync_mode)
            .field("max_queue_size", &self.max_queue_size)
            .field("flush_at", &self.flush_at)
            .field("flush_interval", &self.flush_interval)
            .field("gzip", &self.gzip)
            .field("max_retries", &self.max_retries)
            .field("timeout", &self.timeout)
            .field("workers", &self.workers)
            .field("on_error", &self.on_error.as_ref().map(|_| "<callback>"))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = ClientConfig::new("key");
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.max_queue_size, 10_000);
        assert_eq!(config.flush_at, 100);
        assert_eq!(config.flush_interval, Duration::from_millis(500));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.timeout, Duration::from_secs(15));
        assert_eq!(config.workers, 1);
        assert!(config.send);
        assert!(!config.sync_mode);
        assert!(!config.gzip);
    }

    #[test]
    fn rejects_empty_api_key() {
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::new("  ").validate().is_err());
        assert!(ClientConfig::new("key").validate().is_ok());
    }

    #[test]
    fn rejects_zero_workers_and_flush_at() {
        assert!(ClientConfig::new("key").with_workers(0).validate().is_err());
        assert!(ClientConfig::new("key").with_flush_at(0).validate().is_err());
    }
}
