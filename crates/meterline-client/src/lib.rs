//! Meterline client SDK.
//!
//! This crate provides a client library for applications to report usage
//! events and manage customers, subscriptions, and plans on a meterline
//! service. Tracked events are queued and delivered in batches by background
//! consumers with bounded retries; everything else is a blocking call.
//!
//! # Example
//!
//! ```no_run
//! use meterline_client::{ClientConfig, MeterClient, TrackEvent};
//!
//! # async fn example() -> Result<(), meterline_client::ClientError> {
//! let client = MeterClient::with_config(
//!     ClientConfig::new("your-api-key").with_host("http://localhost:8000"),
//! )?;
//!
//! let accepted = client
//!     .track_event(
//!         TrackEvent::new("customer_id", "api_call")
//!             .with_properties(serde_json::json!({"region": "US", "mb_used": 150})),
//!     )
//!     .await?;
//! assert!(accepted);
//!
//! // Deliver everything still buffered before the program exits.
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod config;
mod consumer;
mod delivery;
mod error;
mod operation;
mod types;

pub use client::MeterClient;
pub use config::{ClientConfig, DEFAULT_HOST};
pub use consumer::ErrorCallback;
pub use error::ClientError;
pub use operation::Operation;
pub use types::*;

pub use meterline_core::{Message, MAX_BATCH_BYTES, MAX_MESSAGE_BYTES};
