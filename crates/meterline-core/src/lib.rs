//! Core primitives for the meterline SDK.
//!
//! This crate provides the runtime pieces the client builds on:
//!
//! - **Messages**: [`Message`], the opaque payload unit with its size cap
//! - **Queue**: [`MessageQueue`], a bounded FIFO with flush tracking
//! - **Batches**: [`Batch`], count- and byte-bounded message groups
//! - **Retries**: [`RetryPolicy`], exponential backoff with jitter
//!
//! Nothing in this crate performs I/O; delivery lives in `meterline-client`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod batch;
pub mod message;
pub mod queue;
pub mod retry;

pub use batch::{Batch, BatchPush, BATCH_BYTES_BUDGET, DEFAULT_FLUSH_AT, MAX_BATCH_BYTES};
pub use message::{Message, KEY_LIBRARY, KEY_LIBRARY_VERSION, KEY_TYPE, MAX_MESSAGE_BYTES};
pub use queue::MessageQueue;
pub use retry::RetryPolicy;
