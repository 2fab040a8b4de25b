//! Nonce observation for transaction submission
//!
//! Wraps a chain reader's transaction-count query with retries and a
//! stuck-transaction heuristic. Logging goes through an injected
//! `NonceLogger` rather than a global sink.

mod fetcher;
pub mod log;

pub use fetcher::{create_nonce_fetcher, NonceFetcher, DEFAULT_MAX_ATTEMPTS};
pub use log::{NonceLogger, TracingLogger};
