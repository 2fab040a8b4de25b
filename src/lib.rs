//! Nonce Watch - retrying nonce reads and stuck transaction detection
//!
//! The `nonce` module holds the fetcher used by transaction submitters. The
//! remaining modules run it as a service that watches a set of wallets across
//! chains and reports their state over HTTP and Prometheus.

pub mod api;
pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod nonce;
pub mod watch;

pub use chain::{BlockTag, ChainReader};
pub use error::{error_message, NonceError, NonceResult, ReadError};
pub use nonce::{create_nonce_fetcher, NonceFetcher, NonceLogger, TracingLogger};
