//! Error types for the nonce watcher

use thiserror::Error;

/// Failure reported by a [`ChainReader`](crate::chain::ChainReader) call.
///
/// Readers fail in one of three shapes: a typed error from the client
/// library, a bare message, or something that carries no description at all.
#[derive(Error, Debug)]
pub enum ReadError {
    #[error(transparent)]
    Provider(Box<dyn std::error::Error + Send + Sync>),

    #[error("{0}")]
    Message(String),

    #[error("Unknown error")]
    Unknown,
}

impl ReadError {
    /// Wrap a typed client error
    pub fn provider<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        ReadError::Provider(Box::new(err))
    }

    /// Human readable message used in log entries
    pub fn message(&self) -> String {
        match self {
            ReadError::Provider(e) => e.to_string(),
            ReadError::Message(msg) => msg.clone(),
            ReadError::Unknown => "Unknown error".to_string(),
        }
    }
}

impl From<ethers::providers::ProviderError> for ReadError {
    fn from(err: ethers::providers::ProviderError) -> Self {
        ReadError::provider(err)
    }
}

impl From<tokio::time::error::Elapsed> for ReadError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        ReadError::provider(err)
    }
}

impl From<String> for ReadError {
    fn from(msg: String) -> Self {
        ReadError::Message(msg)
    }
}

impl From<&str> for ReadError {
    fn from(msg: &str) -> Self {
        ReadError::Message(msg.to_string())
    }
}

/// Extract a log-friendly message from a reader failure.
pub fn error_message(err: &ReadError) -> String {
    err.message()
}

/// Main error type for the nonce watcher
#[derive(Error, Debug)]
pub enum NonceError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: u64 },

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("Failed to fetch nonce")]
    FetchFailed,

    #[error("Server error: {0}")]
    Server(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for nonce watcher operations
pub type NonceResult<T> = Result<T, NonceError>;
