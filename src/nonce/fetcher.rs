//! Nonce retrieval with bounded retries and stuck transaction detection

use super::log::NonceLogger;
use crate::chain::{BlockTag, ChainReader};
use crate::error::{NonceError, NonceResult, ReadError};

use ethers::types::Address;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Attempts made by [`NonceFetcher::get_current_nonce`]
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Base unit of the linear backoff between attempts
const BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Reads account nonces from a chain, tolerating transient RPC failures.
///
/// Holds no state between calls; concurrent calls for the same address are
/// independent and not deduplicated.
#[derive(Clone)]
pub struct NonceFetcher {
    reader: Arc<dyn ChainReader>,
    logger: Arc<dyn NonceLogger>,
}

/// Factory for a [`NonceFetcher`]
pub fn create_nonce_fetcher(
    reader: Arc<dyn ChainReader>,
    logger: Arc<dyn NonceLogger>,
) -> NonceFetcher {
    NonceFetcher::new(reader, logger)
}

impl NonceFetcher {
    pub fn new(reader: Arc<dyn ChainReader>, logger: Arc<dyn NonceLogger>) -> Self {
        Self { reader, logger }
    }

    /// Next nonce for `address` at the pending tag, with the default attempt budget
    pub async fn get_current_nonce(&self, address: Address) -> NonceResult<u64> {
        self.get_current_nonce_with_attempts(address, DEFAULT_MAX_ATTEMPTS)
            .await
    }

    /// Next nonce for `address` at the pending tag.
    ///
    /// Makes up to `max_attempts` reads, sleeping `100ms * attempt` after each
    /// failure that still has an attempt behind it. On exhaustion the last
    /// reader error is returned.
    pub async fn get_current_nonce_with_attempts(
        &self,
        address: Address,
        max_attempts: u32,
    ) -> NonceResult<u64> {
        let wallet = format!("{:?}", address);
        let mut last_error: Option<ReadError> = None;

        for attempt in 1..=max_attempts {
            match self
                .reader
                .get_transaction_count(address, BlockTag::Pending)
                .await
            {
                Ok(nonce) => {
                    self.logger.debug(
                        json!({ "wallet": wallet, "nonce": nonce, "attempt": attempt }),
                        "fetched current nonce",
                    );
                    return Ok(nonce);
                }
                Err(e) => {
                    self.logger.warn(
                        json!({
                            "wallet": wallet,
                            "attempt": attempt,
                            "max_attempts": max_attempts,
                            "error": e.message(),
                        }),
                        &format!("failed to fetch nonce, attempt {}/{}", attempt, max_attempts),
                    );
                    last_error = Some(e);

                    if attempt < max_attempts {
                        tokio::time::sleep(BACKOFF_STEP * attempt).await;
                    }
                }
            }
        }

        self.logger.error(
            json!({
                "wallet": wallet,
                "error": last_error.as_ref().map(ReadError::message),
            }),
            "failed to fetch nonce after all retry attempts",
        );

        Err(last_error.map_or(NonceError::FetchFailed, NonceError::Read))
    }

    /// Whether `address` appears to have transactions stuck in the mempool.
    ///
    /// More than one pending-but-unmined transaction counts as stuck. A read
    /// failure is logged and reported as `false`, so `false` does not mean
    /// the account was confirmed healthy.
    pub async fn has_stuck_transactions(&self, address: Address) -> bool {
        let wallet = format!("{:?}", address);

        let counts = futures::try_join!(
            self.reader.get_transaction_count(address, BlockTag::Latest),
            self.reader.get_transaction_count(address, BlockTag::Pending),
        );

        match counts {
            Ok((latest_nonce, pending_nonce)) => {
                let stuck = pending_nonce > latest_nonce.saturating_add(1);
                if stuck {
                    self.logger.warn(
                        json!({
                            "wallet": wallet,
                            "latest_nonce": latest_nonce,
                            "pending_nonce": pending_nonce,
                        }),
                        "detected stuck transactions",
                    );
                }
                stuck
            }
            Err(e) => {
                self.logger.error(
                    json!({ "wallet": wallet, "error": e.message() }),
                    "failed to check for stuck transactions",
                );
                false
            }
        }
    }
}
