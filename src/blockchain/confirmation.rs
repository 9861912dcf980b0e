// src/blockchain/confirmation.rs
//! Bounded polling for transaction receipts.
//!
//! A submitted transaction moves from `Pending` to exactly one of
//! `Succeeded`, `Failed` or a timeout. A failed (reverted) transaction is a
//! normal result, not an error; only the timeout is an error, and it leaves
//! the transaction's outcome unknown.

use crate::blockchain::ledger_client::LedgerClient;
use crate::error::{DidError, Result};
use ethers::types::{TransactionReceipt, H256, U64};
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

/// Default delay between receipt lookups.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(4_000);

/// Default overall deadline for a confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Observed state of a submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationState {
    /// No receipt yet
    Pending,
    /// Mined with a success status
    Succeeded,
    /// Mined but reverted
    Failed,
}

impl ConfirmationState {
    fn from_receipt(receipt: &TransactionReceipt) -> Self {
        if receipt.status == Some(U64::from(1)) {
            ConfirmationState::Succeeded
        } else {
            ConfirmationState::Failed
        }
    }
}

/// Poll interval and deadline for one confirmation wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

/// Waits for transactions to be mined.
#[derive(Clone)]
pub struct ConfirmationWaiter {
    ledger: Arc<dyn LedgerClient>,
}

impl ConfirmationWaiter {
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Looks up the receipt once.
    ///
    /// A failed lookup is reported as `Pending`: the ledger is eventually
    /// consistent and a freshly broadcast transaction may not be visible yet.
    pub async fn poll_once(&self, tx_hash: H256) -> ConfirmationState {
        match self.ledger.get_transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => ConfirmationState::from_receipt(&receipt),
            Ok(None) => ConfirmationState::Pending,
            Err(err) => {
                warn!("Receipt lookup for {:?} failed, treating as pending: {}", tx_hash, err);
                ConfirmationState::Pending
            }
        }
    }

    /// Polls until the transaction is mined or `timeout` elapses.
    ///
    /// Returns `Ok(true)` for a successful transaction and `Ok(false)` for one
    /// that was mined but reverted. The deadline is measured from the start of
    /// the wait, so the total wait overshoots `timeout` by at most one
    /// `poll_interval` plus one lookup.
    ///
    /// # Errors
    /// `ConfirmationTimeout` when no receipt appears in time. The transaction
    /// may still be mined later; re-invoke with a fresh timeout to find out.
    pub async fn wait_for_confirmation(
        &self,
        tx_hash: H256,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<bool> {
        let started = Instant::now();
        let deadline = started + timeout;

        loop {
            match self.poll_once(tx_hash).await {
                ConfirmationState::Succeeded => {
                    info!("Transaction {:?} confirmed after {:?}", tx_hash, started.elapsed());
                    return Ok(true);
                }
                ConfirmationState::Failed => {
                    warn!("Transaction {:?} was mined but failed", tx_hash);
                    return Ok(false);
                }
                ConfirmationState::Pending => {}
            }

            if Instant::now() >= deadline {
                return Err(DidError::ConfirmationTimeout { tx_hash, timeout });
            }

            debug!("Mining {:?}...", tx_hash);
            sleep(poll_interval).await;
        }
    }

    /// [`wait_for_confirmation`](Self::wait_for_confirmation) with stored settings.
    pub async fn wait(&self, tx_hash: H256, settings: WaitSettings) -> Result<bool> {
        self.wait_for_confirmation(tx_hash, settings.poll_interval, settings.timeout)
            .await
    }
}
