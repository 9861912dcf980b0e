// src/services/funding.rs
//! Funding Coordinator
//!
//! Makes sure a sender can afford a transaction before it is submitted. When
//! the sender's balance falls short of the upfront cost, the sponsor account
//! transfers exactly the shortfall and the transfer is confirmed on-chain
//! before control returns. The ledger offers no atomic bundle, so funding and
//! the sender's own transaction are two separate phases; callers see the
//! funding phase's outcome as a [`FundingOutcome`].

use crate::blockchain::confirmation::{ConfirmationWaiter, WaitSettings};
use crate::blockchain::ledger_client::LedgerClient;
use crate::blockchain::nonce::SenderLocks;
use crate::error::{DidError, Result};
use crate::models::transaction::{GasOverrides, UnsignedTransaction};
use crate::services::transaction_builder::TransactionBuilder;
use ethers::types::{Address, BlockNumber, H256, U256};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;

/// Maximum amount the transaction can consume: `gas_limit * gas_price + value`.
///
/// # Errors
/// - `MissingGasParameters` if gas price or limit is absent
/// - `AmountOverflow` if the cost does not fit in 256 bits
pub fn upfront_cost(tx: &UnsignedTransaction) -> Result<U256> {
    let (gas_limit, gas_price) = match (tx.gas_limit, tx.gas_price) {
        (Some(limit), Some(price)) => (limit, price),
        _ => return Err(DidError::MissingGasParameters),
    };
    gas_limit
        .checked_mul(gas_price)
        .and_then(|gas| gas.checked_add(tx.value))
        .ok_or(DidError::AmountOverflow {
            gas_limit,
            gas_price,
            value: tx.value,
        })
}

/// A top-up the sponsor is able to cover, not yet submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct TopUp {
    pub sponsor: Address,
    pub shortfall: U256,
    pub transfer: UnsignedTransaction,
}

/// What the funding phase did for a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FundingOutcome {
    /// The sender already held enough
    NotRequired,
    /// A sponsor transfer was mined; `confirmed` is false if it reverted
    ToppedUp {
        tx_hash: H256,
        amount: U256,
        confirmed: bool,
    },
}

impl FundingOutcome {
    /// Whether the sender can now afford the transaction.
    pub fn confirmed(&self) -> bool {
        match self {
            FundingOutcome::NotRequired => true,
            FundingOutcome::ToppedUp { confirmed, .. } => *confirmed,
        }
    }

    pub fn tx_hash(&self) -> Option<H256> {
        match self {
            FundingOutcome::NotRequired => None,
            FundingOutcome::ToppedUp { tx_hash, .. } => Some(*tx_hash),
        }
    }
}

/// Sources sponsor top-ups for underfunded senders.
pub struct FundingCoordinator {
    ledger: Arc<dyn LedgerClient>,
    builder: Arc<TransactionBuilder>,
    waiter: ConfirmationWaiter,
    wait: WaitSettings,
    locks: SenderLocks,
}

impl FundingCoordinator {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        builder: Arc<TransactionBuilder>,
        wait: WaitSettings,
        locks: SenderLocks,
    ) -> Self {
        Self {
            waiter: ConfirmationWaiter::new(ledger.clone()),
            ledger,
            builder,
            wait,
            locks,
        }
    }

    /// Amount `sender` is missing to hold `required`; zero when already covered.
    pub async fn required_top_up(&self, sender: Address, required: U256) -> Result<U256> {
        let balance = self.ledger.get_balance(sender, BlockNumber::Latest).await?;
        Ok(required.saturating_sub(balance))
    }

    /// Decides whether `tx` needs a top-up and, if so, builds the sponsor transfer.
    ///
    /// # Errors
    /// - `NoSponsor` if a top-up is needed and no sponsor is configured
    /// - `SponsorIsSender` if the sponsor is the underfunded sender itself
    /// - `SponsorUnderfunded` if the sponsor's balance is below the shortfall
    pub async fn plan(&self, tx: &UnsignedTransaction, sponsor: Option<Address>) -> Result<Option<TopUp>> {
        let shortfall = self.required_top_up(tx.from, upfront_cost(tx)?).await?;
        if shortfall.is_zero() {
            return Ok(None);
        }

        let sponsor = sponsor.ok_or(DidError::NoSponsor {
            sender: tx.from,
            required: shortfall,
        })?;
        if sponsor == tx.from {
            return Err(DidError::SponsorIsSender {
                sender: tx.from,
                required: shortfall,
            });
        }
        let available = self.ledger.get_balance(sponsor, BlockNumber::Latest).await?;
        if available < shortfall {
            return Err(DidError::SponsorUnderfunded {
                required: shortfall,
                available,
            });
        }

        let transfer = self
            .builder
            .build_transaction(
                Some(sponsor),
                Some(tx.from),
                shortfall,
                None,
                GasOverrides::default(),
            )
            .await?;
        Ok(Some(TopUp {
            sponsor,
            shortfall,
            transfer,
        }))
    }

    /// Broadcasts the sponsor transfer; the node signs for the sponsor account.
    ///
    /// A failed broadcast hands the transfer's nonce back, so the next top-up
    /// reuses it instead of leaving a gap.
    pub async fn submit(&self, top_up: &TopUp) -> Result<H256> {
        let tx_hash = match self.ledger.send_transaction(&top_up.transfer).await {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                warn!(
                    "Funding transfer from sponsor {:?} to {:?} was not broadcast: {}",
                    top_up.sponsor, top_up.transfer.to, err
                );
                self.builder.resync_nonce(top_up.sponsor);
                return Err(err);
            }
        };
        info!(
            "Providing {} wei from sponsor {:?} to {:?} in {:?}",
            top_up.shortfall, top_up.sponsor, top_up.transfer.to, tx_hash
        );
        Ok(tx_hash)
    }

    /// Tops up `tx.from` if needed and waits for the transfer to be mined.
    ///
    /// Returns once the sender's balance reflects the top-up, so the caller's
    /// own transaction can follow. The sponsor is locked while its transfer is
    /// built and broadcast, not while it is being confirmed.
    pub async fn ensure_funded(&self, tx: &UnsignedTransaction, sponsor: Option<Address>) -> Result<FundingOutcome> {
        let (top_up, tx_hash) = {
            let _sponsor_guard = match sponsor {
                Some(sponsor) if sponsor != tx.from => Some(self.locks.acquire(sponsor).await),
                _ => None,
            };
            let Some(top_up) = self.plan(tx, sponsor).await? else {
                return Ok(FundingOutcome::NotRequired);
            };
            let tx_hash = self.submit(&top_up).await?;
            (top_up, tx_hash)
        };

        let confirmed = self.waiter.wait(tx_hash, self.wait).await?;
        if !confirmed {
            warn!("Funding transfer {:?} to {:?} failed", tx_hash, tx.from);
        }
        Ok(FundingOutcome::ToppedUp {
            tx_hash,
            amount: top_up.shortfall,
            confirmed,
        })
    }
}
