// src/services/did_manager.rs
//! DID Manager
//!
//! Orchestrates identity-mutating operations as a linear pipeline:
//! authorize → build → fund → sign → submit → confirm.
//!
//! The pipeline is exposed in two phases so partial completion is observable:
//! the `prepare_*` methods authorize, build and fund, returning a
//! [`PreparedTransaction`]; [`DidManager::submit`] signs and broadcasts it. A
//! prepared transaction holds its sender's lock, so no other transaction from
//! the same sender is built or submitted until it is submitted or dropped.
//! The convenience methods (`change_owner`, `set_attribute`, ...) run every
//! phase and wait for confirmation.

use crate::blockchain::confirmation::{ConfirmationWaiter, WaitSettings};
use crate::blockchain::ledger_client::LedgerClient;
use crate::blockchain::nonce::{NonceStrategy, SenderLocks};
use crate::contracts::did_registry::DidRegistry;
use crate::error::{DidError, Result};
use crate::models::did::{Attribute, Delegate};
use crate::models::transaction::UnsignedTransaction;
use crate::services::authorization::AuthorizationGuard;
use crate::services::funding::{FundingCoordinator, FundingOutcome};
use crate::services::signer::TransactionSigner;
use crate::services::transaction_builder::{GasConfig, TransactionBuilder};
use crate::utils::formatting::address_from_did;
use ethers::types::{Address, H256};
use log::{info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// Static configuration of a [`DidManager`].
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    pub registry: DidRegistry,
    /// Account that covers senders' shortfalls, if any
    pub sponsor: Option<Address>,
    pub gas: GasConfig,
    pub wait: WaitSettings,
}

/// A built and funded transaction, not yet signed or submitted.
///
/// Dropping it without submitting releases the sender and returns its nonce
/// to the nonce strategy.
pub struct PreparedTransaction {
    tx: UnsignedTransaction,
    funding: FundingOutcome,
    nonces: Arc<dyn NonceStrategy>,
    submitted: bool,
    _sender_guard: OwnedMutexGuard<()>,
}

impl PreparedTransaction {
    pub fn transaction(&self) -> &UnsignedTransaction {
        &self.tx
    }

    pub fn funding(&self) -> FundingOutcome {
        self.funding
    }
}

impl Drop for PreparedTransaction {
    fn drop(&mut self) {
        if !self.submitted {
            self.nonces.resync(self.tx.from);
        }
    }
}

/// Result of a full operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OperationReceipt {
    pub funding: FundingOutcome,
    pub tx_hash: H256,
    /// `false` when the transaction was mined but reverted
    pub success: bool,
}

/// Entry point for DID registry mutations.
pub struct DidManager {
    guard: AuthorizationGuard,
    builder: Arc<TransactionBuilder>,
    funding: FundingCoordinator,
    signer: Arc<dyn TransactionSigner>,
    waiter: ConfirmationWaiter,
    ledger: Arc<dyn LedgerClient>,
    nonces: Arc<dyn NonceStrategy>,
    locks: SenderLocks,
    sponsor: Option<Address>,
    wait: WaitSettings,
}

impl DidManager {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<dyn TransactionSigner>,
        nonces: Arc<dyn NonceStrategy>,
        settings: ManagerSettings,
    ) -> Self {
        let locks = SenderLocks::new();
        let builder = Arc::new(TransactionBuilder::new(
            ledger.clone(),
            nonces.clone(),
            settings.registry,
            settings.gas,
        ));
        let funding = FundingCoordinator::new(
            ledger.clone(),
            builder.clone(),
            settings.wait,
            locks.clone(),
        );

        Self {
            guard: AuthorizationGuard::new(ledger.clone(), settings.registry),
            builder,
            funding,
            signer,
            waiter: ConfirmationWaiter::new(ledger.clone()),
            ledger,
            nonces,
            locks,
            sponsor: settings.sponsor,
            wait: settings.wait,
        }
    }

    /// Current owner of the identity named by `did`.
    pub async fn lookup_owner(&self, did: &str) -> Result<Address> {
        self.guard.lookup_owner(address_from_did(did)?).await
    }

    /// Authorizes the caller and takes the owner's sender lock.
    async fn authorize(&self, did: &str, private_key: &str) -> Result<(Address, Address, OwnedMutexGuard<()>)> {
        let identity = address_from_did(did)?;
        let owner = self.guard.require_ownership(private_key, identity).await?;
        let sender_guard = self.locks.acquire(owner).await;
        Ok((identity, owner, sender_guard))
    }

    /// Funds `tx` and wraps it for submission.
    async fn fund(&self, tx: UnsignedTransaction, sender_guard: OwnedMutexGuard<()>) -> Result<PreparedTransaction> {
        let mut prepared = PreparedTransaction {
            tx,
            funding: FundingOutcome::NotRequired,
            nonces: self.nonces.clone(),
            submitted: false,
            _sender_guard: sender_guard,
        };

        prepared.funding = self.funding.ensure_funded(&prepared.tx, self.sponsor).await?;
        match prepared.funding.tx_hash() {
            Some(tx_hash) if !prepared.funding.confirmed() => {
                return Err(DidError::TransactionFailed { tx_hash })
            }
            _ => {}
        }
        Ok(prepared)
    }

    pub async fn prepare_change_owner(
        &self,
        did: &str,
        new_owner: Address,
        private_key: &str,
    ) -> Result<PreparedTransaction> {
        let (identity, owner, sender_guard) = self.authorize(did, private_key).await?;
        let tx = self.builder.change_owner_tx(identity, new_owner, owner).await?;
        self.fund(tx, sender_guard).await
    }

    pub async fn prepare_set_attribute(
        &self,
        did: &str,
        attribute: &Attribute,
        private_key: &str,
    ) -> Result<PreparedTransaction> {
        let (identity, owner, sender_guard) = self.authorize(did, private_key).await?;
        let tx = self
            .builder
            .set_attribute_tx(identity, &attribute.key, &attribute.value, attribute.expires_in, owner)
            .await?;
        self.fund(tx, sender_guard).await
    }

    pub async fn prepare_add_delegate(
        &self,
        did: &str,
        delegate: &Delegate,
        private_key: &str,
    ) -> Result<PreparedTransaction> {
        let (identity, owner, sender_guard) = self.authorize(did, private_key).await?;
        let tx = self
            .builder
            .add_delegate_tx(
                identity,
                delegate.address,
                delegate.delegate_type.as_str(),
                delegate.expires_in,
                owner,
            )
            .await?;
        self.fund(tx, sender_guard).await
    }

    /// Signs and broadcasts a prepared transaction.
    ///
    /// Broadcast transactions cannot be withdrawn; abandoning a later
    /// confirmation wait does not cancel them.
    pub async fn submit(&self, mut prepared: PreparedTransaction, private_key: &str) -> Result<H256> {
        let signed = self.signer.sign(private_key, &prepared.tx)?;
        let tx_hash = self.ledger.send_raw_transaction(signed).await?;
        prepared.submitted = true;
        let tx = prepared.transaction();
        info!("Submitted {:?} from {:?} with nonce {}", tx_hash, tx.from, tx.nonce);
        Ok(tx_hash)
    }

    /// Waits for `tx_hash` using the configured poll interval and timeout.
    pub async fn wait(&self, tx_hash: H256) -> Result<bool> {
        self.waiter.wait(tx_hash, self.wait).await
    }

    /// Waits for `tx_hash` with a caller-chosen deadline.
    pub async fn wait_with_timeout(&self, tx_hash: H256, timeout: Duration) -> Result<bool> {
        self.waiter
            .wait_for_confirmation(tx_hash, self.wait.poll_interval, timeout)
            .await
    }

    async fn complete(&self, prepared: PreparedTransaction, private_key: &str) -> Result<OperationReceipt> {
        let funding = prepared.funding();
        let tx_hash = self.submit(prepared, private_key).await?;
        let success = self.wait(tx_hash).await?;
        if !success {
            warn!("Registry rejected {:?}", tx_hash);
        }
        Ok(OperationReceipt {
            funding,
            tx_hash,
            success,
        })
    }

    /// Transfers ownership of `did` to `new_owner`.
    pub async fn change_owner(&self, did: &str, new_owner: Address, private_key: &str) -> Result<OperationReceipt> {
        let prepared = self.prepare_change_owner(did, new_owner, private_key).await?;
        self.complete(prepared, private_key).await
    }

    pub async fn set_attribute(&self, did: &str, attribute: &Attribute, private_key: &str) -> Result<OperationReceipt> {
        let prepared = self.prepare_set_attribute(did, attribute, private_key).await?;
        self.complete(prepared, private_key).await
    }

    pub async fn add_delegate(&self, did: &str, delegate: &Delegate, private_key: &str) -> Result<OperationReceipt> {
        let prepared = self.prepare_add_delegate(did, delegate, private_key).await?;
        self.complete(prepared, private_key).await
    }

    /// Publishes a service endpoint as the `did/svc/<name>` attribute.
    pub async fn set_service_endpoint(
        &self,
        did: &str,
        name: &str,
        url: &str,
        private_key: &str,
    ) -> Result<OperationReceipt> {
        self.set_attribute(did, &Attribute::service_endpoint(name, url), private_key)
            .await
    }
}
