// src/blockchain/ledger_client.rs
//! Ledger client abstraction and its JSON-RPC implementation.
//!
//! The transaction-management core only needs a handful of node capabilities:
//! balance and nonce reads, receipt lookups, submission of node-signed and
//! locally-signed transactions, and read-only contract calls. They are
//! collected in [`LedgerClient`] so the core can run against any transport.

use crate::error::{DidError, Result};
use crate::models::transaction::UnsignedTransaction;
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockId, BlockNumber, Bytes, TransactionReceipt, TransactionRequest, H256, U256,
};
use std::sync::Arc;

/// JSON-RPC capabilities consumed by the transaction manager.
///
/// Implementations are shared read-only handles; every method may be called
/// concurrently from independent operations.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Balance of `address` at `block`.
    async fn get_balance(&self, address: Address, block: BlockNumber) -> Result<U256>;

    /// Transaction count of `address` at `block` (`Pending` includes the mempool).
    async fn get_transaction_count(&self, address: Address, block: BlockNumber) -> Result<U256>;

    /// Receipt for `tx_hash`, or `None` while the transaction is not yet mined.
    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>>;

    /// Submits a transaction for the node to sign with an unlocked account.
    async fn send_transaction(&self, tx: &UnsignedTransaction) -> Result<H256>;

    /// Broadcasts an already-signed transaction.
    async fn send_raw_transaction(&self, signed: Bytes) -> Result<H256>;

    /// Executes a read-only contract call against the latest block.
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;
}

/// [`LedgerClient`] backed by an `ethers` HTTP provider.
#[derive(Clone)]
pub struct EthersLedgerClient {
    provider: Arc<Provider<Http>>,
}

impl EthersLedgerClient {
    /// Connects to the JSON-RPC endpoint at `rpc_url`.
    ///
    /// # Errors
    /// Returns `Ledger` if the URL cannot be parsed.
    pub fn new(rpc_url: &str) -> Result<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| DidError::Ledger(format!("invalid RPC URL '{}': {}", rpc_url, e)))?;
        Ok(Self {
            provider: Arc::new(provider),
        })
    }

    /// Chain id reported by the node, used for EIP-155 signing.
    pub async fn chain_id(&self) -> Result<u64> {
        self.provider
            .get_chainid()
            .await
            .map(|id| id.as_u64())
            .map_err(ledger_error)
    }
}

fn ledger_error(err: impl std::fmt::Display) -> DidError {
    DidError::Ledger(err.to_string())
}

#[async_trait]
impl LedgerClient for EthersLedgerClient {
    async fn get_balance(&self, address: Address, block: BlockNumber) -> Result<U256> {
        self.provider
            .get_balance(address, Some(BlockId::Number(block)))
            .await
            .map_err(ledger_error)
    }

    async fn get_transaction_count(&self, address: Address, block: BlockNumber) -> Result<U256> {
        self.provider
            .get_transaction_count(address, Some(BlockId::Number(block)))
            .await
            .map_err(ledger_error)
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(ledger_error)
    }

    async fn send_transaction(&self, tx: &UnsignedTransaction) -> Result<H256> {
        let request: TransactionRequest = tx.into();
        let request: TypedTransaction = request.into();
        self.provider
            .send_transaction(request, None)
            .await
            .map(|pending| pending.tx_hash())
            .map_err(ledger_error)
    }

    async fn send_raw_transaction(&self, signed: Bytes) -> Result<H256> {
        self.provider
            .send_raw_transaction(signed)
            .await
            .map(|pending| pending.tx_hash())
            .map_err(ledger_error)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        let request: TypedTransaction = TransactionRequest::new().to(to).data(data).into();
        self.provider.call(&request, None).await.map_err(ledger_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_rpc_url() {
        assert!(matches!(
            EthersLedgerClient::new("not a url"),
            Err(DidError::Ledger(_))
        ));
        assert!(EthersLedgerClient::new("http://localhost:8545").is_ok());
    }
}
