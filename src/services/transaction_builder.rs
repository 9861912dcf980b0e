// src/services/transaction_builder.rs
//! Transaction Builder
//!
//! Turns high-level registry intents (change owner, set attribute, add
//! delegate) into fully-populated unsigned transactions. Gas defaults come from
//! the [`GasConfig`] supplied at construction; no gas estimation is performed,
//! so callers who need different values pass [`GasOverrides`].

use crate::blockchain::ledger_client::LedgerClient;
use crate::blockchain::nonce::NonceStrategy;
use crate::contracts::did_registry::DidRegistry;
use crate::error::{DidError, Result};
use crate::models::did::AttributeValue;
use crate::models::transaction::{CallSpec, GasOverrides, UnsignedTransaction};
use crate::utils::formatting::{attribute_to_bytes, key_to_fixed_width};
use ethers::abi::Token;
use ethers::types::{Address, Bytes, U256};
use log::debug;
use std::sync::Arc;

/// Gas price applied when none is configured: 20 gwei.
pub const DEFAULT_GAS_PRICE_WEI: u64 = 20_000_000_000;

/// Gas limit applied when none is configured.
pub const DEFAULT_GAS_LIMIT: u64 = 3_000_000;

/// Gas price and limit applied when a call supplies no override.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasConfig {
    pub gas_price: U256,
    pub gas_limit: U256,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            gas_price: U256::from(DEFAULT_GAS_PRICE_WEI),
            gas_limit: U256::from(DEFAULT_GAS_LIMIT),
        }
    }
}

/// Builds unsigned transactions against the ledger and the identity registry.
pub struct TransactionBuilder {
    ledger: Arc<dyn LedgerClient>,
    nonces: Arc<dyn NonceStrategy>,
    registry: DidRegistry,
    gas: GasConfig,
}

impl TransactionBuilder {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        nonces: Arc<dyn NonceStrategy>,
        registry: DidRegistry,
        gas: GasConfig,
    ) -> Self {
        Self {
            ledger,
            nonces,
            registry,
            gas,
        }
    }

    /// Returns `sender`'s nonce bookkeeping to the ledger's pending count.
    ///
    /// Called when a built transaction never reached the ledger.
    pub fn resync_nonce(&self, sender: Address) {
        self.nonces.resync(sender);
    }

    /// Populates a transaction from `from` to `to`.
    ///
    /// The nonce is assigned by the configured [`NonceStrategy`] on every call.
    /// Call data is encoded from `call` when present and is empty otherwise.
    ///
    /// # Errors
    /// - `MissingSender` if `from` is `None`
    /// - `UnknownMethod` / `Abi` if `call` cannot be encoded
    /// - ledger errors while reading the nonce
    pub async fn build_transaction(
        &self,
        from: Option<Address>,
        to: Option<Address>,
        value: U256,
        call: Option<CallSpec>,
        overrides: GasOverrides,
    ) -> Result<UnsignedTransaction> {
        let from = from.ok_or(DidError::MissingSender)?;
        // Encode before taking a nonce so a bad call does not consume one.
        let data = match &call {
            Some(call) => DidRegistry::encode(call)?,
            None => Bytes::default(),
        };
        let nonce = self.nonces.next_nonce(self.ledger.as_ref(), from).await?;

        let tx = UnsignedTransaction {
            from,
            to,
            nonce,
            value,
            gas_price: Some(overrides.gas_price.unwrap_or(self.gas.gas_price)),
            gas_limit: Some(overrides.gas_limit.unwrap_or(self.gas.gas_limit)),
            data,
        };
        debug!(
            "Built transaction from {:?} to {:?} nonce {} method {}",
            tx.from,
            tx.to,
            tx.nonce,
            call.as_ref().map(|c| c.method.as_str()).unwrap_or("<transfer>")
        );
        Ok(tx)
    }

    async fn registry_call(&self, from: Address, call: CallSpec) -> Result<UnsignedTransaction> {
        self.build_transaction(
            Some(from),
            Some(self.registry.address()),
            U256::zero(),
            Some(call),
            GasOverrides::default(),
        )
        .await
    }

    /// Transfers ownership of `identity` to `new_owner`, sent by the current owner.
    pub async fn change_owner_tx(
        &self,
        identity: Address,
        new_owner: Address,
        from_owner: Address,
    ) -> Result<UnsignedTransaction> {
        let call = CallSpec::new(
            "changeOwner",
            vec![Token::Address(identity), Token::Address(new_owner)],
        );
        self.registry_call(from_owner, call).await
    }

    /// Sets attribute `key` of `identity` for `expires_in` seconds.
    ///
    /// The key is stored in its fixed 32-byte form and the value in the
    /// encoding its DID document section prescribes.
    pub async fn set_attribute_tx(
        &self,
        identity: Address,
        key: &str,
        value: &AttributeValue,
        expires_in: u64,
        from_owner: Address,
    ) -> Result<UnsignedTransaction> {
        let name = key_to_fixed_width(key);
        let value = attribute_to_bytes(key, value)?;
        let call = CallSpec::new(
            "setAttribute",
            vec![
                Token::Address(identity),
                Token::FixedBytes(name.to_vec()),
                Token::Bytes(value.to_vec()),
                Token::Uint(U256::from(expires_in)),
            ],
        );
        self.registry_call(from_owner, call).await
    }

    /// Grants `delegate` the capability `delegate_type` for `expires_in` seconds.
    pub async fn add_delegate_tx(
        &self,
        identity: Address,
        delegate: Address,
        delegate_type: &str,
        expires_in: u64,
        from_owner: Address,
    ) -> Result<UnsignedTransaction> {
        let call = CallSpec::new(
            "addDelegate",
            vec![
                Token::Address(identity),
                Token::FixedBytes(key_to_fixed_width(delegate_type).to_vec()),
                Token::Address(delegate),
                Token::Uint(U256::from(expires_in)),
            ],
        );
        self.registry_call(from_owner, call).await
    }
}
