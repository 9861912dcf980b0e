// src/error.rs
//! Error taxonomy for DID registry transaction management.
//!
//! Validation errors indicate caller programming mistakes and are never
//! retried. Business-rule failures (`NotOwner`, `SponsorUnderfunded`) carry
//! both compared values so they can be diagnosed without re-querying the
//! ledger. `ConfirmationTimeout` leaves the transaction outcome unknown.

use ethers::types::{Address, H256, U256};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the transaction-management core.
#[derive(Debug, Error)]
pub enum DidError {
    /// A transaction was requested without a sender address.
    #[error("missing required parameter `from`")]
    MissingSender,

    /// Upfront cost requested for a transaction without gas price or limit.
    #[error("missing required gas price or gas limit")]
    MissingGasParameters,

    /// The method is not part of the registry interface description.
    #[error("method '{method}' is not defined in the registry interface")]
    UnknownMethod { method: String },

    /// The attribute key names an undefined DID document section.
    #[error("DID document section '{section}' is not defined")]
    UnknownSection { section: String },

    /// An attribute value was expected to be `0x`-prefixed hex.
    #[error("provided value '{value}' is invalid HEX")]
    InvalidHex { value: String },

    #[error("provided value '{value}' is invalid base64")]
    InvalidBase64 { value: String },

    /// The caller's key does not control the identity.
    #[error("caller {caller:?} is not the owner of {identity:?}; the owner is {owner:?}")]
    NotOwner {
        identity: Address,
        owner: Address,
        caller: Address,
    },

    /// The sponsor cannot cover the sender's shortfall.
    #[error("requested extra funds {required} wei is above sponsor's balance {available} wei")]
    SponsorUnderfunded { required: U256, available: U256 },

    /// The configured sponsor is the sender that needs funds.
    #[error("sender {sender:?} needs {required} wei and cannot sponsor itself")]
    SponsorIsSender { sender: Address, required: U256 },

    /// A top-up is needed but no sponsor account is configured.
    #[error("sender {sender:?} needs {required} wei but no sponsor is configured")]
    NoSponsor { sender: Address, required: U256 },

    /// Upfront cost does not fit in 256 bits.
    #[error("upfront cost overflows: gas limit {gas_limit} x gas price {gas_price} + value {value}")]
    AmountOverflow {
        gas_limit: U256,
        gas_price: U256,
        value: U256,
    },

    /// No receipt appeared before the deadline; outcome unknown.
    #[error("no receipt for {tx_hash:?} after waiting {timeout:?}")]
    ConfirmationTimeout { tx_hash: H256, timeout: Duration },

    /// The transaction was mined but reverted.
    #[error("transaction {tx_hash:?} was mined but failed")]
    TransactionFailed { tx_hash: H256 },

    #[error("invalid DID '{0}'")]
    InvalidDid(String),

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("ABI encoding failed: {0}")]
    Abi(String),

    #[error("signing failed: {0}")]
    Signing(String),

    /// Transport-level failure from the ledger client, message preserved.
    #[error("ledger error: {0}")]
    Ledger(String),
}

impl DidError {
    /// Whether re-invoking the failed step may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConfirmationTimeout { .. } | Self::Ledger(_))
    }
}

impl From<ethers::abi::Error> for DidError {
    fn from(err: ethers::abi::Error) -> Self {
        DidError::Abi(err.to_string())
    }
}

/// Result type for DID transaction operations.
pub type Result<T> = std::result::Result<T, DidError>;
