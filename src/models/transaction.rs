// src/models/transaction.rs
//! Transaction data model.
//!
//! An [`UnsignedTransaction`] is fully populated by the transaction builder and
//! is immutable once signed. Nonces are assigned at construction time and are
//! never reused across builds.

use ethers::abi::Token;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use serde::{Deserialize, Serialize};

/// A fully-populated transaction awaiting signature or node-side submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Sending account
    pub from: Address,
    /// Destination; `None` only for contract creation
    pub to: Option<Address>,
    pub nonce: U256,
    /// Transferred amount in wei
    pub value: U256,
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
    /// ABI-encoded call data, empty for plain transfers
    pub data: Bytes,
}

impl From<&UnsignedTransaction> for TransactionRequest {
    fn from(tx: &UnsignedTransaction) -> Self {
        let mut request = TransactionRequest::new()
            .from(tx.from)
            .nonce(tx.nonce)
            .value(tx.value)
            .data(tx.data.clone());
        if let Some(to) = tx.to {
            request = request.to(to);
        }
        if let Some(gas_price) = tx.gas_price {
            request = request.gas_price(gas_price);
        }
        if let Some(gas_limit) = tx.gas_limit {
            request = request.gas(gas_limit);
        }
        request
    }
}

/// A registry method invocation: method name plus its ABI tokens.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSpec {
    pub method: String,
    pub params: Vec<Token>,
}

impl CallSpec {
    pub fn new(method: impl Into<String>, params: Vec<Token>) -> Self {
        Self {
            method: method.into(),
            params,
        }
    }
}

/// Per-call replacements for the configured gas defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasOverrides {
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
}
