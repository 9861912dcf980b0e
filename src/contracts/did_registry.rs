// src/contracts/did_registry.rs
//! Identity registry contract interface.
//!
//! The registry is treated as a fixed, RPC-callable interface. This module owns
//! its interface description and turns method invocations into call data; it
//! also performs the one read the transaction manager needs, `identityOwner`,
//! through the ledger client.

use crate::blockchain::ledger_client::LedgerClient;
use crate::error::{DidError, Result};
use crate::models::transaction::CallSpec;
use ethers::abi::{Abi, Token};
use ethers::types::{Address, Bytes};
use once_cell::sync::Lazy;

/// Address of the canonical ethr-did registry deployment.
pub const DEFAULT_REGISTRY_ADDRESS: &str = "0xdca7ef03e98e0dc2b855be647c39abe984fcf21b";

static REGISTRY_ABI: Lazy<Abi> = Lazy::new(|| {
    serde_json::from_str(include_str!("abi/EthereumDIDRegistry.json"))
        .expect("Failed to load contract ABI")
});

/// Handle on a deployed identity registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DidRegistry {
    address: Address,
}

impl DidRegistry {
    pub fn new(address: Address) -> Self {
        Self { address }
    }

    /// Address transactions against the registry are sent to.
    pub fn address(&self) -> Address {
        self.address
    }

    /// ABI-encodes a call to `method` with `params`.
    ///
    /// # Errors
    /// - `UnknownMethod` if the interface has no function of that name
    /// - `Abi` if the parameters do not match the function's inputs
    pub fn encode_call(method: &str, params: &[Token]) -> Result<Bytes> {
        let function = REGISTRY_ABI
            .function(method)
            .map_err(|_| DidError::UnknownMethod {
                method: method.to_string(),
            })?;
        Ok(Bytes::from(function.encode_input(params)?))
    }

    /// Encodes a [`CallSpec`].
    pub fn encode(call: &CallSpec) -> Result<Bytes> {
        Self::encode_call(&call.method, &call.params)
    }

    /// Reads the identity's current owner from the chain.
    ///
    /// Never cached: authorization decisions must see the latest owner.
    pub async fn identity_owner(&self, ledger: &dyn LedgerClient, identity: Address) -> Result<Address> {
        let data = Self::encode_call("identityOwner", &[Token::Address(identity)])?;
        let output = ledger.call(self.address, data).await?;

        let function = REGISTRY_ABI.function("identityOwner")?;
        let mut tokens = function.decode_output(&output)?;
        match tokens.pop() {
            Some(Token::Address(owner)) => Ok(owner),
            other => Err(DidError::Abi(format!(
                "identityOwner returned unexpected output {:?}",
                other
            ))),
        }
    }
}

impl Default for DidRegistry {
    fn default() -> Self {
        Self::new(
            DEFAULT_REGISTRY_ADDRESS
                .parse()
                .unwrap_or_else(|_| Address::zero()),
        )
    }
}
