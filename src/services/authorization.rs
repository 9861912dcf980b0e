// src/services/authorization.rs
//! Identity Authorization Guard
//!
//! Checks that the caller's key controls an identity before any transaction is
//! built for it. The registry contract enforces ownership again on execution;
//! if ownership changes between this check and inclusion, the transaction is
//! mined as failed and surfaces as a negative confirmation, not a local error.

use crate::blockchain::ledger_client::LedgerClient;
use crate::contracts::did_registry::DidRegistry;
use crate::error::{DidError, Result};
use crate::utils::crypto::private_key_to_address;
use ethers::types::Address;
use log::warn;
use std::sync::Arc;

/// Resolves identity owners and rejects callers who do not hold them.
#[derive(Clone)]
pub struct AuthorizationGuard {
    ledger: Arc<dyn LedgerClient>,
    registry: DidRegistry,
}

impl AuthorizationGuard {
    pub fn new(ledger: Arc<dyn LedgerClient>, registry: DidRegistry) -> Self {
        Self { ledger, registry }
    }

    /// Current on-chain owner of `identity`, read fresh on every call.
    pub async fn lookup_owner(&self, identity: Address) -> Result<Address> {
        self.registry
            .identity_owner(self.ledger.as_ref(), identity)
            .await
    }

    /// Returns the owner address when `private_key` controls `identity`.
    ///
    /// # Errors
    /// `NotOwner` carrying both the owner and the caller's address.
    pub async fn require_ownership(&self, private_key: &str, identity: Address) -> Result<Address> {
        let caller = private_key_to_address(private_key)?;
        let owner = self.lookup_owner(identity).await?;
        if owner != caller {
            warn!("Rejected {:?}: not the owner of {:?} (owner is {:?})", caller, identity, owner);
            return Err(DidError::NotOwner {
                identity,
                owner,
                caller,
            });
        }
        Ok(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::mock_ledger::MockLedger;

    const PRIVATE_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn guard(ledger: &Arc<MockLedger>) -> AuthorizationGuard {
        AuthorizationGuard::new(ledger.clone(), DidRegistry::default())
    }

    #[tokio::test]
    async fn identity_owns_itself_initially() {
        let ledger = Arc::new(MockLedger::new());
        let caller = private_key_to_address(PRIVATE_KEY).unwrap();

        assert_eq!(guard(&ledger).require_ownership(PRIVATE_KEY, caller).await.unwrap(), caller);
    }

    #[tokio::test]
    async fn transferred_owner_authorizes_for_identity() {
        let ledger = Arc::new(MockLedger::new());
        let caller = private_key_to_address(PRIVATE_KEY).unwrap();
        let identity = Address::repeat_byte(0x1d);
        ledger.set_owner(identity, caller);

        assert_eq!(guard(&ledger).require_ownership(PRIVATE_KEY, identity).await.unwrap(), caller);
    }

    #[tokio::test]
    async fn mismatched_owner_is_rejected_with_both_addresses() {
        let ledger = Arc::new(MockLedger::new());
        let caller = private_key_to_address(PRIVATE_KEY).unwrap();
        let identity = caller;
        let owner = Address::repeat_byte(0x0e);
        ledger.set_owner(identity, owner);

        let err = guard(&ledger).require_ownership(PRIVATE_KEY, identity).await.unwrap_err();
        match err {
            DidError::NotOwner { identity: id, owner: o, caller: c } => {
                assert_eq!(id, identity);
                assert_eq!(o, owner);
                assert_eq!(c, caller);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn owner_is_never_cached() {
        let ledger = Arc::new(MockLedger::new());
        let caller = private_key_to_address(PRIVATE_KEY).unwrap();
        let guard = guard(&ledger);

        assert!(guard.require_ownership(PRIVATE_KEY, caller).await.is_ok());
        ledger.set_owner(caller, Address::repeat_byte(0x0e));
        assert!(matches!(
            guard.require_ownership(PRIVATE_KEY, caller).await,
            Err(DidError::NotOwner { .. })
        ));
    }
}
