// src/services/signer.rs
//! Transaction signing.
//!
//! Signed transactions are EIP-155 legacy transactions, RLP-encoded and ready
//! for `eth_sendRawTransaction`.

use crate::error::{DidError, Result};
use crate::models::transaction::UnsignedTransaction;
use crate::utils::crypto::wallet_from_private_key;
use ethers::signers::Signer;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Bytes, TransactionRequest};

/// Produces signed transaction bytes from an unsigned transaction.
pub trait TransactionSigner: Send + Sync {
    fn sign(&self, private_key: &str, tx: &UnsignedTransaction) -> Result<Bytes>;
}

/// secp256k1 signer backed by an `ethers` local wallet.
#[derive(Debug, Clone, Copy)]
pub struct EthersSigner {
    chain_id: u64,
}

impl EthersSigner {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }
}

impl TransactionSigner for EthersSigner {
    /// # Errors
    /// - `InvalidPrivateKey` if the key cannot be parsed
    /// - `Signing` if the key does not belong to `tx.from`
    fn sign(&self, private_key: &str, tx: &UnsignedTransaction) -> Result<Bytes> {
        let wallet = wallet_from_private_key(private_key)?.with_chain_id(self.chain_id);
        if wallet.address() != tx.from {
            return Err(DidError::Signing(format!(
                "key for {:?} cannot sign a transaction from {:?}",
                wallet.address(),
                tx.from
            )));
        }

        let request: TransactionRequest = tx.into();
        let request: TypedTransaction = request.chain_id(self.chain_id).into();
        let signature = wallet
            .sign_transaction_sync(&request)
            .map_err(|e| DidError::Signing(e.to_string()))?;
        Ok(request.rlp_signed(&signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::private_key_to_address;
    use ethers::types::{Address, Transaction, U256};
    use ethers::utils::rlp;

    const PRIVATE_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn unsigned(from: Address) -> UnsignedTransaction {
        UnsignedTransaction {
            from,
            to: Some(Address::repeat_byte(0x22)),
            nonce: U256::from(3),
            value: U256::zero(),
            gas_price: Some(U256::from(20_000_000_000u64)),
            gas_limit: Some(U256::from(3_000_000)),
            data: Bytes::from(vec![0x01, 0x02]),
        }
    }

    #[test]
    fn signed_bytes_recover_to_sender() {
        let from = private_key_to_address(PRIVATE_KEY).unwrap();
        let signed = EthersSigner::new(1337).sign(PRIVATE_KEY, &unsigned(from)).unwrap();

        let decoded: Transaction = rlp::decode(&signed).unwrap();
        assert_eq!(decoded.recover_from().unwrap(), from);
        assert_eq!(decoded.nonce, U256::from(3));
        assert_eq!(decoded.to, Some(Address::repeat_byte(0x22)));
        assert_eq!(decoded.input, Bytes::from(vec![0x01, 0x02]));
    }

    #[test]
    fn foreign_sender_is_refused() {
        let err = EthersSigner::new(1)
            .sign(PRIVATE_KEY, &unsigned(Address::repeat_byte(0x99)))
            .unwrap_err();
        assert!(matches!(err, DidError::Signing(_)));
    }
}
