// src/utils/crypto.rs
//! Key-to-address derivation for secp256k1 keys.
//!
//! Addresses are the last 20 bytes of the Keccak-256 hash of the uncompressed
//! public key, as on Ethereum.

use crate::error::{DidError, Result};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::Address;
use ethers::utils::{hex, public_key_to_address as verifying_key_to_address};
use k256::ecdsa::VerifyingKey;

/// Parses a hex private key, with or without `0x` prefix.
pub fn wallet_from_private_key(private_key: &str) -> Result<LocalWallet> {
    private_key
        .trim()
        .parse::<LocalWallet>()
        .map_err(|e| DidError::InvalidPrivateKey(e.to_string()))
}

/// Address controlled by `private_key`.
pub fn private_key_to_address(private_key: &str) -> Result<Address> {
    wallet_from_private_key(private_key).map(|wallet| wallet.address())
}

/// Address of a SEC1-encoded public key (compressed or uncompressed).
pub fn public_key_to_address(public_key: &str) -> Result<Address> {
    let digits = public_key.trim_start_matches("0x");
    let bytes = hex::decode(digits).map_err(|_| DidError::InvalidHex {
        value: public_key.to_string(),
    })?;
    let key = VerifyingKey::from_sec1_bytes(&bytes)
        .map_err(|e| DidError::InvalidPrivateKey(format!("invalid public key: {}", e)))?;
    Ok(verifying_key_to_address(&key))
}
