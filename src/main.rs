// src/main.rs

//! # DID Transaction Manager - Main Entry Point
//!
//! Wires the registry transaction pipeline together and starts the API server.
//!
//! ## Architecture Overview
//! 1. **Blockchain Layer**: `EthersLedgerClient`, nonce assignment and confirmation polling
//! 2. **Contracts Layer**: ABI encoding for the identity registry
//! 3. **Services Layer**: building, funding, authorization, signing and the HTTP API
//!
//! ## Configuration
//! Read from `did-tx-manager.toml` and `DID_*` environment variables
//! (a `.env` file is honored). Notable keys:
//! - `DID_RPC_URL`: JSON-RPC endpoint (default: http://localhost:8545)
//! - `DID_REGISTRY_ADDRESS`: deployed identity registry
//! - `DID_SPONSOR_ADDRESS`: (Optional) unlocked account that tops up senders
//! - `DID_CHAIN_ID`: (Optional) queried from the node when unset

use crate::blockchain::ledger_client::EthersLedgerClient;
use crate::services::api_server::ApiServer;
use crate::services::did_manager::DidManager;
use crate::services::signer::EthersSigner;
use crate::utils::settings::Settings;
use anyhow::Context;
use dotenv::dotenv;
use log::info;
use std::sync::Arc;

mod blockchain;    // Ledger access, nonces, confirmations
mod contracts;     // Registry ABI
mod error;         // Error taxonomy
mod models;        // Data structures
mod services;      // Pipeline stages and API
mod utils;         // Helper functions and settings

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load configuration
/// 2. Connect to the ledger and resolve the chain id
/// 3. Assemble the DID manager
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("failed to load configuration")?;

    let ledger = EthersLedgerClient::new(&settings.rpc_url)?;
    let chain_id = match settings.chain_id {
        Some(id) => id,
        None => ledger
            .chain_id()
            .await
            .context("failed to query chain id - check DID_RPC_URL")?,
    };
    info!("Connected to {} (chain id {})", settings.rpc_url, chain_id);

    let manager_settings = settings.manager_settings()?;
    info!(
        "Registry at {:?}, sponsor {:?}, nonce strategy {:?}",
        manager_settings.registry.address(),
        manager_settings.sponsor,
        settings.nonce_strategy
    );

    let manager = DidManager::new(
        Arc::new(ledger),
        Arc::new(EthersSigner::new(chain_id)),
        settings.nonce_strategy(),
        manager_settings,
    );

    let api_server = ApiServer::new(Arc::new(manager));
    api_server.run(settings.listen_addr()?).await?;
    Ok(())
}
