// src/utils/settings.rs
//! Runtime configuration.
//!
//! Sources, later ones overriding earlier ones:
//! 1. built-in defaults
//! 2. optional `did-tx-manager.toml` in the working directory
//! 3. environment variables prefixed with `DID_` (e.g. `DID_RPC_URL`)

use crate::blockchain::confirmation::{
    WaitSettings, DEFAULT_CONFIRMATION_TIMEOUT, DEFAULT_POLL_INTERVAL,
};
use crate::blockchain::nonce::{NonceStrategy, PendingCountNonce, SequencedNonce, DEFAULT_IDLE_TTL};
use crate::contracts::did_registry::{DidRegistry, DEFAULT_REGISTRY_ADDRESS};
use crate::services::did_manager::ManagerSettings;
use crate::services::transaction_builder::{GasConfig, DEFAULT_GAS_LIMIT, DEFAULT_GAS_PRICE_WEI};
use config::{Config, ConfigError, Environment, File};
use ethers::types::{Address, U256};
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// How transaction nonces are chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NonceMode {
    /// Re-read the pending count for every transaction
    Pending,
    /// Count locally per sender after the first read
    Sequenced,
}

/// Deserialized configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub rpc_url: String,
    /// Queried from the node when absent
    pub chain_id: Option<u64>,
    pub registry_address: String,
    pub sponsor_address: Option<String>,
    /// Decimal wei
    pub gas_price: String,
    pub gas_limit: u64,
    pub poll_interval_ms: u64,
    pub confirmation_timeout_ms: u64,
    pub listen_addr: String,
    pub nonce_strategy: NonceMode,
    /// Seconds after which an idle sender's nonce counter is dropped
    pub nonce_idle_ttl_secs: u64,
}

impl Settings {
    /// Loads settings from defaults, the optional config file and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder()?
            .add_source(File::with_name("did-tx-manager").required(false))
            .add_source(Environment::with_prefix("DID"))
            .build()?
            .try_deserialize()
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("rpc_url", "http://localhost:8545")?
            .set_default("registry_address", DEFAULT_REGISTRY_ADDRESS)?
            .set_default("gas_price", DEFAULT_GAS_PRICE_WEI.to_string())?
            .set_default("gas_limit", DEFAULT_GAS_LIMIT)?
            .set_default("poll_interval_ms", DEFAULT_POLL_INTERVAL.as_millis() as u64)?
            .set_default(
                "confirmation_timeout_ms",
                DEFAULT_CONFIRMATION_TIMEOUT.as_millis() as u64,
            )?
            .set_default("listen_addr", "127.0.0.1:3000")?
            .set_default("nonce_strategy", "sequenced")?
            .set_default("nonce_idle_ttl_secs", DEFAULT_IDLE_TTL.as_secs())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|e| invalid("listen_addr", e))
    }

    pub fn gas_config(&self) -> Result<GasConfig, ConfigError> {
        let gas_price = U256::from_dec_str(&self.gas_price).map_err(|e| invalid("gas_price", e))?;
        Ok(GasConfig {
            gas_price,
            gas_limit: U256::from(self.gas_limit),
        })
    }

    pub fn wait_settings(&self) -> WaitSettings {
        WaitSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            timeout: Duration::from_millis(self.confirmation_timeout_ms),
        }
    }

    pub fn nonce_strategy(&self) -> Arc<dyn NonceStrategy> {
        match self.nonce_strategy {
            NonceMode::Pending => Arc::new(PendingCountNonce),
            NonceMode::Sequenced => Arc::new(SequencedNonce::with_idle_ttl(Duration::from_secs(
                self.nonce_idle_ttl_secs,
            ))),
        }
    }

    pub fn manager_settings(&self) -> Result<ManagerSettings, ConfigError> {
        let registry = parse_address("registry_address", &self.registry_address)?;
        let sponsor = self
            .sponsor_address
            .as_deref()
            .filter(|address| !address.is_empty())
            .map(|address| parse_address("sponsor_address", address))
            .transpose()?;

        Ok(ManagerSettings {
            registry: DidRegistry::new(registry),
            sponsor,
            gas: self.gas_config()?,
            wait: self.wait_settings(),
        })
    }
}

fn parse_address(key: &str, value: &str) -> Result<Address, ConfigError> {
    value.parse().map_err(|e| invalid(key, e))
}

fn invalid(key: &str, err: impl std::fmt::Display) -> ConfigError {
    ConfigError::Message(format!("invalid `{}`: {}", key, err))
}
