// src/blockchain/nonce.rs
//! Nonce assignment and per-sender serialization.
//!
//! Two transactions from the same sender built concurrently would read the same
//! pending count and collide. Nonce selection is therefore an injectable
//! [`NonceStrategy`], and [`SenderLocks`] serializes construction through
//! submission for each sender address.

use crate::blockchain::ledger_client::LedgerClient;
use crate::error::Result;
use async_trait::async_trait;
use ethers::types::{Address, BlockNumber, U256};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Chooses the nonce for the next transaction of a sender.
#[async_trait]
pub trait NonceStrategy: Send + Sync {
    async fn next_nonce(&self, ledger: &dyn LedgerClient, sender: Address) -> Result<U256>;

    /// Forgets local state for `sender` after a build was abandoned or a
    /// submission failed, so the next nonce is re-read from the ledger.
    fn resync(&self, _sender: Address) {}
}

/// Reads the pending transaction count on every build.
///
/// Only safe when each sender submits one transaction at a time.
#[derive(Debug, Default, Clone, Copy)]
pub struct PendingCountNonce;

#[async_trait]
impl NonceStrategy for PendingCountNonce {
    async fn next_nonce(&self, ledger: &dyn LedgerClient, sender: Address) -> Result<U256> {
        ledger.get_transaction_count(sender, BlockNumber::Pending).await
    }
}

/// Counters idle for this long are forgotten and re-read from the ledger.
pub const DEFAULT_IDLE_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy)]
struct Counter {
    next: U256,
    last_used: Instant,
}

/// Per-sender counter seeded from the pending count on first use.
///
/// Senders idle for longer than the TTL are evicted whenever a new sender is
/// seeded, so the table only holds recently active senders. An evicted sender
/// simply re-reads its pending count.
#[derive(Debug)]
pub struct SequencedNonce {
    next: Mutex<HashMap<Address, Counter>>,
    idle_ttl: Duration,
}

impl Default for SequencedNonce {
    fn default() -> Self {
        Self::with_idle_ttl(DEFAULT_IDLE_TTL)
    }
}

impl SequencedNonce {
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            next: Mutex::new(HashMap::new()),
            idle_ttl,
        }
    }

    fn counters(&self) -> MutexGuard<'_, HashMap<Address, Counter>> {
        match self.next.lock() {
            Ok(next) => next,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn take(&self, sender: Address) -> Option<U256> {
        let mut next = self.counters();
        let counter = next.get_mut(&sender)?;
        let nonce = counter.next;
        counter.next = nonce + U256::one();
        counter.last_used = Instant::now();
        Some(nonce)
    }
}

#[async_trait]
impl NonceStrategy for SequencedNonce {
    async fn next_nonce(&self, ledger: &dyn LedgerClient, sender: Address) -> Result<U256> {
        if let Some(nonce) = self.take(sender) {
            return Ok(nonce);
        }

        let pending = ledger
            .get_transaction_count(sender, BlockNumber::Pending)
            .await?;
        debug!("Seeded nonce counter for {:?} at {}", sender, pending);

        let now = Instant::now();
        let idle_ttl = self.idle_ttl;
        let mut next = self.counters();
        next.retain(|_, counter| now.duration_since(counter.last_used) < idle_ttl);
        // A concurrent seed may have landed while the count was in flight.
        let counter = next.entry(sender).or_insert(Counter {
            next: pending,
            last_used: now,
        });
        let nonce = counter.next;
        counter.next = nonce + U256::one();
        counter.last_used = now;
        Ok(nonce)
    }

    fn resync(&self, sender: Address) {
        self.counters().remove(&sender);
    }
}

/// Per-address async locks.
///
/// Holding the guard for a sender excludes every other build or submission
/// from that sender. Cloning shares the same lock table. Entries nobody holds
/// or waits on are pruned on the next acquisition.
#[derive(Debug, Default, Clone)]
pub struct SenderLocks {
    locks: Arc<Mutex<HashMap<Address, Arc<AsyncMutex<()>>>>>,
}

impl SenderLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other holder exists for `sender`.
    pub async fn acquire(&self, sender: Address) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(locks) => locks,
                Err(poisoned) => poisoned.into_inner(),
            };
            // The table's own reference is the only one left once every
            // guard and waiter for a sender is gone.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(sender).or_default().clone()
        };
        lock.lock_owned().await
    }
}
