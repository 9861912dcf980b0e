// src/blockchain/mock_ledger.rs
//! In-memory ledger used by unit tests.
//!
//! Tracks balances, nonces and registry owners, records every submission in
//! order, and lets tests script how receipts appear.

use crate::blockchain::ledger_client::LedgerClient;
use crate::error::{DidError, Result};
use crate::models::transaction::UnsignedTransaction;
use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::types::{Address, BlockNumber, Bytes, TransactionReceipt, H256, U256, U64};
use std::collections::HashMap;
use std::sync::Mutex;

/// How receipt lookups for one transaction behave.
#[derive(Debug, Clone, Copy)]
pub struct ReceiptPlan {
    /// Lookups answered with "not found" before the receipt appears
    pending_polls: usize,
    /// `None` keeps the transaction pending forever
    status: Option<bool>,
}

impl ReceiptPlan {
    pub fn after(pending_polls: usize, success: bool) -> Self {
        Self {
            pending_polls,
            status: Some(success),
        }
    }

    pub fn never() -> Self {
        Self {
            pending_polls: 0,
            status: None,
        }
    }
}

/// A submission observed by the ledger.
#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    /// Node-signed transaction, e.g. a sponsor top-up
    Transaction { hash: H256, tx: UnsignedTransaction },
    /// Locally signed transaction bytes
    Raw { hash: H256, bytes: Bytes },
}

#[derive(Default)]
struct State {
    balances: HashMap<Address, U256>,
    nonces: HashMap<Address, U256>,
    owners: HashMap<Address, Address>,
    plans: HashMap<H256, ReceiptPlan>,
    lookups: HashMap<H256, usize>,
    failing_lookups: usize,
    failing_submissions: usize,
    /// Receipt plan applied to transactions submitted through this ledger
    submission_plan: Option<ReceiptPlan>,
    submissions: Vec<Submission>,
    next_hash: u64,
}

/// Scriptable [`LedgerClient`] double.
pub struct MockLedger {
    state: Mutex<State>,
}

impl MockLedger {
    /// Every submitted transaction confirms successfully on the first lookup.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                submission_plan: Some(ReceiptPlan::after(0, true)),
                ..State::default()
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let mut state = self.state.lock().expect("mock ledger lock poisoned");
        f(&mut state)
    }

    pub fn set_balance(&self, address: Address, balance: U256) {
        self.with_state(|s| s.balances.insert(address, balance));
    }

    pub fn balance(&self, address: Address) -> U256 {
        self.with_state(|s| s.balances.get(&address).copied().unwrap_or_default())
    }

    pub fn set_nonce(&self, address: Address, nonce: U256) {
        self.with_state(|s| s.nonces.insert(address, nonce));
    }

    pub fn set_owner(&self, identity: Address, owner: Address) {
        self.with_state(|s| s.owners.insert(identity, owner));
    }

    pub fn plan_receipt(&self, tx_hash: H256, plan: ReceiptPlan) {
        self.with_state(|s| s.plans.insert(tx_hash, plan));
    }

    /// Receipt plan for transactions submitted from now on.
    pub fn plan_submissions(&self, plan: ReceiptPlan) {
        self.with_state(|s| s.submission_plan = Some(plan));
    }

    pub fn fail_next_receipt_lookups(&self, count: usize) {
        self.with_state(|s| s.failing_lookups = count);
    }

    /// The next `count` broadcasts fail without touching balances or nonces.
    pub fn fail_next_submissions(&self, count: usize) {
        self.with_state(|s| s.failing_submissions = count);
    }

    pub fn receipt_lookups(&self, tx_hash: H256) -> usize {
        self.with_state(|s| s.lookups.get(&tx_hash).copied().unwrap_or_default())
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.with_state(|s| s.submissions.clone())
    }

    fn reject_submission(state: &mut State) -> Result<()> {
        if state.failing_submissions > 0 {
            state.failing_submissions -= 1;
            return Err(DidError::Ledger("connection reset".into()));
        }
        Ok(())
    }

    fn record(state: &mut State, submission: impl FnOnce(H256) -> Submission) -> H256 {
        state.next_hash += 1;
        let hash = H256::from_low_u64_be(state.next_hash);
        if let Some(plan) = state.submission_plan {
            state.plans.insert(hash, plan);
        }
        state.submissions.push(submission(hash));
        hash
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn get_balance(&self, address: Address, _block: BlockNumber) -> Result<U256> {
        Ok(self.balance(address))
    }

    async fn get_transaction_count(&self, address: Address, _block: BlockNumber) -> Result<U256> {
        Ok(self.with_state(|s| s.nonces.get(&address).copied().unwrap_or_default()))
    }

    async fn get_transaction_receipt(&self, tx_hash: H256) -> Result<Option<TransactionReceipt>> {
        self.with_state(|s| {
            if s.failing_lookups > 0 {
                s.failing_lookups -= 1;
                return Err(DidError::Ledger("connection reset".into()));
            }

            let seen = s.lookups.entry(tx_hash).or_default();
            *seen += 1;
            let Some(plan) = s.plans.get(&tx_hash) else {
                return Ok(None);
            };
            match plan.status {
                Some(success) if *seen > plan.pending_polls => Ok(Some(TransactionReceipt {
                    transaction_hash: tx_hash,
                    status: Some(U64::from(success as u64)),
                    ..TransactionReceipt::default()
                })),
                _ => Ok(None),
            }
        })
    }

    async fn send_transaction(&self, tx: &UnsignedTransaction) -> Result<H256> {
        self.with_state(|s| {
            Self::reject_submission(s)?;
            let sender = s.balances.entry(tx.from).or_default();
            *sender = sender.saturating_sub(tx.value);
            if let Some(to) = tx.to {
                let recipient = s.balances.entry(to).or_default();
                *recipient += tx.value;
            }
            let nonce = s.nonces.entry(tx.from).or_default();
            *nonce += U256::one();
            Ok(Self::record(s, |hash| Submission::Transaction {
                hash,
                tx: tx.clone(),
            }))
        })
    }

    async fn send_raw_transaction(&self, signed: Bytes) -> Result<H256> {
        self.with_state(|s| {
            Self::reject_submission(s)?;
            Ok(Self::record(s, |hash| Submission::Raw { hash, bytes: signed }))
        })
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes> {
        let tokens = abi::decode(&[abi::ParamType::Address], &data[4..])
            .map_err(|e| DidError::Ledger(e.to_string()))?;
        let identity = match tokens.first() {
            Some(Token::Address(identity)) => *identity,
            _ => return Err(DidError::Ledger("unexpected call data".into())),
        };
        let owner = self.with_state(|s| s.owners.get(&identity).copied().unwrap_or(identity));
        Ok(Bytes::from(abi::encode(&[Token::Address(owner)])))
    }
}
