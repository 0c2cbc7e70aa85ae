//! Scripted in-memory chain shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use alloy_core::primitives::{Address, TxHash};
use anyhow::Context;
use tokensale_deploy::{
    ArtifactDir, ChainProvider, Mnemonic, NetworkProfile, SaleParams, SalePlan, TokenParams,
    TransactionReceipt, TransactionRequest,
};
use tokio::sync::watch;
use url::Url;

pub const TEST_MNEMONIC: &str = "test test test test test test test test test test test junk";

/// What happens to the next submitted transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Mined successfully.
    Confirm,
    /// Mined but reverted.
    Revert,
    /// Never mined.
    Stall,
    /// Rejected by the node at submission.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Sent(usize),
    Confirmed(usize),
}

#[derive(Default)]
struct State {
    script: VecDeque<Outcome>,
    submitted: Vec<TransactionRequest>,
    pending: HashMap<TxHash, (usize, Outcome, Option<Address>)>,
    events: Vec<Event>,
    confirmed: usize,
    first: usize,
    cancel_after: Option<(usize, watch::Sender<bool>)>,
}

/// Transactions are numbered from 1 in submission order unless
/// [`MockChain::numbered_from`] says otherwise.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<State>>,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes for the first transactions; later ones confirm.
    pub fn with_script(outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        let chain = Self::default();
        chain.state.lock().unwrap().script = outcomes.into_iter().collect();
        chain
    }

    /// Number transactions from `first`, as on a chain that has seen earlier runs.
    pub fn numbered_from(self, first: usize) -> Self {
        self.state.lock().unwrap().first = first.saturating_sub(1);
        self
    }

    /// Send `true` on `sender` once `confirmed` transactions have been mined.
    pub fn cancel_after(&self, confirmed: usize, sender: watch::Sender<bool>) {
        self.state.lock().unwrap().cancel_after = Some((confirmed, sender));
    }

    pub fn submitted(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.lock().unwrap().events.clone()
    }
}

pub fn tx_hash(n: usize) -> TxHash {
    TxHash::with_last_byte(n as u8)
}

pub fn contract_address(n: usize) -> Address {
    Address::with_last_byte(0x10 + n as u8)
}

impl ChainProvider for MockChain {
    async fn send_transaction(&self, request: TransactionRequest) -> anyhow::Result<TxHash> {
        let mut state = self.state.lock().unwrap();
        let outcome = state.script.pop_front().unwrap_or(Outcome::Confirm);
        if outcome == Outcome::Reject {
            anyhow::bail!("insufficient funds for gas * price + value");
        }

        let n = state.first + state.submitted.len() + 1;
        let created = request.to.is_none().then(|| contract_address(n));
        state.submitted.push(request);
        state.events.push(Event::Sent(n));
        state.pending.insert(tx_hash(n), (n, outcome, created));

        Ok(tx_hash(n))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> anyhow::Result<TransactionReceipt> {
        let (n, outcome, created) = {
            let state = self.state.lock().unwrap();
            *state
                .pending
                .get(&tx_hash)
                .context("Unknown transaction")?
        };

        if outcome == Outcome::Stall {
            std::future::pending::<()>().await;
        }

        let mut state = self.state.lock().unwrap();
        state.events.push(Event::Confirmed(n));
        state.confirmed += 1;
        if let Some((after, sender)) = &state.cancel_after {
            if state.confirmed >= *after {
                let _ = sender.send(true);
            }
        }

        let success = outcome != Outcome::Revert;
        Ok(TransactionReceipt {
            tx_hash,
            success,
            contract_address: if success { created } else { None },
            gas_used: 21_000,
        })
    }
}

pub fn fixtures() -> ArtifactDir {
    ArtifactDir::new(concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures"))
}

pub fn profile(id: &str, chain_id: u64) -> NetworkProfile {
    NetworkProfile::new(
        id,
        Url::parse("http://127.0.0.1:8545").unwrap(),
        Mnemonic::new(TEST_MNEMONIC),
        4_600_000,
        chain_id,
    )
}

pub fn beneficiary() -> Address {
    Address::repeat_byte(0xbe)
}

/// The observed sale: Gabro Token, 1B cap, 5000 GBO per ETH, 0.1 ETH minimum.
pub fn gabro_plan() -> SalePlan {
    SalePlan::new(TokenParams::default(), SaleParams::new(beneficiary()))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
