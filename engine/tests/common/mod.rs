//! Shared test helpers for integration tests.
//!
//! Provides stable accounts, chain configurations, block builders, a
//! recording observer and a one-call block runner used across all
//! integration test files.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use alloy_primitives::{address, Address, U256};
use basalt_engine::{
    BlockExecutor, BlockObserver, ConsensusEngine, ExecutionConfig, ExecutionHooks, MemoryChain,
    MemoryState, MemoryWriter, TransferExecutor, TxTracer,
};
use basalt_primitives::merkle::{logs_bloom, receipts_root};
use basalt_primitives::{
    Account, Block, ChainConfig, ConsensusKind, ExecError, ExecResult, ExecutionReport, Header,
    Receipt, Transaction, TxType,
};

// ── Accounts ──

pub const ALICE: Address = address!("00000000000000000000000000000000000a11ce");
pub const BOB: Address = address!("0000000000000000000000000000000000000b0b");
pub const CAROL: Address = address!("000000000000000000000000000000000000ca01");
pub const MINER: Address = address!("00000000000000000000000000000000000c0ffe");

/// Starting balance of every funded account: 10 ether.
pub const FUNDS: u128 = 10_000_000_000_000_000_000;

/// Pre-state with `accounts` funded.
pub fn funded_state(accounts: &[Address]) -> MemoryState {
    accounts.iter().fold(MemoryState::new(), |state, address| {
        state.with_account(*address, Account::with_balance(U256::from(FUNDS)))
    })
}

// ── Chains and headers ──

pub fn pow_chain() -> ChainConfig {
    ChainConfig::all_forks(1, ConsensusKind::ProofOfWork)
}

pub fn pos_chain() -> ChainConfig {
    ChainConfig::all_forks(1, ConsensusKind::ProofOfStake)
}

/// A post-merge header template: no difficulty, base fee 7 wei.
pub fn pos_header(number: u64) -> Header {
    Header {
        number,
        beneficiary: MINER,
        gas_limit: 30_000_000,
        timestamp: 1_700_000_000 + number * 12,
        base_fee_per_gas: Some(7),
        blob_gas_used: Some(0),
        excess_blob_gas: Some(0),
        ..Default::default()
    }
}

/// A pre-merge header template.
pub fn pow_header(number: u64) -> Header {
    Header {
        number,
        beneficiary: MINER,
        gas_limit: 8_000_000,
        difficulty: U256::from(131_072),
        timestamp: 1_500_000_000 + number * 15,
        base_fee_per_gas: Some(7),
        ..Default::default()
    }
}

/// A plain transfer of `value` wei at gas price 10.
pub fn transfer(sender: Address, nonce: u64, to: Address, value: u64) -> Transaction {
    Transaction::legacy(sender, nonce, to, U256::from(value), 21_000, 10)
}

/// Receipts a run of successful, log-free transfers produces.
pub fn transfer_receipts(count: usize) -> Vec<Receipt> {
    (1..=count as u64)
        .map(|i| Receipt::new(TxType::Legacy, true, 21_000 * i, Vec::new()))
        .collect()
}

/// Fill in the header fields a block of `count` plain transfers commits to.
pub fn seal_transfers(mut header: Header, count: usize) -> Header {
    let receipts = transfer_receipts(count);
    header.gas_used = 21_000 * count as u64;
    header.receipts_root = receipts_root(&receipts);
    header.logs_bloom = logs_bloom(&receipts);
    header
}

// ── Running blocks ──

/// Route engine logs to the test harness. Filter with `RUST_LOG`.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    // several tests share one process; only the first install wins
    let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
}

/// Execute `block` with no hooks against an empty chain history.
pub fn run_block(
    chain: &ChainConfig,
    engine: &dyn ConsensusEngine,
    config: ExecutionConfig,
    block: &Block,
    state: &mut MemoryState,
) -> ExecResult<ExecutionReport> {
    run_block_with(chain, engine, config, block, state, &MemoryChain::new(), ExecutionHooks::default())
}

/// Execute `block` with the given chain history and hooks.
pub fn run_block_with(
    chain: &ChainConfig,
    engine: &dyn ConsensusEngine,
    config: ExecutionConfig,
    block: &Block,
    state: &mut MemoryState,
    reader: &MemoryChain,
    hooks: ExecutionHooks<'_>,
) -> ExecResult<ExecutionReport> {
    init_tracing();
    let executor = TransferExecutor::ethereum();
    let mut writer = MemoryWriter::new(block.number());
    BlockExecutor::new(chain, config, engine, &executor)?
        .execute_block(block, state, &mut writer, reader, hooks)
}

// ── Observers and tracers ──

/// Records every observer event as a short string.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    pub events: Vec<String>,
    pub finalized: Option<Option<u64>>,
    pub total_difficulty: Option<Option<U256>>,
}

impl BlockObserver for RecordingObserver {
    fn start_block(&mut self, block: &Block) {
        self.events.push(format!("start_block {}", block.number()));
    }

    fn start_transaction(&mut self, tx: &Transaction, _base_fee: Option<u64>) {
        self.events.push(format!("start_tx {}", tx.nonce));
    }

    fn end_transaction(&mut self, receipt: Option<&Receipt>) {
        let status = receipt.map(|receipt| receipt.status);
        self.events.push(format!("end_tx {status:?}"));
    }

    fn finalize_block(&mut self, block: &Block) {
        self.events.push(format!("finalize_block {}", block.number()));
    }

    fn end_block(&mut self, block: &Block, finalized: Option<&Header>, total_difficulty: Option<U256>) {
        self.finalized = Some(finalized.map(|header| header.number));
        self.total_difficulty = Some(total_difficulty);
        self.events.push(format!("end_block {}", block.number()));
    }

    fn cancel_block(&mut self, block: &Block, _error: &ExecError) {
        self.events.push(format!("cancel_block {}", block.number()));
    }
}

/// Tracer writing into a shared log, so boxed instances stay observable.
#[derive(Debug, Clone, Default)]
pub struct SharedTracer {
    pub log: Rc<RefCell<Vec<String>>>,
}

impl TxTracer for SharedTracer {
    fn on_tx_start(&mut self, tx: &Transaction) {
        self.log.borrow_mut().push(format!("start {}", tx.nonce));
    }

    fn on_tx_end(&mut self, receipt: Option<&Receipt>, error: Option<&ExecError>) {
        let outcome = match (receipt, error) {
            (_, Some(_)) => "error",
            (Some(_), None) => "receipt",
            (None, None) => "none",
        };
        self.log.borrow_mut().push(format!("end {outcome}"));
    }

    fn flush(&mut self, tx: &Transaction) {
        self.log.borrow_mut().push(format!("flush {}", tx.nonce));
    }
}
