//! Consensus engines.
//!
//! The executor talks to consensus through [`ConsensusEngine`] only: one
//! hook before the first transaction and one after the last. Engines reach
//! system contracts through the [`SystemCall`] callback and never see how
//! calls are dispatched.
//!
//! - [`ProofOfWork`]: block and uncle rewards
//! - [`ProofOfStake`]: beacon root and withdrawals, pre-merge blocks handled
//!   by proof-of-work
//! - [`ProofOfAuthority`]: state-sync event commits at sprint boundaries

use crate::contracts::{lastStateIdCall, StateSyncEvent};
use crate::forks::apply_beacon_root;
use crate::state::StateView;
use crate::system_call::SystemCall;
use alloy_consensus::Header;
use alloy_eips::eip4895::Withdrawal;
use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolCall;
use basalt_primitives::merkle::{
    logs_bloom, ommers_hash, receipts_root, transactions_root, withdrawals_root,
};
use basalt_primitives::types::GWEI_TO_WEI;
use basalt_primitives::{
    Block, ChainConfig, ConsensusKind, ExecError, ExecResult, Receipt, Rules, Transaction,
};
use tracing::{debug, warn};

/// Everything a consensus engine sees after the transactions ran.
#[derive(Debug, Clone, Copy)]
pub struct FinalizeInput<'a> {
    pub chain: &'a ChainConfig,
    pub header: &'a Header,
    /// Included transactions only.
    pub transactions: &'a [Transaction],
    pub uncles: &'a [Header],
    pub receipts: &'a [Receipt],
    pub withdrawals: Option<&'a [Withdrawal]>,
}

impl FinalizeInput<'_> {
    fn rules(&self) -> Rules {
        self.chain.rules(self.header.number, self.header.timestamp)
    }
}

/// Narrow contract between the executor and a consensus algorithm.
pub trait ConsensusEngine {
    fn kind(&self) -> ConsensusKind;

    /// Runs before the first transaction of a block.
    fn initialize(
        &self,
        chain: &ChainConfig,
        header: &Header,
        state: &mut dyn StateView,
        syscall: &dyn SystemCall,
    ) -> ExecResult<()>;

    /// Consensus bookkeeping after the last transaction.
    fn finalize(
        &self,
        input: &FinalizeInput<'_>,
        state: &mut dyn StateView,
        syscall: &dyn SystemCall,
    ) -> ExecResult<()>;

    /// [`finalize`](Self::finalize), then build the block to propose.
    fn finalize_and_assemble(
        &self,
        input: &FinalizeInput<'_>,
        state: &mut dyn StateView,
        syscall: &dyn SystemCall,
    ) -> ExecResult<Block> {
        self.finalize(input, state, syscall)?;
        Ok(assemble_block(input))
    }
}

/// Build a block from a header template and execution results, filling in
/// every root the body determines.
pub fn assemble_block(input: &FinalizeInput<'_>) -> Block {
    let mut header = input.header.clone();
    header.transactions_root = transactions_root(input.transactions);
    header.receipts_root = receipts_root(input.receipts);
    header.logs_bloom = logs_bloom(input.receipts);
    header.ommers_hash = ommers_hash(input.uncles);
    header.withdrawals_root = input.withdrawals.map(withdrawals_root);

    Block {
        header,
        transactions: input.transactions.to_vec(),
        ommers: input.uncles.to_vec(),
        withdrawals: input.withdrawals.map(<[Withdrawal]>::to_vec),
    }
}

// ── Proof of work ──

const ETHER: u128 = 1_000_000_000_000_000_000;

/// Block reward in wei for the given rules.
pub fn block_reward(rules: &Rules) -> U256 {
    let ether = if rules.is_constantinople {
        2
    } else if rules.is_byzantium {
        3
    } else {
        5
    };
    U256::from(ether * ETHER)
}

/// Ethash-style rewards. Withdrawals are not part of this protocol.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofOfWork;

impl ProofOfWork {
    /// Credit the miner and every uncle miner.
    ///
    /// An uncle `k` blocks behind earns `(8 - k) / 8` of the block reward;
    /// the miner earns an extra `1/32` per included uncle.
    pub fn accumulate_rewards(&self, input: &FinalizeInput<'_>, state: &mut dyn StateView) {
        let reward = block_reward(&input.rules());
        let number = input.header.number;
        let mut miner_reward = reward;

        for uncle in input.uncles {
            let factor = uncle.number.saturating_add(8).saturating_sub(number);
            let uncle_reward = U256::from(factor) * reward / U256::from(8);
            state.add_balance(uncle.beneficiary, uncle_reward);
            miner_reward += reward / U256::from(32);
        }
        state.add_balance(input.header.beneficiary, miner_reward);
        debug!(number, uncles = input.uncles.len(), %miner_reward, "block rewards");
    }
}

impl ConsensusEngine for ProofOfWork {
    fn kind(&self) -> ConsensusKind {
        ConsensusKind::ProofOfWork
    }

    fn initialize(
        &self,
        _chain: &ChainConfig,
        _header: &Header,
        _state: &mut dyn StateView,
        _syscall: &dyn SystemCall,
    ) -> ExecResult<()> {
        Ok(())
    }

    fn finalize(
        &self,
        input: &FinalizeInput<'_>,
        state: &mut dyn StateView,
        _syscall: &dyn SystemCall,
    ) -> ExecResult<()> {
        if input.withdrawals.is_some() {
            return Err(ExecError::Consensus("withdrawals are not allowed in proof-of-work blocks".into()));
        }
        if let Some(uncle) = input.uncles.iter().find(|uncle| uncle.number >= input.header.number) {
            return Err(ExecError::Consensus(format!(
                "uncle {} is not older than block {}",
                uncle.number, input.header.number
            )));
        }
        self.accumulate_rewards(input, state);
        Ok(())
    }
}

// ── Proof of stake ──

/// Post-merge consensus. Headers with non-zero difficulty predate the merge
/// and are handed to the wrapped proof-of-work engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProofOfStake {
    pre_merge: ProofOfWork,
}

impl ProofOfStake {
    pub fn new() -> Self {
        Self::default()
    }

    /// Post-merge headers carry zero difficulty.
    pub fn is_pos_header(header: &Header) -> bool {
        header.difficulty.is_zero()
    }
}

impl ConsensusEngine for ProofOfStake {
    fn kind(&self) -> ConsensusKind {
        ConsensusKind::ProofOfStake
    }

    fn initialize(
        &self,
        chain: &ChainConfig,
        header: &Header,
        state: &mut dyn StateView,
        syscall: &dyn SystemCall,
    ) -> ExecResult<()> {
        if !Self::is_pos_header(header) {
            self.pre_merge.initialize(chain, header, state, syscall)?;
        }
        let rules = chain.rules(header.number, header.timestamp);
        if rules.is_cancun {
            if let Some(root) = header.parent_beacon_block_root {
                apply_beacon_root(state, root, syscall);
            }
        }
        Ok(())
    }

    fn finalize(
        &self,
        input: &FinalizeInput<'_>,
        state: &mut dyn StateView,
        syscall: &dyn SystemCall,
    ) -> ExecResult<()> {
        if !Self::is_pos_header(input.header) {
            return self.pre_merge.finalize(input, state, syscall);
        }
        if !input.uncles.is_empty() {
            return Err(ExecError::Consensus("uncles are not allowed after the merge".into()));
        }

        let Some(withdrawals) = input.withdrawals else {
            return Ok(());
        };
        if !input.rules().is_shanghai {
            return Err(ExecError::Consensus("withdrawals before shanghai".into()));
        }
        for withdrawal in withdrawals {
            let amount = U256::from(withdrawal.amount) * U256::from(GWEI_TO_WEI);
            state.add_balance(withdrawal.address, amount);
        }
        debug!(number = input.header.number, count = withdrawals.len(), "withdrawals credited");
        Ok(())
    }
}

// ── Proof of authority ──

/// Supplies off-chain events awaiting commitment.
pub trait StateSyncSource {
    /// Events with an id above `last_state_id`, in id order, that should
    /// be committed in block `number`.
    fn pending_events(&self, number: u64, last_state_id: u64) -> Result<Vec<StateSyncEvent>, String>;
}

/// A fixed list of events.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateSync {
    events: Vec<StateSyncEvent>,
}

impl MemoryStateSync {
    pub fn new(events: Vec<StateSyncEvent>) -> Self {
        Self { events }
    }
}

impl StateSyncSource for MemoryStateSync {
    fn pending_events(&self, _number: u64, last_state_id: u64) -> Result<Vec<StateSyncEvent>, String> {
        let mut events: Vec<_> =
            self.events.iter().filter(|event| event.id > last_state_id).cloned().collect();
        events.sort_by_key(|event| event.id);
        Ok(events)
    }
}

/// Validator-signed blocks with state-sync. On every block divisible by
/// the sprint length, pending events are committed to the state receiver
/// contract; the resulting logs become the block's state-sync receipt.
pub struct ProofOfAuthority {
    source: Box<dyn StateSyncSource>,
}

impl ProofOfAuthority {
    pub fn new(source: impl StateSyncSource + 'static) -> Self {
        Self { source: Box::new(source) }
    }

    fn commit_states(
        &self,
        input: &FinalizeInput<'_>,
        state: &mut dyn StateView,
        syscall: &dyn SystemCall,
    ) -> ExecResult<usize> {
        let Some(sync) = &input.chain.state_sync else {
            return Ok(0);
        };
        let number = input.header.number;
        if number % sync.sprint != 0 {
            return Ok(0);
        }

        let receiver = sync.state_receiver_contract;
        let output = syscall.call_constant(state, receiver, Bytes::from(lastStateIdCall {}.abi_encode()))?;
        let last_state_id = u64::try_from(U256::from_be_slice(&output)).map_err(|_| {
            ExecError::Consensus(format!("state receiver {receiver} returned an invalid state id"))
        })?;

        let events = self
            .source
            .pending_events(number, last_state_id)
            .map_err(ExecError::Consensus)?;

        let mut next_id = last_state_id.checked_add(1).ok_or_else(|| {
            ExecError::Consensus(format!("state receiver {receiver} is at the last state id"))
        })?;
        let mut committed = 0;
        for event in events {
            if event.id != next_id {
                warn!(number, expected = next_id, got = event.id, "state sync gap, deferring remaining events");
                break;
            }
            syscall.call(state, receiver, event.commit_calldata())?;
            committed += 1;
            let Some(id) = next_id.checked_add(1) else { break };
            next_id = id;
        }
        debug!(number, committed, last_state_id, "state sync events committed");
        Ok(committed)
    }
}

impl ConsensusEngine for ProofOfAuthority {
    fn kind(&self) -> ConsensusKind {
        ConsensusKind::ProofOfAuthority
    }

    fn initialize(
        &self,
        _chain: &ChainConfig,
        _header: &Header,
        _state: &mut dyn StateView,
        _syscall: &dyn SystemCall,
    ) -> ExecResult<()> {
        Ok(())
    }

    fn finalize(
        &self,
        input: &FinalizeInput<'_>,
        state: &mut dyn StateView,
        syscall: &dyn SystemCall,
    ) -> ExecResult<()> {
        if input.withdrawals.is_some() {
            return Err(ExecError::Consensus("withdrawals are not supported".into()));
        }
        self.commit_states(input, state, syscall)?;
        Ok(())
    }
}
