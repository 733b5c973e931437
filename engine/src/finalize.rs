//! Block initialization and finalization around the transaction loop.
//!
//! Finalization runs the consensus engine, commits the state view into the
//! writer, then flushes the change sets. Each step fails with its own error
//! wrapped around the block number. On state-sync chains the logs that no
//! transaction produced are gathered into a synthetic receipt.

use crate::consensus::{ConsensusEngine, FinalizeInput};
use crate::state::{StateView, StateWriter};
use crate::system_call::SystemCall;
use alloy_consensus::Header;
use alloy_primitives::{keccak256, B256};
use basalt_primitives::types::STATE_SYNC_RECEIPT_PREFIX;
use basalt_primitives::{
    Block, ChainConfig, ExecError, ExecResult, IndexedLog, Receipt, Rules, TxType,
};
use tracing::debug;

/// Run the consensus engine's pre-block hook, then seal its effects.
pub fn initialize_block(
    engine: &dyn ConsensusEngine,
    chain: &ChainConfig,
    header: &Header,
    rules: &Rules,
    state: &mut dyn StateView,
    syscall: &dyn SystemCall,
) -> ExecResult<()> {
    engine.initialize(chain, header, state, syscall)?;
    state.finalize_tx(rules);
    Ok(())
}

/// Finalize through the consensus engine, commit state and flush change
/// sets. With `assemble`, returns the block built by the engine.
pub fn finalize_block(
    engine: &dyn ConsensusEngine,
    input: &FinalizeInput<'_>,
    state: &mut dyn StateView,
    writer: &mut dyn StateWriter,
    syscall: &dyn SystemCall,
    assemble: bool,
) -> ExecResult<Option<Block>> {
    let block_number = input.header.number;
    let wrap = |source: ExecError| ExecError::FinalizationFailed {
        block_number,
        source: Box::new(source),
    };

    let assembled = if assemble {
        Some(engine.finalize_and_assemble(input, state, syscall).map_err(wrap)?)
    } else {
        engine.finalize(input, state, syscall).map_err(wrap)?;
        None
    };

    let rules = input.chain.rules(block_number, input.header.timestamp);
    state
        .commit_block(&rules, writer)
        .map_err(|source| ExecError::CommitFailed { block_number, source: Box::new(source) })?;
    writer
        .write_change_sets()
        .map_err(|source| ExecError::ChangeSetFlushFailed { block_number, source: Box::new(source) })?;

    debug!(block_number, assembled = assembled.is_some(), "block finalized");
    Ok(assembled)
}

/// Hash standing in for the transaction of a state-sync receipt:
/// `keccak256(prefix ‖ number as 8 big-endian bytes ‖ block hash)`.
pub fn state_sync_tx_hash(block_number: u64, block_hash: B256) -> B256 {
    let mut key = Vec::with_capacity(STATE_SYNC_RECEIPT_PREFIX.len() + 8 + 32);
    key.extend_from_slice(STATE_SYNC_RECEIPT_PREFIX);
    key.extend_from_slice(&block_number.to_be_bytes());
    key.extend_from_slice(block_hash.as_slice());
    keccak256(key)
}

/// Gather the logs beyond those of `receipts` into a synthetic receipt.
///
/// `block_logs` is every log emitted in the block, in any order. Returns
/// `None` when the receipts already account for all of them.
pub fn reconcile_state_sync(
    block_hash: B256,
    block_number: u64,
    receipts: &[Receipt],
    block_logs: &[IndexedLog],
) -> Option<Receipt> {
    let tx_log_count: usize = receipts.iter().map(|receipt| receipt.logs.len()).sum();
    if block_logs.len() <= tx_log_count {
        return None;
    }

    let mut logs = block_logs.to_vec();
    logs.sort_by_key(|log| log.log_index);
    let surplus = logs.split_off(tx_log_count);

    let tx_hash = state_sync_tx_hash(block_number, block_hash);
    let tx_index = receipts.len() as u64;
    let logs: Vec<IndexedLog> = surplus
        .into_iter()
        .enumerate()
        .map(|(offset, mut log)| {
            log.log_index = (tx_log_count + offset) as u64;
            log.transaction_hash = tx_hash;
            log.transaction_index = tx_index;
            log.block_hash = block_hash;
            log.block_number = block_number;
            log
        })
        .collect();

    debug!(block_number, logs = logs.len(), "state sync receipt derived");

    let mut receipt = Receipt::new(TxType::Legacy, true, 0, logs);
    receipt.transaction_hash = tx_hash;
    receipt.transaction_index = tx_index;
    receipt.block_hash = block_hash;
    receipt.block_number = block_number;
    Some(receipt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ProofOfWork;
    use crate::state::{MemoryState, MemoryWriter};
    use alloy_primitives::{address, Address, Bytes, Log, LogData, U256};
    use basalt_primitives::{Account, ConsensusKind, Withdrawal};

    const MINER: Address = address!("00000000000000000000000000000000000c0ffe");
    const EMITTER: Address = address!("0000000000000000000000000000000000e1e1e1");

    fn log(index: u64, tx_index: u64) -> IndexedLog {
        IndexedLog {
            inner: Log { address: EMITTER, data: LogData::new_unchecked(vec![B256::with_last_byte(index as u8)], Bytes::new()) },
            log_index: index,
            transaction_index: tx_index,
            ..Default::default()
        }
    }

    fn noop_syscall() -> impl Fn(&mut dyn StateView, Address, Bytes, bool) -> ExecResult<Bytes> {
        |_state: &mut dyn StateView, _contract: Address, _data: Bytes, _constant: bool| Ok(Bytes::new())
    }

    // ── Test: synthetic receipt from surplus logs ──

    #[test]
    fn test_reconcile_takes_surplus_logs() {
        let block_hash = B256::repeat_byte(0xab);
        let receipts = vec![
            Receipt::new(TxType::Legacy, true, 21_000, vec![log(0, 0), log(1, 0)]),
            Receipt::new(TxType::Legacy, true, 42_000, vec![log(2, 1)]),
        ];
        // shuffled on purpose
        let block_logs = vec![log(3, 1), log(0, 0), log(4, 1), log(2, 1), log(1, 0)];

        let receipt = reconcile_state_sync(block_hash, 77, &receipts, &block_logs).unwrap();

        assert!(receipt.status);
        assert_eq!(receipt.logs.len(), 2);
        assert_eq!(receipt.logs[0].log_index, 3);
        assert_eq!(receipt.logs[1].log_index, 4);
        assert_eq!(receipt.block_hash, block_hash);
        assert_eq!(receipt.block_number, 77);
        assert_eq!(receipt.transaction_index, 2);

        let tx_hash = state_sync_tx_hash(77, block_hash);
        assert_eq!(receipt.transaction_hash, tx_hash);
        for log in &receipt.logs {
            assert_eq!(log.transaction_hash, tx_hash);
            assert_eq!(log.transaction_index, 2);
            assert_eq!(log.block_hash, block_hash);
            assert_eq!(log.block_number, 77);
        }
    }

    #[test]
    fn test_reconcile_without_surplus() {
        let receipts = vec![Receipt::new(TxType::Legacy, true, 21_000, vec![log(0, 0)])];
        assert!(reconcile_state_sync(B256::ZERO, 1, &receipts, &[log(0, 0)]).is_none());
        assert!(reconcile_state_sync(B256::ZERO, 1, &[], &[]).is_none());
    }

    #[test]
    fn test_state_sync_tx_hash_layout() {
        let block_hash = B256::repeat_byte(0x01);
        let mut key = b"matic-bor-receipt-".to_vec();
        key.extend_from_slice(&[0, 0, 0, 0, 0, 0, 0, 5]);
        key.extend_from_slice(block_hash.as_slice());
        assert_eq!(state_sync_tx_hash(5, block_hash), keccak256(&key));
        assert_ne!(state_sync_tx_hash(6, block_hash), keccak256(&key));
    }

    // ── Test: finalize commits and flushes ──

    #[test]
    fn test_finalize_commits_rewards() {
        let chain = ChainConfig::all_forks(1, ConsensusKind::ProofOfWork);
        let header = Header { number: 3, beneficiary: MINER, difficulty: U256::from(1), ..Default::default() };
        let input = FinalizeInput {
            chain: &chain,
            header: &header,
            transactions: &[],
            uncles: &[],
            receipts: &[],
            withdrawals: None,
        };
        let mut state = MemoryState::new();
        let mut writer = MemoryWriter::new(3);

        let assembled = finalize_block(&ProofOfWork, &input, &mut state, &mut writer, &noop_syscall(), false).unwrap();

        assert!(assembled.is_none());
        assert!(!state.has_pending_changes());
        assert_eq!(writer.account(&MINER).unwrap().balance, U256::from(2_000_000_000_000_000_000u128));
        assert!(writer.change_set(3).is_some());
    }

    #[test]
    fn test_finalize_wraps_engine_error() {
        let chain = ChainConfig::all_forks(1, ConsensusKind::ProofOfWork);
        let header = Header { number: 3, ..Default::default() };
        let withdrawals: Vec<Withdrawal> = Vec::new();
        let input = FinalizeInput {
            chain: &chain,
            header: &header,
            transactions: &[],
            uncles: &[],
            receipts: &[],
            withdrawals: Some(withdrawals.as_slice()),
        };
        let mut writer = MemoryWriter::new(3);

        let err = finalize_block(&ProofOfWork, &input, &mut MemoryState::new(), &mut writer, &noop_syscall(), false)
            .unwrap_err();
        assert!(matches!(err, ExecError::FinalizationFailed { block_number: 3, .. }));
        assert!(matches!(err.root_cause(), ExecError::Consensus(_)));
        assert!(writer.change_set(3).is_none());
    }

    struct FailingWriter {
        fail_flush: bool,
    }

    impl StateWriter for FailingWriter {
        fn update_account(&mut self, _: Address, _: Option<&Account>, _: &Account) -> ExecResult<()> {
            if self.fail_flush {
                Ok(())
            } else {
                Err(ExecError::Storage("disk full".into()))
            }
        }

        fn delete_account(&mut self, _: Address, _: Option<&Account>) -> ExecResult<()> {
            Ok(())
        }

        fn write_storage(&mut self, _: Address, _: U256, _: U256, _: U256) -> ExecResult<()> {
            Ok(())
        }

        fn write_change_sets(&mut self) -> ExecResult<()> {
            Err(ExecError::Storage("changeset table locked".into()))
        }
    }

    #[test]
    fn test_commit_and_flush_errors_are_distinct() {
        let chain = ChainConfig::all_forks(1, ConsensusKind::ProofOfWork);
        let header = Header { number: 9, beneficiary: MINER, difficulty: U256::from(1), ..Default::default() };
        let input = FinalizeInput {
            chain: &chain,
            header: &header,
            transactions: &[],
            uncles: &[],
            receipts: &[],
            withdrawals: None,
        };

        let err = finalize_block(
            &ProofOfWork,
            &input,
            &mut MemoryState::new(),
            &mut FailingWriter { fail_flush: false },
            &noop_syscall(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::CommitFailed { block_number: 9, .. }));
        assert!(err.to_string().starts_with("committing block 9 failed"));

        let err = finalize_block(
            &ProofOfWork,
            &input,
            &mut MemoryState::new(),
            &mut FailingWriter { fail_flush: true },
            &noop_syscall(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ExecError::ChangeSetFlushFailed { block_number: 9, .. }));
        assert!(err.to_string().starts_with("writing changesets for block 9 failed"));
    }

    #[test]
    fn test_initialize_seals_journal() {
        let chain = ChainConfig::all_forks(1, ConsensusKind::ProofOfWork);
        let header = Header::default();
        let mut state = MemoryState::new();
        state.set_balance(MINER, U256::from(1));

        initialize_block(&ProofOfWork, &chain, &header, &Rules::default(), &mut state, &noop_syscall()).unwrap();

        // the journal restarts after initialization
        let snapshot = state.snapshot();
        state.set_balance(MINER, U256::from(2));
        state.revert_to_snapshot(snapshot);
        assert_eq!(state.balance(MINER), U256::from(1));
    }
}
