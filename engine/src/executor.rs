//! Block executor: the transaction loop and everything around it.
//!
//! `BlockExecutor::execute_block` runs one block through its lifecycle:
//!
//! 1. Seed the gas pool from the header and the data-gas cap
//! 2. Consensus initialization and the DAO rewrite on its activation block
//! 3. For each transaction, in order:
//!    a. Bind the transaction context and notify the observer
//!    b. Attach a tracer when tracing is on
//!    c. Apply through the [`TransactionExecutor`]
//!    d. Abort the block, or in stateless mode record a rejection
//! 4. Check receipts root, gas, data gas and bloom against the header
//! 5. Consensus finalization, commit and change-set flush
//! 6. Build the [`ExecutionReport`], with the state-sync receipt on chains
//!    that carry one
//!
//! **Atomicity:** a fatal error unwinds with no report. The observer sees
//! `cancel_block` and the caller discards the state view.

use crate::chain::ChainHeaderReader;
use crate::config::ExecutionConfig;
use crate::consensus::{assemble_block, ConsensusEngine, FinalizeInput};
use crate::finalize::{finalize_block, initialize_block, reconcile_state_sync, state_sync_tx_hash};
use crate::observer::{BlockObserver, ExecutionHooks, TxTracer};
use crate::state::{StateView, StateWriter};
use crate::system_call::SystemCaller;
use crate::transaction::{TransactionExecutor, TxEnv};
use crate::validation::{validate_block_outcome, ExecutionTotals};
use alloy_consensus::Header;
use alloy_primitives::{B256, U256};
use basalt_primitives::merkle::{logs_bloom, logs_hash, receipts_root, transactions_root};
use basalt_primitives::{
    Block, ChainConfig, ExecError, ExecResult, ExecutionReport, GasPool, GasUsage, Receipt,
    RejectedTx, Rules, Transaction, MAX_DATA_GAS_PER_BLOCK,
};
use tracing::{debug, trace};

/// Observer wrapper that stays silent in read-only runs.
struct Events<'o> {
    observer: Option<&'o mut dyn BlockObserver>,
}

impl<'o> Events<'o> {
    fn new(observer: Option<&'o mut dyn BlockObserver>, read_only: bool) -> Self {
        Self { observer: if read_only { None } else { observer } }
    }

    fn emit(&mut self, event: impl FnOnce(&mut (dyn BlockObserver + 'o))) {
        if let Some(observer) = self.observer.as_deref_mut() {
            event(observer);
        }
    }
}

/// Validation replays a sealed block; production fills in a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Validate,
    Produce,
}

/// What the transaction loop leaves behind.
struct LoopResult {
    included: Vec<Transaction>,
    receipts: Vec<Receipt>,
    rejected: Vec<RejectedTx>,
    usage: GasUsage,
}

/// Executes blocks for one chain.
///
/// Holds no per-block state, so one executor serves any number of blocks.
/// Given the same block, pre-state and configuration it always produces
/// the same report.
pub struct BlockExecutor<'a> {
    chain: &'a ChainConfig,
    config: ExecutionConfig,
    consensus: &'a dyn ConsensusEngine,
    executor: &'a dyn TransactionExecutor,
}

impl<'a> BlockExecutor<'a> {
    /// Fails if `consensus` is not the engine the chain is configured for.
    pub fn new(
        chain: &'a ChainConfig,
        config: ExecutionConfig,
        consensus: &'a dyn ConsensusEngine,
        executor: &'a dyn TransactionExecutor,
    ) -> ExecResult<Self> {
        chain.validate()?;
        if consensus.kind() != chain.consensus {
            return Err(ExecError::Config(format!(
                "chain expects {:?} consensus, got {:?}",
                chain.consensus,
                consensus.kind()
            )));
        }
        Ok(Self { chain, config, consensus, executor })
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    /// Execute and validate a sealed block.
    ///
    /// `state` must reflect the parent block's post-state. On success its
    /// changes have been committed into `writer`.
    pub fn execute_block(
        &self,
        block: &Block,
        state: &mut dyn StateView,
        writer: &mut dyn StateWriter,
        reader: &dyn ChainHeaderReader,
        hooks: ExecutionHooks<'_>,
    ) -> ExecResult<ExecutionReport> {
        let (report, _) = self.run(block, state, writer, reader, hooks, Mode::Validate)?;
        Ok(report)
    }

    /// Build a block from a header template and candidate transactions.
    ///
    /// Header checks are skipped. The returned block carries the roots
    /// derived from execution plus the gas and data gas actually used.
    pub fn produce_block(
        &self,
        template: &Block,
        state: &mut dyn StateView,
        writer: &mut dyn StateWriter,
        reader: &dyn ChainHeaderReader,
        hooks: ExecutionHooks<'_>,
    ) -> ExecResult<(Block, ExecutionReport)> {
        let (mut report, assembled) = self.run(template, state, writer, reader, hooks, Mode::Produce)?;
        let mut block = assembled.ok_or_else(|| {
            ExecError::Consensus("consensus engine assembled no block".into())
        })?;

        let rules = self.chain.rules(block.header.number, block.header.timestamp);
        block.header.gas_used = report.gas_used;
        if rules.is_cancun {
            let data_gas: u64 = block.transactions.iter().map(Transaction::data_gas).sum();
            block.header.blob_gas_used = Some(data_gas);
        }
        let hash = block.hash();
        link_receipts(&mut report, hash);
        debug!(number = block.number(), %hash, "block produced");
        Ok((block, report))
    }

    fn run(
        &self,
        block: &Block,
        state: &mut dyn StateView,
        writer: &mut dyn StateWriter,
        reader: &dyn ChainHeaderReader,
        mut hooks: ExecutionHooks<'_>,
        mode: Mode,
    ) -> ExecResult<(ExecutionReport, Option<Block>)> {
        let mut events = Events::new(hooks.observer.take(), self.config.read_only);
        let result = self.run_inner(block, state, writer, reader, &mut hooks, &mut events, mode);
        if let Err(err) = &result {
            debug!(number = block.number(), %err, "block aborted");
            events.emit(|observer| observer.cancel_block(block, err));
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn run_inner(
        &self,
        block: &Block,
        state: &mut dyn StateView,
        writer: &mut dyn StateWriter,
        reader: &dyn ChainHeaderReader,
        hooks: &mut ExecutionHooks<'_>,
        events: &mut Events<'_>,
        mode: Mode,
    ) -> ExecResult<(ExecutionReport, Option<Block>)> {
        let header = &block.header;
        let rules = self.chain.rules(header.number, header.timestamp);
        let syscaller = SystemCaller::new(self.chain, header, self.executor);

        let mut pool = GasPool::new();
        pool.add_gas(header.gas_limit)?.add_data_gas(MAX_DATA_GAS_PER_BLOCK)?;

        debug!(
            number = header.number,
            txs = block.tx_count(),
            gas_limit = header.gas_limit,
            "executing block"
        );
        state.begin_block();
        events.emit(|observer| observer.start_block(block));

        if !self.config.read_only {
            initialize_block(self.consensus, self.chain, header, &rules, state, &syscaller)?;
        }
        syscaller.apply_hard_fork_if_due(state);

        let LoopResult { included, receipts, rejected, usage } =
            self.apply_transactions(block, &rules, &mut pool, state, hooks, events)?;

        let receipts_root = receipts_root(&receipts);
        let bloom = (!self.config.no_receipts).then(|| logs_bloom(&receipts));
        if mode == Mode::Validate {
            let totals = ExecutionTotals {
                receipts_root,
                gas_used: usage.gas,
                data_gas_used: usage.data_gas,
                logs_bloom: bloom,
            };
            validate_block_outcome(header, &rules, &self.config, &totals)?;
        }

        let mut assembled = None;
        if !self.config.read_only {
            events.emit(|observer| observer.finalize_block(block));
            let input = FinalizeInput {
                chain: self.chain,
                header,
                transactions: &included,
                uncles: &block.ommers,
                receipts: &receipts,
                withdrawals: block.withdrawals.as_deref(),
            };
            assembled = finalize_block(
                self.consensus,
                &input,
                state,
                writer,
                &syscaller,
                mode == Mode::Produce,
            )?;
        } else if mode == Mode::Produce {
            assembled = Some(assemble_block(&FinalizeInput {
                chain: self.chain,
                header,
                transactions: &included,
                uncles: &block.ommers,
                receipts: &receipts,
                withdrawals: block.withdrawals.as_deref(),
            }));
        }

        let (finalized, total_difficulty) = self.chain_position(header, reader);
        events.emit(|observer| observer.end_block(block, finalized.as_ref(), total_difficulty));

        let state_sync_receipt = if self.chain.uses_state_sync() {
            reconcile_state_sync(block.hash(), header.number, &receipts, state.logs())
        } else {
            None
        };

        let report = ExecutionReport {
            state_root: Default::default(),
            tx_root: transactions_root(&included),
            receipts_root,
            logs_hash: logs_hash(state.logs()),
            logs_bloom: bloom.unwrap_or_default(),
            receipts,
            rejected,
            difficulty: header.difficulty,
            gas_used: usage.gas,
            state_sync_receipt,
        };

        debug!(
            number = header.number,
            gas_used = report.gas_used,
            data_gas_used = usage.data_gas,
            included = included.len(),
            rejected = report.rejected.len(),
            "block executed"
        );
        Ok((report, assembled))
    }

    fn apply_transactions(
        &self,
        block: &Block,
        rules: &Rules,
        pool: &mut GasPool,
        state: &mut dyn StateView,
        hooks: &mut ExecutionHooks<'_>,
        events: &mut Events<'_>,
    ) -> ExecResult<LoopResult> {
        let header = &block.header;
        let block_hash = block.hash();
        let base_fee = if rules.is_london { header.base_fee_per_gas } else { None };

        let mut result = LoopResult {
            included: Vec::with_capacity(block.tx_count()),
            receipts: Vec::with_capacity(block.tx_count()),
            rejected: Vec::new(),
            usage: GasUsage::default(),
        };

        for (index, tx) in block.transactions.iter().enumerate() {
            let tx_hash = tx.hash();
            state.set_tx_context(tx_hash, block_hash, index);
            events.emit(|observer| observer.start_transaction(tx, base_fee));

            let mut acquired: Option<Box<dyn TxTracer>> = None;
            if self.config.trace && hooks.tracer.is_none() {
                let tracer = match hooks.tracer_provider.as_deref_mut() {
                    Some(provider) => provider.tracer_for(index, tx),
                    None => Err("no tracer provider configured".to_string()),
                };
                acquired = Some(tracer.map_err(|reason| ExecError::TracerAcquisitionFailed { index, reason })?);
            }

            let env = TxEnv::new(header, *rules, block_hash)
                .at_index(index)
                .no_receipts(self.config.no_receipts);
            let tracer: Option<&mut dyn TxTracer> = match acquired.as_deref_mut() {
                Some(tracer) => Some(tracer),
                None => match hooks.tracer.as_deref_mut() {
                    Some(tracer) => Some(tracer),
                    None => None,
                },
            };
            let applied = self.executor.apply(tx, &env, pool, &mut result.usage, state, tracer);

            if let Some(mut tracer) = acquired.take() {
                tracer.flush(tx);
            }

            match applied {
                Ok(outcome) => {
                    trace!(
                        index,
                        hash = %tx_hash,
                        gas_used = outcome.gas_used,
                        status = outcome.is_success(),
                        "transaction included"
                    );
                    events.emit(|observer| observer.end_transaction(outcome.receipt.as_ref()));
                    if let Some(receipt) = outcome.receipt {
                        result.receipts.push(receipt);
                    }
                    result.included.push(tx.clone());
                }
                Err(err) if self.config.stateless => {
                    debug!(index, hash = %tx_hash, %err, "transaction rejected");
                    result.rejected.push(RejectedTx { index, error: err.to_string() });
                }
                Err(err) => {
                    return Err(ExecError::TransactionExecutionFailed {
                        index,
                        block_number: header.number,
                        tx_hash,
                        source: Box::new(err),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Finalized header and total difficulty reported to `end_block`.
    fn chain_position(
        &self,
        header: &Header,
        reader: &dyn ChainHeaderReader,
    ) -> (Option<Header>, Option<U256>) {
        let total_difficulty = header
            .number
            .checked_sub(1)
            .and_then(|parent| reader.total_difficulty(header.parent_hash, parent))
            .map(|parent_td| parent_td.saturating_add(header.difficulty));

        let finalized = if self.chain.uses_state_sync() {
            None
        } else {
            reader
                .current_finalized_header()
                .filter(|finalized| finalized.number <= header.number)
        };
        (finalized, total_difficulty)
    }
}

/// Point receipts and logs at the sealed block. During execution they
/// carry the template's hash, which the assembled header no longer has.
fn link_receipts(report: &mut ExecutionReport, block_hash: B256) {
    for receipt in &mut report.receipts {
        receipt.block_hash = block_hash;
        for log in &mut receipt.logs {
            log.block_hash = block_hash;
        }
    }
    if let Some(receipt) = &mut report.state_sync_receipt {
        let tx_hash = state_sync_tx_hash(receipt.block_number, block_hash);
        receipt.block_hash = block_hash;
        receipt.transaction_hash = tx_hash;
        for log in &mut receipt.logs {
            log.block_hash = block_hash;
            log.transaction_hash = tx_hash;
        }
    }
}
