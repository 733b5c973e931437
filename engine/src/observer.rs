//! Optional instrumentation hooks.
//!
//! A [`BlockObserver`] receives block and transaction lifecycle events; a
//! [`TxTracer`] follows a single transaction through the executor. Every
//! hook has a no-op default and returns `()`, so neither can influence
//! control flow. An observer that can fail must swallow its own errors.

use alloy_consensus::Header;
use alloy_primitives::U256;
use basalt_primitives::{Block, ExecError, Receipt, Transaction};

/// Block lifecycle sink.
pub trait BlockObserver {
    fn start_block(&mut self, _block: &Block) {}

    fn start_transaction(&mut self, _tx: &Transaction, _base_fee: Option<u64>) {}

    /// `receipt` is `None` when receipt generation is disabled.
    fn end_transaction(&mut self, _receipt: Option<&Receipt>) {}

    fn finalize_block(&mut self, _block: &Block) {}

    /// `finalized` is withheld while the block is behind the finalized head.
    fn end_block(
        &mut self,
        _block: &Block,
        _finalized: Option<&Header>,
        _total_difficulty: Option<U256>,
    ) {
    }

    fn cancel_block(&mut self, _block: &Block, _error: &ExecError) {}
}

/// Observer that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl BlockObserver for NoopObserver {}

/// Per-transaction tracer.
pub trait TxTracer {
    fn on_tx_start(&mut self, _tx: &Transaction) {}

    fn on_tx_end(&mut self, _receipt: Option<&Receipt>, _error: Option<&ExecError>) {}

    /// Called once the transaction has been applied, before the tracer is detached.
    fn flush(&mut self, _tx: &Transaction) {}
}

/// Source of per-transaction tracers when none is pre-attached.
pub trait TracerProvider {
    fn tracer_for(&mut self, index: usize, tx: &Transaction) -> Result<Box<dyn TxTracer>, String>;
}

impl<F> TracerProvider for F
where
    F: FnMut(usize, &Transaction) -> Result<Box<dyn TxTracer>, String>,
{
    fn tracer_for(&mut self, index: usize, tx: &Transaction) -> Result<Box<dyn TxTracer>, String> {
        self(index, tx)
    }
}

/// Hooks threaded through one block run.
#[derive(Default)]
pub struct ExecutionHooks<'a> {
    /// Tracer attached to every transaction of the block.
    pub tracer: Option<&'a mut dyn TxTracer>,
    /// Consulted per transaction when tracing is on and no tracer is attached.
    pub tracer_provider: Option<&'a mut dyn TracerProvider>,
    pub observer: Option<&'a mut dyn BlockObserver>,
}

impl<'a> ExecutionHooks<'a> {
    pub fn with_observer(observer: &'a mut dyn BlockObserver) -> Self {
        Self { observer: Some(observer), ..Default::default() }
    }

    pub fn with_tracer_provider(provider: &'a mut dyn TracerProvider) -> Self {
        Self { tracer_provider: Some(provider), ..Default::default() }
    }
}
