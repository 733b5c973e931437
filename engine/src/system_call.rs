//! System calls: contract invocations that originate in the engine itself.
//!
//! A system call runs through the regular [`TransactionExecutor`] as a
//! synthetic transaction, but with its own gas pool and no receipt. It never
//! joins the block's transaction list, receipts or gas accounting.

use crate::forks::apply_dao_hard_fork;
use crate::state::StateView;
use crate::transaction::{TransactionExecutor, TxEnv};
use alloy_consensus::Header;
use alloy_primitives::{Address, Bytes};
use basalt_primitives::{
    ChainConfig, ExecError, ExecResult, GasPool, GasUsage, Rules, Transaction, SYSTEM_ADDRESS,
    SYSTEM_CALL_GAS_LIMIT,
};
use tracing::trace;

/// Callback through which consensus engines reach system contracts.
pub trait SystemCall {
    /// Call `contract`; the effects persist.
    fn call(&self, state: &mut dyn StateView, contract: Address, data: Bytes) -> ExecResult<Bytes>;

    /// Call `contract` and discard every effect afterwards.
    fn call_constant(
        &self,
        state: &mut dyn StateView,
        contract: Address,
        data: Bytes,
    ) -> ExecResult<Bytes>;
}

/// Closures taking `(state, contract, data, constant)` are system callers.
impl<F> SystemCall for F
where
    F: Fn(&mut dyn StateView, Address, Bytes, bool) -> ExecResult<Bytes>,
{
    fn call(&self, state: &mut dyn StateView, contract: Address, data: Bytes) -> ExecResult<Bytes> {
        self(state, contract, data, false)
    }

    fn call_constant(
        &self,
        state: &mut dyn StateView,
        contract: Address,
        data: Bytes,
    ) -> ExecResult<Bytes> {
        self(state, contract, data, true)
    }
}

/// Issues system calls for one block.
pub struct SystemCaller<'a> {
    chain: &'a ChainConfig,
    header: &'a Header,
    rules: Rules,
    executor: &'a dyn TransactionExecutor,
}

impl<'a> SystemCaller<'a> {
    pub fn new(
        chain: &'a ChainConfig,
        header: &'a Header,
        executor: &'a dyn TransactionExecutor,
    ) -> Self {
        Self { chain, header, rules: chain.rules(header.number, header.timestamp), executor }
    }

    /// Block author seen by system calls: the header's beneficiary on
    /// state-sync chains, the system address everywhere else.
    pub fn author(&self) -> Address {
        if self.chain.uses_state_sync() {
            self.header.beneficiary
        } else {
            SYSTEM_ADDRESS
        }
    }

    /// Apply the DAO rewrite when this is its activation block.
    pub fn apply_hard_fork_if_due(&self, state: &mut dyn StateView) {
        if let Some(fork) = self.chain.dao_fork_at(self.header.number) {
            apply_dao_hard_fork(state, fork);
        }
    }

    /// Call `contract` from `sender` with at most `gas_limit` gas.
    ///
    /// With `restore_state` every effect of the call is reverted before
    /// returning, whether the call succeeded or not.
    pub fn call(
        &self,
        state: &mut dyn StateView,
        contract: Address,
        data: Bytes,
        sender: Address,
        gas_limit: u64,
        restore_state: bool,
    ) -> ExecResult<Bytes> {
        self.apply_hard_fork_if_due(state);
        let tx = Transaction::system_call(sender, contract, state.nonce(sender), gas_limit, data);

        let snapshot = restore_state.then(|| state.snapshot());
        let result = self.execute(&tx, contract, state);
        if let Some(snapshot) = snapshot {
            state.revert_to_snapshot(snapshot);
        }
        result
    }

    /// Install `code` at `contract`, bypassing nonce and address derivation.
    pub fn create(&self, state: &mut dyn StateView, contract: Address, code: Bytes) -> ExecResult<Bytes> {
        self.apply_hard_fork_if_due(state);
        let tx = Transaction::system_create(contract, SYSTEM_CALL_GAS_LIMIT, code);
        self.execute(&tx, contract, state)
    }

    fn execute(&self, tx: &Transaction, contract: Address, state: &mut dyn StateView) -> ExecResult<Bytes> {
        let mut pool = GasPool::new();
        pool.add_gas(tx.gas_limit)?;
        let env = TxEnv {
            beneficiary: self.author(),
            ..TxEnv::new(self.header, self.rules, Default::default())
        }
        .no_receipts(true);

        let outcome = self
            .executor
            .apply(tx, &env, &mut pool, &mut GasUsage::default(), state, None)
            .map_err(|err| ExecError::SystemCallFailed { contract, reason: err.to_string() })?;

        trace!(%contract, gas_used = outcome.gas_used, "system call");
        match outcome.revert_reason {
            Some(reason) => Err(ExecError::SystemCallFailed { contract, reason }),
            None => Ok(outcome.output),
        }
    }
}

impl SystemCall for SystemCaller<'_> {
    fn call(&self, state: &mut dyn StateView, contract: Address, data: Bytes) -> ExecResult<Bytes> {
        SystemCaller::call(self, state, contract, data, SYSTEM_ADDRESS, SYSTEM_CALL_GAS_LIMIT, false)
    }

    fn call_constant(
        &self,
        state: &mut dyn StateView,
        contract: Address,
        data: Bytes,
    ) -> ExecResult<Bytes> {
        SystemCaller::call(self, state, contract, data, SYSTEM_ADDRESS, SYSTEM_CALL_GAS_LIMIT, true)
    }
}
