//! Single-transaction application.
//!
//! [`TransactionExecutor`] is the seam between the block pipeline and the
//! virtual machine. The block loop only needs a transaction applied against
//! the shared state and gas pool; everything inside the call is the
//! executor's business.
//!
//! [`TransferExecutor`] is the in-tree implementation: value transfers,
//! contract creation that installs the calldata as code, and calls into
//! [`NativeContract`]s registered by address.
//!
//! Processing order:
//! 1. Pre-checks (intrinsic gas, pool budgets, nonce, fee caps, balance).
//!    A failing pre-check leaves state and pool untouched.
//! 2. Buy gas, bump nonce, run the call under a snapshot.
//! 3. Refund unused gas, pay the tip, charge the pool.
//! 4. Build the receipt from the logs emitted since the call started.

use crate::contracts::{BeaconRootsContract, NativeCall, NativeContract, NativeOutput, Revert};
use crate::observer::TxTracer;
use crate::state::StateView;
use alloy_consensus::Header;
use alloy_eips::eip4844::calc_blob_gasprice;
use alloy_primitives::{Address, Bytes, TxKind, B256, U256};
use basalt_primitives::types::{
    TX_DATA_NON_ZERO_GAS, TX_DATA_ZERO_GAS, TX_GAS, TX_GAS_CONTRACT_CREATION,
};
use basalt_primitives::{
    ExecError, ExecResult, GasPool, GasUsage, IndexedLog, Receipt, Rules, Transaction,
    BEACON_ROOTS_ADDRESS,
};
use std::collections::BTreeMap;
use tracing::trace;

/// Block-level inputs shared by every transaction of a block.
#[derive(Debug, Clone, Copy)]
pub struct TxEnv<'a> {
    pub header: &'a Header,
    pub rules: Rules,
    pub block_hash: B256,
    /// Receives the priority fee.
    pub beneficiary: Address,
    pub tx_index: usize,
    pub no_receipts: bool,
}

impl<'a> TxEnv<'a> {
    pub fn new(header: &'a Header, rules: Rules, block_hash: B256) -> Self {
        Self {
            header,
            rules,
            block_hash,
            beneficiary: header.beneficiary,
            tx_index: 0,
            no_receipts: false,
        }
    }

    pub fn at_index(mut self, tx_index: usize) -> Self {
        self.tx_index = tx_index;
        self
    }

    pub fn no_receipts(mut self, no_receipts: bool) -> Self {
        self.no_receipts = no_receipts;
        self
    }

    fn base_fee(&self) -> Option<u64> {
        if self.rules.is_london {
            self.header.base_fee_per_gas
        } else {
            None
        }
    }
}

/// Result of an applied transaction.
///
/// A reverted call is still an applied transaction: it consumes gas and
/// produces a receipt with a failed status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxOutcome {
    /// `None` when receipts are disabled.
    pub receipt: Option<Receipt>,
    pub gas_used: u64,
    pub output: Bytes,
    /// Set when the call reverted.
    pub revert_reason: Option<String>,
}

impl TxOutcome {
    pub fn is_success(&self) -> bool {
        self.revert_reason.is_none()
    }
}

/// Applies one transaction to the block state.
///
/// Implementations must leave `state`, `pool` and `usage` untouched when
/// they return an error. `tracer`, when present, sees the start and end of
/// the transaction.
pub trait TransactionExecutor {
    fn apply(
        &self,
        tx: &Transaction,
        env: &TxEnv<'_>,
        pool: &mut GasPool,
        usage: &mut GasUsage,
        state: &mut dyn StateView,
        tracer: Option<&mut dyn TxTracer>,
    ) -> ExecResult<TxOutcome>;
}

/// Gas charged before any execution: base cost plus calldata.
pub fn intrinsic_gas(tx: &Transaction, rules: &Rules) -> u64 {
    let base = if tx.is_create() && rules.is_homestead {
        TX_GAS_CONTRACT_CREATION
    } else {
        TX_GAS
    };
    let zeros = tx.input.iter().filter(|byte| **byte == 0).count() as u64;
    let non_zeros = tx.input.len() as u64 - zeros;
    base.saturating_add(zeros.saturating_mul(TX_DATA_ZERO_GAS))
        .saturating_add(non_zeros.saturating_mul(TX_DATA_NON_ZERO_GAS))
}

// ── TransferExecutor ──

/// Executor for transfers, code installation and native contracts.
#[derive(Default)]
pub struct TransferExecutor {
    contracts: BTreeMap<Address, Box<dyn NativeContract>>,
}

impl TransferExecutor {
    /// An executor with no native contracts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a native contract at `address`, replacing any previous one.
    pub fn with_contract(mut self, address: Address, contract: impl NativeContract + 'static) -> Self {
        self.contracts.insert(address, Box::new(contract));
        self
    }

    /// An executor with the Ethereum system contracts installed.
    pub fn ethereum() -> Self {
        Self::new().with_contract(BEACON_ROOTS_ADDRESS, BeaconRootsContract)
    }

    fn precheck(
        &self,
        tx: &Transaction,
        env: &TxEnv<'_>,
        pool: &GasPool,
        state: &dyn StateView,
    ) -> ExecResult<Prepared> {
        let intrinsic = if tx.system { 0 } else { intrinsic_gas(tx, &env.rules) };
        if tx.gas_limit < intrinsic {
            return Err(ExecError::InvalidTransaction(format!(
                "intrinsic gas too low: have {}, want {intrinsic}",
                tx.gas_limit
            )));
        }
        pool.check_gas(tx.gas_limit)?;

        let data_gas = tx.data_gas();
        if data_gas > 0 && !env.rules.is_cancun {
            return Err(ExecError::InvalidTransaction(
                "blob transaction before cancun".into(),
            ));
        }
        pool.check_data_gas(data_gas)?;

        let base_fee = env.base_fee();
        let blob_gas_price = calc_blob_gasprice(env.header.excess_blob_gas.unwrap_or_default());

        if tx.system {
            return Ok(Prepared { intrinsic, data_gas, gas_price: 0, blob_gas_price, base_fee });
        }

        let expected = state.nonce(tx.sender);
        if tx.nonce != expected {
            return Err(ExecError::InvalidTransaction(format!(
                "nonce mismatch for {}: state {expected}, tx {}",
                tx.sender, tx.nonce
            )));
        }
        if expected == u64::MAX {
            return Err(ExecError::InvalidTransaction(format!("nonce has max value: {}", tx.sender)));
        }
        if let Some(base_fee) = base_fee {
            if tx.gas_price < u128::from(base_fee) {
                return Err(ExecError::InvalidTransaction(format!(
                    "max fee per gas less than block base fee: {} < {base_fee}",
                    tx.gas_price
                )));
            }
        }
        if tx.max_priority_fee_per_gas.is_some_and(|tip| tip > tx.gas_price) {
            return Err(ExecError::InvalidTransaction(
                "max priority fee per gas higher than max fee per gas".into(),
            ));
        }

        let mut cost = U256::from(tx.gas_limit)
            .saturating_mul(U256::from(tx.gas_price))
            .saturating_add(tx.value);
        if data_gas > 0 {
            let max_blob_fee = tx.max_fee_per_blob_gas.unwrap_or_default();
            if max_blob_fee < blob_gas_price {
                return Err(ExecError::InvalidTransaction(format!(
                    "max fee per blob gas less than block blob gas fee: {max_blob_fee} < {blob_gas_price}"
                )));
            }
            cost = cost.saturating_add(U256::from(data_gas).saturating_mul(U256::from(max_blob_fee)));
        }
        let balance = state.balance(tx.sender);
        if balance < cost {
            return Err(ExecError::InvalidTransaction(format!(
                "insufficient funds for gas * price + value: address {} have {balance} want {cost}",
                tx.sender
            )));
        }

        Ok(Prepared {
            intrinsic,
            data_gas,
            gas_price: tx.effective_gas_price(base_fee),
            blob_gas_price,
            base_fee,
        })
    }

    fn execute(
        &self,
        tx: &Transaction,
        env: &TxEnv<'_>,
        prepared: &Prepared,
        pool: &mut GasPool,
        usage: &mut GasUsage,
        state: &mut dyn StateView,
    ) -> ExecResult<TxOutcome> {
        let logs_before = state.logs().len();
        let nonce = state.nonce(tx.sender);

        if !tx.system {
            let gas_cost = U256::from(tx.gas_limit).saturating_mul(U256::from(prepared.gas_price));
            state.sub_balance(tx.sender, gas_cost)?;
            if prepared.data_gas > 0 {
                let blob_cost = U256::from(prepared.data_gas)
                    .saturating_mul(U256::from(prepared.blob_gas_price));
                state.sub_balance(tx.sender, blob_cost)?;
            }
            state.set_nonce(tx.sender, nonce.saturating_add(1));
        }

        let (target, contract_address) = match tx.to {
            TxKind::Create => {
                let address = if tx.system { tx.sender } else { tx.sender.create(nonce) };
                (address, Some(address))
            }
            TxKind::Call(to) => (to, None),
        };

        let call_snapshot = state.snapshot();
        let mut gas_used = prepared.intrinsic;
        let mut output = Bytes::new();
        let mut revert_reason = None;

        match self.run(tx, env, target, state) {
            Ok(out) => {
                let total = prepared.intrinsic.saturating_add(out.gas_used);
                if total > tx.gas_limit {
                    state.revert_to_snapshot(call_snapshot);
                    gas_used = tx.gas_limit;
                    revert_reason = Some("out of gas".to_string());
                } else {
                    gas_used = total;
                    output = out.output;
                }
            }
            Err(Revert(reason)) => {
                state.revert_to_snapshot(call_snapshot);
                revert_reason = Some(reason);
            }
        }

        if !tx.system {
            let refund = U256::from(tx.gas_limit - gas_used).saturating_mul(U256::from(prepared.gas_price));
            state.add_balance(tx.sender, refund);
            let tip = prepared
                .gas_price
                .saturating_sub(prepared.base_fee.map(u128::from).unwrap_or_default());
            state.add_balance(env.beneficiary, U256::from(gas_used).saturating_mul(U256::from(tip)));
        }

        pool.deduct_data_gas(prepared.data_gas)?;
        pool.deduct_gas(gas_used)?;
        usage.gas += gas_used;
        usage.data_gas += prepared.data_gas;

        let receipt = (!env.no_receipts).then(|| {
            let logs: Vec<IndexedLog> = state.logs()[logs_before..]
                .iter()
                .cloned()
                .map(|mut log| {
                    log.block_number = env.header.number;
                    log
                })
                .collect();
            let mut receipt = Receipt::new(tx.tx_type, revert_reason.is_none(), usage.gas, logs);
            receipt.transaction_hash = tx.hash();
            receipt.contract_address = contract_address;
            receipt.gas_used = gas_used;
            receipt.block_hash = env.block_hash;
            receipt.block_number = env.header.number;
            receipt.transaction_index = env.tx_index as u64;
            receipt
        });

        trace!(
            sender = %tx.sender,
            gas_used,
            status = revert_reason.is_none(),
            "transaction applied"
        );

        Ok(TxOutcome { receipt, gas_used, output, revert_reason })
    }

    /// Value transfer and code: the part of a transaction a revert undoes.
    fn run(
        &self,
        tx: &Transaction,
        env: &TxEnv<'_>,
        target: Address,
        state: &mut dyn StateView,
    ) -> Result<NativeOutput, Revert> {
        if tx.is_create() && !tx.system && !state.code(target).is_empty() {
            return Err(Revert(format!("contract address collision at {target}")));
        }

        if !tx.value.is_zero() {
            state
                .sub_balance(tx.sender, tx.value)
                .map_err(|err| Revert(err.to_string()))?;
            state.add_balance(target, tx.value);
        } else if !tx.system {
            state.add_balance(target, U256::ZERO);
        }

        if tx.is_create() {
            if env.rules.is_spurious_dragon && !tx.system {
                state.set_nonce(target, 1);
            }
            state.set_code(target, tx.input.clone());
            return Ok(NativeOutput { output: tx.input.clone(), gas_used: 0 });
        }

        match self.contracts.get(&target) {
            Some(contract) => contract.call(
                state,
                &NativeCall { caller: tx.sender, address: target, input: &tx.input, header: env.header },
            ),
            None => Ok(NativeOutput::default()),
        }
    }
}

/// Values fixed by the pre-checks.
struct Prepared {
    intrinsic: u64,
    data_gas: u64,
    gas_price: u128,
    blob_gas_price: u128,
    base_fee: Option<u64>,
}

impl TransactionExecutor for TransferExecutor {
    fn apply(
        &self,
        tx: &Transaction,
        env: &TxEnv<'_>,
        pool: &mut GasPool,
        usage: &mut GasUsage,
        state: &mut dyn StateView,
        mut tracer: Option<&mut dyn TxTracer>,
    ) -> ExecResult<TxOutcome> {
        if let Some(tracer) = tracer.as_deref_mut() {
            tracer.on_tx_start(tx);
        }

        let result = self.precheck(tx, env, pool, state).and_then(|prepared| {
            let snapshot = state.snapshot();
            let (pool_before, usage_before) = (pool.clone(), *usage);
            let result = self.execute(tx, env, &prepared, pool, usage, state);
            if result.is_err() {
                state.revert_to_snapshot(snapshot);
                *pool = pool_before;
                *usage = usage_before;
            }
            result
        });

        if let Some(tracer) = tracer {
            match &result {
                Ok(outcome) => tracer.on_tx_end(outcome.receipt.as_ref(), None),
                Err(err) => tracer.on_tx_end(None, Some(err)),
            }
        }
        result
    }
}
