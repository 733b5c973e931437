//! State access traits and their in-memory implementations.
//!
//! [`StateView`] decouples the engine from the state engine backing it:
//! account and storage reads and writes, snapshot/revert for constant
//! system calls, log collection, and the end-of-block commit into a
//! [`StateWriter`].
//!
//! - In production: implemented over the client's state database
//! - In tests: [`MemoryState`] and [`MemoryWriter`]

use alloy_primitives::{Address, Bytes, Log, B256, U256};
use basalt_primitives::{
    Account, ExecError, ExecResult, IndexedLog, OverlayResult, Rules, StateOverlay,
};
use std::collections::BTreeMap;

/// Position of the transaction currently being applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxContext {
    pub tx_hash: B256,
    pub block_hash: B256,
    pub index: usize,
}

/// Mutable view of account and storage state for one block.
///
/// The engine has exclusive access for the whole block. Reads reflect
/// committed state plus every write made earlier in the block.
pub trait StateView {
    fn exists(&self, address: Address) -> bool;
    fn nonce(&self, address: Address) -> u64;
    fn balance(&self, address: Address) -> U256;
    fn code(&self, address: Address) -> Bytes;
    fn storage(&self, address: Address, key: U256) -> U256;

    /// Create an empty account, replacing any existing one.
    fn create_account(&mut self, address: Address);
    fn set_nonce(&mut self, address: Address, nonce: u64);
    fn set_balance(&mut self, address: Address, balance: U256);
    fn set_code(&mut self, address: Address, code: Bytes);
    fn set_storage(&mut self, address: Address, key: U256, value: U256);

    fn add_balance(&mut self, address: Address, amount: U256) {
        let balance = self.balance(address).saturating_add(amount);
        self.set_balance(address, balance);
    }

    /// Debit `amount`, failing without changes if the balance is short.
    fn sub_balance(&mut self, address: Address, amount: U256) -> ExecResult<()> {
        let balance = self.balance(address);
        let remaining = balance.checked_sub(amount).ok_or_else(|| {
            ExecError::InvalidTransaction(format!(
                "insufficient funds for {address}: have {balance}, want {amount}"
            ))
        })?;
        self.set_balance(address, remaining);
        Ok(())
    }

    /// Returns an identifier to pass to [`revert_to_snapshot`](Self::revert_to_snapshot).
    fn snapshot(&mut self) -> usize;
    fn revert_to_snapshot(&mut self, snapshot: usize);

    /// Reset per-block bookkeeping. Runs before any work of a block, so
    /// logs and log indices start fresh.
    fn begin_block(&mut self);

    /// Bind the transaction whose effects follow.
    fn set_tx_context(&mut self, tx_hash: B256, block_hash: B256, index: usize);
    fn tx_context(&self) -> TxContext;

    /// Record a log under the current transaction context.
    fn add_log(&mut self, log: Log);
    /// Every log emitted in the block so far, in emission order.
    fn logs(&self) -> &[IndexedLog];

    /// Seal the effects of the preceding system work so later reverts
    /// cannot cross it.
    fn finalize_tx(&mut self, rules: &Rules);

    /// Write accumulated changes into `writer` under `rules`.
    fn commit_block(&mut self, rules: &Rules, writer: &mut dyn StateWriter) -> ExecResult<()>;
}

/// Destination of committed block changes.
pub trait StateWriter {
    fn update_account(
        &mut self,
        address: Address,
        original: Option<&Account>,
        account: &Account,
    ) -> ExecResult<()>;

    fn delete_account(&mut self, address: Address, original: Option<&Account>) -> ExecResult<()>;

    fn write_storage(
        &mut self,
        address: Address,
        key: U256,
        original: U256,
        value: U256,
    ) -> ExecResult<()>;

    /// Flush the history of the block's changes.
    fn write_change_sets(&mut self) -> ExecResult<()>;
}

// ── MemoryState: in-memory state for testing and replay ──

/// In-memory state: committed accounts plus a journaled [`StateOverlay`].
///
/// `Clone` gives an isolated copy, which is how independent blocks can run
/// concurrently against the same pre-state.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    committed: BTreeMap<Address, Account>,
    committed_storage: BTreeMap<(Address, U256), U256>,
    overlay: StateOverlay,
    tx_context: TxContext,
}

impl MemoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a committed account.
    pub fn with_account(mut self, address: Address, account: Account) -> Self {
        self.committed.insert(address, account);
        self
    }

    /// Add a committed storage slot.
    pub fn with_storage(mut self, address: Address, key: U256, value: U256) -> Self {
        self.committed_storage.insert((address, key), value);
        self
    }

    /// Current account, including uncommitted writes.
    pub fn account(&self, address: Address) -> Option<Account> {
        match self.overlay.account(&address) {
            OverlayResult::Found(account) => Some(account.clone()),
            OverlayResult::Deleted => None,
            OverlayResult::NotInOverlay => self.committed.get(&address).cloned(),
        }
    }

    /// Returns true if writes are waiting for a commit.
    pub fn has_pending_changes(&self) -> bool {
        !self.overlay.is_empty()
    }

    fn update(&mut self, address: Address, f: impl FnOnce(&mut Account)) {
        let mut account = self.account(address).unwrap_or_default();
        f(&mut account);
        self.overlay.set_account(address, account);
    }
}

impl StateView for MemoryState {
    fn exists(&self, address: Address) -> bool {
        self.account(address).is_some()
    }

    fn nonce(&self, address: Address) -> u64 {
        self.account(address).map(|a| a.nonce).unwrap_or_default()
    }

    fn balance(&self, address: Address) -> U256 {
        self.account(address).map(|a| a.balance).unwrap_or_default()
    }

    fn code(&self, address: Address) -> Bytes {
        self.account(address).map(|a| a.code).unwrap_or_default()
    }

    fn storage(&self, address: Address, key: U256) -> U256 {
        if let Some(value) = self.overlay.storage(&address, &key) {
            return value;
        }
        if matches!(self.overlay.account(&address), OverlayResult::Deleted) {
            return U256::ZERO;
        }
        self.committed_storage
            .get(&(address, key))
            .copied()
            .unwrap_or_default()
    }

    fn create_account(&mut self, address: Address) {
        self.overlay.set_account(address, Account::default());
    }

    fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.update(address, |account| account.nonce = nonce);
    }

    fn set_balance(&mut self, address: Address, balance: U256) {
        self.update(address, |account| account.balance = balance);
    }

    fn set_code(&mut self, address: Address, code: Bytes) {
        self.update(address, |account| account.code = code);
    }

    fn set_storage(&mut self, address: Address, key: U256, value: U256) {
        if !self.exists(address) {
            self.create_account(address);
        }
        self.overlay.set_storage(address, key, value);
    }

    fn snapshot(&mut self) -> usize {
        self.overlay.snapshot()
    }

    fn revert_to_snapshot(&mut self, snapshot: usize) {
        self.overlay.revert_to(snapshot);
    }

    fn begin_block(&mut self) {
        self.overlay.clear_logs();
        self.tx_context = TxContext::default();
    }

    fn set_tx_context(&mut self, tx_hash: B256, block_hash: B256, index: usize) {
        self.tx_context = TxContext { tx_hash, block_hash, index };
    }

    fn tx_context(&self) -> TxContext {
        self.tx_context
    }

    fn add_log(&mut self, log: Log) {
        let ctx = self.tx_context;
        self.overlay.push_log(IndexedLog {
            inner: log,
            transaction_hash: ctx.tx_hash,
            transaction_index: ctx.index as u64,
            block_hash: ctx.block_hash,
            ..Default::default()
        });
    }

    fn logs(&self) -> &[IndexedLog] {
        self.overlay.logs()
    }

    fn finalize_tx(&mut self, _rules: &Rules) {
        self.overlay.discard_journal();
    }

    fn commit_block(&mut self, rules: &Rules, writer: &mut dyn StateWriter) -> ExecResult<()> {
        let changes = self.overlay.take_changes();
        let mut deleted = Vec::new();

        for (address, account) in changes.accounts {
            let original = self.committed.get(&address);
            match account {
                Some(account) if !(rules.is_spurious_dragon && account.is_empty()) => {
                    writer.update_account(address, original, &account)?;
                    self.committed.insert(address, account);
                }
                _ => {
                    writer.delete_account(address, original)?;
                    self.committed.remove(&address);
                    deleted.push(address);
                }
            }
        }

        for ((address, key), value) in changes.storage {
            if deleted.contains(&address) {
                continue;
            }
            let original = self
                .committed_storage
                .get(&(address, key))
                .copied()
                .unwrap_or_default();
            if original == value {
                continue;
            }
            writer.write_storage(address, key, original, value)?;
            if value.is_zero() {
                self.committed_storage.remove(&(address, key));
            } else {
                self.committed_storage.insert((address, key), value);
            }
        }

        if !deleted.is_empty() {
            self.committed_storage
                .retain(|(address, _), _| !deleted.contains(address));
        }
        Ok(())
    }
}

// ── MemoryWriter: plain state plus per-block change sets ──

/// A single pre-image recorded for historical queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeSetEntry {
    Account { address: Address, original: Option<Account> },
    Storage { address: Address, key: U256, original: U256 },
}

/// In-memory [`StateWriter`] keeping the latest plain state and the change
/// sets of every flushed block.
#[derive(Debug, Clone, Default)]
pub struct MemoryWriter {
    block_number: u64,
    accounts: BTreeMap<Address, Account>,
    storage: BTreeMap<(Address, U256), U256>,
    pending: Vec<ChangeSetEntry>,
    change_sets: BTreeMap<u64, Vec<ChangeSetEntry>>,
}

impl MemoryWriter {
    /// A writer collecting changes for `block_number`.
    pub fn new(block_number: u64) -> Self {
        Self { block_number, ..Default::default() }
    }

    /// Move on to the next block, keeping plain state and history.
    pub fn set_block_number(&mut self, block_number: u64) {
        self.block_number = block_number;
    }

    pub fn account(&self, address: &Address) -> Option<&Account> {
        self.accounts.get(address)
    }

    pub fn storage(&self, address: &Address, key: &U256) -> U256 {
        self.storage.get(&(*address, *key)).copied().unwrap_or_default()
    }

    /// Change set flushed for `block_number`, if any.
    pub fn change_set(&self, block_number: u64) -> Option<&[ChangeSetEntry]> {
        self.change_sets.get(&block_number).map(Vec::as_slice)
    }

    /// Entries written but not yet flushed.
    pub fn pending(&self) -> &[ChangeSetEntry] {
        &self.pending
    }
}

impl StateWriter for MemoryWriter {
    fn update_account(
        &mut self,
        address: Address,
        original: Option<&Account>,
        account: &Account,
    ) -> ExecResult<()> {
        self.pending.push(ChangeSetEntry::Account { address, original: original.cloned() });
        self.accounts.insert(address, account.clone());
        Ok(())
    }

    fn delete_account(&mut self, address: Address, original: Option<&Account>) -> ExecResult<()> {
        self.pending.push(ChangeSetEntry::Account { address, original: original.cloned() });
        self.accounts.remove(&address);
        self.storage.retain(|(owner, _), _| *owner != address);
        Ok(())
    }

    fn write_storage(
        &mut self,
        address: Address,
        key: U256,
        original: U256,
        value: U256,
    ) -> ExecResult<()> {
        self.pending.push(ChangeSetEntry::Storage { address, key, original });
        if value.is_zero() {
            self.storage.remove(&(address, key));
        } else {
            self.storage.insert((address, key), value);
        }
        Ok(())
    }

    fn write_change_sets(&mut self) -> ExecResult<()> {
        let entries = std::mem::take(&mut self.pending);
        self.change_sets.entry(self.block_number).or_default().extend(entries);
        Ok(())
    }
}
