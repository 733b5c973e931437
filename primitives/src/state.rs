//! Journaled state overlay.
//!
//! The overlay buffers account, storage and log writes made during block
//! execution on top of committed state. Every write is journaled so the
//! overlay can roll back to any earlier snapshot; this backs both failed
//! transactions and constant system calls.
//!
//! Reads reflect committed state plus buffered writes. Iteration goes
//! through `BTreeMap` so commits are deterministic.

use crate::execution::IndexedLog;
use crate::types::{Bytes, B256, U256};
use alloy_primitives::{keccak256, Address};
use std::collections::BTreeMap;

/// Account data held by the state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Account {
    pub nonce: u64,
    pub balance: U256,
    pub code: Bytes,
}

impl Account {
    /// An externally owned account with the given balance.
    pub fn with_balance(balance: U256) -> Self {
        Self { balance, ..Default::default() }
    }

    /// Empty in the EIP-161 sense: no nonce, no balance, no code.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0 && self.balance.is_zero() && self.code.is_empty()
    }

    pub fn code_hash(&self) -> B256 {
        keccak256(&self.code)
    }
}

/// Result of looking up an account in the overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OverlayResult<'a> {
    /// Written in this overlay.
    Found(&'a Account),
    /// Explicitly deleted in this overlay.
    Deleted,
    /// Not touched; caller must check committed state.
    NotInOverlay,
}

#[derive(Debug, Clone)]
enum JournalEntry {
    Account {
        address: Address,
        previous: Option<Option<Account>>,
    },
    Storage {
        address: Address,
        key: U256,
        previous: Option<U256>,
    },
    Log,
}

/// Account and storage changes drained from the overlay at commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverlayChanges {
    /// `None` marks a deleted account.
    pub accounts: BTreeMap<Address, Option<Account>>,
    pub storage: BTreeMap<(Address, U256), U256>,
}

/// Journaled write buffer overlaying committed state.
#[derive(Debug, Clone, Default)]
pub struct StateOverlay {
    accounts: BTreeMap<Address, Option<Account>>,
    storage: BTreeMap<(Address, U256), U256>,
    logs: Vec<IndexedLog>,
    journal: Vec<JournalEntry>,
}

impl StateOverlay {
    /// Create a new empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an account.
    pub fn account(&self, address: &Address) -> OverlayResult<'_> {
        match self.accounts.get(address) {
            Some(Some(account)) => OverlayResult::Found(account),
            Some(None) => OverlayResult::Deleted,
            None => OverlayResult::NotInOverlay,
        }
    }

    /// Buffer a full account write.
    pub fn set_account(&mut self, address: Address, account: Account) {
        let previous = self.accounts.insert(address, Some(account));
        self.journal.push(JournalEntry::Account { address, previous });
    }

    /// Buffer an account deletion.
    pub fn delete_account(&mut self, address: Address) {
        let previous = self.accounts.insert(address, None);
        self.journal.push(JournalEntry::Account { address, previous });
    }

    /// Look up a storage slot written in this overlay.
    pub fn storage(&self, address: &Address, key: &U256) -> Option<U256> {
        self.storage.get(&(*address, *key)).copied()
    }

    /// Buffer a storage write.
    pub fn set_storage(&mut self, address: Address, key: U256, value: U256) {
        let previous = self.storage.insert((address, key), value);
        self.journal.push(JournalEntry::Storage { address, key, previous });
    }

    /// Append a log. `log_index` is assigned from the block-wide position.
    pub fn push_log(&mut self, mut log: IndexedLog) {
        log.log_index = self.logs.len() as u64;
        self.logs.push(log);
        self.journal.push(JournalEntry::Log);
    }

    /// All logs emitted in the block so far.
    pub fn logs(&self) -> &[IndexedLog] {
        &self.logs
    }

    /// Drop the logs of a finished block, along with their journal entries.
    pub fn clear_logs(&mut self) {
        self.logs.clear();
        self.journal.retain(|entry| !matches!(entry, JournalEntry::Log));
    }

    /// Returns an identifier to pass to [`revert_to`](Self::revert_to).
    pub fn snapshot(&self) -> usize {
        self.journal.len()
    }

    /// Undo every write made after `snapshot` was taken.
    pub fn revert_to(&mut self, snapshot: usize) {
        while self.journal.len() > snapshot {
            let Some(entry) = self.journal.pop() else { break };
            match entry {
                JournalEntry::Account { address, previous: Some(prev) } => {
                    self.accounts.insert(address, prev);
                }
                JournalEntry::Account { address, previous: None } => {
                    self.accounts.remove(&address);
                }
                JournalEntry::Storage { address, key, previous: Some(prev) } => {
                    self.storage.insert((address, key), prev);
                }
                JournalEntry::Storage { address, key, previous: None } => {
                    self.storage.remove(&(address, key));
                }
                JournalEntry::Log => {
                    self.logs.pop();
                }
            }
        }
    }

    /// Forget the journal. Earlier snapshots become invalid.
    pub fn discard_journal(&mut self) {
        self.journal.clear();
    }

    /// Drain buffered account and storage writes. Logs stay readable.
    pub fn take_changes(&mut self) -> OverlayChanges {
        self.journal.clear();
        OverlayChanges {
            accounts: std::mem::take(&mut self.accounts),
            storage: std::mem::take(&mut self.storage),
        }
    }

    /// Returns true if no account or storage writes are buffered.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.storage.is_empty()
    }
}
