//! Read access to ancestor headers.

use alloy_consensus::Header;
use alloy_primitives::{B256, U256};
use std::collections::BTreeMap;

/// Random access to canonical headers and their total difficulty.
pub trait ChainHeaderReader {
    fn header_by_number(&self, number: u64) -> Option<Header>;
    fn header_by_hash(&self, hash: B256) -> Option<Header>;
    fn total_difficulty(&self, hash: B256, number: u64) -> Option<U256>;
    fn current_finalized_header(&self) -> Option<Header>;
}

/// In-memory canonical chain.
#[derive(Debug, Clone, Default)]
pub struct MemoryChain {
    by_number: BTreeMap<u64, B256>,
    headers: BTreeMap<B256, Header>,
    total_difficulty: BTreeMap<B256, U256>,
    finalized: Option<B256>,
}

impl MemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header. Its total difficulty extends the parent's, or starts
    /// at its own difficulty when the parent is unknown.
    pub fn insert(&mut self, header: Header) -> B256 {
        let hash = header.hash_slow();
        let parent_td = self
            .total_difficulty
            .get(&header.parent_hash)
            .copied()
            .unwrap_or_default();
        self.total_difficulty
            .insert(hash, parent_td.saturating_add(header.difficulty));
        self.by_number.insert(header.number, hash);
        self.headers.insert(hash, header);
        hash
    }

    /// Mark a known header as finalized.
    pub fn set_finalized(&mut self, hash: B256) {
        if self.headers.contains_key(&hash) {
            self.finalized = Some(hash);
        }
    }
}

impl ChainHeaderReader for MemoryChain {
    fn header_by_number(&self, number: u64) -> Option<Header> {
        self.by_number
            .get(&number)
            .and_then(|hash| self.headers.get(hash))
            .cloned()
    }

    fn header_by_hash(&self, hash: B256) -> Option<Header> {
        self.headers.get(&hash).cloned()
    }

    fn total_difficulty(&self, hash: B256, number: u64) -> Option<U256> {
        self.headers
            .get(&hash)
            .filter(|header| header.number == number)
            .and_then(|_| self.total_difficulty.get(&hash).copied())
    }

    fn current_finalized_header(&self) -> Option<Header> {
        self.finalized.and_then(|hash| self.headers.get(&hash)).cloned()
    }
}
