//! `basalt-primitives` — foundational types for Basalt block execution.
//!
//! This crate provides the block and transaction types, the block-level
//! resource pool, receipts and the execution report, root derivation,
//! the journaled state overlay, chain configuration and the error type
//! shared by the execution engine.

pub mod types;
pub mod error;
pub mod gas;
pub mod block;
pub mod execution;
pub mod merkle;
pub mod state;
pub mod chain;

// Re-export commonly used types at the crate root for convenience.
pub use types::{
    BlockNumber, BEACON_ROOTS_ADDRESS, MAX_DATA_GAS_PER_BLOCK, SYSTEM_ADDRESS,
    SYSTEM_CALL_GAS_LIMIT,
};
pub use error::{ExecError, ExecResult, Mismatch, Resource};
pub use gas::{GasPool, GasUsage};
pub use block::{Block, Transaction, TxType};
pub use execution::{ExecutionReport, IndexedLog, Receipt, RejectedTx};
pub use state::{Account, OverlayChanges, OverlayResult, StateOverlay};
pub use chain::{ChainConfig, ConsensusKind, DaoForkConfig, Rules, StateSyncConfig};
pub use merkle::EMPTY_ROOT_HASH;
pub use alloy_consensus::Header;
pub use alloy_eips::eip4895::Withdrawal;
