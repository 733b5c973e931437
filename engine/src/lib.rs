//! `basalt-engine` — deterministic block execution and validation.
//!
//! This crate runs the state transition of one block:
//! `f(parent_state, block) → (receipts, roots, gas_used, rejected)`
//!
//! It applies transactions in order against a shared gas pool, checks the
//! derived receipts root, gas, data gas and bloom against the header, and
//! hands the block to a consensus engine for finalization.
//!
//! ## Architecture
//!
//! - [`executor::BlockExecutor`] — top-level block execution entry point
//! - [`transaction::TransactionExecutor`] — applies one transaction; [`transaction::TransferExecutor`] is the in-tree implementation
//! - [`system_call::SystemCaller`] — engine-originated contract calls, handed to consensus as [`system_call::SystemCall`]
//! - [`consensus`] — proof-of-work, proof-of-stake and proof-of-authority engines
//! - [`validation`] — post-execution header checks
//! - [`finalize`] — finalization, commit and the state-sync receipt
//! - [`state::StateView`] / [`state::StateWriter`] — state access, with in-memory implementations
//! - [`observer`] — block observer and transaction tracer hooks

pub mod chain;
pub mod config;
pub mod consensus;
pub mod contracts;
pub mod executor;
pub mod finalize;
pub mod forks;
pub mod observer;
pub mod state;
pub mod system_call;
pub mod transaction;
pub mod validation;

// Re-export key types for convenience
pub use chain::{ChainHeaderReader, MemoryChain};
pub use config::ExecutionConfig;
pub use consensus::{
    ConsensusEngine, MemoryStateSync, ProofOfAuthority, ProofOfStake, ProofOfWork, StateSyncSource,
};
pub use executor::BlockExecutor;
pub use observer::{BlockObserver, ExecutionHooks, NoopObserver, TracerProvider, TxTracer};
pub use state::{MemoryState, MemoryWriter, StateView, StateWriter};
pub use system_call::{SystemCall, SystemCaller};
pub use transaction::{TransactionExecutor, TransferExecutor, TxEnv, TxOutcome};
