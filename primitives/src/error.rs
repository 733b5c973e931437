//! Error types for Basalt block execution.
//!
//! Every fatal condition unwinds out of block processing as an [`ExecError`].
//! Nested causes are boxed so the enum stays small on the happy path.

use alloy_primitives::{Address, Bloom, B256};
use core::fmt;
use thiserror::Error;

/// The two metered budgets of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Gas,
    DataGas,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gas => write!(f, "gas"),
            Self::DataGas => write!(f, "data gas"),
        }
    }
}

/// A disagreement between a value derived by execution and the header's claim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Mismatch {
    #[error("mismatched receipt headers ({computed} != {expected})")]
    ReceiptsRoot { computed: B256, expected: B256 },

    #[error("gas used by execution: {computed}, in header: {expected}")]
    GasUsed { computed: u64, expected: u64 },

    #[error("data gas used by execution: {computed}, in header: {expected}")]
    DataGasUsed { computed: u64, expected: u64 },

    #[error("bloom computed by execution: {computed}, in header: {expected}")]
    LogsBloom { computed: Box<Bloom>, expected: Box<Bloom> },
}

/// Errors produced while executing, validating or finalizing a block.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("insufficient {resource}: requested {requested}, available {available}")]
    InsufficientResource {
        resource: Resource,
        requested: u64,
        available: u64,
    },

    #[error("{0} pool overflow")]
    ResourceOverflow(Resource),

    #[error("could not obtain tracer for tx {index}: {reason}")]
    TracerAcquisitionFailed { index: usize, reason: String },

    #[error("could not apply tx {index} from block {block_number} [{tx_hash}]: {source}")]
    TransactionExecutionFailed {
        index: usize,
        block_number: u64,
        tx_hash: B256,
        #[source]
        source: Box<ExecError>,
    },

    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("block {block_number}: {mismatch}")]
    StateMismatch {
        block_number: u64,
        #[source]
        mismatch: Mismatch,
    },

    #[error("system call to {contract} failed: {reason}")]
    SystemCallFailed { contract: Address, reason: String },

    #[error("consensus: {0}")]
    Consensus(String),

    #[error("finalizing block {block_number} failed: {source}")]
    FinalizationFailed {
        block_number: u64,
        #[source]
        source: Box<ExecError>,
    },

    #[error("committing block {block_number} failed: {source}")]
    CommitFailed {
        block_number: u64,
        #[source]
        source: Box<ExecError>,
    },

    #[error("writing changesets for block {block_number} failed: {source}")]
    ChangeSetFlushFailed {
        block_number: u64,
        #[source]
        source: Box<ExecError>,
    },

    #[error("storage: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ExecError {
    /// Returns the innermost error, unwrapping transaction and finalization wrappers.
    pub fn root_cause(&self) -> &ExecError {
        match self {
            Self::TransactionExecutionFailed { source, .. }
            | Self::FinalizationFailed { source, .. }
            | Self::CommitFailed { source, .. }
            | Self::ChangeSetFlushFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns the header mismatch carried by this error, if any.
    pub fn mismatch(&self) -> Option<&Mismatch> {
        match self {
            Self::StateMismatch { mismatch, .. } => Some(mismatch),
            _ => None,
        }
    }
}

/// Convenience alias for results carrying an [`ExecError`].
pub type ExecResult<T> = Result<T, ExecError>;
