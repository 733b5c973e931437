//! Execution mode switches.

use basalt_primitives::{ExecError, ExecResult};
use serde::{Deserialize, Serialize};

/// How a block run behaves.
///
/// The default is canonical validation: every hook runs, every header check
/// is enforced and any transaction failure aborts the block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExecutionConfig {
    /// Skip consensus initialization and finalization (trace replays).
    pub read_only: bool,
    /// Tolerate failing transactions and skip most header checks.
    pub stateless: bool,
    /// Do not build receipts.
    pub no_receipts: bool,
    /// Attach a tracer to every transaction.
    pub trace: bool,
}

impl ExecutionConfig {
    /// Parse from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> ExecResult<Self> {
        serde_json::from_str(json).map_err(|err| ExecError::Config(err.to_string()))
    }

    /// Tolerant tracing replay.
    pub fn tracing() -> Self {
        Self { stateless: true, trace: true, ..Default::default() }
    }

    pub fn stateless(mut self, stateless: bool) -> Self {
        self.stateless = stateless;
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn no_receipts(mut self, no_receipts: bool) -> Self {
        self.no_receipts = no_receipts;
        self
    }

    pub fn trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }
}
