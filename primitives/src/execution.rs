//! Execution outputs: receipts, block logs, rejected transactions and the
//! [`ExecutionReport`] returned by a successful block run.

use crate::block::{rlp_list_header, TxType};
use crate::error::{ExecError, ExecResult};
use crate::types::{Bloom, Log, B256, U256};
use alloy_primitives::{Address, BloomInput};
use alloy_rlp::{BufMut, Encodable};
use serde::{Deserialize, Serialize};

/// A log emitted during block execution, tagged with its position.
///
/// `log_index` is block-wide; the transaction fields come from the context
/// the state view was bound to when the log was emitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedLog {
    #[serde(flatten)]
    pub inner: Log,
    #[serde(with = "alloy_serde::quantity")]
    pub log_index: u64,
    pub transaction_hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub transaction_index: u64,
    pub block_hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub block_number: u64,
}

impl IndexedLog {
    pub fn address(&self) -> Address {
        self.inner.address
    }

    pub fn topics(&self) -> &[B256] {
        self.inner.data.topics()
    }

    /// Length of the consensus encoding `[address, topics, data]`.
    pub fn rlp_length(&self) -> usize {
        let payload_length = self.rlp_payload_length();
        rlp_list_header(payload_length).length() + payload_length
    }

    /// Write the consensus encoding `[address, topics, data]`.
    pub fn rlp_encode(&self, out: &mut dyn BufMut) {
        rlp_list_header(self.rlp_payload_length()).encode(out);
        self.inner.address.encode(out);
        let topics = self.topics();
        rlp_list_header(topics_payload_length(topics)).encode(out);
        for topic in topics {
            topic.encode(out);
        }
        self.inner.data.data.encode(out);
    }

    fn rlp_payload_length(&self) -> usize {
        let topics_payload = topics_payload_length(self.topics());
        self.inner.address.length()
            + rlp_list_header(topics_payload).length()
            + topics_payload
            + self.inner.data.data.length()
    }
}

fn topics_payload_length(topics: &[B256]) -> usize {
    topics.iter().map(Encodable::length).sum()
}

/// Accrue address and topics of every log into `bloom`.
pub fn accrue_logs<'a>(bloom: &mut Bloom, logs: impl IntoIterator<Item = &'a IndexedLog>) {
    for log in logs {
        bloom.accrue(BloomInput::Raw(log.address().as_slice()));
        for topic in log.topics() {
            bloom.accrue(BloomInput::Raw(topic.as_slice()));
        }
    }
}

/// Length of the RLP list of the given logs.
pub fn logs_rlp_length(logs: &[IndexedLog]) -> usize {
    let payload_length: usize = logs.iter().map(IndexedLog::rlp_length).sum();
    rlp_list_header(payload_length).length() + payload_length
}

/// Write the RLP list of the given logs.
pub fn encode_logs(logs: &[IndexedLog], out: &mut dyn BufMut) {
    let payload_length: usize = logs.iter().map(IndexedLog::rlp_length).sum();
    rlp_list_header(payload_length).encode(out);
    for log in logs {
        log.rlp_encode(out);
    }
}

/// Outcome of one applied transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub status: bool,
    #[serde(with = "alloy_serde::quantity")]
    pub cumulative_gas_used: u64,
    pub logs_bloom: Bloom,
    pub logs: Vec<IndexedLog>,
    pub transaction_hash: B256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_address: Option<Address>,
    #[serde(with = "alloy_serde::quantity")]
    pub gas_used: u64,
    pub block_hash: B256,
    #[serde(with = "alloy_serde::quantity")]
    pub block_number: u64,
    #[serde(with = "alloy_serde::quantity")]
    pub transaction_index: u64,
}

impl Receipt {
    /// Build a receipt whose bloom is derived from `logs`.
    pub fn new(tx_type: TxType, status: bool, cumulative_gas_used: u64, logs: Vec<IndexedLog>) -> Self {
        let mut logs_bloom = Bloom::ZERO;
        accrue_logs(&mut logs_bloom, &logs);
        Self {
            tx_type,
            status,
            cumulative_gas_used,
            logs_bloom,
            logs,
            ..Default::default()
        }
    }

    /// Returns the EIP-2718 consensus encoding used for the receipt root.
    pub fn encoded_2718(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.encode_2718(&mut out);
        out
    }

    /// Write the consensus encoding `[status, cumulative_gas, bloom, logs]`,
    /// prefixed by the type byte for typed transactions.
    pub fn encode_2718(&self, out: &mut dyn BufMut) {
        if self.tx_type != TxType::Legacy {
            out.put_u8(self.tx_type.as_u8());
        }
        let payload_length = self.status.length()
            + self.cumulative_gas_used.length()
            + self.logs_bloom.length()
            + logs_rlp_length(&self.logs);
        rlp_list_header(payload_length).encode(out);
        self.status.encode(out);
        self.cumulative_gas_used.encode(out);
        self.logs_bloom.encode(out);
        encode_logs(&self.logs, out);
    }
}

/// A transaction that failed in tolerant mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedTx {
    pub index: usize,
    pub error: String,
}

/// The aggregate outcome of one block run.
///
/// `state_root` is a placeholder; callers fill it in after committing.
/// The state-sync receipt travels alongside but is never serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub state_root: B256,
    pub tx_root: B256,
    pub receipts_root: B256,
    pub logs_hash: B256,
    pub logs_bloom: Bloom,
    pub receipts: Vec<Receipt>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedTx>,
    #[serde(rename = "currentDifficulty")]
    pub difficulty: U256,
    #[serde(with = "alloy_serde::quantity")]
    pub gas_used: u64,
    #[serde(skip)]
    pub state_sync_receipt: Option<Receipt>,
}

impl ExecutionReport {
    /// Serialize to JSON.
    pub fn to_json(&self) -> ExecResult<String> {
        serde_json::to_string(self).map_err(|err| ExecError::Config(err.to_string()))
    }
}
