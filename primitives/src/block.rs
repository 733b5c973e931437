//! Block and transaction types.
//!
//! Headers are `alloy_consensus::Header`; the engine only reads them. A
//! [`Transaction`] arrives with its sender already recovered, so it carries
//! the sender in place of a signature. System transactions are synthesized
//! by the engine and never enter a block's transaction list.

use crate::types::{Bytes, TxKind, B256, DATA_GAS_PER_BLOB, U256};
use alloy_consensus::Header;
use alloy_eips::eip4895::Withdrawal;
use alloy_primitives::{keccak256, Address};
use alloy_rlp::{BufMut, Encodable};
use serde::{Deserialize, Serialize};

/// EIP-2718 transaction type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum TxType {
    #[default]
    Legacy = 0,
    AccessList = 1,
    DynamicFee = 2,
    Blob = 3,
}

impl TxType {
    /// Returns the envelope type byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl From<TxType> for u8 {
    fn from(ty: TxType) -> Self {
        ty.as_u8()
    }
}

impl TryFrom<u8> for TxType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Legacy),
            1 => Ok(Self::AccessList),
            2 => Ok(Self::DynamicFee),
            3 => Ok(Self::Blob),
            other => Err(format!("unsupported transaction type {other}")),
        }
    }
}

/// A transaction with a recovered sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub tx_type: TxType,
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub sender: Address,
    pub to: TxKind,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    /// Gas price for legacy transactions, max fee per gas otherwise.
    pub gas_price: u128,
    pub max_priority_fee_per_gas: Option<u128>,
    pub max_fee_per_blob_gas: Option<u128>,
    pub blob_versioned_hashes: Vec<B256>,
    /// Set on engine-synthesized system calls.
    pub system: bool,
}

impl Transaction {
    /// A legacy value transfer.
    pub fn legacy(
        sender: Address,
        nonce: u64,
        to: Address,
        value: U256,
        gas_limit: u64,
        gas_price: u128,
    ) -> Self {
        Self {
            tx_type: TxType::Legacy,
            chain_id: None,
            nonce,
            sender,
            to: TxKind::Call(to),
            value,
            input: Bytes::new(),
            gas_limit,
            gas_price,
            max_priority_fee_per_gas: None,
            max_fee_per_blob_gas: None,
            blob_versioned_hashes: Vec::new(),
            system: false,
        }
    }

    /// An EIP-1559 call.
    #[allow(clippy::too_many_arguments)]
    pub fn dynamic_fee(
        chain_id: u64,
        sender: Address,
        nonce: u64,
        to: Address,
        value: U256,
        gas_limit: u64,
        max_fee_per_gas: u128,
        max_priority_fee_per_gas: u128,
    ) -> Self {
        Self {
            tx_type: TxType::DynamicFee,
            chain_id: Some(chain_id),
            max_priority_fee_per_gas: Some(max_priority_fee_per_gas),
            ..Self::legacy(sender, nonce, to, value, gas_limit, max_fee_per_gas)
        }
    }

    /// A zero-value system call to `to`.
    pub fn system_call(sender: Address, to: Address, nonce: u64, gas_limit: u64, input: Bytes) -> Self {
        Self {
            input,
            system: true,
            ..Self::legacy(sender, nonce, to, U256::ZERO, gas_limit, 0)
        }
    }

    /// A system creation that installs code at `contract` itself.
    pub fn system_create(contract: Address, gas_limit: u64, input: Bytes) -> Self {
        Self {
            to: TxKind::Create,
            ..Self::system_call(contract, contract, 0, gas_limit, input)
        }
    }

    /// Replace the calldata.
    pub fn with_input(mut self, input: Bytes) -> Self {
        self.input = input;
        self
    }

    /// Turn this into a blob-carrying transaction.
    pub fn with_blobs(mut self, hashes: Vec<B256>, max_fee_per_blob_gas: u128) -> Self {
        self.tx_type = TxType::Blob;
        self.blob_versioned_hashes = hashes;
        self.max_fee_per_blob_gas = Some(max_fee_per_blob_gas);
        self
    }

    pub fn is_create(&self) -> bool {
        self.to.is_create()
    }

    /// Data gas consumed by the attached blobs.
    pub fn data_gas(&self) -> u64 {
        self.blob_versioned_hashes.len() as u64 * DATA_GAS_PER_BLOB
    }

    /// Price actually paid per gas under the given base fee.
    pub fn effective_gas_price(&self, base_fee: Option<u64>) -> u128 {
        match (self.max_priority_fee_per_gas, base_fee) {
            (Some(tip), Some(base_fee)) => {
                self.gas_price.min((base_fee as u128).saturating_add(tip))
            }
            _ => self.gas_price,
        }
    }

    /// Canonical hash: keccak256 of the EIP-2718 encoding.
    pub fn hash(&self) -> B256 {
        keccak256(self.encoded_2718())
    }

    /// Returns the EIP-2718 encoding.
    pub fn encoded_2718(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encode_2718_len());
        self.encode_2718(&mut out);
        out
    }

    /// Length of the EIP-2718 encoding.
    pub fn encode_2718_len(&self) -> usize {
        let payload_length = self.fields_len();
        let typed = usize::from(self.tx_type != TxType::Legacy);
        typed + rlp_list_header(payload_length).length() + payload_length
    }

    /// Write the EIP-2718 encoding: type byte for typed transactions,
    /// followed by the RLP field list.
    pub fn encode_2718(&self, out: &mut dyn BufMut) {
        if self.tx_type != TxType::Legacy {
            out.put_u8(self.tx_type.as_u8());
        }
        rlp_list_header(self.fields_len()).encode(out);
        if self.tx_type != TxType::Legacy {
            self.chain_id.unwrap_or_default().encode(out);
        }
        self.nonce.encode(out);
        if let Some(tip) = self.max_priority_fee_per_gas {
            tip.encode(out);
        }
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.input.encode(out);
        if let Some(blob_fee) = self.max_fee_per_blob_gas {
            blob_fee.encode(out);
            self.blob_versioned_hashes.encode(out);
        }
        self.sender.encode(out);
    }

    fn fields_len(&self) -> usize {
        let mut len = 0;
        if self.tx_type != TxType::Legacy {
            len += self.chain_id.unwrap_or_default().length();
        }
        len += self.nonce.length();
        if let Some(tip) = self.max_priority_fee_per_gas {
            len += tip.length();
        }
        len += self.gas_price.length();
        len += self.gas_limit.length();
        len += self.to.length();
        len += self.value.length();
        len += self.input.length();
        if let Some(blob_fee) = self.max_fee_per_blob_gas {
            len += blob_fee.length();
            len += self.blob_versioned_hashes.length();
        }
        len + self.sender.length()
    }
}

pub(crate) fn rlp_list_header(payload_length: usize) -> alloy_rlp::Header {
    alloy_rlp::Header { list: true, payload_length }
}

/// Full block: header, ordered transactions, uncles and optional withdrawals.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Block {
    pub header: Header,
    pub transactions: Vec<Transaction>,
    pub ommers: Vec<Header>,
    pub withdrawals: Option<Vec<Withdrawal>>,
}

impl Block {
    /// A block with the given header and no body.
    pub fn new(header: Header) -> Self {
        Self { header, ..Default::default() }
    }

    pub fn with_transactions(mut self, transactions: Vec<Transaction>) -> Self {
        self.transactions = transactions;
        self
    }

    pub fn with_withdrawals(mut self, withdrawals: Vec<Withdrawal>) -> Self {
        self.withdrawals = Some(withdrawals);
        self
    }

    pub fn with_ommers(mut self, ommers: Vec<Header>) -> Self {
        self.ommers = ommers;
        self
    }

    /// Hash of the header.
    pub fn hash(&self) -> B256 {
        self.header.hash_slow()
    }

    pub fn number(&self) -> u64 {
        self.header.number
    }

    /// Returns the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Returns true if this block has no transactions.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}
