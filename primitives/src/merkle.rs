//! Block commitments derived from execution results.
//!
//! Receipt and transaction roots are ordered Merkle-Patricia trie roots over
//! the EIP-2718 encodings, keyed by RLP-encoded index. An empty list yields
//! [`EMPTY_ROOT_HASH`].

use crate::block::{rlp_list_header, Transaction};
use crate::execution::{accrue_logs, encode_logs, IndexedLog, Receipt};
use crate::types::{Bloom, B256};
use alloy_consensus::proofs::{
    calculate_ommers_root, calculate_withdrawals_root, ordered_trie_root_with_encoder,
};
use alloy_consensus::Header;
use alloy_eips::eip4895::Withdrawal;
use alloy_primitives::keccak256;
use alloy_rlp::Encodable;

pub use alloy_consensus::EMPTY_ROOT_HASH;

/// Order-preserving root over the receipts of a block.
pub fn receipts_root(receipts: &[Receipt]) -> B256 {
    if receipts.is_empty() {
        return EMPTY_ROOT_HASH;
    }
    ordered_trie_root_with_encoder(receipts, |receipt, buf| receipt.encode_2718(buf))
}

/// Order-preserving root over the included transactions of a block.
pub fn transactions_root(transactions: &[Transaction]) -> B256 {
    if transactions.is_empty() {
        return EMPTY_ROOT_HASH;
    }
    ordered_trie_root_with_encoder(transactions, |tx, buf| tx.encode_2718(buf))
}

/// Root over the withdrawals list.
pub fn withdrawals_root(withdrawals: &[Withdrawal]) -> B256 {
    calculate_withdrawals_root(withdrawals)
}

/// Hash of the RLP-encoded uncle headers.
pub fn ommers_hash(ommers: &[Header]) -> B256 {
    calculate_ommers_root(ommers)
}

/// Aggregate bloom over every receipt's logs.
pub fn logs_bloom<'a>(receipts: impl IntoIterator<Item = &'a Receipt>) -> Bloom {
    let mut bloom = Bloom::ZERO;
    for receipt in receipts {
        accrue_logs(&mut bloom, &receipt.logs);
    }
    bloom
}

/// keccak256 of the RLP list of all logs emitted in the block.
pub fn logs_hash(logs: &[IndexedLog]) -> B256 {
    let payload_length: usize = logs.iter().map(IndexedLog::rlp_length).sum();
    let mut out = Vec::with_capacity(rlp_list_header(payload_length).length() + payload_length);
    encode_logs(logs, &mut out);
    keccak256(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::TxType;
    use crate::types::{Bytes, Log, LogData, U256};
    use alloy_primitives::{address, b256};

    #[test]
    fn test_empty_roots() {
        assert_eq!(receipts_root(&[]), EMPTY_ROOT_HASH);
        assert_eq!(transactions_root(&[]), EMPTY_ROOT_HASH);
        assert_eq!(
            EMPTY_ROOT_HASH,
            b256!("56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421")
        );
    }

    #[test]
    fn test_empty_logs_hash() {
        // keccak256(rlp([]))
        assert_eq!(
            logs_hash(&[]),
            b256!("1dcc4de8dec75d7aab85b567b6ccd41ad312451b948a7413f0a142fd40d49347")
        );
    }

    #[test]
    fn test_single_transfer_receipt_root() {
        let receipt = Receipt::new(TxType::Legacy, true, 21_000, Vec::new());
        assert_eq!(
            receipts_root(&[receipt]),
            b256!("056b23fbba480696b65fe5a59b8f2148a1299103c4f57df839233af2cf4ca2d2")
        );
    }

    #[test]
    fn test_receipts_root_is_order_sensitive() {
        let a = Receipt::new(TxType::Legacy, true, 21_000, Vec::new());
        let b = Receipt::new(TxType::Legacy, true, 42_000, Vec::new());
        assert_ne!(
            receipts_root(&[a.clone(), b.clone()]),
            receipts_root(&[b, a])
        );
    }

    #[test]
    fn test_transactions_root_changes_with_content() {
        let sender = address!("00000000000000000000000000000000000a11ce");
        let to = address!("0000000000000000000000000000000000000b0b");
        let one = Transaction::legacy(sender, 0, to, U256::from(1), 21_000, 1);
        let two = Transaction::legacy(sender, 0, to, U256::from(2), 21_000, 1);
        assert_ne!(transactions_root(&[one]), transactions_root(&[two]));
    }

    #[test]
    fn test_logs_bloom_aggregates_receipts() {
        let topic = B256::repeat_byte(7);
        let log = IndexedLog {
            inner: Log {
                address: address!("00000000000000000000000000000000000000aa"),
                data: LogData::new_unchecked(vec![topic], Bytes::new()),
            },
            ..Default::default()
        };
        let empty = Receipt::new(TxType::Legacy, true, 21_000, Vec::new());
        let with_log = Receipt::new(TxType::Legacy, true, 50_000, vec![log]);

        assert_eq!(logs_bloom([&empty]), Bloom::ZERO);
        let bloom = logs_bloom([&empty, &with_log]);
        assert_eq!(bloom, with_log.logs_bloom);
    }
}
