//! Core type re-exports and protocol constants for Basalt block execution.

use alloy_primitives::{address, Address};

pub use alloy_primitives::{Bloom, Bytes, Log, LogData, TxKind, B256, U256};

/// Block number (monotonically increasing).
pub type BlockNumber = u64;

/// Sender of system-originated calls (EIP-4788 `SYSTEM_ADDRESS`).
pub const SYSTEM_ADDRESS: Address = address!("fffffffffffffffffffffffffffffffffffffffe");

/// Fixed address of the beacon roots contract (EIP-4788).
pub const BEACON_ROOTS_ADDRESS: Address = address!("000f3df6d732807ef1319fb7b8bb8522d0beac02");

/// Gas ceiling granted to every system call.
pub const SYSTEM_CALL_GAS_LIMIT: u64 = 50_000_000;

/// Data gas charged per blob.
pub const DATA_GAS_PER_BLOB: u64 = 131_072;

/// Protocol cap on data gas per block (6 blobs).
pub const MAX_DATA_GAS_PER_BLOCK: u64 = 6 * DATA_GAS_PER_BLOB;

/// Intrinsic gas of a plain call.
pub const TX_GAS: u64 = 21_000;

/// Intrinsic gas of a contract creation.
pub const TX_GAS_CONTRACT_CREATION: u64 = 53_000;

/// Calldata cost per zero byte.
pub const TX_DATA_ZERO_GAS: u64 = 4;

/// Calldata cost per non-zero byte (EIP-2028).
pub const TX_DATA_NON_ZERO_GAS: u64 = 16;

/// One gwei in wei.
pub const GWEI_TO_WEI: u64 = 1_000_000_000;

/// Prefix of the key hashed into the derived state-sync transaction hash.
pub const STATE_SYNC_RECEIPT_PREFIX: &[u8] = b"matic-bor-receipt-";
