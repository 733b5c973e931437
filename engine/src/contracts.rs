//! Native system contracts.
//!
//! The engine has no bytecode interpreter of its own, so the system
//! contracts the block pipeline depends on are implemented natively and
//! dispatched by address from [`TransferExecutor`](crate::transaction::TransferExecutor).

use crate::state::StateView;
use alloy_consensus::Header;
use alloy_primitives::{Address, Bytes, Log, B256, U256};
use alloy_rlp::{Decodable, RlpDecodable, RlpEncodable};
use alloy_sol_types::{sol, SolCall, SolEvent};
use basalt_primitives::SYSTEM_ADDRESS;
use thiserror::Error;

sol! {
    function commitState(uint256 syncTime, bytes recordBytes) external returns (bool success);
    function lastStateId() external view returns (uint256);
    event StateCommitted(uint256 indexed stateId, bool success);
}

/// A reverted native call. State changes made by the call are discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("execution reverted: {0}")]
pub struct Revert(pub String);

/// Context of one native call.
#[derive(Debug, Clone, Copy)]
pub struct NativeCall<'a> {
    pub caller: Address,
    pub address: Address,
    pub input: &'a Bytes,
    pub header: &'a Header,
}

/// Successful native call result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeOutput {
    pub output: Bytes,
    pub gas_used: u64,
}

/// A contract implemented in the engine.
pub trait NativeContract {
    fn call(&self, state: &mut dyn StateView, call: &NativeCall<'_>) -> Result<NativeOutput, Revert>;
}

// ── Beacon roots (EIP-4788) ──

/// Length of the beacon roots ring buffer.
pub const HISTORY_BUFFER_LENGTH: u64 = 8191;

const BEACON_ROOT_SET_GAS: u64 = 44_200;
const BEACON_ROOT_GET_GAS: u64 = 4_200;

/// Stores parent beacon block roots keyed by timestamp.
///
/// Calls from the system address record `header.timestamp -> root`; any
/// other caller passes a 32-byte timestamp and reads the root back.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeaconRootsContract;

impl NativeContract for BeaconRootsContract {
    fn call(&self, state: &mut dyn StateView, call: &NativeCall<'_>) -> Result<NativeOutput, Revert> {
        if call.input.len() != 32 {
            return Err(Revert("input must be 32 bytes".into()));
        }
        let word = U256::from_be_slice(call.input);

        if call.caller == SYSTEM_ADDRESS {
            let timestamp = U256::from(call.header.timestamp);
            let slot = timestamp % U256::from(HISTORY_BUFFER_LENGTH);
            state.set_storage(call.address, slot, timestamp);
            state.set_storage(call.address, slot + U256::from(HISTORY_BUFFER_LENGTH), word);
            return Ok(NativeOutput { output: Bytes::new(), gas_used: BEACON_ROOT_SET_GAS });
        }

        if word.is_zero() {
            return Err(Revert("zero timestamp".into()));
        }
        let slot = word % U256::from(HISTORY_BUFFER_LENGTH);
        if state.storage(call.address, slot) != word {
            return Err(Revert("timestamp not in buffer".into()));
        }
        let root = state.storage(call.address, slot + U256::from(HISTORY_BUFFER_LENGTH));
        Ok(NativeOutput {
            output: Bytes::copy_from_slice(&root.to_be_bytes::<32>()),
            gas_used: BEACON_ROOT_GET_GAS,
        })
    }
}

// ── State receiver ──

/// An off-chain event delivered to a proof-of-authority chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, RlpEncodable, RlpDecodable)]
pub struct StateSyncEvent {
    pub id: u64,
    pub contract: Address,
    pub data: Bytes,
    pub tx_hash: B256,
    pub log_index: u64,
    pub time: u64,
}

impl StateSyncEvent {
    /// Calldata committing this event to the state receiver.
    pub fn commit_calldata(&self) -> Bytes {
        let record = alloy_rlp::encode(self);
        let call = commitStateCall {
            syncTime: U256::from(self.time),
            recordBytes: Bytes::from(record),
        };
        Bytes::from(call.abi_encode())
    }
}

const STATE_COMMIT_GAS: u64 = 50_000;

/// Slot holding the id of the last committed event.
pub const LAST_STATE_ID_SLOT: U256 = U256::ZERO;

const STATE_QUERY_GAS: u64 = 2_100;

/// Accepts `commitState` from the system address, enforces consecutive
/// event ids and emits `StateCommitted` for each event. `lastStateId` is
/// open to every caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateReceiverContract;

impl NativeContract for StateReceiverContract {
    fn call(&self, state: &mut dyn StateView, call: &NativeCall<'_>) -> Result<NativeOutput, Revert> {
        if call.input.starts_with(&lastStateIdCall::SELECTOR) {
            let last = state.storage(call.address, LAST_STATE_ID_SLOT);
            return Ok(NativeOutput {
                output: Bytes::copy_from_slice(&last.to_be_bytes::<32>()),
                gas_used: STATE_QUERY_GAS,
            });
        }
        if call.caller != SYSTEM_ADDRESS {
            return Err(Revert("caller is not the system address".into()));
        }
        let commit = commitStateCall::abi_decode(call.input)
            .map_err(|err| Revert(format!("bad commitState calldata: {err}")))?;
        let event = StateSyncEvent::decode(&mut &commit.recordBytes[..])
            .map_err(|err| Revert(format!("bad state record: {err}")))?;

        let last = state.storage(call.address, LAST_STATE_ID_SLOT);
        let id = U256::from(event.id);
        if id != last + U256::from(1) {
            return Err(Revert(format!("state id {id} does not follow {last}")));
        }
        state.set_storage(call.address, LAST_STATE_ID_SLOT, id);

        let committed = StateCommitted { stateId: id, success: true };
        state.add_log(Log { address: call.address, data: committed.encode_log_data() });

        Ok(NativeOutput {
            output: Bytes::copy_from_slice(&U256::from(1).to_be_bytes::<32>()),
            gas_used: STATE_COMMIT_GAS,
        })
    }
}
