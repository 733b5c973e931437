//! Chain configuration and per-block protocol rules.
//!
//! [`ChainConfig`] is loaded from genesis-style camelCase JSON. Block-number
//! forks activate at `number >= block`, timestamp forks at `time >= time`.

use crate::error::{ExecError, ExecResult};
use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

/// Which consensus engine drives a chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConsensusKind {
    #[default]
    ProofOfWork,
    ProofOfStake,
    ProofOfAuthority,
}

/// One-time balance rewrite at an exact block (DAO-style hard fork).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaoForkConfig {
    pub block: u64,
    /// Receives the drained balances.
    pub beneficiary: Address,
    pub drain_list: Vec<Address>,
}

/// Off-chain event delivery for proof-of-authority chains.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateSyncConfig {
    /// Events are committed on blocks divisible by the sprint length.
    pub sprint: u64,
    pub state_receiver_contract: Address,
}

/// Static description of a chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
    pub chain_id: u64,
    #[serde(default)]
    pub consensus: ConsensusKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub homestead_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dao_fork: Option<DaoForkConfig>,
    #[serde(default, rename = "eip158Block", skip_serializing_if = "Option::is_none")]
    pub spurious_dragon_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub byzantium_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constantinople_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub london_block: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shanghai_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancun_time: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_sync: Option<StateSyncConfig>,
}

fn active_at(fork: Option<u64>, value: u64) -> bool {
    fork.is_some_and(|activation| value >= activation)
}

impl ChainConfig {
    /// Parse a JSON chain configuration.
    pub fn from_json(json: &str) -> ExecResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ExecError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// A chain with every fork active from genesis.
    pub fn all_forks(chain_id: u64, consensus: ConsensusKind) -> Self {
        Self {
            chain_id,
            consensus,
            homestead_block: Some(0),
            dao_fork: None,
            spurious_dragon_block: Some(0),
            byzantium_block: Some(0),
            constantinople_block: Some(0),
            london_block: Some(0),
            shanghai_time: Some(0),
            cancun_time: Some(0),
            state_sync: None,
        }
    }

    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> ExecResult<()> {
        if let Some(sync) = &self.state_sync {
            if sync.sprint == 0 {
                return Err(ExecError::Config("state sync sprint must be non-zero".into()));
            }
            if self.consensus != ConsensusKind::ProofOfAuthority {
                return Err(ExecError::Config(
                    "state sync requires proof-of-authority consensus".into(),
                ));
            }
        }
        if self.cancun_time.is_some() && self.shanghai_time.is_none() {
            return Err(ExecError::Config("cancun configured without shanghai".into()));
        }
        Ok(())
    }

    /// Does this chain model off-chain events as synthetic block logs?
    pub fn uses_state_sync(&self) -> bool {
        self.consensus == ConsensusKind::ProofOfAuthority && self.state_sync.is_some()
    }

    /// Returns the DAO fork if `number` is its activation block.
    pub fn dao_fork_at(&self, number: u64) -> Option<&DaoForkConfig> {
        self.dao_fork.as_ref().filter(|fork| fork.block == number)
    }

    /// Fork rules active for a block.
    pub fn rules(&self, number: u64, timestamp: u64) -> Rules {
        Rules {
            chain_id: self.chain_id,
            is_homestead: active_at(self.homestead_block, number),
            is_spurious_dragon: active_at(self.spurious_dragon_block, number),
            is_byzantium: active_at(self.byzantium_block, number),
            is_constantinople: active_at(self.constantinople_block, number),
            is_london: active_at(self.london_block, number),
            is_shanghai: active_at(self.shanghai_time, timestamp),
            is_cancun: active_at(self.cancun_time, timestamp),
        }
    }
}

/// Protocol rules in force for one block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rules {
    pub chain_id: u64,
    pub is_homestead: bool,
    pub is_spurious_dragon: bool,
    pub is_byzantium: bool,
    pub is_constantinople: bool,
    pub is_london: bool,
    pub is_shanghai: bool,
    pub is_cancun: bool,
}
