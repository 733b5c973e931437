//! Height- and time-triggered protocol hooks that rewrite state outside of
//! any transaction.

use crate::state::StateView;
use crate::system_call::SystemCall;
use alloy_primitives::{Bytes, B256, U256};
use basalt_primitives::{DaoForkConfig, BEACON_ROOTS_ADDRESS};
use tracing::{info, warn};

/// Move the balance of every drained account to the fork beneficiary.
///
/// Safe to apply more than once: a second pass finds nothing left to move.
/// Returns the amount moved.
pub fn apply_dao_hard_fork(state: &mut dyn StateView, fork: &DaoForkConfig) -> U256 {
    let created = !state.exists(fork.beneficiary);
    if created {
        state.create_account(fork.beneficiary);
    }

    let mut moved = U256::ZERO;
    for account in &fork.drain_list {
        let balance = state.balance(*account);
        if balance.is_zero() {
            continue;
        }
        state.add_balance(fork.beneficiary, balance);
        state.set_balance(*account, U256::ZERO);
        moved = moved.saturating_add(balance);
    }

    if created || !moved.is_zero() {
        info!(
            block = fork.block,
            beneficiary = %fork.beneficiary,
            drained = fork.drain_list.len(),
            %moved,
            "applied DAO hard fork"
        );
    }
    moved
}

/// Publish the parent beacon block root (EIP-4788).
///
/// The root is advisory, so a failed call is logged and otherwise ignored.
pub fn apply_beacon_root(state: &mut dyn StateView, root: B256, syscall: &dyn SystemCall) {
    let input = Bytes::copy_from_slice(root.as_slice());
    if let Err(err) = syscall.call(state, BEACON_ROOTS_ADDRESS, input) {
        warn!(%root, %err, "failed to publish parent beacon block root");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::MemoryState;
    use alloy_primitives::{address, Address};
    use basalt_primitives::{Account, ExecError, ExecResult};
    use std::cell::RefCell;

    const REFUND: Address = address!("bf4ed7b27f1d666546e30d74d50d173d20bca754");
    const DRAINED_A: Address = address!("d4fe7bc31cedb7bfb8a345f31e668033056b2728");
    const DRAINED_B: Address = address!("b3fb0e5aba0e20e5c49d252dfd30e102b171a425");

    fn dao_fork() -> DaoForkConfig {
        DaoForkConfig { block: 1_920_000, beneficiary: REFUND, drain_list: vec![DRAINED_A, DRAINED_B] }
    }

    // ── Test: DAO rewrite ──

    #[test]
    fn test_dao_fork_moves_balances() {
        let mut state = MemoryState::new()
            .with_account(DRAINED_A, Account::with_balance(U256::from(70)))
            .with_account(DRAINED_B, Account::with_balance(U256::from(30)));

        let moved = apply_dao_hard_fork(&mut state, &dao_fork());

        assert_eq!(moved, U256::from(100));
        assert_eq!(state.balance(REFUND), U256::from(100));
        assert_eq!(state.balance(DRAINED_A), U256::ZERO);
        assert_eq!(state.balance(DRAINED_B), U256::ZERO);
    }

    #[test]
    fn test_dao_fork_is_idempotent() {
        let mut state = MemoryState::new().with_account(DRAINED_A, Account::with_balance(U256::from(5)));
        apply_dao_hard_fork(&mut state, &dao_fork());
        let moved = apply_dao_hard_fork(&mut state, &dao_fork());
        assert_eq!(moved, U256::ZERO);
        assert_eq!(state.balance(REFUND), U256::from(5));
    }

    #[test]
    fn test_dao_fork_creates_beneficiary() {
        let mut state = MemoryState::new();
        apply_dao_hard_fork(&mut state, &dao_fork());
        assert!(state.exists(REFUND));
    }

    // ── Test: beacon root publication ──

    #[test]
    fn test_beacon_root_targets_contract() {
        let seen = RefCell::new(Vec::new());
        let syscall = |_state: &mut dyn StateView, contract: Address, data: Bytes, constant: bool| -> ExecResult<Bytes> {
            seen.borrow_mut().push((contract, data, constant));
            Ok(Bytes::new())
        };
        let root = B256::repeat_byte(0x0b);

        apply_beacon_root(&mut MemoryState::new(), root, &syscall);

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, BEACON_ROOTS_ADDRESS);
        assert_eq!(&seen[0].1[..], root.as_slice());
        assert!(!seen[0].2);
    }

    #[test]
    fn test_beacon_root_failure_is_swallowed() {
        let syscall = |_state: &mut dyn StateView, contract: Address, _data: Bytes, _constant: bool| -> ExecResult<Bytes> {
            Err(ExecError::SystemCallFailed { contract, reason: "no code".into() })
        };
        let mut state = MemoryState::new();
        apply_beacon_root(&mut state, B256::ZERO, &syscall);
        assert!(!state.has_pending_changes());
    }
}
