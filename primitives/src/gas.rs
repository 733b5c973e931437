//! Block-level resource accounting.
//!
//! A [`GasPool`] holds the two independent budgets of a block: ordinary
//! gas, seeded from the header's gas limit, and data gas, seeded from
//! [`MAX_DATA_GAS_PER_BLOCK`](crate::types::MAX_DATA_GAS_PER_BLOCK).
//! After seeding, both counters only ever go down.

use crate::error::{ExecError, ExecResult, Resource};

/// Spendable gas and data-gas budgets of one block.
///
/// Owned by a single block's execution and never shared across blocks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GasPool {
    gas: u64,
    data_gas: u64,
}

impl GasPool {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increase the gas budget. Used once, at block start.
    pub fn add_gas(&mut self, amount: u64) -> ExecResult<&mut Self> {
        self.gas = self
            .gas
            .checked_add(amount)
            .ok_or(ExecError::ResourceOverflow(Resource::Gas))?;
        Ok(self)
    }

    /// Increase the data-gas budget. Used once, at block start.
    pub fn add_data_gas(&mut self, amount: u64) -> ExecResult<&mut Self> {
        self.data_gas = self
            .data_gas
            .checked_add(amount)
            .ok_or(ExecError::ResourceOverflow(Resource::DataGas))?;
        Ok(self)
    }

    /// Fails if `amount` gas is not available. Does not modify the pool.
    pub fn check_gas(&self, amount: u64) -> ExecResult<()> {
        if amount > self.gas {
            return Err(ExecError::InsufficientResource {
                resource: Resource::Gas,
                requested: amount,
                available: self.gas,
            });
        }
        Ok(())
    }

    /// Deduct gas. On error the pool is unchanged.
    pub fn deduct_gas(&mut self, amount: u64) -> ExecResult<()> {
        self.check_gas(amount)?;
        self.gas -= amount;
        Ok(())
    }

    /// Fails if `amount` data gas is not available. Does not modify the pool.
    pub fn check_data_gas(&self, amount: u64) -> ExecResult<()> {
        if amount > self.data_gas {
            return Err(ExecError::InsufficientResource {
                resource: Resource::DataGas,
                requested: amount,
                available: self.data_gas,
            });
        }
        Ok(())
    }

    /// Deduct data gas. On error the pool is unchanged.
    pub fn deduct_data_gas(&mut self, amount: u64) -> ExecResult<()> {
        self.check_data_gas(amount)?;
        self.data_gas -= amount;
        Ok(())
    }

    /// Returns the gas left in the block.
    pub fn remaining_gas(&self) -> u64 {
        self.gas
    }

    /// Returns the data gas left in the block.
    pub fn remaining_data_gas(&self) -> u64 {
        self.data_gas
    }
}

/// Gas consumed so far by the transactions of a block.
///
/// The executor bumps these after every applied transaction; the running
/// `gas` value becomes each receipt's cumulative gas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GasUsage {
    pub gas: u64,
    pub data_gas: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MAX_DATA_GAS_PER_BLOCK;

    fn seeded(gas: u64) -> GasPool {
        let mut pool = GasPool::new();
        pool.add_gas(gas)
            .unwrap()
            .add_data_gas(MAX_DATA_GAS_PER_BLOCK)
            .unwrap();
        pool
    }

    #[test]
    fn test_pool_seeding() {
        let pool = seeded(30_000_000);
        assert_eq!(pool.remaining_gas(), 30_000_000);
        assert_eq!(pool.remaining_data_gas(), MAX_DATA_GAS_PER_BLOCK);
    }

    #[test]
    fn test_deduct_exact_budget() {
        let mut pool = seeded(21_000);
        pool.deduct_gas(21_000).unwrap();
        assert_eq!(pool.remaining_gas(), 0);
    }

    #[test]
    fn test_deduct_over_budget_leaves_pool_unchanged() {
        let mut pool = seeded(30_000);
        pool.deduct_gas(21_000).unwrap();
        let err = pool.deduct_gas(21_000).unwrap_err();
        match err {
            ExecError::InsufficientResource { resource, requested, available } => {
                assert_eq!(resource, Resource::Gas);
                assert_eq!(requested, 21_000);
                assert_eq!(available, 9_000);
            }
            other => panic!("expected InsufficientResource, got {other:?}"),
        }
        assert_eq!(pool.remaining_gas(), 9_000);
    }

    #[test]
    fn test_budgets_are_independent() {
        let mut pool = seeded(100);
        pool.deduct_data_gas(MAX_DATA_GAS_PER_BLOCK).unwrap();
        assert_eq!(pool.remaining_gas(), 100);
        let err = pool.deduct_data_gas(1).unwrap_err();
        assert!(matches!(
            err,
            ExecError::InsufficientResource { resource: Resource::DataGas, .. }
        ));
    }

    #[test]
    fn test_check_gas_does_not_mutate() {
        let pool = seeded(50);
        pool.check_gas(50).unwrap();
        assert!(pool.check_gas(51).is_err());
        assert_eq!(pool.remaining_gas(), 50);
    }

    #[test]
    fn test_seeding_overflow() {
        let mut pool = GasPool::new();
        pool.add_gas(u64::MAX).unwrap();
        let err = pool.add_gas(1).unwrap_err();
        assert!(matches!(err, ExecError::ResourceOverflow(Resource::Gas)));
        assert_eq!(pool.remaining_gas(), u64::MAX);
    }
}
