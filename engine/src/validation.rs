//! Post-execution header checks.
//!
//! After the transaction loop the engine recomputes what the header claims
//! and compares. Every comparison except data gas is skipped in stateless
//! mode; the data-gas check runs whenever the header declares a value.

use crate::config::ExecutionConfig;
use alloy_consensus::Header;
use alloy_primitives::{Bloom, B256};
use basalt_primitives::{ExecError, ExecResult, Mismatch, Rules};
use tracing::warn;

/// Values derived from executing a block's transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionTotals {
    pub receipts_root: B256,
    pub gas_used: u64,
    pub data_gas_used: u64,
    /// `None` when receipts were not generated.
    pub logs_bloom: Option<Bloom>,
}

fn mismatch(header: &Header, mismatch: Mismatch) -> ExecError {
    warn!(block_number = header.number, %mismatch, "header mismatch");
    ExecError::StateMismatch { block_number: header.number, mismatch }
}

pub fn validate_receipts_root(header: &Header, computed: B256) -> ExecResult<()> {
    if computed != header.receipts_root {
        return Err(mismatch(
            header,
            Mismatch::ReceiptsRoot { computed, expected: header.receipts_root },
        ));
    }
    Ok(())
}

pub fn validate_gas_used(header: &Header, computed: u64) -> ExecResult<()> {
    if computed != header.gas_used {
        return Err(mismatch(header, Mismatch::GasUsed { computed, expected: header.gas_used }));
    }
    Ok(())
}

/// Passes trivially when the header declares no blob gas.
pub fn validate_data_gas_used(header: &Header, computed: u64) -> ExecResult<()> {
    match header.blob_gas_used {
        Some(expected) if expected != computed => {
            Err(mismatch(header, Mismatch::DataGasUsed { computed, expected }))
        }
        _ => Ok(()),
    }
}

pub fn validate_bloom(header: &Header, computed: &Bloom) -> ExecResult<()> {
    if *computed != header.logs_bloom {
        return Err(mismatch(
            header,
            Mismatch::LogsBloom {
                computed: Box::new(*computed),
                expected: Box::new(header.logs_bloom),
            },
        ));
    }
    Ok(())
}

/// Run every check that applies under `config` and `rules`, in order:
/// receipts root, gas used, data gas used, bloom.
///
/// The receipts root is only checked from Byzantium on, since earlier
/// receipts commit to intermediate state roots the engine does not produce.
pub fn validate_block_outcome(
    header: &Header,
    rules: &Rules,
    config: &ExecutionConfig,
    totals: &ExecutionTotals,
) -> ExecResult<()> {
    if !config.stateless && rules.is_byzantium && !config.no_receipts {
        validate_receipts_root(header, totals.receipts_root)?;
    }
    if !config.stateless {
        validate_gas_used(header, totals.gas_used)?;
    }
    validate_data_gas_used(header, totals.data_gas_used)?;
    if let Some(bloom) = &totals.logs_bloom {
        if !config.stateless {
            validate_bloom(header, bloom)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use basalt_primitives::EMPTY_ROOT_HASH;

    fn byzantium() -> Rules {
        Rules { is_byzantium: true, ..Default::default() }
    }

    fn header() -> Header {
        Header {
            number: 12,
            gas_used: 21_000,
            receipts_root: EMPTY_ROOT_HASH,
            blob_gas_used: Some(0),
            ..Default::default()
        }
    }

    fn totals() -> ExecutionTotals {
        ExecutionTotals {
            receipts_root: EMPTY_ROOT_HASH,
            gas_used: 21_000,
            data_gas_used: 0,
            logs_bloom: Some(Bloom::ZERO),
        }
    }

    // ── Test: matching totals pass ──

    #[test]
    fn test_matching_totals() {
        validate_block_outcome(&header(), &byzantium(), &ExecutionConfig::default(), &totals()).unwrap();
    }

    // ── Test: each mismatch is reported ──

    #[test]
    fn test_receipts_root_mismatch() {
        let totals = ExecutionTotals { receipts_root: B256::repeat_byte(1), ..totals() };
        let err = validate_block_outcome(&header(), &byzantium(), &ExecutionConfig::default(), &totals)
            .unwrap_err();
        assert!(matches!(err.mismatch(), Some(Mismatch::ReceiptsRoot { .. })));
        assert!(err.to_string().contains("mismatched receipt headers"));
    }

    #[test]
    fn test_receipts_root_skipped_before_byzantium() {
        let totals = ExecutionTotals { receipts_root: B256::repeat_byte(1), ..totals() };
        validate_block_outcome(&header(), &Rules::default(), &ExecutionConfig::default(), &totals).unwrap();
    }

    #[test]
    fn test_gas_used_mismatch() {
        let totals = ExecutionTotals { gas_used: 42_000, ..totals() };
        let err = validate_block_outcome(&header(), &byzantium(), &ExecutionConfig::default(), &totals)
            .unwrap_err();
        assert_eq!(
            err.mismatch(),
            Some(&Mismatch::GasUsed { computed: 42_000, expected: 21_000 })
        );
        assert_eq!(
            err.to_string(),
            "block 12: gas used by execution: 42000, in header: 21000"
        );
    }

    #[test]
    fn test_bloom_mismatch() {
        let mut bloom = Bloom::ZERO;
        bloom.0[0] = 1;
        let totals = ExecutionTotals { logs_bloom: Some(bloom), ..totals() };
        let err = validate_block_outcome(&header(), &byzantium(), &ExecutionConfig::default(), &totals)
            .unwrap_err();
        assert!(matches!(err.mismatch(), Some(Mismatch::LogsBloom { .. })));
    }

    // ── Test: stateless mode skips everything but data gas ──

    #[test]
    fn test_stateless_skips_header_checks() {
        let mut bloom = Bloom::ZERO;
        bloom.0[5] = 1;
        let totals = ExecutionTotals {
            receipts_root: B256::repeat_byte(9),
            gas_used: 1,
            data_gas_used: 0,
            logs_bloom: Some(bloom),
        };
        let config = ExecutionConfig::default().stateless(true);
        validate_block_outcome(&header(), &byzantium(), &config, &totals).unwrap();
    }

    #[test]
    fn test_data_gas_checked_in_stateless_mode() {
        let totals = ExecutionTotals { data_gas_used: 131_072, ..totals() };
        let config = ExecutionConfig::default().stateless(true);
        let err = validate_block_outcome(&header(), &byzantium(), &config, &totals).unwrap_err();
        assert_eq!(
            err.mismatch(),
            Some(&Mismatch::DataGasUsed { computed: 131_072, expected: 0 })
        );
    }

    #[test]
    fn test_data_gas_ignored_without_header_value() {
        let header = Header { blob_gas_used: None, ..header() };
        let totals = ExecutionTotals { data_gas_used: 131_072, ..totals() };
        validate_block_outcome(&header, &byzantium(), &ExecutionConfig::default(), &totals).unwrap();
    }

    #[test]
    fn test_no_receipts_skips_root_and_bloom() {
        let totals = ExecutionTotals {
            receipts_root: B256::repeat_byte(3),
            logs_bloom: None,
            ..totals()
        };
        let config = ExecutionConfig::default().no_receipts(true);
        validate_block_outcome(&header(), &byzantium(), &config, &totals).unwrap();
    }
}
