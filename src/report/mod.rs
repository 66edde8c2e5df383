//! Balance reports.
//!
//! Turns a replayed [`BalanceMap`] into holder rows (scaled balance plus share
//! of the total) and hands them to one or more sinks.

pub mod csv;
pub mod json;

use crate::error::ReportError;
use crate::types::{BalanceMap, BlockRange};
use alloy_primitives::{Address, U256};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;
use tracing::warn;

pub use self::csv::CsvSink;
pub use self::json::JsonSnapshotSink;

/// Decimal places kept for a holder's share of the total.
const SHARE_SCALE: u32 = 8;

/// Convert a raw U256 balance to a human-readable Decimal given token decimals.
///
/// E.g. U256(1_000_000) with 6 decimals → Decimal(1.000000)
///
/// The integer and fractional parts are split in U256 before parsing, so only
/// an integer part beyond Decimal's ~7.9e28 range clamps. Fractional digits
/// past Decimal's precision are rounded.
pub fn u256_to_decimal(raw: U256, decimals: u8) -> Decimal {
    let (int, frac) = match U256::from(10u64).checked_pow(U256::from(decimals)) {
        Some(unit) => raw.div_rem(unit),
        None => (U256::ZERO, raw),
    };

    let s = if decimals == 0 {
        int.to_string()
    } else {
        format!(
            "{int}.{frac:0>width$}",
            frac = frac.to_string(),
            width = decimals as usize
        )
    };

    match Decimal::from_str(&s) {
        Ok(d) => d,
        Err(_) => {
            warn!(raw = %raw, decimals, "integer part exceeds Decimal range, clamping");
            Decimal::MAX
        }
    }
}

/// File-name friendly form of a contract label.
pub fn slug(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// `balance / total` as a fraction in `[0, 1]`, truncated to [`SHARE_SCALE`] places.
pub fn share_of_total(balance: U256, total: U256) -> Decimal {
    if total.is_zero() {
        return Decimal::ZERO;
    }
    let unit = U256::from(10u64.pow(SHARE_SCALE));
    let scaled = match balance.checked_mul(unit) {
        Some(v) => v / total,
        None => balance / (total / unit).max(U256::from(1)),
    };
    let scaled = u64::try_from(scaled).unwrap_or(10u64.pow(SHARE_SCALE));
    Decimal::new(scaled as i64, SHARE_SCALE)
}

/// One row of a holder table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HolderRow {
    pub address: Address,
    #[serde(serialize_with = "serialize_u256_dec")]
    pub raw_balance: U256,
    #[serde(with = "rust_decimal::serde::str")]
    pub balance: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub share: Decimal,
}

/// Holder table for one tracked contract.
#[derive(Debug, Clone, Serialize)]
pub struct ContractReport {
    pub label: String,
    pub contract: Address,
    pub decimals: u8,
    pub range: BlockRange,
    #[serde(serialize_with = "serialize_u256_dec")]
    pub raw_total: U256,
    #[serde(with = "rust_decimal::serde::str")]
    pub total: Decimal,
    pub holders: Vec<HolderRow>,
}

impl ContractReport {
    /// Rows are ordered by balance descending, then address.
    pub fn new(
        label: impl Into<String>,
        contract: Address,
        decimals: u8,
        range: BlockRange,
        balances: &BalanceMap,
    ) -> Self {
        let raw_total = balances.total();
        let holders = balances
            .sorted()
            .into_iter()
            .map(|(address, raw_balance)| HolderRow {
                address,
                raw_balance,
                balance: u256_to_decimal(raw_balance, decimals),
                share: share_of_total(raw_balance, raw_total),
            })
            .collect();

        Self {
            label: label.into(),
            contract,
            decimals,
            range,
            raw_total,
            total: u256_to_decimal(raw_total, decimals),
            holders,
        }
    }

    /// File-name friendly form of the label.
    pub fn slug(&self) -> String {
        slug(&self.label)
    }
}

/// Destination for finished reports.
pub trait ReportSink {
    fn write(&mut self, report: &ContractReport) -> Result<(), ReportError>;

    /// Called once after every report has been written.
    fn finish(&mut self) -> Result<(), ReportError> {
        Ok(())
    }
}

fn serialize_u256_dec<S: serde::Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use rust_decimal_macros::dec;

    #[test]
    fn test_u256_to_decimal() {
        assert_eq!(u256_to_decimal(U256::from(1_000_000u64), 6), dec!(1.000000));
        assert_eq!(
            u256_to_decimal(U256::from(1_500_000_000_000_000_000u128), 18),
            dec!(1.5)
        );
        assert_eq!(u256_to_decimal(U256::ZERO, 18), dec!(0));
        assert_eq!(u256_to_decimal(U256::MAX, 0), Decimal::MAX);
    }

    #[test]
    fn test_u256_to_decimal_large_supply() {
        // 1e12 tokens at 18 decimals is 1e30 raw, past Decimal's raw range
        let raw = U256::from(10u64).pow(U256::from(30));
        assert_eq!(u256_to_decimal(raw, 18), dec!(1000000000000));

        let raw = U256::from_str("123456789012345678901234567890123").unwrap();
        let scaled = u256_to_decimal(raw, 18);
        assert_eq!(scaled.trunc(), dec!(123456789012345));
        assert!(scaled > dec!(123456789012345.6789));
        assert!(scaled < dec!(123456789012345.679));
    }

    #[test]
    fn test_u256_to_decimal_pads_fraction() {
        assert_eq!(u256_to_decimal(U256::from(5u64), 18), dec!(0.000000000000000005));
        assert_eq!(u256_to_decimal(U256::from(1_000_001u64), 6), dec!(1.000001));
    }

    #[test]
    fn test_slug_collapses_case_and_punctuation() {
        assert_eq!(slug("LP"), slug("lp"));
        assert_eq!(slug("a.b"), slug("a_b"));
        assert_eq!(slug("Token Balances"), "token_balances");
    }

    #[test]
    fn test_share_of_total() {
        assert_eq!(share_of_total(U256::from(60), U256::from(90)), dec!(0.66666666));
        assert_eq!(share_of_total(U256::from(90), U256::from(90)), dec!(1));
        assert_eq!(share_of_total(U256::from(1), U256::ZERO), dec!(0));
    }

    #[test]
    fn test_share_of_huge_balances() {
        let total = U256::MAX;
        let half = U256::MAX / U256::from(2);
        assert_eq!(share_of_total(half, total), dec!(0.5));
    }

    #[test]
    fn test_report_rows_and_shares() {
        let a = address!("00000000000000000000000000000000000000aa");
        let b = address!("00000000000000000000000000000000000000bb");
        let balances = BalanceMap::from_entries([
            (a, U256::from(60_000_000_000_000_000_000u128)),
            (b, U256::from(30_000_000_000_000_000_000u128)),
        ]);

        let report = ContractReport::new(
            "Token Balances",
            Address::ZERO,
            18,
            BlockRange::new(1, 2),
            &balances,
        );

        assert_eq!(report.total, dec!(90));
        assert_eq!(report.holders.len(), 2);
        assert_eq!(report.holders[0].address, a);
        assert_eq!(report.holders[0].balance, dec!(60));
        assert_eq!(report.holders[0].share, dec!(0.66666666));
        assert_eq!(report.holders[1].share, dec!(0.33333333));
        assert_eq!(report.slug(), "token_balances");
    }
}
