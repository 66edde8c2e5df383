//! Snapshot configuration from environment variables.

use crate::report::slug;
use crate::transfers::fetcher::FetcherConfig;
use alloy_primitives::{address, Address};
use eyre::{eyre, Result, WrapErr};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// First block of the default token's history.
pub const DEFAULT_START_BLOCK: u64 = 17_370_667;

pub const DEFAULT_RPC_URL: &str = "http://localhost:8545";

const DEFAULT_TOKEN: Address = address!("B459F7204A8Ac84F9e7758d6d839eBD01670E35C");
const DEFAULT_PAIR: Address = address!("1840c51B131a51bb66F3019CC7B2d54e6d686E10");

/// A contract whose Transfer log is replayed into a holder table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedContract {
    pub label: String,
    pub address: Address,
    pub decimals: u8,
}

impl FromStr for TrackedContract {
    type Err = eyre::Report;

    /// `label=address[:decimals]`, decimals default to 18.
    fn from_str(s: &str) -> Result<Self> {
        let (label, rest) = s
            .split_once('=')
            .ok_or_else(|| eyre!("expected label=address[:decimals], got '{s}'"))?;
        let label = label.trim();
        if label.is_empty() {
            return Err(eyre!("empty label in '{s}'"));
        }

        let (addr, decimals) = match rest.split_once(':') {
            Some((addr, decimals)) => (
                addr,
                decimals
                    .trim()
                    .parse::<u8>()
                    .wrap_err_with(|| format!("invalid decimals in '{s}'"))?,
            ),
            None => (rest, 18),
        };
        let address = addr
            .trim()
            .parse::<Address>()
            .map_err(|e| eyre!("invalid address in '{s}': {e}"))?;

        Ok(Self {
            label: label.to_string(),
            address,
            decimals,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub rpc_url: String,
    pub start_block: u64,
    /// `None` means the source's latest block at start-up
    pub end_block: Option<u64>,
    pub contracts: Vec<TrackedContract>,
    pub output_dir: PathBuf,
    pub fetcher: FetcherConfig,
    /// Reject debits that exceed the holder's balance
    pub strict: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            start_block: DEFAULT_START_BLOCK,
            end_block: None,
            contracts: vec![
                TrackedContract {
                    label: "token".to_string(),
                    address: DEFAULT_TOKEN,
                    decimals: 18,
                },
                TrackedContract {
                    label: "lp".to_string(),
                    address: DEFAULT_PAIR,
                    decimals: 18,
                },
            ],
            output_dir: PathBuf::from("./snapshot"),
            fetcher: FetcherConfig::default(),
            strict: true,
        }
    }
}

impl SnapshotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("SNAPSHOT_RPC_URL") {
            config.rpc_url = url;
        }
        if let Some(v) = parse_var(&lookup, "SNAPSHOT_START_BLOCK")? {
            config.start_block = v;
        }
        config.end_block = parse_var(&lookup, "SNAPSHOT_END_BLOCK")?;
        if let Some(raw) = lookup("SNAPSHOT_CONTRACTS") {
            config.contracts = raw
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(TrackedContract::from_str)
                .collect::<Result<Vec<_>>>()
                .wrap_err("invalid SNAPSHOT_CONTRACTS")?;
        }
        if let Some(dir) = lookup("SNAPSHOT_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(v) = parse_var(&lookup, "SNAPSHOT_MAX_CONCURRENCY")? {
            config.fetcher.max_concurrency = v;
        }
        if let Some(v) = parse_var(&lookup, "SNAPSHOT_MAX_RETRIES")? {
            config.fetcher.max_retries = v;
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "SNAPSHOT_RETRY_BACKOFF_MS")? {
            config.fetcher.retry_backoff = Duration::from_millis(v);
        }
        if let Some(v) = parse_var(&lookup, "SNAPSHOT_MIN_RANGE_WIDTH")? {
            config.fetcher.min_range_width = v;
        }
        if let Some(v) = parse_var(&lookup, "SNAPSHOT_STRICT")? {
            config.strict = v;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.contracts.is_empty() {
            return Err(eyre!("no contracts configured"));
        }
        if let Some(end) = self.end_block {
            if self.start_block > end {
                return Err(eyre!(
                    "SNAPSHOT_START_BLOCK {} is after SNAPSHOT_END_BLOCK {}",
                    self.start_block,
                    end
                ));
            }
        }
        if self.fetcher.max_concurrency == 0 {
            return Err(eyre!("SNAPSHOT_MAX_CONCURRENCY must be at least 1"));
        }
        if self.fetcher.min_range_width == 0 {
            return Err(eyre!("SNAPSHOT_MIN_RANGE_WIDTH must be at least 1"));
        }
        // labels name output files, so they must differ after slugging
        let mut seen: HashMap<String, &str> = HashMap::new();
        for contract in &self.contracts {
            if let Some(prev) = seen.insert(slug(&contract.label), &contract.label) {
                return Err(eyre!(
                    "contract labels {:?} and {:?} in SNAPSHOT_CONTRACTS map to the same output file",
                    prev,
                    contract.label
                ));
            }
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| eyre!("invalid {key} '{raw}': {e}")),
        None => Ok(None),
    }
}
