// Snapshot Data Types
//
// Block ranges, decoded transfer events and the balance map produced by replay.

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Inclusive block range. `from > to` is the empty range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub const fn new(from: u64, to: u64) -> Self {
        Self { from, to }
    }

    pub const fn is_empty(&self) -> bool {
        self.from > self.to
    }

    /// Number of blocks covered (0 for the empty range).
    pub const fn width(&self) -> u64 {
        if self.is_empty() {
            0
        } else {
            (self.to - self.from).saturating_add(1)
        }
    }

    /// Split into `[from, mid]` and `[mid + 1, to]`.
    ///
    /// Returns `None` for ranges narrower than two blocks.
    pub fn bisect(&self) -> Option<(BlockRange, BlockRange)> {
        if self.width() < 2 {
            return None;
        }
        // from + (to - from) / 2 cannot overflow near u64::MAX
        let mid = self.from + (self.to - self.from) / 2;
        Some((BlockRange::new(self.from, mid), BlockRange::new(mid + 1, self.to)))
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

/// Which logs a source should return: one contract, one event signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    pub address: Address,
    pub topic0: B256,
}

/// Position of a log in chain history.
///
/// Field order gives the derived `Ord` chronological meaning.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventOrdinal {
    pub block_number: u64,
    pub transaction_index: u64,
    pub log_index: u64,
}

impl EventOrdinal {
    pub const fn new(block_number: u64, transaction_index: u64, log_index: u64) -> Self {
        Self {
            block_number,
            transaction_index,
            log_index,
        }
    }
}

impl fmt::Display for EventOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "block {} tx {} log {}",
            self.block_number, self.transaction_index, self.log_index
        )
    }
}

/// A decoded ERC20 Transfer.
///
/// `Address::ZERO` on either side marks a mint or burn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub value: U256,
    pub ordinal: EventOrdinal,
}

impl TransferEvent {
    pub fn is_mint(&self) -> bool {
        self.from == Address::ZERO
    }

    pub fn is_burn(&self) -> bool {
        self.to == Address::ZERO
    }
}

/// Final per-holder balances. Never contains a zero entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceMap {
    balances: HashMap<Address, U256>,
}

impl BalanceMap {
    /// Build from raw entries, dropping zero balances.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (Address, U256)>,
    {
        let balances = entries
            .into_iter()
            .filter(|(_, balance)| !balance.is_zero())
            .collect();
        Self { balances }
    }

    pub fn get(&self, holder: &Address) -> Option<U256> {
        self.balances.get(holder).copied()
    }

    pub fn contains(&self, holder: &Address) -> bool {
        self.balances.contains_key(holder)
    }

    pub fn len(&self) -> usize {
        self.balances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balances.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Address, &U256)> {
        self.balances.iter()
    }

    /// Sum of all balances, saturating at `U256::MAX`.
    pub fn total(&self) -> U256 {
        self.balances
            .values()
            .fold(U256::ZERO, |acc, v| acc.saturating_add(*v))
    }

    /// Entries ordered by balance descending, then address ascending.
    pub fn sorted(&self) -> Vec<(Address, U256)> {
        let mut entries: Vec<(Address, U256)> =
            self.balances.iter().map(|(a, b)| (*a, *b)).collect();
        entries.sort_unstable_by(|(addr_a, bal_a), (addr_b, bal_b)| {
            bal_b.cmp(bal_a).then_with(|| addr_a.cmp(addr_b))
        });
        entries
    }
}
