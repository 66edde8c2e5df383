//! Ledger replay: fold an ordered Transfer log into final holder balances.
//!
//! Replay is a pure fold. Each call builds a fresh map, so replaying the same
//! log twice yields the same balances. Events are applied in the order given
//! unless ordinal sorting is enabled.

use crate::error::ConsistencyError;
use crate::types::{BalanceMap, TransferEvent};
use alloy_primitives::{Address, I256, U256};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Replays Transfer events into a [`BalanceMap`].
#[derive(Debug, Clone, Copy)]
pub struct LedgerReplayer {
    strict: bool,
    sort_by_ordinal: bool,
}

impl Default for LedgerReplayer {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerReplayer {
    /// Strict replayer that trusts the supplied order.
    pub const fn new() -> Self {
        Self {
            strict: true,
            sort_by_ordinal: false,
        }
    }

    /// Reject (`true`) or tolerate (`false`) debits that exceed the balance.
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Stable-sort events by (block, tx, log) before folding.
    pub const fn sorted(mut self) -> Self {
        self.sort_by_ordinal = true;
        self
    }

    pub fn replay(&self, events: &[TransferEvent]) -> Result<BalanceMap, ConsistencyError> {
        if self.sort_by_ordinal && !is_chronological(events) {
            let mut ordered = events.to_vec();
            ordered.sort_by_key(|e| e.ordinal);
            debug!(events = ordered.len(), "sorted out-of-order transfer log");
            return self.fold(&ordered);
        }
        self.fold(events)
    }

    fn fold(&self, events: &[TransferEvent]) -> Result<BalanceMap, ConsistencyError> {
        if self.strict {
            replay_strict(events)
        } else {
            replay_lenient(events)
        }
    }
}

fn is_chronological(events: &[TransferEvent]) -> bool {
    events.windows(2).all(|w| w[0].ordinal <= w[1].ordinal)
}

/// Unsigned fold: any debit past zero is an error.
fn replay_strict(events: &[TransferEvent]) -> Result<BalanceMap, ConsistencyError> {
    let mut balances: HashMap<Address, U256> = HashMap::new();

    for event in events {
        if event.from != Address::ZERO {
            let balance = balances.entry(event.from).or_insert(U256::ZERO);
            *balance = balance.checked_sub(event.value).ok_or(
                ConsistencyError::NegativeBalance {
                    address: event.from,
                    ordinal: event.ordinal,
                    balance: *balance,
                    value: event.value,
                },
            )?;
        }

        if event.to != Address::ZERO {
            let balance = balances.entry(event.to).or_insert(U256::ZERO);
            *balance = balance
                .checked_add(event.value)
                .ok_or(ConsistencyError::Overflow {
                    address: event.to,
                    ordinal: event.ordinal,
                })?;
        }
    }

    Ok(BalanceMap::from_entries(balances))
}

/// Signed fold: balances may dip below zero mid-replay. Holders that end
/// negative cannot be verified and are left out of the result.
fn replay_lenient(events: &[TransferEvent]) -> Result<BalanceMap, ConsistencyError> {
    let mut balances: HashMap<Address, I256> = HashMap::new();

    for event in events {
        let value = I256::try_from(event.value).map_err(|_| ConsistencyError::Overflow {
            address: if event.from != Address::ZERO {
                event.from
            } else {
                event.to
            },
            ordinal: event.ordinal,
        })?;

        if event.from != Address::ZERO {
            let balance = balances.entry(event.from).or_insert(I256::ZERO);
            *balance = balance
                .checked_sub(value)
                .ok_or(ConsistencyError::Overflow {
                    address: event.from,
                    ordinal: event.ordinal,
                })?;
        }

        if event.to != Address::ZERO {
            let balance = balances.entry(event.to).or_insert(I256::ZERO);
            *balance = balance
                .checked_add(value)
                .ok_or(ConsistencyError::Overflow {
                    address: event.to,
                    ordinal: event.ordinal,
                })?;
        }
    }

    let mut negative = 0usize;
    let entries: Vec<(Address, U256)> = balances
        .into_iter()
        .filter_map(|(address, balance)| {
            if balance.is_negative() {
                warn!(%address, %balance, "holder ended with negative balance, excluding");
                negative += 1;
                None
            } else {
                Some((address, balance.into_raw()))
            }
        })
        .collect();

    if negative > 0 {
        warn!(negative, "ledger replay excluded unverifiable holders");
    }

    Ok(BalanceMap::from_entries(entries))
}
