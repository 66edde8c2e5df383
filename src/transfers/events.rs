use crate::types::{EventFilter, EventOrdinal, TransferEvent};
use alloy_primitives::{Address, Log, U256};
use alloy_sol_types::{sol, SolEvent};

sol! {
    #[derive(Debug)]
    event Transfer(address indexed from, address indexed to, uint256 value);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub token: Address,
    pub from: Address,
    pub to: Address,
    pub value: U256,
}

impl DecodedTransfer {
    /// Attach the log's chain position.
    pub fn at(self, ordinal: EventOrdinal) -> TransferEvent {
        TransferEvent {
            from: self.from,
            to: self.to,
            value: self.value,
            ordinal,
        }
    }
}

/// Filter selecting ERC20 Transfer logs emitted by `token`.
pub fn transfer_filter(token: Address) -> EventFilter {
    EventFilter {
        address: token,
        topic0: Transfer::SIGNATURE_HASH,
    }
}

/// Decode an ERC20 Transfer log.
///
/// None for any other event, including ERC721 Transfer, which shares the
/// signature but carries tokenId as a fourth indexed topic.
pub fn decode_transfer(log: &Log) -> Option<DecodedTransfer> {
    match log.topics() {
        [topic0, _, _] if *topic0 == Transfer::SIGNATURE_HASH => {}
        _ => return None,
    }

    let Transfer { from, to, value } = Transfer::decode_log_data(&log.data).ok()?;
    Some(DecodedTransfer {
        token: log.address,
        from,
        to,
        value,
    })
}
