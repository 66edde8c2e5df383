//! ERC20 Transfer log handling: decoding, range fetching and ledger replay.

pub mod events;
pub mod fetcher;
pub mod ledger;

pub use events::{decode_transfer, transfer_filter, DecodedTransfer, Transfer};
pub use fetcher::{FetcherConfig, LogSource, RangeFetcher};
pub use ledger::LedgerReplayer;
