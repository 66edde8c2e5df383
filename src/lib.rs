// Transfer Snapshot Library
//
// Rebuilds ERC20 holder balances by replaying Transfer logs fetched over RPC.

pub mod config;
pub mod error;
pub mod report;
pub mod rpc;
pub mod snapshot;
pub mod transfers;
pub mod types;

pub use config::{SnapshotConfig, TrackedContract};
pub use error::{ConsistencyError, FetchError, ReportError, SnapshotError, SourceError};
pub use report::{ContractReport, CsvSink, HolderRow, JsonSnapshotSink, ReportSink};
pub use rpc::RpcLogSource;
pub use snapshot::{write_reports, ContractSnapshot, SnapshotJob};
pub use transfers::{FetcherConfig, LedgerReplayer, LogSource, RangeFetcher};
pub use types::{BalanceMap, BlockRange, EventFilter, EventOrdinal, TransferEvent};
