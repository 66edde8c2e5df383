// RPC Log Source
//
// `eth_getLogs` over an alloy HTTP provider. Logs that fail to decode as an
// ERC20 Transfer, or that lack their chain position, fail the whole query so
// the ledger never replays a partial history.

use crate::error::SourceError;
use crate::transfers::events::decode_transfer;
use crate::transfers::fetcher::LogSource;
use crate::types::{BlockRange, EventFilter, EventOrdinal, TransferEvent};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{Filter, Log};
use alloy_transport::{RpcError, TransportErrorKind};
use std::error::Error as StdError;
use std::io::ErrorKind;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum RpcSourceError {
    #[error("transport error: {0}")]
    Transport(#[from] alloy_transport::TransportError),

    #[error("log at index {index} is not an ERC20 Transfer")]
    Undecodable { index: usize },

    #[error("log at index {index} is missing {field}")]
    MissingPosition { index: usize, field: &'static str },
}

pub struct RpcLogSource {
    provider: DynProvider,
}

impl RpcLogSource {
    pub async fn connect(rpc_url: &str) -> eyre::Result<Self> {
        let provider = ProviderBuilder::new().connect(rpc_url).await?.erased();
        info!("Connected to RPC at {}", rpc_url);
        Ok(Self { provider })
    }

    pub fn from_provider(provider: DynProvider) -> Self {
        Self { provider }
    }
}

impl LogSource for RpcLogSource {
    async fn query(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> Result<Vec<TransferEvent>, SourceError> {
        let rpc_filter = Filter::new()
            .address(filter.address)
            .event_signature(filter.topic0)
            .from_block(range.from)
            .to_block(range.to);

        let logs = self
            .provider
            .get_logs(&rpc_filter)
            .await
            .map_err(RpcSourceError::from)?;
        debug!(from = range.from, to = range.to, logs = logs.len(), "eth_getLogs");

        let events = logs
            .iter()
            .enumerate()
            .map(|(index, log)| to_transfer_event(index, log))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(events)
    }

    async fn latest_block(&self) -> Result<u64, SourceError> {
        let block = self
            .provider
            .get_block_number()
            .await
            .map_err(RpcSourceError::from)?;
        Ok(block)
    }

    fn should_bisect(&self, err: &SourceError) -> bool {
        !is_connection_error(err)
    }
}

/// The endpoint could not be reached at all, whatever the block range.
pub fn is_connection_error(err: &SourceError) -> bool {
    let Some(RpcSourceError::Transport(RpcError::Transport(kind))) =
        err.downcast_ref::<RpcSourceError>()
    else {
        return false;
    };
    match kind {
        TransportErrorKind::BackendGone => true,
        TransportErrorKind::Custom(inner) => refused(&**inner),
        _ => false,
    }
}

fn refused(err: &(dyn StdError + 'static)) -> bool {
    let mut cur = Some(err);
    while let Some(e) = cur {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            if matches!(
                io.kind(),
                ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::NotConnected
                    | ErrorKind::AddrNotAvailable
            ) {
                return true;
            }
        }
        cur = e.source();
    }
    false
}

fn to_transfer_event(index: usize, log: &Log) -> Result<TransferEvent, RpcSourceError> {
    let transfer = decode_transfer(&log.inner).ok_or(RpcSourceError::Undecodable { index })?;
    let ordinal = EventOrdinal::new(
        log.block_number
            .ok_or(RpcSourceError::MissingPosition { index, field: "blockNumber" })?,
        log.transaction_index
            .ok_or(RpcSourceError::MissingPosition { index, field: "transactionIndex" })?,
        log.log_index
            .ok_or(RpcSourceError::MissingPosition { index, field: "logIndex" })?,
    );
    Ok(transfer.at(ordinal))
}
