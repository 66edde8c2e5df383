//! Range fetcher with bisection on failure.
//!
//! A failed query over a block range is treated as a signal to retry at finer
//! granularity: the range is split in half and both halves are fetched
//! concurrently. Ranges at the width floor, and failures the source reports
//! as range-independent, are retried with backoff instead, and only those can
//! fail the whole fetch.

use crate::error::{FetchError, SourceError};
use crate::types::{BlockRange, EventFilter, TransferEvent};
use futures::future::{self, BoxFuture, FutureExt};
use std::future::Future;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Remote log source, e.g. an `eth_getLogs` endpoint.
///
/// `query` must return matching events in chronological order. Failure
/// semantics (range limits, result caps, rate limits) are up to the source.
pub trait LogSource: Send + Sync {
    fn query(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> impl Future<Output = Result<Vec<TransferEvent>, SourceError>> + Send;

    fn latest_block(&self) -> impl Future<Output = Result<u64, SourceError>> + Send;

    /// Whether a failed query might succeed over a narrower range. Failures
    /// that don't depend on the range (dead endpoint) are retried in place.
    fn should_bisect(&self, _err: &SourceError) -> bool {
        true
    }
}

/// Fetcher tuning.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Maximum source queries in flight at once
    pub max_concurrency: usize,
    /// Retries for a range that can no longer be bisected
    pub max_retries: u32,
    /// Backoff unit; retry `n` sleeps `n * retry_backoff`
    pub retry_backoff: Duration,
    /// Ranges this wide or narrower are never bisected
    pub min_range_width: u64,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            max_retries: 3,
            retry_backoff: Duration::from_millis(500),
            min_range_width: 1,
        }
    }
}

pub struct RangeFetcher<S> {
    source: S,
    permits: Semaphore,
    config: FetcherConfig,
}

impl<S: LogSource> RangeFetcher<S> {
    pub fn new(source: S, config: FetcherConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrency.max(1));
        Self {
            source,
            permits,
            config,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch every event matching `filter` in `range`, in range order.
    pub async fn fetch(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> Result<Vec<TransferEvent>, FetchError> {
        if range.is_empty() {
            return Ok(Vec::new());
        }
        self.fetch_range(*filter, range).await
    }

    fn fetch_range(
        &self,
        filter: EventFilter,
        range: BlockRange,
    ) -> BoxFuture<'_, Result<Vec<TransferEvent>, FetchError>> {
        async move {
            let err = match self.query_once(&filter, range).await {
                Ok(events) => return Ok(events),
                Err(e) => e,
            };

            warn!(
                contract = %filter.address,
                from = range.from,
                to = range.to,
                error = %err,
                "log query failed"
            );

            if range.width() > self.config.min_range_width && self.source.should_bisect(&err) {
                if let Some((left, right)) = range.bisect() {
                    debug!(
                        contract = %filter.address,
                        left = %left,
                        right = %right,
                        "bisecting block range"
                    );
                    let (mut events, tail) = future::try_join(
                        self.fetch_range(filter, left),
                        self.fetch_range(filter, right),
                    )
                    .await?;
                    events.extend(tail);
                    return Ok(events);
                }
            }

            self.retry_at_floor(&filter, range, err).await
        }
        .boxed()
    }

    async fn retry_at_floor(
        &self,
        filter: &EventFilter,
        range: BlockRange,
        mut last_err: SourceError,
    ) -> Result<Vec<TransferEvent>, FetchError> {
        for attempt in 1..=self.config.max_retries {
            tokio::time::sleep(self.config.retry_backoff * attempt).await;
            match self.query_once(filter, range).await {
                Ok(events) => return Ok(events),
                Err(e) => {
                    warn!(
                        contract = %filter.address,
                        range = %range,
                        attempt,
                        max_retries = self.config.max_retries,
                        error = %e,
                        "retry failed"
                    );
                    last_err = e;
                }
            }
        }

        Err(FetchError {
            range,
            attempts: self.config.max_retries + 1,
            source: last_err,
        })
    }

    async fn query_once(
        &self,
        filter: &EventFilter,
        range: BlockRange,
    ) -> Result<Vec<TransferEvent>, SourceError> {
        let _permit = self.permits.acquire().await?;
        self.source.query(filter, range).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventOrdinal;
    use alloy_primitives::{address, Address, B256, U256};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory source that rejects ranges wider than `max_width`.
    struct MockSource {
        events: Vec<TransferEvent>,
        max_width: u64,
        always_fail: bool,
        bisectable: bool,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak_in_flight: AtomicUsize,
        ranges: Mutex<Vec<BlockRange>>,
    }

    impl MockSource {
        fn new(events: Vec<TransferEvent>, max_width: u64) -> Self {
            Self {
                events,
                max_width,
                always_fail: false,
                bisectable: true,
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                peak_in_flight: AtomicUsize::new(0),
                ranges: Mutex::new(Vec::new()),
            }
        }

        fn failing() -> Self {
            Self {
                always_fail: true,
                ..Self::new(Vec::new(), u64::MAX)
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl LogSource for MockSource {
        async fn query(
            &self,
            _filter: &EventFilter,
            range: BlockRange,
        ) -> Result<Vec<TransferEvent>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.ranges.lock().unwrap().push(range);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::task::yield_now().await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.always_fail {
                return Err("upstream unavailable".into());
            }
            if range.width() > self.max_width {
                return Err(format!("range {range} exceeds {} blocks", self.max_width).into());
            }
            Ok(self
                .events
                .iter()
                .filter(|e| e.ordinal.block_number >= range.from && e.ordinal.block_number <= range.to)
                .copied()
                .collect())
        }

        async fn latest_block(&self) -> Result<u64, SourceError> {
            Ok(self.events.last().map_or(0, |e| e.ordinal.block_number))
        }

        fn should_bisect(&self, _err: &SourceError) -> bool {
            self.bisectable
        }
    }

    const HOLDER: Address = address!("00000000000000000000000000000000000000aa");

    fn filter() -> EventFilter {
        EventFilter {
            address: address!("B459F7204A8Ac84F9e7758d6d839eBD01670E35C"),
            topic0: B256::ZERO,
        }
    }

    fn one_event_per_block(from: u64, to: u64) -> Vec<TransferEvent> {
        (from..=to)
            .map(|block| TransferEvent {
                from: Address::ZERO,
                to: HOLDER,
                value: U256::from(block + 1),
                ordinal: EventOrdinal::new(block, 0, 0),
            })
            .collect()
    }

    fn fast_config() -> FetcherConfig {
        FetcherConfig {
            max_concurrency: 4,
            max_retries: 2,
            retry_backoff: Duration::ZERO,
            min_range_width: 1,
        }
    }

    #[tokio::test]
    async fn test_single_query_when_source_accepts_range() {
        let events = one_event_per_block(0, 10);
        let fetcher = RangeFetcher::new(MockSource::new(events.clone(), u64::MAX), fast_config());

        let fetched = fetcher.fetch(&filter(), BlockRange::new(0, 10)).await.unwrap();

        assert_eq!(fetched, events);
        assert_eq!(fetcher.source().calls(), 1);
    }

    #[tokio::test]
    async fn test_bisection_matches_never_failing_source() {
        let events = one_event_per_block(0, 10);
        let reliable = RangeFetcher::new(MockSource::new(events.clone(), u64::MAX), fast_config());
        let limited = RangeFetcher::new(MockSource::new(events, 5), fast_config());

        let expected = reliable.fetch(&filter(), BlockRange::new(0, 10)).await.unwrap();
        let fetched = limited.fetch(&filter(), BlockRange::new(0, 10)).await.unwrap();

        assert_eq!(fetched, expected);
        // [0,10] and [0,5] fail; [0,2], [3,5] and [6,10] succeed
        assert_eq!(limited.source().calls(), 5);
    }

    #[tokio::test]
    async fn test_deep_bisection_preserves_order() {
        let events = one_event_per_block(100, 163);
        let fetcher = RangeFetcher::new(MockSource::new(events.clone(), 3), fast_config());

        let fetched = fetcher.fetch(&filter(), BlockRange::new(100, 163)).await.unwrap();

        assert_eq!(fetched, events);
        let ranges = fetcher.source().ranges.lock().unwrap().clone();
        assert!(ranges.iter().all(|r| !r.is_empty()));
    }

    #[tokio::test]
    async fn test_empty_range_skips_source() {
        let fetcher = RangeFetcher::new(MockSource::new(one_event_per_block(0, 10), u64::MAX), fast_config());

        let fetched = fetcher.fetch(&filter(), BlockRange::new(5, 3)).await.unwrap();

        assert!(fetched.is_empty());
        assert_eq!(fetcher.source().calls(), 0);
    }

    #[tokio::test]
    async fn test_persistent_failure_terminates_with_fetch_error() {
        let fetcher = RangeFetcher::new(MockSource::failing(), fast_config());

        let err = fetcher.fetch(&filter(), BlockRange::new(0, 3)).await.unwrap_err();

        assert_eq!(err.range.width(), 1);
        assert_eq!(err.attempts, 3);
        assert!(err.to_string().contains("upstream unavailable"));
    }

    #[tokio::test]
    async fn test_single_block_failure_retries_then_fails() {
        let fetcher = RangeFetcher::new(MockSource::failing(), fast_config());

        let err = fetcher.fetch(&filter(), BlockRange::new(7, 7)).await.unwrap_err();

        assert_eq!(err.range, BlockRange::new(7, 7));
        // one initial attempt plus two retries
        assert_eq!(fetcher.source().calls(), 3);
    }

    #[tokio::test]
    async fn test_range_independent_failure_is_not_bisected() {
        let source = MockSource {
            bisectable: false,
            ..MockSource::failing()
        };
        let fetcher = RangeFetcher::new(source, fast_config());

        let err = fetcher
            .fetch(&filter(), BlockRange::new(0, 1_000_000))
            .await
            .unwrap_err();

        assert_eq!(err.range, BlockRange::new(0, 1_000_000));
        assert_eq!(fetcher.source().calls(), 3);
        let ranges = fetcher.source().ranges.lock().unwrap().clone();
        assert!(ranges.iter().all(|r| *r == BlockRange::new(0, 1_000_000)));
    }

    #[tokio::test]
    async fn test_width_floor_stops_bisection_early() {
        let config = FetcherConfig {
            min_range_width: 4,
            ..fast_config()
        };
        let fetcher = RangeFetcher::new(MockSource::new(one_event_per_block(0, 7), 2), config);

        let err = fetcher.fetch(&filter(), BlockRange::new(0, 7)).await.unwrap_err();

        assert_eq!(err.range.width(), 4);
        let ranges = fetcher.source().ranges.lock().unwrap().clone();
        assert!(ranges.iter().all(|r| r.width() >= 4));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let config = FetcherConfig {
            max_concurrency: 2,
            ..fast_config()
        };
        let fetcher = RangeFetcher::new(MockSource::new(one_event_per_block(0, 63), 1), config);

        let fetched = fetcher.fetch(&filter(), BlockRange::new(0, 63)).await.unwrap();

        assert_eq!(fetched.len(), 64);
        assert!(fetcher.source().peak_in_flight.load(Ordering::SeqCst) <= 2);
    }
}
