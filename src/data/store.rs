use std::{collections::BTreeMap, time::Duration};

use chrono::NaiveDateTime;
use tracing::warn;

use crate::{
    data::{
        domain::{Bar, Price, Timeframe},
        source::BarSource,
    },
    error::DataError,
};

/// Owner of all historical and live bar series, one ordered series per
/// [`Timeframe`].
///
/// The store is the only mutator of its series and maintains two
/// invariants:
/// - every series is strictly increasing by timestamp;
/// - appending a bar whose timestamp already exists is a no-op.
///
/// Every call to the underlying [`BarSource`] is wrapped in a
/// per-request deadline so a stalled vendor yields a missed bar, not a
/// hung cycle.
#[derive(Debug)]
pub struct TimeframeStore<B> {
    source: B,
    symbol: String,
    request_timeout: Duration,
    series: BTreeMap<Timeframe, Vec<Bar>>,
    latest: BTreeMap<Timeframe, Bar>,
}

impl<B: BarSource> TimeframeStore<B> {
    pub fn new(source: B, symbol: impl Into<String>, request_timeout: Duration) -> Self {
        let series = Timeframe::ALL.iter().map(|tf| (*tf, Vec::new())).collect();
        Self {
            source,
            symbol: symbol.into(),
            request_timeout,
            series,
            latest: BTreeMap::new(),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Pulls historical bars for every timeframe over `[start, end]`.
    ///
    /// A per-timeframe failure is non-fatal: the series stays empty, a
    /// warning is logged and the session continues with whichever
    /// timeframes succeeded.
    pub async fn fetch_historical(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        for tf in Timeframe::ALL {
            let fetched = self
                .bounded(tf, self.source.fetch_bars(&self.symbol, tf, start, end, None))
                .await;

            match fetched {
                Ok(mut bars) => {
                    // The vendor is expected to deliver monotone series;
                    // enforce the invariant anyway.
                    bars.sort_by_key(|bar| bar.timestamp);
                    bars.dedup_by_key(|bar| bar.timestamp);
                    self.series.insert(tf, bars);
                }
                Err(err) => {
                    warn!(timeframe = %tf, error = %err, "historical fetch failed, continuing without this timeframe");
                    self.series.insert(tf, Vec::new());
                }
            }
        }
    }

    /// Requests the most recent bar for every timeframe, caching it and
    /// appending it to the stored series when its timestamp is new.
    ///
    /// Live bars only merge into series that have history: a timeframe
    /// whose historical fetch came up empty keeps an empty series, so
    /// its price is exactly as fresh as the cache and a failed poll
    /// reads as "no data" instead of replaying a stale close.
    pub async fn update_latest(&mut self) {
        for tf in Timeframe::ALL {
            let fetched = self
                .bounded(tf, self.source.latest_bar(&self.symbol, tf))
                .await;

            match fetched {
                Ok(Some(bar)) => {
                    if !self.series(tf).is_empty() {
                        self.append(tf, bar);
                    }
                    self.latest.insert(tf, bar);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(timeframe = %tf, error = %err, "latest bar fetch failed");
                    // Drop the stale cache entry so a consumer falls back
                    // to the stored series.
                    self.latest.remove(&tf);
                }
            }
        }
    }

    /// The latest known close for `timeframe`: the cached latest bar if
    /// present, else the tail of the stored series.
    pub fn latest_close(&self, timeframe: Timeframe) -> Option<Price> {
        self.latest
            .get(&timeframe)
            .map(|bar| bar.close)
            .or_else(|| self.series(timeframe).last().map(|bar| bar.close))
    }

    /// Read-only borrow of the ordered series for `timeframe`.
    pub fn series(&self, timeframe: Timeframe) -> &[Bar] {
        self.series
            .get(&timeframe)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The close of the stored bar whose timestamp is nearest to `ts`.
    pub fn close_nearest(&self, timeframe: Timeframe, ts: NaiveDateTime) -> Option<Price> {
        let series = self.series(timeframe);
        if series.is_empty() {
            return None;
        }

        let upper = series.partition_point(|bar| bar.timestamp < ts);
        let candidates = [upper.checked_sub(1), (upper < series.len()).then_some(upper)];

        candidates
            .into_iter()
            .flatten()
            .min_by_key(|&idx| (series[idx].timestamp - ts).abs())
            .map(|idx| series[idx].close)
    }

    /// Inserts `bar` into the series for `timeframe`, keeping timestamps
    /// strictly increasing. Duplicate timestamps are dropped; the rare
    /// out-of-order bar is placed by binary search instead of a tail
    /// push. Returns whether the series changed.
    fn append(&mut self, timeframe: Timeframe, bar: Bar) -> bool {
        let series = self
            .series
            .get_mut(&timeframe)
            .expect("every timeframe is seeded at construction");

        match series.last() {
            None => {
                series.push(bar);
                true
            }
            Some(last) if last.timestamp < bar.timestamp => {
                series.push(bar);
                true
            }
            Some(last) if last.timestamp == bar.timestamp => false,
            _ => match series.binary_search_by_key(&bar.timestamp, |b| b.timestamp) {
                Ok(_) => false,
                Err(pos) => {
                    series.insert(pos, bar);
                    true
                }
            },
        }
    }

    async fn bounded<T>(
        &self,
        timeframe: Timeframe,
        request: impl Future<Output = Result<T, DataError>>,
    ) -> Result<T, DataError> {
        match tokio::time::timeout(self.request_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(DataError::Timeout(timeframe.to_string())),
        }
    }
}
