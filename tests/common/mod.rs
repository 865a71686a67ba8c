use std::{
    collections::{BTreeMap, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use driftwatch::{Bar, BarSource, Timeframe, error::DataError};

pub fn et(day: u32, hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, day)
        .unwrap()
        .and_hms_opt(hour, minute, 0)
        .unwrap()
}

pub fn bar(timestamp: NaiveDateTime, close: f64) -> Bar {
    Bar::new(timestamp, close, close + 0.5, close - 0.5, close, 10_000.0)
}

/// Deterministic bar source: fixed per-timeframe history plus a scripted
/// queue of 1m latest-bar responses consumed one per poll.
#[derive(Debug)]
pub struct ScriptedSource {
    history: BTreeMap<Timeframe, Vec<Bar>>,
    latest: Mutex<VecDeque<Result<Option<Bar>, DataError>>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            history: BTreeMap::new(),
            latest: Mutex::new(VecDeque::new()),
        }
    }

    pub fn with_history(mut self, timeframe: Timeframe, bars: Vec<Bar>) -> Self {
        self.history.insert(timeframe, bars);
        self
    }

    pub fn with_latest_script(self, script: Vec<Result<Option<Bar>, DataError>>) -> Self {
        *self.latest.lock().unwrap() = script.into();
        self
    }
}

#[async_trait]
impl BarSource for ScriptedSource {
    async fn fetch_bars(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
        _start: NaiveDateTime,
        _end: NaiveDateTime,
        _limit: Option<usize>,
    ) -> Result<Vec<Bar>, DataError> {
        Ok(self.history.get(&timeframe).cloned().unwrap_or_default())
    }

    async fn latest_bar(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
    ) -> Result<Option<Bar>, DataError> {
        if timeframe != Timeframe::M1 {
            return Ok(None);
        }
        self.latest.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}
