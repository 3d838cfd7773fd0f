use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn body(&self) -> f64 {
        (self.close - self.open).abs()
    }

    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    pub fn is_bearish(&self) -> bool {
        self.close < self.open
    }

    pub fn body_top(&self) -> f64 {
        self.close.max(self.open)
    }

    pub fn body_bottom(&self) -> f64 {
        self.close.min(self.open)
    }
}

/// Candles oldest first. Ordering is checked by the series preparer, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CandleSeries {
    candles: Vec<Candle>,
}

impl CandleSeries {
    pub fn new(candles: Vec<Candle>) -> Self {
        Self { candles }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Candle> {
        self.candles.get(index)
    }

    pub fn last(&self) -> Option<&Candle> {
        self.candles.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Candle> {
        self.candles.iter()
    }

    pub fn as_slice(&self) -> &[Candle] {
        &self.candles
    }

    pub fn highs_max(&self) -> f64 {
        self.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn lows_min(&self) -> f64 {
        self.iter().map(|c| c.low).fold(f64::INFINITY, f64::min)
    }

    /// Aggregate into epoch-aligned buckets of `bucket` length. Each bucket
    /// keeps its first open and last close.
    pub fn resample(&self, bucket: Duration) -> CandleSeries {
        let bucket_secs = (bucket.as_secs() as i64).max(1);
        let mut out: Vec<Candle> = Vec::new();

        for candle in &self.candles {
            let ts = candle.timestamp.timestamp();
            let start = ts - ts.rem_euclid(bucket_secs);
            let bucket_ts = DateTime::from_timestamp(start, 0).unwrap_or(candle.timestamp);

            match out.last_mut() {
                Some(open_bucket) if open_bucket.timestamp == bucket_ts => {
                    open_bucket.high = open_bucket.high.max(candle.high);
                    open_bucket.low = open_bucket.low.min(candle.low);
                    open_bucket.close = candle.close;
                    open_bucket.volume += candle.volume;
                }
                _ => out.push(Candle {
                    timestamp: bucket_ts,
                    ..candle.clone()
                }),
            }
        }

        CandleSeries::new(out)
    }
}

impl std::ops::Index<usize> for CandleSeries {
    type Output = Candle;
    fn index(&self, index: usize) -> &Self::Output {
        &self.candles[index]
    }
}

impl IntoIterator for CandleSeries {
    type Item = Candle;
    type IntoIter = std::vec::IntoIter<Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.into_iter()
    }
}

impl<'a> IntoIterator for &'a CandleSeries {
    type Item = &'a Candle;
    type IntoIter = std::slice::Iter<'a, Candle>;
    fn into_iter(self) -> Self::IntoIter {
        self.candles.iter()
    }
}
