use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::exchange::CandleSource;
use crate::models::{Candle, CandleSeries, Timeframe};

/// Replays stored candles. Series come from memory (`load`) or from
/// `{data_dir}/{INSTRUMENT}_{tf}.json`. An optional cursor hides candles
/// after a given time, simulating a forward walk.
pub struct HistoricalSource {
    data_dir: Option<PathBuf>,
    data: HashMap<(String, Timeframe), Vec<Candle>>,
    now: Option<DateTime<Utc>>,
}

impl HistoricalSource {
    pub fn new() -> Self {
        Self {
            data_dir: None,
            data: HashMap::new(),
            now: None,
        }
    }

    pub fn from_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(dir.into()),
            ..Self::new()
        }
    }

    /// Candles must be sorted oldest-first.
    pub fn load(&mut self, instrument: &str, tf: Timeframe, candles: Vec<Candle>) {
        self.data.insert((instrument.to_uppercase(), tf), candles);
    }

    pub fn set_time(&mut self, t: DateTime<Utc>) {
        self.now = Some(t);
    }

    fn path_for(&self, instrument: &str, tf: Timeframe) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|d| d.join(format!("{}_{}.json", instrument.to_uppercase(), tf)))
    }

    async fn read_file(&self, instrument: &str, tf: Timeframe) -> Result<Option<Vec<Candle>>> {
        let Some(path) = self.path_for(instrument, tf) else {
            return Ok(None);
        };
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let candles: Vec<Candle> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(candles))
    }

    async fn all_candles(&self, instrument: &str, tf: Timeframe) -> Result<Option<Vec<Candle>>> {
        if let Some(c) = self.data.get(&(instrument.to_uppercase(), tf)) {
            return Ok(Some(c.clone()));
        }
        self.read_file(instrument, tf).await
    }

    /// Candles up to the cursor, capped at `limit`.
    fn visible(&self, all: &[Candle], limit: usize) -> CandleSeries {
        let end = match self.now {
            Some(now) => all.partition_point(|c| c.timestamp <= now),
            None => all.len(),
        };
        let start = end.saturating_sub(limit);
        CandleSeries::new(all[start..end].to_vec())
    }
}

impl Default for HistoricalSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CandleSource for HistoricalSource {
    async fn fetch_candles(
        &self,
        instrument: &str,
        tf: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries> {
        if let Some(all) = self.all_candles(instrument, tf).await? {
            return Ok(self.visible(&all, limit));
        }

        // No stored 4h series: build it from 1h.
        if tf == Timeframe::H4 {
            if let Some(h1) = self.all_candles(instrument, Timeframe::H1).await? {
                let hours = self.visible(&h1, limit * 4);
                return Ok(hours.resample(tf.as_duration()));
            }
        }

        anyhow::bail!("no {} candles stored for {}", tf, instrument)
    }
}
