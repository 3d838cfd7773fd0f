use chrono::{DateTime, Utc};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Candle, CandleSeries, Timeframe};

/// A candle series plus per-candle derived indicators. Read-only once built.
#[derive(Debug, Clone)]
pub struct PreparedSeries {
    pub timeframe: Timeframe,
    candles: CandleSeries,
    atr: Vec<f64>,
    volume_ratio: Vec<f64>,
    volatility: Vec<f64>,
}

impl PreparedSeries {
    pub fn candles(&self) -> &CandleSeries {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn atr_at(&self, index: usize) -> f64 {
        self.atr.get(index).copied().unwrap_or(0.0)
    }

    pub fn volume_ratio_at(&self, index: usize) -> f64 {
        self.volume_ratio.get(index).copied().unwrap_or(1.0)
    }

    pub fn last_atr(&self) -> f64 {
        self.atr.last().copied().unwrap_or(0.0)
    }

    pub fn last_volatility(&self) -> f64 {
        self.volatility.last().copied().unwrap_or(0.0)
    }

    pub fn last_close(&self) -> f64 {
        self.candles.last().map_or(0.0, |c| c.close)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.candles.last().map(|c| c.timestamp)
    }
}

/// Augments raw candles with ATR, relative volume and short-window volatility.
#[derive(Debug, Clone)]
pub struct SeriesPreparer {
    pub min_candles: usize,
    pub atr_period: usize,
    pub volume_period: usize,
    pub volatility_window: usize,
}

impl SeriesPreparer {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            min_candles: cfg.min_candles,
            atr_period: cfg.atr_period,
            volume_period: cfg.volume_period,
            volatility_window: cfg.volatility_window,
        }
    }

    /// `Ok(None)` when the series is shorter than the configured minimum.
    /// Corrupt candles fail loudly.
    pub fn prepare(
        &self,
        candles: &CandleSeries,
        timeframe: Timeframe,
    ) -> PipelineResult<Option<PreparedSeries>> {
        if candles.len() < self.min_candles {
            return Ok(None);
        }
        validate_candles(candles)?;

        let slice = candles.as_slice();
        Ok(Some(PreparedSeries {
            timeframe,
            atr: rolling_atr(slice, self.atr_period),
            volume_ratio: volume_ratios(slice, self.volume_period),
            volatility: rolling_volatility(slice, self.volatility_window),
            candles: candles.clone(),
        }))
    }
}

/// Basic OHLC sanity: finite positive prices, high/low enclosing the body,
/// non-negative volume and strictly increasing timestamps.
pub fn validate_candles(candles: &CandleSeries) -> PipelineResult<()> {
    for (index, c) in candles.iter().enumerate() {
        for (field, value) in [
            ("open", c.open),
            ("high", c.high),
            ("low", c.low),
            ("close", c.close),
            ("volume", c.volume),
        ] {
            if !value.is_finite() {
                return Err(PipelineError::NonFiniteValue { index, field });
            }
        }
        if c.low <= 0.0 {
            return Err(PipelineError::InvalidOhlc {
                index,
                reason: format!("non-positive low {}", c.low),
            });
        }
        if c.high < c.low {
            return Err(PipelineError::InvalidOhlc {
                index,
                reason: format!("high {} below low {}", c.high, c.low),
            });
        }
        if c.high < c.body_top() || c.low > c.body_bottom() {
            return Err(PipelineError::InvalidOhlc {
                index,
                reason: format!(
                    "body [{}, {}] outside range [{}, {}]",
                    c.body_bottom(),
                    c.body_top(),
                    c.low,
                    c.high
                ),
            });
        }
        if c.volume < 0.0 {
            return Err(PipelineError::InvalidOhlc {
                index,
                reason: format!("negative volume {}", c.volume),
            });
        }
        if index > 0 && c.timestamp <= candles[index - 1].timestamp {
            return Err(PipelineError::UnorderedTimestamps { index });
        }
    }
    Ok(())
}

pub fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    let mut trs = Vec::with_capacity(candles.len());
    for (i, c) in candles.iter().enumerate() {
        if i == 0 {
            trs.push(c.high - c.low);
            continue;
        }
        let prev_close = candles[i - 1].close;
        let hl = c.high - c.low;
        let hc = (c.high - prev_close).abs();
        let lc = (c.low - prev_close).abs();
        trs.push(hl.max(hc).max(lc));
    }
    trs
}

/// Simple moving average of true range; the first `period - 1` values
/// average whatever history exists.
fn rolling_atr(candles: &[Candle], period: usize) -> Vec<f64> {
    let trs = true_ranges(candles);
    let mut out = Vec::with_capacity(trs.len());
    let mut sum = 0.0;
    for i in 0..trs.len() {
        sum += trs[i];
        if i >= period {
            sum -= trs[i - period];
        }
        let n = (i + 1).min(period);
        out.push(sum / n as f64);
    }
    out
}

/// Volume relative to the mean of the preceding `period` candles.
fn volume_ratios(candles: &[Candle], period: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(candles.len());
    for i in 0..candles.len() {
        let start = i.saturating_sub(period);
        let window = &candles[start..i];
        if window.is_empty() {
            out.push(1.0);
            continue;
        }
        let mean = window.iter().map(|c| c.volume).sum::<f64>() / window.len() as f64;
        if mean <= 0.0 {
            out.push(1.0);
        } else {
            out.push(candles[i].volume / mean);
        }
    }
    out
}

/// Standard deviation of close-to-close returns over the trailing window.
fn rolling_volatility(candles: &[Candle], window: usize) -> Vec<f64> {
    let returns: Vec<f64> = candles
        .windows(2)
        .map(|w| w[1].close / w[0].close - 1.0)
        .collect();

    (0..candles.len())
        .map(|i| {
            // returns[i - 1] is the return into candle i
            if i < 2 {
                return 0.0;
            }
            let end = i;
            let start = end.saturating_sub(window);
            let slice = &returns[start..end];
            if slice.len() < 2 {
                return 0.0;
            }
            let mean = slice.iter().sum::<f64>() / slice.len() as f64;
            let var = slice.iter().map(|r| (r - mean).powi(2)).sum::<f64>()
                / (slice.len() - 1) as f64;
            var.sqrt()
        })
        .collect()
}
