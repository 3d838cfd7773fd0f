use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DetectorConfig;
use crate::core::detector::ZoneDetector;
use crate::core::series::PreparedSeries;
use crate::models::{Mitigation, Polarity, StructuralZone, ZoneKind, ZoneMeta};

/// An order block plus the candle (if any) that closed through it.
#[derive(Debug, Clone)]
pub struct OrderBlockHit {
    pub zone: StructuralZone,
    pub invalidated_at: Option<usize>,
}

/// Last opposite-coloured candle before a confirmed displacement run.
#[derive(Debug, Clone)]
pub struct OrderBlockDetector {
    pub lookback: usize,
    pub displacement_candles: usize,
    pub min_displacement_pct: f64,
    pub min_volume_ratio: f64,
}

impl OrderBlockDetector {
    pub fn new(cfg: &DetectorConfig) -> Self {
        Self {
            lookback: cfg.ob_lookback,
            displacement_candles: cfg.displacement_candles.max(1),
            min_displacement_pct: cfg.min_displacement_pct,
            min_volume_ratio: cfg.min_volume_ratio,
        }
    }

    pub fn scan(&self, series: &PreparedSeries) -> Vec<OrderBlockHit> {
        let candles = series.candles();
        let len = candles.len();
        let mut hits = Vec::new();
        if len < 2 {
            return hits;
        }

        let start = len.saturating_sub(self.lookback + self.displacement_candles + 1);
        for i in start..(len - 1) {
            let c = &candles[i];
            let next = &candles[i + 1];
            let run_end = (i + self.displacement_candles).min(len - 1);

            let polarity = if c.is_bearish() && next.is_bullish() {
                Polarity::Bullish
            } else if c.is_bullish() && next.is_bearish() {
                Polarity::Bearish
            } else {
                continue;
            };

            let run = (i + 1)..=run_end;
            let (extreme_close, break_idx) = match polarity {
                Polarity::Bullish => {
                    let max_close = run
                        .clone()
                        .map(|j| candles[j].close)
                        .fold(f64::NEG_INFINITY, f64::max);
                    let brk = run.clone().find(|&j| candles[j].close > c.high);
                    (max_close, brk)
                }
                Polarity::Bearish => {
                    let min_close = run
                        .clone()
                        .map(|j| candles[j].close)
                        .fold(f64::INFINITY, f64::min);
                    let brk = run.clone().find(|&j| candles[j].close < c.low);
                    (min_close, brk)
                }
            };
            let break_idx = match break_idx {
                Some(b) => b,
                None => continue,
            };

            let displacement_pct = match polarity {
                Polarity::Bullish => (extreme_close - c.close) / c.close,
                Polarity::Bearish => (c.close - extreme_close) / c.close,
            };
            if displacement_pct < self.min_displacement_pct {
                continue;
            }

            let volume_ratio = run
                .map(|j| series.volume_ratio_at(j))
                .fold(0.0_f64, f64::max);
            if volume_ratio < self.min_volume_ratio {
                continue;
            }

            let (mitigation, invalidated_at) =
                mitigation_after(series, c.high, c.low, polarity, break_idx + 1);

            let disp_score = (displacement_pct / (self.min_displacement_pct * 4.0).max(1e-9)).min(1.0);
            let vol_score = ((volume_ratio - 1.0) / 2.0).clamp(0.0, 1.0);
            let strength = ((0.6 * disp_score + 0.4 * vol_score) * freshness(mitigation)).clamp(0.0, 1.0);

            hits.push(OrderBlockHit {
                zone: StructuralZone {
                    kind: ZoneKind::OrderBlock,
                    polarity,
                    high: c.high,
                    low: c.low,
                    strength,
                    mitigation,
                    origin_index: i,
                    timestamp: c.timestamp,
                    timeframe: series.timeframe,
                    meta: ZoneMeta::OrderBlock {
                        displacement_pct,
                        volume_ratio,
                    },
                },
                invalidated_at,
            });
        }

        tracing::trace!("[OB] {} order blocks on {}", hits.len(), series.timeframe);
        hits
    }
}

impl ZoneDetector for OrderBlockDetector {
    fn kind(&self) -> ZoneKind {
        ZoneKind::OrderBlock
    }

    fn detect(&self, series: &PreparedSeries) -> Vec<StructuralZone> {
        self.scan(series).into_iter().map(|h| h.zone).collect()
    }
}

/// Revisit depth of a zone from `from` onwards. A close beyond the far edge
/// invalidates it; the index of that close is returned alongside.
pub(crate) fn mitigation_after(
    series: &PreparedSeries,
    high: f64,
    low: f64,
    polarity: Polarity,
    from: usize,
) -> (Mitigation, Option<usize>) {
    let candles = series.candles();
    let mid = (high + low) / 2.0;
    let mut state = Mitigation::Unmitigated;

    for j in from..candles.len() {
        let c = &candles[j];
        let (closed_through, depth) = match polarity {
            Polarity::Bullish => (c.close < low, c.low),
            Polarity::Bearish => (c.close > high, c.high),
        };
        if closed_through {
            return (Mitigation::Invalidated, Some(j));
        }
        let reached = match polarity {
            Polarity::Bullish if depth <= low => Mitigation::Filled,
            Polarity::Bullish if depth <= mid => Mitigation::HalfFilled,
            Polarity::Bullish if depth <= high => Mitigation::Tested,
            Polarity::Bearish if depth >= high => Mitigation::Filled,
            Polarity::Bearish if depth >= mid => Mitigation::HalfFilled,
            Polarity::Bearish if depth >= low => Mitigation::Tested,
            _ => Mitigation::Unmitigated,
        };
        state = state.max(reached);
    }
    (state, None)
}

pub(crate) fn freshness(mitigation: Mitigation) -> f64 {
    match mitigation {
        Mitigation::Unmitigated => 1.0,
        Mitigation::Tested => 0.85,
        Mitigation::HalfFilled => 0.7,
        Mitigation::Filled | Mitigation::Invalidated => 0.5,
    }
}

/// A single wide-bodied, high-volume candle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Displacement {
    pub polarity: Polarity,
    pub index: usize,
    pub body: f64,
    pub atr_multiple: f64,
    pub timestamp: DateTime<Utc>,
}

/// Displacement candles among the last `recent` candles, oldest first.
pub fn find_displacements(series: &PreparedSeries, cfg: &DetectorConfig) -> Vec<Displacement> {
    let candles = series.candles();
    let len = candles.len();
    let start = len.saturating_sub(cfg.displacement_recent_candles);

    (start..len)
        .filter_map(|i| {
            let c = &candles[i];
            // ATR before this candle so the candle does not inflate its own yardstick
            let atr = series.atr_at(i.saturating_sub(1));
            if atr <= 0.0 {
                return None;
            }
            let multiple = c.body() / atr;
            if multiple < cfg.displacement_atr_multiple
                || series.volume_ratio_at(i) < cfg.min_volume_ratio
            {
                return None;
            }
            let polarity = if c.is_bullish() {
                Polarity::Bullish
            } else if c.is_bearish() {
                Polarity::Bearish
            } else {
                return None;
            };
            Some(Displacement {
                polarity,
                index: i,
                body: c.body(),
                atr_multiple: multiple,
                timestamp: c.timestamp,
            })
        })
        .collect()
}
