use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Bias, BosType, CandleSeries, Polarity, SwingType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwingPoint {
    pub swing_type: SwingType,
    pub price: f64,
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub broken: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DealingRange {
    pub high: f64,
    pub low: f64,
    pub equilibrium: f64,
    pub premium_zone: f64,
    pub discount_zone: f64,
}

impl DealingRange {
    fn from_bounds(high: f64, low: f64) -> Self {
        let rng = high - low;
        Self {
            high,
            low,
            equilibrium: low + rng * 0.5,
            premium_zone: low + rng * 0.75,
            discount_zone: low + rng * 0.25,
        }
    }

    /// Between the discount and premium quartiles.
    pub fn is_mid_range(&self, price: f64) -> bool {
        price > self.discount_zone && price < self.premium_zone
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BosEvent {
    pub bos_type: BosType,
    pub level: f64,
    pub index: usize,
    pub timestamp: DateTime<Utc>,
}

/// Swings, breaks of structure and the trend they imply for one series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StructureReport {
    pub swing_highs: Vec<SwingPoint>,
    pub swing_lows: Vec<SwingPoint>,
    pub bos_events: Vec<BosEvent>,
    /// Bullish, Bearish or Neutral; never Ranging.
    pub trend: Bias,
    pub dealing_range: Option<DealingRange>,
}

impl StructureReport {
    /// Whether one of the last `recent` breaks went in `polarity`'s direction.
    pub fn has_recent_break(&self, polarity: Polarity, recent: usize) -> bool {
        let start = self.bos_events.len().saturating_sub(recent);
        self.bos_events[start..]
            .iter()
            .any(|e| e.bos_type.polarity() == polarity)
    }

    pub fn is_two_sided(&self) -> bool {
        self.swing_highs.len() >= 2 && self.swing_lows.len() >= 2
    }
}

/// Fractal swing detection with break-of-structure tracking.
#[derive(Debug, Clone)]
pub struct MarketStructure {
    pub swing_lookback: usize,
    pub recent_breaks: usize,
}

impl MarketStructure {
    pub fn new() -> Self {
        Self::with_lookback(5)
    }

    pub fn with_lookback(swing_lookback: usize) -> Self {
        Self {
            swing_lookback: swing_lookback.max(1),
            recent_breaks: 3,
        }
    }

    pub fn analyze(&self, candles: &CandleSeries) -> StructureReport {
        let (mut swing_highs, mut swing_lows) = self.find_swings(candles);
        let bos_events = detect_bos(candles, self.swing_lookback, &mut swing_highs, &mut swing_lows);
        let trend = self.determine_trend(&bos_events);
        let dealing_range = dealing_range(&swing_highs, &swing_lows, candles);

        StructureReport {
            swing_highs,
            swing_lows,
            bos_events,
            trend,
            dealing_range,
        }
    }

    fn find_swings(&self, candles: &CandleSeries) -> (Vec<SwingPoint>, Vec<SwingPoint>) {
        let lb = self.swing_lookback;
        let len = candles.len();
        let mut highs = Vec::new();
        let mut lows = Vec::new();
        if len <= lb * 2 {
            return (highs, lows);
        }

        for i in lb..(len - lb) {
            let window = (i - lb)..=(i + lb);

            // Swing high: highest high in window
            let current_high = candles[i].high;
            if window.clone().all(|j| candles[j].high <= current_high) {
                highs.push(SwingPoint {
                    swing_type: SwingType::High,
                    price: current_high,
                    index: i,
                    timestamp: candles[i].timestamp,
                    broken: false,
                });
            }

            // Swing low: lowest low in window
            let current_low = candles[i].low;
            if window.clone().all(|j| candles[j].low >= current_low) {
                lows.push(SwingPoint {
                    swing_type: SwingType::Low,
                    price: current_low,
                    index: i,
                    timestamp: candles[i].timestamp,
                    broken: false,
                });
            }
        }
        (highs, lows)
    }

    fn determine_trend(&self, bos_events: &[BosEvent]) -> Bias {
        if bos_events.is_empty() {
            return Bias::Neutral;
        }

        let recent_count = bos_events.len().min(self.recent_breaks.max(1));
        let recent = &bos_events[bos_events.len() - recent_count..];

        let bullish = recent
            .iter()
            .filter(|e| e.bos_type == BosType::BullishBos)
            .count();
        let bearish = recent.len() - bullish;

        if bullish > bearish {
            Bias::Bullish
        } else if bearish > bullish {
            Bias::Bearish
        } else {
            Bias::Neutral
        }
    }
}

impl Default for MarketStructure {
    fn default() -> Self {
        Self::new()
    }
}

/// A swing only becomes breakable once it is confirmed, i.e. after the
/// right-hand side of its window has printed.
fn detect_bos(
    candles: &CandleSeries,
    lookback: usize,
    swing_highs: &mut [SwingPoint],
    swing_lows: &mut [SwingPoint],
) -> Vec<BosEvent> {
    let mut events = Vec::new();

    for i in 1..candles.len() {
        let curr_close = candles[i].close;
        let curr_ts = candles[i].timestamp;

        // Bullish BOS: close above most recent unbroken swing high
        let latest_sh = swing_highs
            .iter_mut()
            .filter(|s| s.index + lookback < i && !s.broken)
            .max_by_key(|s| s.index);
        if let Some(sh) = latest_sh {
            if curr_close > sh.price {
                sh.broken = true;
                events.push(BosEvent {
                    bos_type: BosType::BullishBos,
                    level: sh.price,
                    index: i,
                    timestamp: curr_ts,
                });
            }
        }

        // Bearish BOS: close below most recent unbroken swing low
        let latest_sl = swing_lows
            .iter_mut()
            .filter(|s| s.index + lookback < i && !s.broken)
            .max_by_key(|s| s.index);
        if let Some(sl) = latest_sl {
            if curr_close < sl.price {
                sl.broken = true;
                events.push(BosEvent {
                    bos_type: BosType::BearishBos,
                    level: sl.price,
                    index: i,
                    timestamp: curr_ts,
                });
            }
        }
    }
    events
}

fn dealing_range(
    swing_highs: &[SwingPoint],
    swing_lows: &[SwingPoint],
    candles: &CandleSeries,
) -> Option<DealingRange> {
    let sh = swing_highs.iter().map(|s| s.price).fold(f64::NEG_INFINITY, f64::max);
    let sl = swing_lows.iter().map(|s| s.price).fold(f64::INFINITY, f64::min);
    if sh.is_finite() && sl.is_finite() && sh > sl {
        return Some(DealingRange::from_bounds(sh, sl));
    }
    if candles.is_empty() {
        return None;
    }
    Some(DealingRange::from_bounds(candles.highs_max(), candles.lows_min()))
}
