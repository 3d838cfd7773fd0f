use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Direction, Mitigation, Polarity, Timeframe, ZoneKind};

/// Detector-specific detail carried alongside the common zone shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZoneMeta {
    OrderBlock {
        displacement_pct: f64,
        volume_ratio: f64,
    },
    FairValueGap {
        gap_size: f64,
        /// Deepest revisit as a fraction of the gap (0 = untouched, 1 = filled).
        fill_ratio: f64,
    },
    Liquidity {
        touches: usize,
        swept: bool,
    },
    Breaker {
        invalidated_at: DateTime<Utc>,
    },
}

/// Common shape produced by every structural detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuralZone {
    pub kind: ZoneKind,
    pub polarity: Polarity,
    pub high: f64,
    pub low: f64,
    /// 0..=1
    pub strength: f64,
    pub mitigation: Mitigation,
    pub origin_index: usize,
    pub timestamp: DateTime<Utc>,
    pub timeframe: Timeframe,
    pub meta: ZoneMeta,
}

impl StructuralZone {
    pub fn midpoint(&self) -> f64 {
        (self.high + self.low) / 2.0
    }

    pub fn size(&self) -> f64 {
        self.high - self.low
    }

    pub fn contains(&self, price: f64) -> bool {
        price >= self.low && price <= self.high
    }

    pub fn is_active(&self) -> bool {
        self.mitigation.is_active()
    }

    /// Edge price reaches first on a retracement into the zone.
    pub fn proximal_edge(&self) -> f64 {
        match self.polarity {
            Polarity::Bullish => self.high,
            Polarity::Bearish => self.low,
        }
    }

    /// Edge whose close-through invalidates the zone.
    pub fn invalidation_boundary(&self) -> f64 {
        match self.polarity {
            Polarity::Bullish => self.low,
            Polarity::Bearish => self.high,
        }
    }

    pub fn supports(&self, direction: Direction) -> bool {
        self.polarity.matches(direction)
    }

    pub fn zone_ref(&self) -> ZoneRef {
        ZoneRef {
            kind: self.kind,
            polarity: self.polarity,
            origin_index: self.origin_index,
            timestamp: self.timestamp,
            high: self.high,
            low: self.low,
        }
    }

    /// Relative distance from `price` to the nearest edge, 0 when inside.
    pub fn distance_pct(&self, price: f64) -> f64 {
        if price <= 0.0 || self.contains(price) {
            return 0.0;
        }
        let edge = if price > self.high { self.high } else { self.low };
        (price - edge).abs() / price
    }
}

/// Lightweight handle to a zone, used for signal provenance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoneRef {
    pub kind: ZoneKind,
    pub polarity: Polarity,
    pub origin_index: usize,
    pub timestamp: DateTime<Utc>,
    pub high: f64,
    pub low: f64,
}

/// Price ran a liquidity zone and reversed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepEvent {
    pub zone: ZoneRef,
    /// Direction price is expected to move after the sweep.
    pub polarity: Polarity,
    pub extreme: f64,
    /// 0..=1, from reversal size and speed.
    pub strength: f64,
    pub index: usize,
    pub timestamp: DateTime<Utc>,
}

impl SweepEvent {
    /// Linear time decay: 1.0 at `now`, 0.0 once `horizon_minutes` have passed.
    pub fn relevance(&self, now: DateTime<Utc>, horizon_minutes: i64) -> f64 {
        if horizon_minutes <= 0 {
            return 0.0;
        }
        let age = (now - self.timestamp).num_seconds().max(0) as f64 / 60.0;
        (1.0 - age / horizon_minutes as f64).clamp(0.0, 1.0)
    }
}
