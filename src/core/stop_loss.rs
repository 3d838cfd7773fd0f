use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::PipelineConfig;
use crate::core::entry::EntryZone;
use crate::models::{Direction, StopLossMode, StructuralZone, ZoneKind, ZoneRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopMethod {
    /// Beyond the invalidation edge of a structural zone.
    Structural,
    /// `entry ± k × ATR`; the signal is marked non-compliant.
    VolatilityFallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StopLoss {
    pub price: f64,
    pub method: StopMethod,
    pub anchor: Option<ZoneRef>,
    /// Invalidation edge of the anchor zone.
    pub boundary: Option<f64>,
    pub risk: f64,
    pub risk_pct: f64,
    /// Pushed out to honour the minimum distance from entry.
    pub clamped: bool,
    pub reason: String,
}

impl StopLoss {
    pub fn is_compliant(&self) -> bool {
        self.method == StopMethod::Structural
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StopLossFailure {
    #[error("no {direction} zone with an invalidation edge beyond entry {entry}")]
    NoAnchor { direction: Direction, entry: f64 },

    #[error("stop {stop} is on the wrong side of entry {entry}")]
    WrongSide { stop: f64, entry: f64 },

    #[error("stop distance {distance_pct:.4} exceeds maximum {max_pct:.4}")]
    TooWide { distance_pct: f64, max_pct: f64 },

    #[error("stop {stop} is not beyond boundary {boundary} by the buffer")]
    InsideBuffer { stop: f64, boundary: f64 },

    #[error("volatility fallback unavailable (ATR {atr})")]
    NoVolatility { atr: f64 },
}

pub struct StopLossEngine {
    mode: StopLossMode,
    buffer_pct: f64,
    min_distance_pct: f64,
    max_distance_pct: f64,
    atr_multiple: f64,
    anchor_kinds: Vec<ZoneKind>,
}

impl StopLossEngine {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            mode: cfg.stop_loss_mode,
            buffer_pct: cfg.sl_buffer_pct,
            min_distance_pct: cfg.min_sl_distance_pct,
            max_distance_pct: cfg.max_sl_distance_pct,
            atr_multiple: cfg.fallback_atr_multiple,
            anchor_kinds: cfg.stop_anchor_kinds.clone(),
        }
    }

    /// Structural stop first. In strict mode its failure is final; in
    /// fallback mode a volatility stop is substituted.
    pub fn compute(
        &self,
        direction: Direction,
        entry: &EntryZone,
        zones: &[StructuralZone],
        atr: f64,
    ) -> Result<StopLoss, StopLossFailure> {
        match self.structural(direction, entry, zones) {
            Ok(sl) => Ok(sl),
            Err(failure) => match self.mode {
                StopLossMode::Strict => Err(failure),
                StopLossMode::Fallback => {
                    tracing::debug!("[SL] structural stop failed ({}), using ATR fallback", failure);
                    self.volatility(direction, entry.price, atr, &failure)
                }
            },
        }
    }

    /// The entry's own zone when it is an anchor kind, otherwise the nearest
    /// anchor-kind zone whose invalidation edge lies beyond entry.
    pub fn anchor<'a>(
        &self,
        direction: Direction,
        entry: &'a EntryZone,
        zones: &'a [StructuralZone],
    ) -> Option<&'a StructuralZone> {
        let beyond = |z: &StructuralZone| match direction {
            Direction::Long => z.invalidation_boundary() < entry.price,
            Direction::Short => z.invalidation_boundary() > entry.price,
        };

        if self.anchor_kinds.contains(&entry.source.kind) && beyond(&entry.source) {
            return Some(&entry.source);
        }

        zones
            .iter()
            .filter(|z| {
                z.is_active()
                    && z.supports(direction)
                    && self.anchor_kinds.contains(&z.kind)
                    && beyond(z)
            })
            .min_by(|a, b| {
                let da = (entry.price - a.invalidation_boundary()).abs();
                let db = (entry.price - b.invalidation_boundary()).abs();
                da.total_cmp(&db)
            })
    }

    fn structural(
        &self,
        direction: Direction,
        entry: &EntryZone,
        zones: &[StructuralZone],
    ) -> Result<StopLoss, StopLossFailure> {
        let anchor = self
            .anchor(direction, entry, zones)
            .ok_or(StopLossFailure::NoAnchor {
                direction,
                entry: entry.price,
            })?;
        let boundary = anchor.invalidation_boundary();
        let sign = direction.sign();

        let buffered = boundary * (1.0 - sign * self.buffer_pct);
        let min_distance_stop = entry.price * (1.0 - sign * self.min_distance_pct);
        let price = match direction {
            Direction::Long => buffered.min(min_distance_stop),
            Direction::Short => buffered.max(min_distance_stop),
        };
        let clamped = price != buffered;

        self.validate(direction, entry.price, price, buffered, boundary)?;

        let risk = (entry.price - price).abs();
        let mut reason = format!(
            "{} {} boundary {:.4} - {:.2}% buffer",
            anchor.kind,
            anchor.polarity,
            boundary,
            self.buffer_pct * 100.0
        );
        if clamped {
            reason.push_str(&format!(
                ", widened to {:.1}% minimum distance",
                self.min_distance_pct * 100.0
            ));
        }

        Ok(StopLoss {
            price,
            method: StopMethod::Structural,
            anchor: Some(anchor.zone_ref()),
            boundary: Some(boundary),
            risk,
            risk_pct: risk / entry.price * 100.0,
            clamped,
            reason,
        })
    }

    fn validate(
        &self,
        direction: Direction,
        entry: f64,
        stop: f64,
        buffered: f64,
        boundary: f64,
    ) -> Result<(), StopLossFailure> {
        let correct_side = match direction {
            Direction::Long => stop < entry && stop > 0.0,
            Direction::Short => stop > entry,
        };
        if !correct_side {
            return Err(StopLossFailure::WrongSide { stop, entry });
        }

        let beyond_buffer = match direction {
            Direction::Long => stop <= buffered,
            Direction::Short => stop >= buffered,
        };
        if !beyond_buffer {
            return Err(StopLossFailure::InsideBuffer { stop, boundary });
        }

        let distance_pct = (entry - stop).abs() / entry;
        if distance_pct > self.max_distance_pct {
            return Err(StopLossFailure::TooWide {
                distance_pct,
                max_pct: self.max_distance_pct,
            });
        }
        Ok(())
    }

    fn volatility(
        &self,
        direction: Direction,
        entry: f64,
        atr: f64,
        cause: &StopLossFailure,
    ) -> Result<StopLoss, StopLossFailure> {
        if !atr.is_finite() || atr <= 0.0 {
            return Err(StopLossFailure::NoVolatility { atr });
        }
        let price = entry - direction.sign() * self.atr_multiple * atr;
        if direction == Direction::Long && price <= 0.0 {
            return Err(StopLossFailure::WrongSide { stop: price, entry });
        }
        let risk = (entry - price).abs();

        Ok(StopLoss {
            price,
            method: StopMethod::VolatilityFallback,
            anchor: None,
            boundary: None,
            risk,
            risk_pct: risk / entry * 100.0,
            clamped: false,
            reason: format!(
                "FALLBACK: {:.1} x ATR ({:.4}) stop, structural stop failed: {}",
                self.atr_multiple, atr, cause
            ),
        })
    }
}
