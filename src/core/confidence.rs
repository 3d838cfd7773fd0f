use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{PipelineConfig, ScoringWeights};
use crate::core::detector::StructureSnapshot;
use crate::models::{Direction, ZoneKind};

/// Per-component points. `total` is the clamped sum.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub structure_break: f64,
    pub liquidity: f64,
    pub order_blocks: f64,
    pub fair_value_gaps: f64,
    pub consensus: f64,
    pub displacement: f64,
    pub breaker: f64,
    pub proximity: f64,
    pub sweep: f64,
    pub fundamental: f64,
    /// Requested ML adjustment after bounding.
    pub ml_requested: f64,
    /// Portion actually applied.
    pub ml_applied: f64,
    /// Set when the ML term would have moved the score across the threshold.
    pub ml_suppressed: bool,
    pub total: f64,
}

impl ConfidenceBreakdown {
    pub fn summary(&self) -> String {
        format!(
            "BOS {:.1} | LIQ {:.1} | OB {:.1} | FVG {:.1} | MTF {:.1} | DISP {:.1} | BRK {:.1} | PROX {:.1} | SWEEP {:.1} | FUND {:+.1} | ML {:+.1} => {:.1}",
            self.structure_break,
            self.liquidity,
            self.order_blocks,
            self.fair_value_gaps,
            self.consensus,
            self.displacement,
            self.breaker,
            self.proximity,
            self.sweep,
            self.fundamental,
            self.ml_applied,
            self.total
        )
    }
}

/// Everything the scorer looks at for one candidate signal.
pub struct ScoreInput<'a> {
    pub direction: Direction,
    pub snapshot: &'a StructureSnapshot,
    pub consensus_pct: f64,
    pub entry_price: f64,
    pub now: DateTime<Utc>,
    pub fundamental: Option<f64>,
    pub ml_adjustment: Option<f64>,
}

pub struct ConfidenceScorer {
    weights: ScoringWeights,
    min_confidence: f64,
    recent_breaks: usize,
    sweep_horizon_minutes: i64,
}

impl ConfidenceScorer {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            weights: cfg.scoring.clone(),
            min_confidence: cfg.min_confidence,
            recent_breaks: cfg.bias.recent_breaks.max(1),
            sweep_horizon_minutes: cfg.sweep_horizon_minutes,
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn score(&self, input: &ScoreInput) -> ConfidenceBreakdown {
        let w = &self.weights;
        let snap = input.snapshot;
        let direction = input.direction;
        let polarity = direction.polarity();

        let capped = |kind: ZoneKind, per: f64, cap: f64| {
            (snap.count_supporting(kind, direction) as f64 * per).min(cap)
        };

        let mut b = ConfidenceBreakdown {
            structure_break: match &snap.structure {
                Some(s) if s.has_recent_break(polarity, self.recent_breaks) => w.structure_break,
                _ => 0.0,
            },
            liquidity: capped(ZoneKind::Liquidity, w.liquidity_per_zone, w.liquidity_cap),
            order_blocks: capped(ZoneKind::OrderBlock, w.order_block_per_zone, w.order_block_cap),
            fair_value_gaps: capped(ZoneKind::FairValueGap, w.fvg_per_zone, w.fvg_cap),
            consensus: (input.consensus_pct.clamp(0.0, 100.0) / 100.0) * w.consensus,
            ..ConfidenceBreakdown::default()
        };

        if snap.displacements.iter().any(|d| d.polarity == polarity) {
            b.displacement = w.displacement;
        }
        if snap.count_supporting(ZoneKind::Breaker, direction) > 0 {
            b.breaker = w.breaker;
        }

        let nearest = snap
            .supporting(ZoneKind::Liquidity, direction)
            .filter(|z| z.strength >= w.proximity_min_strength)
            .map(|z| z.distance_pct(input.entry_price))
            .min_by(|a, b| a.total_cmp(b));
        if let Some(d) = nearest {
            if d <= w.proximity_max_distance_pct && w.proximity_max_distance_pct > 0.0 {
                b.proximity = w.proximity_max * (1.0 - d / w.proximity_max_distance_pct);
            }
        }

        let best_sweep = snap
            .sweeps
            .iter()
            .filter(|s| s.polarity == polarity)
            .map(|s| s.strength * s.relevance(input.now, self.sweep_horizon_minutes))
            .fold(0.0_f64, f64::max);
        b.sweep = w.sweep_max * best_sweep.clamp(0.0, 1.0);

        b.fundamental = input
            .fundamental
            .filter(|f| f.is_finite())
            .map(|f| f.clamp(w.fundamental_min, w.fundamental_max))
            .unwrap_or(0.0);

        let base = (b.structure_break
            + b.liquidity
            + b.order_blocks
            + b.fair_value_gaps
            + b.consensus
            + b.displacement
            + b.breaker
            + b.proximity
            + b.sweep
            + b.fundamental)
            .clamp(0.0, 100.0);

        b.ml_requested = input
            .ml_adjustment
            .filter(|m| m.is_finite())
            .map(|m| m.clamp(w.ml_min, w.ml_max))
            .unwrap_or(0.0);

        // Advisory only: never the deciding factor on either side of the threshold.
        let with_ml = (base + b.ml_requested).clamp(0.0, 100.0);
        let crosses = (base >= self.min_confidence) != (with_ml >= self.min_confidence);
        if crosses {
            b.ml_suppressed = true;
            b.total = base;
        } else {
            b.ml_applied = b.ml_requested;
            b.total = with_ml;
        }
        b
    }

    pub fn passes(&self, breakdown: &ConfidenceBreakdown) -> bool {
        breakdown.total >= self.min_confidence
    }
}
