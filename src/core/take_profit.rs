use serde::{Deserialize, Serialize};

use crate::config::PipelineConfig;
use crate::models::Direction;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TakeProfit {
    /// 1-based.
    pub tier: u8,
    pub price: f64,
    pub multiplier: f64,
    pub reward_risk: f64,
    /// External level the tier was moved onto, if any.
    pub snapped_to: Option<f64>,
}

/// Risk-multiple ladder with optional snapping to external levels.
#[derive(Debug, Clone)]
pub struct TakeProfitCalculator {
    multipliers: Vec<f64>,
    min_reward_risk: f64,
    snap_tolerance_pct: f64,
}

impl TakeProfitCalculator {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            multipliers: cfg.tp_multipliers.clone(),
            min_reward_risk: cfg.min_reward_risk,
            snap_tolerance_pct: cfg.tp_snap_tolerance_pct,
        }
    }

    /// Tier 1 is lifted to the minimum reward:risk; later tiers never sit
    /// inside an earlier one.
    pub fn ladder(&self) -> Vec<f64> {
        let mut prev = 0.0_f64;
        self.multipliers
            .iter()
            .enumerate()
            .map(|(i, &m)| {
                let mut mult = m.max(prev);
                if i == 0 {
                    mult = mult.max(self.min_reward_risk);
                }
                prev = mult;
                mult
            })
            .collect()
    }

    pub fn compute(
        &self,
        direction: Direction,
        entry: f64,
        stop: f64,
        targets: &[f64],
    ) -> Vec<TakeProfit> {
        let risk = (entry - stop).abs();
        if risk <= 0.0 {
            return Vec::new();
        }
        let sign = direction.sign();
        // Tier 1 may not snap inside the minimum reward:risk, later tiers
        // may not snap inside the tier before them.
        let mut floor = entry + sign * risk * self.min_reward_risk;

        self.ladder()
            .into_iter()
            .enumerate()
            .map(|(i, multiplier)| {
                let computed = entry + sign * risk * multiplier;
                let snapped_to = self.snap(direction, computed, floor, targets);
                let price = match snapped_to {
                    Some(level) => level,
                    None if sign * (computed - floor) < 0.0 => floor,
                    None => computed,
                };
                floor = price;
                TakeProfit {
                    tier: (i + 1) as u8,
                    price,
                    multiplier,
                    reward_risk: sign * (price - entry) / risk,
                    snapped_to,
                }
            })
            .collect()
    }

    fn snap(&self, direction: Direction, computed: f64, floor: f64, targets: &[f64]) -> Option<f64> {
        let sign = direction.sign();
        targets
            .iter()
            .copied()
            .filter(|t| t.is_finite() && sign * (t - floor) >= 0.0)
            .filter(|t| (t - computed).abs() / computed <= self.snap_tolerance_pct)
            .min_by(|a, b| (a - computed).abs().total_cmp(&(b - computed).abs()))
    }
}
