use serde::{Deserialize, Serialize};

use crate::config::{EntryWeights, PipelineConfig};
use crate::models::{Direction, StructuralZone, ZoneKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryCandidate {
    pub kind: ZoneKind,
    pub price: f64,
    pub weight: f64,
    pub zone: StructuralZone,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryZone {
    pub price: f64,
    pub lower: f64,
    pub upper: f64,
    pub source: StructuralZone,
    pub weight: f64,
    pub distance_pct: f64,
    pub distance_compliant: bool,
    /// Best candidate of each zone kind that was considered.
    pub candidates: Vec<EntryCandidate>,
}

/// Picks the retracement entry from the zones sitting between price and
/// the trade's invalidation.
#[derive(Debug, Clone)]
pub struct EntryCalculator {
    weights: EntryWeights,
    band_pct: f64,
    min_distance_pct: f64,
    max_distance_pct: f64,
}

impl EntryCalculator {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            weights: cfg.entry_weights.clone(),
            band_pct: cfg.entry_band_pct,
            min_distance_pct: cfg.entry_distance_min_pct,
            max_distance_pct: cfg.entry_distance_max_pct,
        }
    }

    /// Price a zone offers as an entry. FVGs are entered at their midpoint,
    /// everything else at the edge price reaches first.
    fn candidate_price(zone: &StructuralZone) -> f64 {
        match zone.kind {
            ZoneKind::FairValueGap => zone.midpoint(),
            _ => zone.proximal_edge(),
        }
    }

    pub fn candidates(
        &self,
        direction: Direction,
        current_price: f64,
        zones: &[StructuralZone],
    ) -> Vec<EntryCandidate> {
        let mut best: Vec<EntryCandidate> = Vec::new();

        for zone in zones.iter().filter(|z| z.is_active() && z.supports(direction)) {
            let price = Self::candidate_price(zone);
            let waiting = match direction {
                Direction::Long => price < current_price,
                Direction::Short => price > current_price,
            };
            if !waiting || price <= 0.0 {
                continue;
            }

            let candidate = EntryCandidate {
                kind: zone.kind,
                price,
                weight: self.weights.weight(zone.kind),
                zone: zone.clone(),
            };
            match best.iter_mut().find(|c| c.kind == zone.kind) {
                // Nearest to current price wins within a kind; earlier zone on ties.
                Some(existing) => {
                    let closer = (price - current_price).abs() < (existing.price - current_price).abs();
                    if closer {
                        *existing = candidate;
                    }
                }
                None => best.push(candidate),
            }
        }

        best.sort_by_key(|c| c.kind);
        best
    }

    pub fn select(
        &self,
        direction: Direction,
        current_price: f64,
        zones: &[StructuralZone],
    ) -> Option<EntryZone> {
        let candidates = self.candidates(direction, current_price, zones);

        let chosen = candidates.iter().reduce(|best, c| {
            let heavier = c.weight > best.weight;
            let tied_but_closer = c.weight == best.weight
                && (c.price - current_price).abs() < (best.price - current_price).abs();
            if heavier || tied_but_closer {
                c
            } else {
                best
            }
        })?;

        let price = chosen.price;
        let distance_pct = (price - current_price).abs() / current_price;
        let distance_compliant =
            distance_pct >= self.min_distance_pct && distance_pct <= self.max_distance_pct;

        Some(EntryZone {
            price,
            lower: price * (1.0 - self.band_pct),
            upper: price * (1.0 + self.band_pct),
            source: chosen.zone.clone(),
            weight: chosen.weight,
            distance_pct,
            distance_compliant,
            candidates: candidates.clone(),
        })
    }
}
