use crate::config::DetectorConfig;
use crate::core::detector::ZoneDetector;
use crate::core::series::PreparedSeries;
use crate::models::{Mitigation, Polarity, StructuralZone, ZoneKind, ZoneMeta};

/// Three-candle imbalances: the outer candles' wicks leave a gap the middle
/// candle never traded back into.
#[derive(Debug, Clone)]
pub struct FairValueGapDetector {
    pub min_gap_pct: f64,
}

impl FairValueGapDetector {
    pub fn new(cfg: &DetectorConfig) -> Self {
        Self {
            min_gap_pct: cfg.fvg_min_gap_pct,
        }
    }

    fn build(
        &self,
        series: &PreparedSeries,
        middle: usize,
        polarity: Polarity,
        high: f64,
        low: f64,
        gap_pct: f64,
    ) -> StructuralZone {
        let candles = series.candles();
        let gap_size = high - low;

        // Deepest revisit after the third candle closed.
        let fill_depth = candles
            .as_slice()
            .iter()
            .skip(middle + 2)
            .map(|c| match polarity {
                Polarity::Bullish => high - c.low,
                Polarity::Bearish => c.high - low,
            })
            .fold(0.0_f64, f64::max);
        let fill_ratio = (fill_depth / gap_size).clamp(0.0, 1.0);

        let mitigation = if fill_ratio >= 1.0 {
            Mitigation::Filled
        } else if fill_ratio >= 0.5 {
            Mitigation::HalfFilled
        } else if fill_ratio > 0.0 {
            Mitigation::Tested
        } else {
            Mitigation::Unmitigated
        };

        StructuralZone {
            kind: ZoneKind::FairValueGap,
            polarity,
            high,
            low,
            strength: ((gap_pct * 100.0).min(1.0) * (1.0 - 0.5 * fill_ratio)).clamp(0.0, 1.0),
            mitigation,
            origin_index: middle,
            timestamp: candles[middle].timestamp,
            timeframe: series.timeframe,
            meta: ZoneMeta::FairValueGap {
                gap_size,
                fill_ratio,
            },
        }
    }
}

impl ZoneDetector for FairValueGapDetector {
    fn kind(&self) -> ZoneKind {
        ZoneKind::FairValueGap
    }

    fn detect(&self, series: &PreparedSeries) -> Vec<StructuralZone> {
        let candles = series.candles();
        let mut zones = Vec::new();

        for i in 2..candles.len() {
            let c1 = &candles[i - 2];
            let c3 = &candles[i];

            let gap_up = c3.low - c1.high;
            if gap_up > 0.0 {
                let gap_pct = gap_up / c1.high;
                if gap_pct >= self.min_gap_pct {
                    zones.push(self.build(series, i - 1, Polarity::Bullish, c3.low, c1.high, gap_pct));
                }
            }

            let gap_down = c1.low - c3.high;
            if gap_down > 0.0 {
                let gap_pct = gap_down / c1.low;
                if gap_pct >= self.min_gap_pct {
                    zones.push(self.build(series, i - 1, Polarity::Bearish, c1.low, c3.high, gap_pct));
                }
            }
        }

        tracing::trace!("[FVG] {} gaps on {}", zones.len(), series.timeframe);
        zones
    }
}
