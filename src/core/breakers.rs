use crate::config::DetectorConfig;
use crate::core::detector::ZoneDetector;
use crate::core::order_blocks::{freshness, mitigation_after, OrderBlockDetector};
use crate::core::series::PreparedSeries;
use crate::models::{StructuralZone, ZoneKind, ZoneMeta};

/// Order blocks that price closed through, flipped to the opposite polarity.
#[derive(Debug, Clone)]
pub struct BreakerDetector {
    order_blocks: OrderBlockDetector,
}

impl BreakerDetector {
    pub fn new(cfg: &DetectorConfig) -> Self {
        Self {
            order_blocks: OrderBlockDetector::new(cfg),
        }
    }
}

impl ZoneDetector for BreakerDetector {
    fn kind(&self) -> ZoneKind {
        ZoneKind::Breaker
    }

    fn detect(&self, series: &PreparedSeries) -> Vec<StructuralZone> {
        let candles = series.candles();

        let zones: Vec<StructuralZone> = self
            .order_blocks
            .scan(series)
            .into_iter()
            .filter_map(|hit| {
                let broken_at = hit.invalidated_at?;
                let ob = hit.zone;
                let polarity = ob.polarity.flipped();
                let (mitigation, _) =
                    mitigation_after(series, ob.high, ob.low, polarity, broken_at + 1);

                Some(StructuralZone {
                    kind: ZoneKind::Breaker,
                    polarity,
                    high: ob.high,
                    low: ob.low,
                    strength: ((0.4 + 0.6 * ob.strength) * freshness(mitigation)).clamp(0.0, 1.0),
                    mitigation,
                    origin_index: broken_at,
                    timestamp: candles[broken_at].timestamp,
                    timeframe: series.timeframe,
                    meta: ZoneMeta::Breaker {
                        invalidated_at: candles[broken_at].timestamp,
                    },
                })
            })
            .collect();

        tracing::trace!("[BRK] {} breakers on {}", zones.len(), series.timeframe);
        zones
    }
}
