use serde::{Deserialize, Serialize};

use crate::config::{DetectorConfig, PipelineConfig};
use crate::core::breakers::BreakerDetector;
use crate::core::fvg::FairValueGapDetector;
use crate::core::liquidity::LiquidityMapper;
use crate::core::order_blocks::{find_displacements, Displacement, OrderBlockDetector};
use crate::core::series::PreparedSeries;
use crate::core::structure::{MarketStructure, StructureReport};
use crate::models::{Direction, StructuralZone, SweepEvent, ZoneKind};

/// A structural pattern detector. Detectors are stateless: the same prepared
/// series always yields the same zones.
pub trait ZoneDetector: Send + Sync {
    fn kind(&self) -> ZoneKind;
    fn detect(&self, series: &PreparedSeries) -> Vec<StructuralZone>;
}

/// Everything the detectors found on one prepared series.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StructureSnapshot {
    pub zones: Vec<StructuralZone>,
    pub sweeps: Vec<SweepEvent>,
    pub displacements: Vec<Displacement>,
    pub structure: Option<StructureReport>,
}

impl StructureSnapshot {
    pub fn of_kind(&self, kind: ZoneKind) -> impl Iterator<Item = &StructuralZone> {
        self.zones.iter().filter(move |z| z.kind == kind)
    }

    /// Active zones of `kind` whose polarity supports `direction`.
    pub fn supporting(
        &self,
        kind: ZoneKind,
        direction: Direction,
    ) -> impl Iterator<Item = &StructuralZone> {
        self.of_kind(kind)
            .filter(move |z| z.is_active() && z.supports(direction))
    }

    pub fn count_supporting(&self, kind: ZoneKind, direction: Direction) -> usize {
        self.supporting(kind, direction).count()
    }
}

/// Fixed, ordered detector registry plus swing structure analysis.
pub struct StructureScan {
    detectors: Vec<Box<dyn ZoneDetector>>,
    liquidity: LiquidityMapper,
    structure: MarketStructure,
    config: DetectorConfig,
}

impl StructureScan {
    pub fn new(cfg: &PipelineConfig) -> Self {
        let d = &cfg.detectors;
        let detectors: Vec<Box<dyn ZoneDetector>> = vec![
            Box::new(OrderBlockDetector::new(d)),
            Box::new(FairValueGapDetector::new(d)),
            Box::new(LiquidityMapper::new(d)),
            Box::new(BreakerDetector::new(d)),
        ];
        let mut structure = MarketStructure::with_lookback(d.swing_lookback);
        structure.recent_breaks = cfg.bias.recent_breaks.max(1);

        Self {
            detectors,
            liquidity: LiquidityMapper::new(d),
            structure,
            config: d.clone(),
        }
    }

    pub fn kinds(&self) -> Vec<ZoneKind> {
        self.detectors.iter().map(|d| d.kind()).collect()
    }

    pub fn scan(&self, series: &PreparedSeries) -> StructureSnapshot {
        let mut zones = Vec::new();
        for detector in &self.detectors {
            zones.extend(detector.detect(series));
        }

        let liquidity: Vec<StructuralZone> = zones
            .iter()
            .filter(|z| z.kind == ZoneKind::Liquidity)
            .cloned()
            .collect();
        let sweeps = self.liquidity.sweeps(series, &liquidity);
        let displacements = find_displacements(series, &self.config);
        let structure = self.structure.analyze(series.candles());

        tracing::debug!(
            "[SCAN] {} {} zones, {} sweeps, {} displacements, trend {}",
            series.timeframe,
            zones.len(),
            sweeps.len(),
            displacements.len(),
            structure.trend
        );

        StructureSnapshot {
            zones,
            sweeps,
            displacements,
            structure: Some(structure),
        }
    }
}
