use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};
use crate::models::{InstrumentPolicy, StopLossMode, Timeframe, ZoneKind};

/// Tunables for the four structural detectors and the swing analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorConfig {
    // Order blocks
    pub ob_lookback: usize,
    pub displacement_candles: usize,
    pub min_displacement_pct: f64,
    pub min_volume_ratio: f64,

    // Fair value gaps
    pub fvg_min_gap_pct: f64,

    // Liquidity
    pub liquidity_swing_lookback: usize,
    pub liquidity_tolerance_pct: f64,
    pub liquidity_min_touches: usize,
    pub sweep_window: usize,

    // Displacement candles (confidence bonus)
    pub displacement_atr_multiple: f64,
    pub displacement_recent_candles: usize,

    // Swing structure
    pub swing_lookback: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            ob_lookback: 50,
            displacement_candles: 3,
            min_displacement_pct: 0.005,
            min_volume_ratio: 1.2,
            fvg_min_gap_pct: 0.0005,
            liquidity_swing_lookback: 3,
            liquidity_tolerance_pct: 0.001,
            liquidity_min_touches: 2,
            sweep_window: 3,
            displacement_atr_multiple: 1.5,
            displacement_recent_candles: 10,
            swing_lookback: 3,
        }
    }
}

/// Confluence weight of each zone kind when picking an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryWeights {
    pub order_block: f64,
    pub liquidity: f64,
    pub breaker: f64,
    pub fair_value_gap: f64,
}

impl Default for EntryWeights {
    fn default() -> Self {
        Self {
            order_block: 1.0,
            liquidity: 0.9,
            breaker: 0.8,
            fair_value_gap: 0.6,
        }
    }
}

impl EntryWeights {
    pub fn weight(&self, kind: ZoneKind) -> f64 {
        match kind {
            ZoneKind::OrderBlock => self.order_block,
            ZoneKind::Liquidity => self.liquidity,
            ZoneKind::Breaker => self.breaker,
            ZoneKind::FairValueGap => self.fair_value_gap,
        }
    }
}

/// Point contributions of the confidence scorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub structure_break: f64,
    pub liquidity_per_zone: f64,
    pub liquidity_cap: f64,
    pub order_block_per_zone: f64,
    pub order_block_cap: f64,
    pub fvg_per_zone: f64,
    pub fvg_cap: f64,
    /// Points awarded at 100% consensus, scaled linearly.
    pub consensus: f64,
    pub displacement: f64,
    pub breaker: f64,
    pub proximity_max: f64,
    pub proximity_max_distance_pct: f64,
    pub proximity_min_strength: f64,
    pub sweep_max: f64,
    pub fundamental_min: f64,
    pub fundamental_max: f64,
    pub ml_min: f64,
    pub ml_max: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            structure_break: 20.0,
            liquidity_per_zone: 6.0,
            liquidity_cap: 18.0,
            order_block_per_zone: 8.0,
            order_block_cap: 16.0,
            fvg_per_zone: 4.0,
            fvg_cap: 12.0,
            consensus: 25.0,
            displacement: 8.0,
            breaker: 6.0,
            proximity_max: 5.0,
            proximity_max_distance_pct: 0.02,
            proximity_min_strength: 0.5,
            sweep_max: 3.0,
            fundamental_min: -15.0,
            fundamental_max: 10.0,
            ml_min: -10.0,
            ml_max: 10.0,
        }
    }
}

/// How the structural bias blends break-of-structure with zone presence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasConfig {
    pub structure_weight: f64,
    pub zone_weight: f64,
    /// |score| below this is not directional.
    pub threshold: f64,
    pub recent_breaks: usize,
}

impl Default for BiasConfig {
    fn default() -> Self {
        Self {
            structure_weight: 0.6,
            zone_weight: 0.4,
            threshold: 0.25,
            recent_breaks: 3,
        }
    }
}

/// Per-instrument policy table. Anything unlisted is `Dependent`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstrumentTable {
    pub primary: Vec<String>,
    pub independent: Vec<String>,
}

impl InstrumentTable {
    pub fn policy_for(&self, instrument: &str) -> InstrumentPolicy {
        let matches = |list: &[String]| list.iter().any(|s| s.eq_ignore_ascii_case(instrument));
        if matches(&self.primary) {
            InstrumentPolicy::Primary
        } else if matches(&self.independent) {
            InstrumentPolicy::Independent
        } else {
            InstrumentPolicy::Dependent
        }
    }
}

/// Every threshold the signal pipeline consults. Passed once per invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    // Series preparation
    pub min_candles: usize,
    pub atr_period: usize,
    pub volume_period: usize,
    pub volatility_window: usize,

    pub detectors: DetectorConfig,
    pub bias: BiasConfig,
    pub instruments: InstrumentTable,

    // Multi-timeframe
    pub ladder: Vec<Timeframe>,
    /// Overrides `Timeframe::default_htf` when set.
    pub htf: Option<Timeframe>,
    pub min_consensus_pct: f64,

    // Entry
    pub entry_weights: EntryWeights,
    pub entry_band_pct: f64,
    pub entry_distance_min_pct: f64,
    pub entry_distance_max_pct: f64,

    // Stop loss
    pub stop_loss_mode: StopLossMode,
    pub sl_buffer_pct: f64,
    pub min_sl_distance_pct: f64,
    pub max_sl_distance_pct: f64,
    pub fallback_atr_multiple: f64,
    pub stop_anchor_kinds: Vec<ZoneKind>,

    // Take profit
    pub tp_multipliers: Vec<f64>,
    pub min_reward_risk: f64,
    pub tp_snap_tolerance_pct: f64,

    // Confidence
    pub scoring: ScoringWeights,
    pub min_confidence: f64,
    pub sweep_horizon_minutes: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            min_candles: 50,
            atr_period: 14,
            volume_period: 20,
            volatility_window: 10,
            detectors: DetectorConfig::default(),
            bias: BiasConfig::default(),
            instruments: InstrumentTable::default(),
            ladder: vec![Timeframe::M15, Timeframe::H1, Timeframe::H4, Timeframe::D1],
            htf: None,
            min_consensus_pct: 50.0,
            entry_weights: EntryWeights::default(),
            entry_band_pct: 0.001,
            entry_distance_min_pct: 0.005,
            entry_distance_max_pct: 0.03,
            stop_loss_mode: StopLossMode::Strict,
            sl_buffer_pct: 0.002,
            min_sl_distance_pct: 0.03,
            max_sl_distance_pct: 0.10,
            fallback_atr_multiple: 1.5,
            stop_anchor_kinds: vec![
                ZoneKind::OrderBlock,
                ZoneKind::Breaker,
                ZoneKind::Liquidity,
            ],
            tp_multipliers: vec![2.0, 3.0, 5.0],
            min_reward_risk: 3.0,
            tp_snap_tolerance_pct: 0.003,
            scoring: ScoringWeights::default(),
            min_confidence: 55.0,
            sweep_horizon_minutes: 240,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> PipelineResult<()> {
        let fail = |msg: String| Err(PipelineError::InvalidConfig(msg));

        if self.min_candles < 3 {
            return fail(format!("min_candles must be >= 3, got {}", self.min_candles));
        }
        if self.atr_period == 0 || self.volume_period == 0 || self.volatility_window < 2 {
            return fail("indicator periods must be positive (volatility window >= 2)".into());
        }
        if self.ladder.is_empty() {
            return fail("timeframe ladder is empty".into());
        }
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return fail(format!("min_confidence {} outside 0..=100", self.min_confidence));
        }
        if !(0.0..=100.0).contains(&self.min_consensus_pct) {
            return fail(format!(
                "min_consensus_pct {} outside 0..=100",
                self.min_consensus_pct
            ));
        }
        for (name, v) in [
            ("sl_buffer_pct", self.sl_buffer_pct),
            ("min_sl_distance_pct", self.min_sl_distance_pct),
            ("entry_band_pct", self.entry_band_pct),
            ("tp_snap_tolerance_pct", self.tp_snap_tolerance_pct),
        ] {
            if !(0.0..1.0).contains(&v) {
                return fail(format!("{name} must be within [0, 1), got {v}"));
            }
        }
        if self.max_sl_distance_pct <= self.min_sl_distance_pct || self.max_sl_distance_pct >= 1.0 {
            return fail("max_sl_distance_pct must exceed min_sl_distance_pct and be < 1".into());
        }
        if self.entry_distance_min_pct > self.entry_distance_max_pct {
            return fail("entry distance window is inverted".into());
        }
        if self.tp_multipliers.len() != 3 {
            return fail(format!(
                "expected 3 take-profit multipliers, got {}",
                self.tp_multipliers.len()
            ));
        }
        if self.tp_multipliers.iter().any(|m| !m.is_finite() || *m <= 0.0) {
            return fail("take-profit multipliers must be positive".into());
        }
        if self.tp_multipliers.windows(2).any(|w| w[1] < w[0]) {
            return fail("take-profit multipliers must be non-decreasing".into());
        }
        if !self.min_reward_risk.is_finite() || self.min_reward_risk <= 0.0 {
            return fail("min_reward_risk must be positive".into());
        }
        if self.fallback_atr_multiple <= 0.0 {
            return fail("fallback_atr_multiple must be positive".into());
        }
        if self.scoring.fundamental_min > self.scoring.fundamental_max
            || self.scoring.ml_min > self.scoring.ml_max
        {
            return fail("external adjustment bounds are inverted".into());
        }
        if self.detectors.displacement_candles == 0 || self.detectors.swing_lookback == 0 {
            return fail("detector windows must be positive".into());
        }
        Ok(())
    }

    pub fn policy_for(&self, instrument: &str) -> InstrumentPolicy {
        self.instruments.policy_for(instrument)
    }
}

/// Process-level settings for the scanner binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub instruments: Vec<String>,
    pub signal_timeframes: Vec<Timeframe>,
    pub data_dir: String,
    pub candle_limit: usize,
    pub invocation_timeout_ms: u64,

    // Duplicate suppression
    pub dedup_cooldown_minutes: i64,
    pub dedup_price_tolerance: f64,

    pub pipeline: PipelineConfig,

    // Logging
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let env = |key: &str, default: &str| -> String {
            std::env::var(key).unwrap_or_else(|_| default.to_string())
        };
        let list = |key: &str, default: &str| -> Vec<String> {
            env(key, default)
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let mut pipeline = PipelineConfig::default();
        pipeline.min_confidence = env("MIN_CONFIDENCE", "55").parse().unwrap_or(55.0);
        pipeline.min_consensus_pct = env("MIN_CONSENSUS", "50").parse().unwrap_or(50.0);
        pipeline.stop_loss_mode =
            StopLossMode::from_str_loose(&env("STOP_LOSS_MODE", "strict")).unwrap_or_default();
        pipeline.sl_buffer_pct = env("SL_BUFFER_PCT", "0.002").parse().unwrap_or(0.002);
        pipeline.min_sl_distance_pct = env("MIN_SL_DISTANCE_PCT", "0.03").parse().unwrap_or(0.03);
        pipeline.min_reward_risk = env("MIN_REWARD_RISK", "3.0").parse().unwrap_or(3.0);
        let multipliers: Vec<f64> = list("TP_MULTIPLIERS", "2,3,5")
            .iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        if multipliers.len() == 3 {
            pipeline.tp_multipliers = multipliers;
        }
        pipeline.instruments = InstrumentTable {
            primary: list("PRIMARY_INSTRUMENTS", "BTCUSDT"),
            independent: list("INDEPENDENT_INSTRUMENTS", ""),
        };

        let signal_timeframes: Vec<Timeframe> = list("SIGNAL_TIMEFRAMES", "1h")
            .iter()
            .filter_map(|s| Timeframe::from_str_loose(s))
            .collect();

        Config {
            instruments: list("INSTRUMENTS", "BTCUSDT,ETHUSDT"),
            signal_timeframes: if signal_timeframes.is_empty() {
                vec![Timeframe::H1]
            } else {
                signal_timeframes
            },
            data_dir: env("DATA_DIR", "data"),
            candle_limit: env("CANDLE_LIMIT", "200").parse().unwrap_or(200),
            invocation_timeout_ms: env("INVOCATION_TIMEOUT_MS", "5000")
                .parse()
                .unwrap_or(5000),
            dedup_cooldown_minutes: env("DEDUP_COOLDOWN_MINUTES", "60").parse().unwrap_or(60),
            dedup_price_tolerance: env("DEDUP_PRICE_TOLERANCE", "0.005")
                .parse()
                .unwrap_or(0.005),
            pipeline,
            log_level: env("LOG_LEVEL", "info"),
        }
    }
}
