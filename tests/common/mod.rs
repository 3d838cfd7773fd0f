#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use ict_signal_engine::config::{Config, PipelineConfig};
use ict_signal_engine::core::bias::{BiasResolver, HtfBias, StructuralRead};
use ict_signal_engine::core::consensus::TimeframeVote;
use ict_signal_engine::core::detector::StructureSnapshot;
use ict_signal_engine::core::order_blocks::Displacement;
use ict_signal_engine::core::structure::{BosEvent, StructureReport};
use ict_signal_engine::models::{
    Bias, BosType, Candle, CandleSeries, InstrumentPolicy, Mitigation, Polarity, StructuralZone,
    Timeframe, ZoneKind, ZoneMeta,
};
use ict_signal_engine::strategies::pipeline::Analysis;

pub fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Create candles from (open, high, low, close) tuples with auto-incrementing 1m timestamps.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let base = base_time();
    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Candle {
            timestamp: base + Duration::minutes(i as i64),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: 100.0,
        })
        .collect();

    CandleSeries::new(candles)
}

/// Create n rising (bullish) candles starting from `start` price.
pub fn make_bullish_trend(n: usize, start: f64) -> CandleSeries {
    let base = base_time();
    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let open = start + i as f64 * 10.0;
            let close = open + 8.0;
            Candle {
                timestamp: base + Duration::minutes(i as i64),
                open,
                high: close + 2.0,
                low: open - 1.0,
                close,
                volume: 100.0,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// Waves of six impulse and four pullback candles with a heavier volume
/// on every wave's first impulse, so swings, breaks and order blocks appear.
pub fn stair_series(n: usize, start: f64, step: f64, rising: bool) -> CandleSeries {
    let sign = if rising { 1.0 } else { -1.0 };
    let base = base_time();
    let mut prev = start;
    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let wave = (i / 10) as f64;
            let pos = i % 10;
            let wave_base = start + sign * wave * 4.0 * step;
            let price = if pos <= 5 {
                wave_base + sign * pos as f64 * step
            } else {
                wave_base + sign * (10 - pos) as f64 * step
            };
            let open = if i == 0 { price } else { prev };
            prev = price;
            Candle {
                timestamp: base + Duration::minutes(15 * i as i64),
                open,
                high: open.max(price) + 0.3 * step,
                low: open.min(price) - 0.3 * step,
                close: price,
                volume: if pos == 1 { 250.0 } else { 100.0 },
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// Fifty quiet candles, a down-close block, a high-volume breakout of its
/// high and five drifting candles after it, 15 minutes apart. The breakout
/// leaves an order block at [99.5, 100.8], two gaps above it and a bullish
/// break of structure; price finishes at 103.4. With `bullish` false the
/// whole series is mirrored through 100, giving a bearish block at
/// [99.2, 100.5] under a finishing price of 96.6.
pub fn order_block_breakout(bullish: bool) -> CandleSeries {
    let mut data: Vec<(f64, f64, f64, f64, f64)> =
        (0..50).map(|_| (100.0, 100.4, 99.6, 100.1, 100.0)).collect();
    data.extend_from_slice(&[
        (100.5, 100.8, 99.5, 99.8, 100.0),
        (99.8, 101.5, 99.7, 101.4, 250.0),
        (101.4, 103.0, 101.3, 102.9, 100.0),
        (102.9, 103.3, 102.7, 103.0, 100.0),
        (103.0, 103.4, 102.8, 103.1, 100.0),
        (103.1, 103.5, 102.9, 103.2, 100.0),
        (103.2, 103.6, 103.0, 103.3, 100.0),
        (103.3, 103.7, 103.1, 103.4, 100.0),
    ]);

    let base = base_time();
    let candles = data
        .into_iter()
        .enumerate()
        .map(|(i, (o, h, l, c, volume))| {
            let (open, high, low, close) = if bullish {
                (o, h, l, c)
            } else {
                (200.0 - o, 200.0 - l, 200.0 - h, 200.0 - c)
            };
            Candle {
                timestamp: base + Duration::minutes(15 * i as i64),
                open,
                high,
                low,
                close,
                volume,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// A fresh zone with placeholder metadata for `kind`.
pub fn zone(kind: ZoneKind, polarity: Polarity, low: f64, high: f64) -> StructuralZone {
    let meta = match kind {
        ZoneKind::OrderBlock => ZoneMeta::OrderBlock {
            displacement_pct: 0.02,
            volume_ratio: 1.8,
        },
        ZoneKind::FairValueGap => ZoneMeta::FairValueGap {
            gap_size: high - low,
            fill_ratio: 0.0,
        },
        ZoneKind::Liquidity => ZoneMeta::Liquidity {
            touches: 2,
            swept: false,
        },
        ZoneKind::Breaker => ZoneMeta::Breaker {
            invalidated_at: base_time(),
        },
    };
    StructuralZone {
        kind,
        polarity,
        high,
        low,
        strength: 0.8,
        mitigation: Mitigation::Unmitigated,
        origin_index: 10,
        timestamp: base_time(),
        timeframe: Timeframe::M15,
        meta,
    }
}

pub const LADDER: [Timeframe; 5] = [
    Timeframe::M15,
    Timeframe::H1,
    Timeframe::H4,
    Timeframe::D1,
    Timeframe::W1,
];

pub fn votes(biases: &[Bias]) -> Vec<TimeframeVote> {
    LADDER
        .iter()
        .zip(biases)
        .map(|(tf, bias)| TimeframeVote {
            timeframe: *tf,
            bias: Some(*bias),
        })
        .collect()
}

fn snapshot(polarity: Polarity, zones: Vec<StructuralZone>) -> StructureSnapshot {
    let (bos_type, trend) = match polarity {
        Polarity::Bullish => (BosType::BullishBos, Bias::Bullish),
        Polarity::Bearish => (BosType::BearishBos, Bias::Bearish),
    };
    StructureSnapshot {
        zones,
        sweeps: vec![],
        displacements: vec![Displacement {
            polarity,
            index: 45,
            body: 3.0,
            atr_multiple: 2.5,
            timestamp: base_time(),
        }],
        structure: Some(StructureReport {
            swing_highs: vec![],
            swing_lows: vec![],
            bos_events: vec![BosEvent {
                bos_type,
                level: 100.0,
                index: 44,
                timestamp: base_time(),
            }],
            trend,
            dealing_range: None,
        }),
    }
}

fn analysis(
    cfg: &PipelineConfig,
    bias: Bias,
    current_price: f64,
    zones: Vec<StructuralZone>,
    ladder: &[Bias],
) -> Analysis {
    let polarity = match bias {
        Bias::Bearish => Polarity::Bearish,
        _ => Polarity::Bullish,
    };
    let own = StructuralRead {
        bias,
        score: if polarity == Polarity::Bullish { 1.0 } else { -1.0 },
        structure_component: 1.0,
        zone_component: 1.0,
    };
    let htf = HtfBias {
        preferred: Timeframe::H4,
        resolved_from: Some(Timeframe::H4),
        bias,
    };
    Analysis {
        instrument: "BTCUSDT".into(),
        timeframe: Timeframe::M15,
        current_price,
        atr: 1.2,
        volatility: 0.0,
        snapshot: snapshot(polarity, zones),
        bias: BiasResolver::new(cfg).decide(InstrumentPolicy::Primary, htf, own, None),
        votes: votes(ladder),
        fundamental_score: None,
        ml_adjustment: None,
        target_levels: vec![],
        now: base_time() + Duration::hours(1),
    }
}

/// Bullish HTF, bullish OB [100, 102] and FVG [103, 104] below a price of
/// 105, three of four ladder timeframes bullish.
pub fn bullish_setup(cfg: &PipelineConfig) -> Analysis {
    analysis(
        cfg,
        Bias::Bullish,
        105.0,
        vec![
            zone(ZoneKind::OrderBlock, Polarity::Bullish, 100.0, 102.0),
            zone(ZoneKind::FairValueGap, Polarity::Bullish, 103.0, 104.0),
        ],
        &[Bias::Bullish, Bias::Bullish, Bias::Bullish, Bias::Bearish],
    )
}

/// Bearish HTF, bearish OB [98, 100] and FVG [97, 97.6] above a price of
/// 96.5, every ladder timeframe bearish.
pub fn bearish_setup(cfg: &PipelineConfig) -> Analysis {
    analysis(
        cfg,
        Bias::Bearish,
        96.5,
        vec![
            zone(ZoneKind::OrderBlock, Polarity::Bearish, 98.0, 100.0),
            zone(ZoneKind::FairValueGap, Polarity::Bearish, 97.0, 97.6),
        ],
        &[Bias::Bearish; 4],
    )
}

/// Bullish setup whose only zone is a gap, so no structural stop exists.
pub fn gap_only_setup(cfg: &PipelineConfig) -> Analysis {
    analysis(
        cfg,
        Bias::Bullish,
        105.0,
        vec![zone(ZoneKind::FairValueGap, Polarity::Bullish, 103.0, 104.0)],
        &[Bias::Bullish, Bias::Bullish, Bias::Bullish, Bias::Bearish],
    )
}

pub fn scanner_config(instruments: &[&str], timeout_ms: u64) -> Config {
    let mut pipeline = PipelineConfig::default();
    pipeline.instruments.primary = vec!["BTCUSDT".into()];
    Config {
        instruments: instruments.iter().map(|s| s.to_string()).collect(),
        signal_timeframes: vec![Timeframe::M15],
        data_dir: String::new(),
        candle_limit: 200,
        invocation_timeout_ms: timeout_ms,
        dedup_cooldown_minutes: 60,
        dedup_price_tolerance: 0.005,
        pipeline,
        log_level: "info".into(),
    }
}
