use chrono::{DateTime, Duration, Utc};

use crate::config::PipelineConfig;
use crate::core::series::{PreparedSeries, SeriesPreparer};
use crate::models::{
    Candle, CandleSeries, Mitigation, Polarity, StructuralZone, Timeframe, ZoneKind, ZoneMeta,
};

fn base_time() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-01-15T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Create candles from (open, high, low, close) tuples with auto-incrementing 1m timestamps.
pub fn make_candles(data: &[(f64, f64, f64, f64)]) -> CandleSeries {
    let with_volume: Vec<_> = data.iter().map(|&(o, h, l, c)| (o, h, l, c, 100.0)).collect();
    make_candles_with_volume(&with_volume)
}

/// Same as `make_candles` with an explicit volume per candle.
pub fn make_candles_with_volume(data: &[(f64, f64, f64, f64, f64)]) -> CandleSeries {
    let base = base_time();
    let candles: Vec<Candle> = data
        .iter()
        .enumerate()
        .map(|(i, &(o, h, l, c, v))| Candle {
            timestamp: base + Duration::minutes(i as i64),
            open: o,
            high: h,
            low: l,
            close: c,
            volume: v,
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

/// Waves of six impulse candles and four pullback candles, each wave
/// netting four steps in the trend direction. Produces clean swings
/// and repeated breaks of structure.
pub fn stair_series(n: usize, start: f64, step: f64, rising: bool) -> CandleSeries {
    let sign = if rising { 1.0 } else { -1.0 };
    let base = base_time();
    let mut prev = start;
    let candles: Vec<Candle> = (0..n)
        .map(|i| {
            let wave = (i / 10) as f64;
            let pos = (i % 10) as f64;
            let wave_base = start + sign * wave * 4.0 * step;
            let price = if pos <= 5.0 {
                wave_base + sign * pos * step
            } else {
                wave_base + sign * (5.0 - (pos - 5.0)) * step
            };
            let open = if i == 0 { price } else { prev };
            prev = price;
            Candle {
                timestamp: base + Duration::minutes(i as i64),
                open,
                high: open.max(price) + 0.3 * step,
                low: open.min(price) - 0.3 * step,
                close: price,
                volume: 100.0,
            }
        })
        .collect();

    CandleSeries::new(candles)
}

/// Prepare any non-empty series, ignoring the minimum-length gate.
pub fn prepare(candles: &CandleSeries) -> PreparedSeries {
    let cfg = PipelineConfig::default();
    let preparer = SeriesPreparer {
        min_candles: 1,
        ..SeriesPreparer::new(&cfg)
    };
    preparer
        .prepare(candles, Timeframe::M15)
        .expect("valid candles")
        .expect("non-empty series")
}

/// Pipeline config with the default thresholds.
pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig::default()
}

/// A fresh, full-strength zone with placeholder metadata for `kind`.
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
