mod common;

use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Duration;

use ict_signal_engine::config::PipelineConfig;
use ict_signal_engine::core::bias::{BiasOutcome, BiasResolver, HtfBias, StructuralRead};
use ict_signal_engine::error::PipelineError;
use ict_signal_engine::exchange::{CandleSource, HistoricalSource};
use ict_signal_engine::models::{
    Bias, CandleSeries, Direction, InstrumentPolicy, StopLossMode, Timeframe, ZoneKind,
};
use ict_signal_engine::scanner::SignalScanner;
use ict_signal_engine::strategies::pipeline::{PipelineInput, SignalPipeline};
use ict_signal_engine::strategies::signals::{HoldReason, PipelineStage};
use ict_signal_engine::trading::dedup::InMemoryDuplicateStore;

use common::*;

fn pipeline() -> SignalPipeline {
    SignalPipeline::new(PipelineConfig::default()).unwrap()
}

// ---- decide: full setups ----

#[test]
fn bullish_setup_yields_buy_with_clamped_stop() {
    let cfg = PipelineConfig::default();
    let outcome = SignalPipeline::new(cfg.clone()).unwrap().decide(&bullish_setup(&cfg));
    let signal = outcome.signal().expect("expected a signal");

    assert_eq!(signal.direction, Direction::Long);
    assert_eq!(signal.entry_price, 102.0);
    assert_eq!(signal.entry_zone.source.kind, ZoneKind::OrderBlock);
    // OB low 100 less the buffer is inside the 3% minimum, so 102 * 0.97
    assert!((signal.stop_loss - 98.94).abs() < 1e-9);
    assert!(signal.stop.clamped);
    assert!(signal.compliant);

    let tp1 = signal.tp1().unwrap();
    assert!((tp1.price - 111.18).abs() < 1e-9);
    assert!(tp1.reward_risk >= cfg.min_reward_risk - 1e-9);
    assert_eq!(signal.take_profits.len(), 3);
    assert!(signal.take_profits.windows(2).all(|w| w[1].price >= w[0].price));

    // 20 BOS + 8 OB + 4 FVG + 18.75 consensus + 8 displacement
    assert!((signal.confidence - 58.75).abs() < 1e-9);
    assert!((signal.consensus.pct - 75.0).abs() < 1e-9);
    assert!(signal.warnings.iter().any(|w| w.contains("minimum distance")));
    assert_eq!(signal.reasoning.len(), 6);
}

#[test]
fn stop_inside_return_noise_is_flagged() {
    let cfg = PipelineConfig::default();
    let mut a = bullish_setup(&cfg);
    a.volatility = 0.05;
    let outcome = SignalPipeline::new(cfg.clone()).unwrap().decide(&a);
    let signal = outcome.signal().expect("expected a signal");

    // 3% stop against 5% return deviation
    assert!((signal.stop_sigma - 0.6).abs() < 1e-9);
    assert!(signal.warnings.iter().any(|w| w.contains("standard deviation")));

    let flat = SignalPipeline::new(cfg.clone()).unwrap().decide(&bullish_setup(&cfg));
    assert_eq!(flat.signal().expect("signal").stop_sigma, 0.0);
}

#[test]
fn bearish_setup_yields_sell() {
    let cfg = PipelineConfig::default();
    let outcome = SignalPipeline::new(cfg.clone()).unwrap().decide(&bearish_setup(&cfg));
    let signal = outcome.signal().expect("expected a signal");

    assert_eq!(signal.direction, Direction::Short);
    assert_eq!(signal.entry_price, 98.0);
    assert!(signal.stop_loss >= 100.0 * 1.002);
    assert!((signal.stop_loss - 98.0 * 1.03).abs() < 1e-9);
    assert!(signal.take_profits.iter().all(|tp| tp.price < signal.entry_price));
    assert!((signal.confidence - 65.0).abs() < 1e-9);
    assert!(signal.entry_zone.distance_compliant);
    assert_eq!(signal.bias, Bias::Bearish);
}

#[test]
fn signal_timestamp_is_analysis_clock() {
    let cfg = PipelineConfig::default();
    let a = bullish_setup(&cfg);
    let outcome = pipeline().decide(&a);
    assert_eq!(outcome.signal().unwrap().generated_at, a.now);
}

#[test]
fn strict_mode_holds_without_structural_stop() {
    let cfg = PipelineConfig::default();
    let outcome = pipeline().decide(&gap_only_setup(&cfg));
    let hold = outcome.hold().expect("expected a hold");
    assert_eq!(hold.reason, HoldReason::StopLossValidationFailed);
    assert_eq!(hold.stage, PipelineStage::EntryZoneResolved);
}

#[test]
fn fallback_mode_emits_non_compliant_signal() {
    let cfg = PipelineConfig {
        stop_loss_mode: StopLossMode::Fallback,
        ..PipelineConfig::default()
    };
    let mut a = gap_only_setup(&cfg);
    // gap-only confluence is 50.75; lift it over the threshold
    a.fundamental_score = Some(8.0);
    let outcome = SignalPipeline::new(cfg).unwrap().decide(&a);
    let signal = outcome.signal().expect("expected a signal");

    assert!(!signal.compliant);
    assert!(signal.stop.reason.starts_with("FALLBACK"));
    // FVG midpoint 103.5 minus 1.5 x ATR 1.2
    assert!((signal.stop_loss - 101.7).abs() < 1e-9);
    assert!(signal.warnings.iter().any(|w| w.contains("non-compliant")));
}

#[test]
fn low_consensus_holds_before_confidence() {
    let cfg = PipelineConfig::default();
    let mut a = bullish_setup(&cfg);
    a.votes = votes(&[Bias::Bullish, Bias::Bullish, Bias::Bearish, Bias::Bearish, Bias::Bearish]);
    let outcome = pipeline().decide(&a);
    assert_eq!(outcome.hold_reason(), Some(HoldReason::ConsensusBelowThreshold));
}

#[test]
fn consensus_exactly_at_threshold_passes() {
    let cfg = PipelineConfig::default();
    let mut a = bullish_setup(&cfg);
    a.votes = votes(&[Bias::Bullish, Bias::Bullish, Bias::Bearish, Bias::Bearish]);
    // 50% consensus: 20 + 8 + 4 + 12.5 + 8 = 52.5, so confidence is what stops it
    let outcome = pipeline().decide(&a);
    assert_eq!(outcome.hold_reason(), Some(HoldReason::ConfidenceBelowThreshold));
}

#[test]
fn ml_adjustment_cannot_push_over_threshold() {
    let cfg = PipelineConfig::default();
    let mut a = bullish_setup(&cfg);
    a.votes = votes(&[Bias::Bullish, Bias::Bullish, Bias::Bearish, Bias::Bearish]);
    a.ml_adjustment = Some(10.0);
    let outcome = pipeline().decide(&a);
    assert_eq!(outcome.hold_reason(), Some(HoldReason::ConfidenceBelowThreshold));
}

#[test]
fn target_levels_snap_take_profits() {
    let cfg = PipelineConfig::default();
    let mut a = bullish_setup(&cfg);
    a.target_levels = vec![111.4];
    let outcome = pipeline().decide(&a);
    let tp1 = outcome.signal().unwrap().tp1().unwrap().clone();
    assert_eq!(tp1.snapped_to, Some(111.4));
    assert_eq!(tp1.price, 111.4);
}

// ---- bias policy ----

fn read(bias: Bias) -> StructuralRead {
    StructuralRead {
        bias,
        ..StructuralRead::neutral()
    }
}

fn htf(bias: Bias) -> HtfBias {
    HtfBias {
        preferred: Timeframe::D1,
        resolved_from: Some(Timeframe::D1),
        bias,
    }
}

#[test]
fn primary_instrument_exits_on_neutral_htf() {
    let r = BiasResolver::new(&PipelineConfig::default());
    let d = r.decide(InstrumentPolicy::Primary, htf(Bias::Neutral), read(Bias::Bullish), None);
    assert!(matches!(d.outcome, BiasOutcome::EarlyExit(_)));
}

#[test]
fn independent_instrument_trades_own_structure() {
    let r = BiasResolver::new(&PipelineConfig::default());
    let d = r.decide(
        InstrumentPolicy::Independent,
        htf(Bias::Bullish),
        read(Bias::Bearish),
        Some(Bias::Bullish),
    );
    assert_eq!(d.direction(), Some(Direction::Short));

    let d = r.decide(
        InstrumentPolicy::Independent,
        htf(Bias::Neutral),
        read(Bias::Bullish),
        Some(Bias::Neutral),
    );
    assert_eq!(d.direction(), Some(Direction::Long));
}

#[test]
fn dependent_instrument_is_gated_by_context() {
    let r = BiasResolver::new(&PipelineConfig::default());

    let gated = r.decide(
        InstrumentPolicy::Dependent,
        htf(Bias::Bearish),
        read(Bias::Bearish),
        Some(Bias::Neutral),
    );
    assert!(matches!(gated.outcome, BiasOutcome::EarlyExit(_)));

    let follows_htf = r.decide(
        InstrumentPolicy::Dependent,
        htf(Bias::Bearish),
        read(Bias::Bullish),
        Some(Bias::Bullish),
    );
    assert_eq!(follows_htf.direction(), Some(Direction::Short));

    let falls_back_to_context = r.decide(
        InstrumentPolicy::Dependent,
        htf(Bias::Neutral),
        read(Bias::Neutral),
        Some(Bias::Bullish),
    );
    assert_eq!(falls_back_to_context.direction(), Some(Direction::Long));
}

#[test]
fn early_exit_decision_becomes_hold() {
    let cfg = PipelineConfig::default();
    let mut a = bullish_setup(&cfg);
    a.bias = BiasResolver::new(&cfg).decide(
        InstrumentPolicy::Primary,
        htf(Bias::Ranging),
        read(Bias::Bullish),
        None,
    );
    let hold = pipeline().decide(&a).hold().cloned().expect("hold");
    assert_eq!(hold.reason, HoldReason::EarlyExitHold);
    assert_eq!(hold.stage, PipelineStage::BiasDetermined);
}

// ---- run: end to end over candles ----

#[test]
fn short_series_holds_with_insufficient_data() {
    let input = PipelineInput::new("BTCUSDT", Timeframe::M15, make_bullish_trend(20, 100.0));
    let outcome = pipeline().run(&input).unwrap();
    let hold = outcome.hold().expect("hold");
    assert_eq!(hold.reason, HoldReason::InsufficientData);
    assert_eq!(hold.stage, PipelineStage::Start);
}

#[test]
fn corrupt_candle_is_an_error() {
    let mut candles = stair_series(80, 100.0, 1.0, true).as_slice().to_vec();
    candles[40].high = candles[40].low - 1.0;
    let input = PipelineInput::new("BTCUSDT", Timeframe::M15, CandleSeries::new(candles));
    assert!(matches!(
        pipeline().run(&input),
        Err(PipelineError::InvalidOhlc { index: 40, .. })
    ));
}

#[test]
fn unordered_timestamps_are_an_error() {
    let mut candles = stair_series(80, 100.0, 1.0, true).as_slice().to_vec();
    candles[30].timestamp = candles[29].timestamp;
    let input = PipelineInput::new("BTCUSDT", Timeframe::M15, CandleSeries::new(candles));
    assert!(matches!(
        pipeline().run(&input),
        Err(PipelineError::UnorderedTimestamps { index: 30 })
    ));
}

#[test]
fn corrupt_auxiliary_series_is_an_error() {
    let mut aux = stair_series(80, 100.0, 4.0, true).as_slice().to_vec();
    aux[10].close = f64::NAN;
    let input = PipelineInput::new("BTCUSDT", Timeframe::M15, stair_series(120, 100.0, 1.0, true))
        .with_auxiliary(Timeframe::H4, CandleSeries::new(aux));
    assert!(matches!(
        pipeline().run(&input),
        Err(PipelineError::NonFiniteValue { field: "close", .. })
    ));
}

#[test]
fn short_auxiliary_series_is_tolerated() {
    let input = PipelineInput::new("BTCUSDT", Timeframe::M15, stair_series(120, 100.0, 1.0, true))
        .with_auxiliary(Timeframe::H4, stair_series(10, 100.0, 4.0, true));
    assert!(pipeline().run(&input).is_ok());
}

/// SOLUSDT trades its own structure, so no HTF series is needed.
fn independent_pipeline() -> SignalPipeline {
    let mut cfg = PipelineConfig::default();
    cfg.instruments.independent = vec!["SOLUSDT".into()];
    SignalPipeline::new(cfg).unwrap()
}

#[test]
fn breakout_above_order_block_yields_buy() {
    let input = PipelineInput::new("SOLUSDT", Timeframe::M15, order_block_breakout(true));
    let outcome = independent_pipeline().run(&input).unwrap();
    let signal = outcome.signal().expect("signal");

    assert_eq!(signal.direction, Direction::Long);
    assert_eq!(signal.entry_zone.source.kind, ZoneKind::OrderBlock);
    assert!((signal.entry_price - 100.8).abs() < 1e-9);
    assert!(signal.stop_loss < 99.5);
    assert!(signal.stop_loss < signal.entry_price);
    // Block low is inside 3% of entry, so the stop is pushed out to it.
    assert!((signal.stop_loss - 100.8 * 0.97).abs() < 1e-9);
    assert!(signal.take_profits[0].reward_risk >= 3.0 - 1e-9);
    assert!(signal.take_profits[0].price > signal.entry_price);
    assert!(signal.compliant);
    assert!(signal.confidence >= 55.0);
    assert_eq!(signal.consensus.pct, 100.0);
    assert!(signal.stop_sigma > 1.0);
    assert!(!signal.warnings.iter().any(|w| w.contains("standard deviation")));
    assert_eq!(signal.generated_at, input.candles.last().unwrap().timestamp);
}

#[test]
fn breakdown_below_order_block_yields_sell() {
    let input = PipelineInput::new("SOLUSDT", Timeframe::M15, order_block_breakout(false));
    let outcome = independent_pipeline().run(&input).unwrap();
    let signal = outcome.signal().expect("signal");

    assert_eq!(signal.direction, Direction::Short);
    assert_eq!(signal.entry_zone.source.kind, ZoneKind::OrderBlock);
    assert!((signal.entry_price - 99.2).abs() < 1e-6);
    assert!(signal.stop_loss > 100.5);
    assert!(signal.stop_loss > signal.entry_price);
    assert!(signal.take_profits[0].reward_risk >= 3.0 - 1e-9);
    assert!(signal.take_profits[0].price < signal.entry_price);
    assert!(signal.confidence >= 55.0);
}

#[test]
fn weekly_primary_does_not_use_its_own_structure_as_htf() {
    let mut cfg = PipelineConfig::default();
    cfg.instruments.primary = vec!["BTCUSDT".into()];
    let input = PipelineInput::new("BTCUSDT", Timeframe::W1, order_block_breakout(true));
    let outcome = SignalPipeline::new(cfg).unwrap().run(&input).unwrap();
    let hold = outcome.hold().expect("hold");
    assert_eq!(hold.reason, HoldReason::EarlyExitHold);
    assert_eq!(hold.stage, PipelineStage::BiasDetermined);
}

#[test]
fn run_is_deterministic() {
    let input = PipelineInput::new("SOLUSDT", Timeframe::M15, order_block_breakout(true))
        .with_auxiliary(Timeframe::H1, stair_series(120, 100.0, 2.0, true))
        .with_auxiliary(Timeframe::H4, stair_series(120, 100.0, 4.0, true))
        .with_auxiliary(Timeframe::D1, stair_series(120, 2000.0, 8.0, false));
    let p = independent_pipeline();
    let first = p.run(&input).expect("first run");
    let second = p.run(&input).expect("second run");

    assert_eq!(first.signal().is_some(), second.signal().is_some());
    assert_eq!(first.hold_reason(), second.hold_reason());
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn as_of_overrides_the_clock() {
    let candles = order_block_breakout(true);
    let as_of = candles.last().unwrap().timestamp + Duration::days(3);
    let mut input = PipelineInput::new("SOLUSDT", Timeframe::M15, candles);
    input.as_of = Some(as_of);

    let outcome = independent_pipeline().run(&input).unwrap();
    let signal = outcome.signal().expect("signal");
    assert_eq!(signal.generated_at, as_of);
}

#[test]
fn invalid_external_inputs_are_rejected() {
    let mut input = PipelineInput::new("BTCUSDT", Timeframe::M15, make_bullish_trend(20, 100.0));
    input.target_levels = vec![-5.0];
    assert!(matches!(
        pipeline().run(&input),
        Err(PipelineError::InvalidExternalInput(_))
    ));

    let input = PipelineInput::new("  ", Timeframe::M15, make_bullish_trend(20, 100.0));
    assert!(pipeline().run(&input).is_err());
}

// ---- scanner ----

struct FailingSource;

#[async_trait]
impl CandleSource for FailingSource {
    async fn fetch_candles(&self, instrument: &str, tf: Timeframe, _limit: usize) -> Result<CandleSeries> {
        anyhow::bail!("feed down for {} {}", instrument, tf)
    }
}

struct SlowSource;

#[async_trait]
impl CandleSource for SlowSource {
    async fn fetch_candles(&self, _instrument: &str, _tf: Timeframe, _limit: usize) -> Result<CandleSeries> {
        tokio::time::sleep(StdDuration::from_millis(500)).await;
        Ok(make_bullish_trend(60, 100.0))
    }
}

#[tokio::test]
async fn scanner_reports_holds_for_short_history() {
    let cfg = scanner_config(&["BTCUSDT", "ETHUSDT"], 5_000);
    let mut source = HistoricalSource::new();
    source.load("BTCUSDT", Timeframe::M15, make_bullish_trend(20, 100.0).as_slice().to_vec());
    source.load("ETHUSDT", Timeframe::M15, make_bullish_trend(20, 200.0).as_slice().to_vec());

    let scanner = SignalScanner::new(
        &cfg,
        SignalPipeline::new(cfg.pipeline.clone()).unwrap(),
        Arc::new(source),
    );
    let mut dedup = InMemoryDuplicateStore::new(60, 0.005);
    let report = scanner.scan_once(&mut dedup).await;

    assert!(report.signals.is_empty());
    assert_eq!(report.holds.len(), 2);
    assert_eq!(report.holds[0].0, "BTCUSDT");
    assert_eq!(report.holds[1].0, "ETHUSDT");
    assert!(report
        .holds
        .iter()
        .all(|(_, _, h)| h.reason == HoldReason::InsufficientData));
    assert!(dedup.is_empty());
}

#[tokio::test]
async fn scanner_skips_failed_fetches() {
    let cfg = scanner_config(&["BTCUSDT", "SOLUSDT"], 5_000);
    let scanner = SignalScanner::new(
        &cfg,
        SignalPipeline::new(cfg.pipeline.clone()).unwrap(),
        Arc::new(FailingSource),
    );
    let mut dedup = InMemoryDuplicateStore::new(60, 0.005);
    let report = scanner.scan_once(&mut dedup).await;

    assert_eq!(report.failed.len(), 2);
    assert!(report.signals.is_empty());
    assert!(report.holds.is_empty());
}

#[tokio::test]
async fn scanner_times_out_slow_pairs() {
    let cfg = scanner_config(&["BTCUSDT"], 50);
    let scanner = SignalScanner::new(
        &cfg,
        SignalPipeline::new(cfg.pipeline.clone()).unwrap(),
        Arc::new(SlowSource),
    );
    let mut dedup = InMemoryDuplicateStore::new(60, 0.005);
    let report = scanner.scan_once(&mut dedup).await;

    assert_eq!(report.timed_out, vec![("BTCUSDT".to_string(), Timeframe::M15)]);
    assert!(report.signals.is_empty());
}
