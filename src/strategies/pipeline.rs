use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

use crate::config::PipelineConfig;
use crate::core::bias::{BiasDecision, BiasOutcome, BiasResolver, HtfBias, StructuralRead};
use crate::core::confidence::{ConfidenceScorer, ScoreInput};
use crate::core::consensus::{tally, TimeframeVote};
use crate::core::detector::{StructureScan, StructureSnapshot};
use crate::core::entry::EntryCalculator;
use crate::core::series::{PreparedSeries, SeriesPreparer};
use crate::core::stop_loss::{StopLossEngine, StopMethod};
use crate::core::take_profit::TakeProfitCalculator;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{Bias, CandleSeries, Direction, Timeframe, ZoneRef};
use crate::strategies::signals::{Hold, HoldReason, PipelineOutcome, PipelineStage, Signal};

/// Immutable snapshot the pipeline runs over. Owned by the caller.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub candles: CandleSeries,
    /// Ladder and HTF series. Missing entries are tolerated.
    pub auxiliary: BTreeMap<Timeframe, CandleSeries>,
    /// Bias of the primary/benchmark instrument, for dependent instruments.
    pub context_bias: Option<Bias>,
    pub fundamental_score: Option<f64>,
    pub ml_adjustment: Option<f64>,
    /// External levels take-profit tiers may snap to.
    pub target_levels: Vec<f64>,
    /// Overrides the last candle's timestamp as "now".
    pub as_of: Option<DateTime<Utc>>,
}

impl PipelineInput {
    pub fn new(instrument: impl Into<String>, timeframe: Timeframe, candles: CandleSeries) -> Self {
        Self {
            instrument: instrument.into(),
            timeframe,
            candles,
            auxiliary: BTreeMap::new(),
            context_bias: None,
            fundamental_score: None,
            ml_adjustment: None,
            target_levels: Vec::new(),
            as_of: None,
        }
    }

    pub fn with_auxiliary(mut self, timeframe: Timeframe, candles: CandleSeries) -> Self {
        self.auxiliary.insert(timeframe, candles);
        self
    }

    fn validate(&self) -> PipelineResult<()> {
        if self.instrument.trim().is_empty() {
            return Err(PipelineError::InvalidExternalInput("instrument is empty".into()));
        }
        for (name, v) in [
            ("fundamental_score", self.fundamental_score),
            ("ml_adjustment", self.ml_adjustment),
        ] {
            if v.is_some_and(|x| !x.is_finite()) {
                return Err(PipelineError::InvalidExternalInput(format!("{name} is not finite")));
            }
        }
        if let Some(bad) = self.target_levels.iter().find(|t| !t.is_finite() || **t <= 0.0) {
            return Err(PipelineError::InvalidExternalInput(format!(
                "target level {bad} is not a positive price"
            )));
        }
        Ok(())
    }
}

/// Everything resolved before the entry stage. `decide` runs the rest.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub current_price: f64,
    pub atr: f64,
    /// Standard deviation of recent close-to-close returns.
    pub volatility: f64,
    pub snapshot: StructureSnapshot,
    pub bias: BiasDecision,
    pub votes: Vec<TimeframeVote>,
    pub fundamental_score: Option<f64>,
    pub ml_adjustment: Option<f64>,
    pub target_levels: Vec<f64>,
    pub now: DateTime<Utc>,
}

/// Pure, synchronous signal pipeline. Holds configuration only, so one
/// instance can serve many concurrent invocations.
pub struct SignalPipeline {
    config: PipelineConfig,
    preparer: SeriesPreparer,
    scan: StructureScan,
    bias: BiasResolver,
    entry: EntryCalculator,
    stop_loss: StopLossEngine,
    take_profit: TakeProfitCalculator,
    scorer: ConfidenceScorer,
}

impl SignalPipeline {
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            preparer: SeriesPreparer::new(&config),
            scan: StructureScan::new(&config),
            bias: BiasResolver::new(&config),
            entry: EntryCalculator::new(&config),
            stop_loss: StopLossEngine::new(&config),
            take_profit: TakeProfitCalculator::new(&config),
            scorer: ConfidenceScorer::new(&config),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, input: &PipelineInput) -> PipelineResult<PipelineOutcome> {
        input.validate()?;
        let tag = format!("{} {}", input.instrument, input.timeframe);

        // Start -> SeriesPrepared
        let series = match self.preparer.prepare(&input.candles, input.timeframe)? {
            Some(s) => s,
            None => {
                tracing::debug!(
                    "[PIPELINE] {} insufficient data ({} < {} candles)",
                    tag,
                    input.candles.len(),
                    self.config.min_candles
                );
                return Ok(hold(
                    HoldReason::InsufficientData,
                    PipelineStage::Start,
                    format!(
                        "{} candles, need {}",
                        input.candles.len(),
                        self.config.min_candles
                    ),
                ));
            }
        };

        // SeriesPrepared -> StructureDetected
        let snapshot = self.scan.scan(&series);
        let own = self.read(&series, &snapshot);

        let mut reads = self.auxiliary_reads(input, &tag)?;
        reads.insert(input.timeframe, own);

        // StructureDetected -> BiasDetermined
        let htf = self.bias.resolve_htf(input.timeframe, &reads);
        let policy = self.config.policy_for(&input.instrument);
        let decision = self.bias.decide(policy, htf, own, input.context_bias);

        if let BiasOutcome::EarlyExit(why) = &decision.outcome {
            tracing::debug!("[PIPELINE] {} early exit: {}", tag, why);
            return Ok(hold(HoldReason::EarlyExitHold, PipelineStage::BiasDetermined, why.clone()));
        }

        let votes = self
            .config
            .ladder
            .iter()
            .map(|tf| TimeframeVote {
                timeframe: *tf,
                bias: reads.get(tf).map(|r| r.bias),
            })
            .collect();

        let now = input
            .as_of
            .or_else(|| series.last_timestamp())
            .unwrap_or_default();

        let analysis = Analysis {
            instrument: input.instrument.clone(),
            timeframe: input.timeframe,
            current_price: series.last_close(),
            atr: series.last_atr(),
            volatility: series.last_volatility(),
            snapshot,
            bias: decision,
            votes,
            fundamental_score: input.fundamental_score,
            ml_adjustment: input.ml_adjustment,
            target_levels: input.target_levels.clone(),
            now,
        };
        Ok(self.decide(&analysis))
    }

    /// HTF bias of an instrument on its own, for use as the context bias of
    /// dependent instruments.
    pub fn htf_bias(&self, input: &PipelineInput) -> PipelineResult<HtfBias> {
        input.validate()?;
        let tag = format!("{} {}", input.instrument, input.timeframe);
        let reads = self.auxiliary_reads(input, &tag)?;
        Ok(self.bias.resolve_htf(input.timeframe, &reads))
    }

    /// Structural reads of every usable auxiliary series. Too-short series
    /// are left out; corrupt ones fail the invocation.
    fn auxiliary_reads(
        &self,
        input: &PipelineInput,
        tag: &str,
    ) -> PipelineResult<BTreeMap<Timeframe, StructuralRead>> {
        let mut reads = BTreeMap::new();
        for (tf, candles) in &input.auxiliary {
            if *tf == input.timeframe {
                continue;
            }
            match self.preparer.prepare(candles, *tf)? {
                Some(aux) => {
                    let aux_snapshot = self.scan.scan(&aux);
                    reads.insert(*tf, self.read(&aux, &aux_snapshot));
                }
                None => tracing::debug!("[PIPELINE] {} {} too short, treated as unavailable", tag, tf),
            }
        }
        Ok(reads)
    }

    fn read(&self, series: &PreparedSeries, snapshot: &StructureSnapshot) -> StructuralRead {
        match &snapshot.structure {
            Some(report) => self
                .bias
                .structural(report, &snapshot.zones, series.last_close()),
            None => StructuralRead::neutral(),
        }
    }

    /// Entry, stop, targets, consensus and confidence over a resolved
    /// analysis, ending in a Signal or a Hold.
    pub fn decide(&self, a: &Analysis) -> PipelineOutcome {
        let tag = format!("{} {}", a.instrument, a.timeframe);

        let direction = match &a.bias.outcome {
            BiasOutcome::Proceed(d) => *d,
            BiasOutcome::EarlyExit(why) => {
                return hold(HoldReason::EarlyExitHold, PipelineStage::BiasDetermined, why.clone());
            }
        };

        // BiasDetermined -> EntryZoneResolved
        let entry = match self.entry.select(direction, a.current_price, &a.snapshot.zones) {
            Some(e) => e,
            None => {
                tracing::debug!("[PIPELINE] {} blocked at entry ({} has no zone)", tag, direction);
                return hold(
                    HoldReason::NoEntryZone,
                    PipelineStage::BiasDetermined,
                    format!("no active {} zone on the waiting side of {:.4}", direction, a.current_price),
                );
            }
        };

        // EntryZoneResolved -> StopLossResolved
        let stop = match self
            .stop_loss
            .compute(direction, &entry, &a.snapshot.zones, a.atr)
        {
            Ok(sl) => sl,
            Err(failure) => {
                tracing::debug!("[PIPELINE] {} blocked at stop loss ({})", tag, failure);
                return hold(
                    HoldReason::StopLossValidationFailed,
                    PipelineStage::EntryZoneResolved,
                    failure.to_string(),
                );
            }
        };

        // StopLossResolved -> TakeProfitComputed
        let take_profits = self
            .take_profit
            .compute(direction, entry.price, stop.price, &a.target_levels);
        if take_profits.is_empty() {
            return hold(
                HoldReason::StopLossValidationFailed,
                PipelineStage::StopLossResolved,
                "zero risk between entry and stop",
            );
        }

        // TakeProfitComputed -> ConsensusChecked
        let consensus = tally(direction, &a.votes);
        if !consensus.passes(self.config.min_consensus_pct) {
            tracing::debug!(
                "[PIPELINE] {} blocked at consensus ({:.1}% < {:.1}%)",
                tag,
                consensus.pct,
                self.config.min_consensus_pct
            );
            return hold(
                HoldReason::ConsensusBelowThreshold,
                PipelineStage::TakeProfitComputed,
                format!("{:.1}% < {:.1}%", consensus.pct, self.config.min_consensus_pct),
            );
        }

        // ConsensusChecked -> ConfidenceComputed
        let breakdown = self.scorer.score(&ScoreInput {
            direction,
            snapshot: &a.snapshot,
            consensus_pct: consensus.pct,
            entry_price: entry.price,
            now: a.now,
            fundamental: a.fundamental_score,
            ml_adjustment: a.ml_adjustment,
        });
        if !self.scorer.passes(&breakdown) {
            tracing::debug!(
                "[PIPELINE] {} blocked at confidence ({:.1} < {:.1})",
                tag,
                breakdown.total,
                self.scorer.min_confidence()
            );
            return hold(
                HoldReason::ConfidenceBelowThreshold,
                PipelineStage::ConsensusChecked,
                format!("{:.1} < {:.1}", breakdown.total, self.scorer.min_confidence()),
            );
        }

        // ConfidenceComputed -> SignalAssembled
        let stop_sigma = if a.volatility > 0.0 {
            stop.risk / entry.price / a.volatility
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        if !entry.distance_compliant {
            warnings.push(format!(
                "entry {:.2}% from price, outside the {:.1}%-{:.1}% window",
                entry.distance_pct * 100.0,
                self.config.entry_distance_min_pct * 100.0,
                self.config.entry_distance_max_pct * 100.0
            ));
        }
        if stop.method == StopMethod::VolatilityFallback {
            warnings.push("volatility fallback stop, signal is non-compliant".to_string());
        }
        if a.volatility > 0.0 && stop_sigma < 1.0 {
            warnings.push(format!(
                "stop {:.2}% from entry is inside one standard deviation of recent returns ({:.2}%)",
                stop.risk_pct,
                a.volatility * 100.0
            ));
        }
        if stop.clamped {
            warnings.push(format!(
                "stop widened to the {:.1}% minimum distance",
                self.config.min_sl_distance_pct * 100.0
            ));
        }
        let htf = &a.bias.htf;
        if htf.fell_back() {
            warnings.push(match htf.resolved_from {
                Some(tf) => format!("HTF {} unavailable, used {}", htf.preferred, tf),
                None => format!("no HTF data above {}", a.timeframe),
            });
        }
        if breakdown.ml_suppressed {
            warnings.push(format!(
                "ML adjustment {:+.1} ignored, it would have crossed the confidence threshold",
                breakdown.ml_requested
            ));
        }

        let targets: Vec<String> = take_profits
            .iter()
            .map(|tp| match tp.snapped_to {
                Some(_) => format!("TP{} {:.4} ({:.2}R, snapped)", tp.tier, tp.price, tp.reward_risk),
                None => format!("TP{} {:.4} ({:.2}R)", tp.tier, tp.price, tp.reward_risk),
            })
            .collect();
        let htf_label = htf
            .resolved_from
            .map(|tf| tf.to_string())
            .unwrap_or_else(|| "none".to_string());
        let reasoning = vec![
            format!(
                "Bias: {} policy, HTF {} ({}), own {} ({:+.2}) -> {}",
                a.bias.policy, htf.bias, htf_label, a.bias.own.bias, a.bias.own.score, direction
            ),
            format!(
                "Entry: {} {} [{:.4} - {:.4}] @ {:.4}, {:.2}% from {:.4}",
                entry.source.kind,
                entry.source.polarity,
                entry.source.low,
                entry.source.high,
                entry.price,
                entry.distance_pct * 100.0,
                a.current_price
            ),
            format!(
                "Stop: {:.4} ({}), {:.1} sigma of recent returns",
                stop.price, stop.reason, stop_sigma
            ),
            format!("Targets: {}", targets.join(", ")),
            format!("Consensus: {}", consensus.summary()),
            format!("Confidence: {}", breakdown.summary()),
        ];

        let components = components(direction, &entry.source.zone_ref(), stop.anchor, &a.snapshot);

        let signal = Signal {
            instrument: a.instrument.clone(),
            timeframe: a.timeframe,
            direction,
            entry_price: entry.price,
            stop_loss: stop.price,
            stop_sigma,
            compliant: stop.is_compliant(),
            take_profits,
            confidence: breakdown.total,
            breakdown,
            consensus,
            bias: a.bias.resolved_bias(),
            bias_decision: a.bias.clone(),
            components,
            reasoning,
            warnings,
            generated_at: a.now,
            entry_zone: entry,
            stop,
        };

        tracing::info!("[PIPELINE] {}", signal.headline());
        PipelineOutcome::Signal(Box::new(signal))
    }
}

fn hold(reason: HoldReason, stage: PipelineStage, detail: impl Into<String>) -> PipelineOutcome {
    PipelineOutcome::Hold(Hold::new(reason, stage, detail))
}

/// Entry source, stop anchor, then every other active zone backing the trade.
fn components(
    direction: Direction,
    entry: &ZoneRef,
    anchor: Option<ZoneRef>,
    snapshot: &StructureSnapshot,
) -> Vec<ZoneRef> {
    let mut refs = vec![*entry];
    for r in anchor
        .into_iter()
        .chain(
            snapshot
                .zones
                .iter()
                .filter(|z| z.is_active() && z.supports(direction))
                .map(|z| z.zone_ref()),
        )
    {
        if !refs.contains(&r) {
            refs.push(r);
        }
    }
    refs
}
