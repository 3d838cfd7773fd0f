use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::exchange::CandleSource;
use crate::models::{Bias, InstrumentPolicy, Timeframe};
use crate::strategies::pipeline::{PipelineInput, SignalPipeline};
use crate::strategies::signals::{Hold, PipelineOutcome, Signal};
use crate::trading::dedup::DuplicateStore;

/// How one (instrument, timeframe) invocation ended.
#[derive(Debug, Clone)]
pub enum PairOutcome {
    Finished(PipelineOutcome),
    /// Exceeded the invocation timeout. Treated like a hold.
    TimedOut,
    /// Fetch failure or corrupt input. Logged and skipped.
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct PairResult {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub outcome: PairOutcome,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub signals: Vec<Signal>,
    pub holds: Vec<(String, Timeframe, Hold)>,
    pub timed_out: Vec<(String, Timeframe)>,
    pub failed: Vec<(String, Timeframe, String)>,
    pub duplicates: usize,
}

/// Runs the pipeline for every configured (instrument, timeframe) pair
/// concurrently, each under its own timeout.
pub struct SignalScanner {
    pipeline: Arc<SignalPipeline>,
    source: Arc<dyn CandleSource>,
    instruments: Vec<String>,
    timeframes: Vec<Timeframe>,
    candle_limit: usize,
    timeout: Duration,
}

impl SignalScanner {
    pub fn new(cfg: &Config, pipeline: SignalPipeline, source: Arc<dyn CandleSource>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            source,
            instruments: cfg.instruments.clone(),
            timeframes: cfg.signal_timeframes.clone(),
            candle_limit: cfg.candle_limit,
            timeout: Duration::from_millis(cfg.invocation_timeout_ms.max(1)),
        }
    }

    /// Ladder timeframes plus the HTF fallback chain of `tf`.
    fn auxiliary_timeframes(&self, tf: Timeframe) -> BTreeSet<Timeframe> {
        let cfg = self.pipeline.config();
        let htf = cfg.htf.unwrap_or_else(|| tf.default_htf());
        cfg.ladder
            .iter()
            .copied()
            .chain(std::iter::once(htf))
            .chain(htf.coarser_chain())
            .filter(|t| *t != tf)
            .collect()
    }

    pub async fn scan_once(&self, dedup: &mut dyn DuplicateStore) -> ScanReport {
        let contexts = self.context_biases().await;

        let mut tasks = JoinSet::new();
        for instrument in &self.instruments {
            for &tf in &self.timeframes {
                let instrument = instrument.clone();
                let pipeline = Arc::clone(&self.pipeline);
                let source = Arc::clone(&self.source);
                let aux_tfs = self.auxiliary_timeframes(tf);
                let context = contexts.get(&tf).copied();
                let limit = self.candle_limit;
                let timeout = self.timeout;

                tasks.spawn(async move {
                    let work = evaluate(pipeline, source, instrument.clone(), tf, aux_tfs, limit, context);
                    let outcome = match tokio::time::timeout(timeout, work).await {
                        Ok(outcome) => outcome,
                        Err(_) => PairOutcome::TimedOut,
                    };
                    PairResult {
                        instrument,
                        timeframe: tf,
                        outcome,
                    }
                });
            }
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(r) => results.push(r),
                Err(e) => warn!("[SCAN] task panicked: {}", e),
            }
        }
        // Completion order is arbitrary; dedup must not depend on it.
        results.sort_by(|a, b| {
            a.instrument
                .cmp(&b.instrument)
                .then(a.timeframe.cmp(&b.timeframe))
        });

        let mut report = ScanReport::default();
        for r in results {
            match r.outcome {
                PairOutcome::Finished(PipelineOutcome::Signal(signal)) => {
                    let key = signal.key();
                    if dedup.is_duplicate(&key, signal.generated_at) {
                        debug!("[SCAN] duplicate suppressed: {}", signal.headline());
                        report.duplicates += 1;
                        continue;
                    }
                    dedup.record(key, signal.generated_at);
                    report.signals.push(*signal);
                }
                PairOutcome::Finished(PipelineOutcome::Hold(hold)) => {
                    debug!(
                        "[SCAN] {} {} hold: {} ({})",
                        r.instrument, r.timeframe, hold.reason, hold.detail
                    );
                    report.holds.push((r.instrument, r.timeframe, hold));
                }
                PairOutcome::TimedOut => {
                    warn!(
                        "[SCAN] {} {} timed out after {:?}, treated as hold",
                        r.instrument, r.timeframe, self.timeout
                    );
                    report.timed_out.push((r.instrument, r.timeframe));
                }
                PairOutcome::Failed(e) => {
                    warn!("[SCAN] {} {} skipped: {}", r.instrument, r.timeframe, e);
                    report.failed.push((r.instrument, r.timeframe, e));
                }
            }
        }

        info!(
            "[SCAN] {} signals, {} holds, {} timeouts, {} failures, {} duplicates",
            report.signals.len(),
            report.holds.len(),
            report.timed_out.len(),
            report.failed.len(),
            report.duplicates
        );
        report
    }

    /// HTF bias of the first configured primary instrument, per timeframe.
    async fn context_biases(&self) -> BTreeMap<Timeframe, Bias> {
        let cfg = self.pipeline.config();
        let Some(primary) = self
            .instruments
            .iter()
            .find(|i| cfg.policy_for(i) == InstrumentPolicy::Primary)
            .cloned()
        else {
            return BTreeMap::new();
        };

        let mut out = BTreeMap::new();
        for &tf in &self.timeframes {
            let aux_tfs = self.auxiliary_timeframes(tf);
            let work = async {
                let input = fetch_input(self.source.as_ref(), &primary, tf, &aux_tfs, self.candle_limit)
                    .await
                    .map_err(|e| format!("fetch failed: {e:#}"))?;
                let pipeline = Arc::clone(&self.pipeline);
                match tokio::task::spawn_blocking(move || pipeline.htf_bias(&input)).await {
                    Ok(Ok(htf)) => Ok::<_, String>(htf),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(e) => Err(format!("task panicked: {e}")),
                }
            };
            match tokio::time::timeout(self.timeout, work).await {
                Ok(Ok(htf)) => {
                    debug!("[SCAN] context {} {}: {}", primary, tf, htf.bias);
                    out.insert(tf, htf.bias);
                }
                Ok(Err(e)) => warn!("[SCAN] context for {} {} unavailable: {}", primary, tf, e),
                Err(_) => warn!("[SCAN] context for {} {} timed out", primary, tf),
            }
        }
        out
    }
}

async fn fetch_input(
    source: &dyn CandleSource,
    instrument: &str,
    tf: Timeframe,
    aux_tfs: &BTreeSet<Timeframe>,
    limit: usize,
) -> Result<PipelineInput> {
    let candles = source.fetch_candles(instrument, tf, limit).await?;
    let mut input = PipelineInput::new(instrument, tf, candles);
    for &aux in aux_tfs {
        match source.fetch_candles(instrument, aux, limit).await {
            Ok(series) if !series.is_empty() => {
                input.auxiliary.insert(aux, series);
            }
            Ok(_) => debug!("[SCAN] {} {} returned no candles", instrument, aux),
            Err(e) => debug!("[SCAN] {} {} unavailable: {}", instrument, aux, e),
        }
    }
    Ok(input)
}

async fn evaluate(
    pipeline: Arc<SignalPipeline>,
    source: Arc<dyn CandleSource>,
    instrument: String,
    tf: Timeframe,
    aux_tfs: BTreeSet<Timeframe>,
    limit: usize,
    context: Option<Bias>,
) -> PairOutcome {
    let mut input = match fetch_input(source.as_ref(), &instrument, tf, &aux_tfs, limit).await {
        Ok(input) => input,
        Err(e) => return PairOutcome::Failed(format!("fetch failed: {e:#}")),
    };
    input.context_bias = context;

    match tokio::task::spawn_blocking(move || pipeline.run(&input)).await {
        Ok(Ok(outcome)) => PairOutcome::Finished(outcome),
        Ok(Err(e)) => PairOutcome::Failed(e.to_string()),
        Err(e) => PairOutcome::Failed(format!("pipeline task panicked: {e}")),
    }
}
