use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{BiasConfig, EntryWeights, PipelineConfig};
use crate::core::structure::StructureReport;
use crate::models::{Bias, Direction, InstrumentPolicy, Polarity, StructuralZone, Timeframe};

/// Same-timeframe bias from swing breaks and weighted zone presence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructuralRead {
    pub bias: Bias,
    /// -1..=1, positive is bullish.
    pub score: f64,
    pub structure_component: f64,
    pub zone_component: f64,
}

impl StructuralRead {
    pub fn neutral() -> Self {
        Self {
            bias: Bias::Neutral,
            score: 0.0,
            structure_component: 0.0,
            zone_component: 0.0,
        }
    }
}

/// Higher-timeframe context and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HtfBias {
    pub preferred: Timeframe,
    /// Timeframe actually used; `None` when nothing coarser was available.
    pub resolved_from: Option<Timeframe>,
    pub bias: Bias,
}

impl HtfBias {
    pub fn fell_back(&self) -> bool {
        self.resolved_from != Some(self.preferred)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BiasOutcome {
    Proceed(Direction),
    EarlyExit(String),
}

/// Result of applying the instrument policy to HTF, own and context bias.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BiasDecision {
    pub policy: InstrumentPolicy,
    pub htf: HtfBias,
    pub own: StructuralRead,
    pub context: Option<Bias>,
    pub outcome: BiasOutcome,
}

impl BiasDecision {
    pub fn direction(&self) -> Option<Direction> {
        match self.outcome {
            BiasOutcome::Proceed(d) => Some(d),
            BiasOutcome::EarlyExit(_) => None,
        }
    }

    /// Bias reported on the signal: the direction taken.
    pub fn resolved_bias(&self) -> Bias {
        self.direction().map(Bias::from_direction).unwrap_or(Bias::Neutral)
    }
}

#[derive(Debug, Clone)]
pub struct BiasResolver {
    config: BiasConfig,
    weights: EntryWeights,
    htf_override: Option<Timeframe>,
}

impl BiasResolver {
    pub fn new(cfg: &PipelineConfig) -> Self {
        Self {
            config: cfg.bias.clone(),
            weights: cfg.entry_weights.clone(),
            htf_override: cfg.htf,
        }
    }

    /// Step B: blend the structural trend with the weighted balance of
    /// active bullish vs bearish zones.
    pub fn structural(
        &self,
        report: &StructureReport,
        zones: &[StructuralZone],
        last_close: f64,
    ) -> StructuralRead {
        let structure_component = match report.trend {
            Bias::Bullish => 1.0,
            Bias::Bearish => -1.0,
            _ => 0.0,
        };

        let (signed, total) = zones
            .iter()
            .filter(|z| z.is_active())
            .fold((0.0, 0.0), |(signed, total), z| {
                let w = z.strength * self.weights.weight(z.kind);
                let sign = match z.polarity {
                    Polarity::Bullish => 1.0,
                    Polarity::Bearish => -1.0,
                };
                (signed + sign * w, total + w)
            });
        let zone_component = if total > 0.0 { signed / total } else { 0.0 };

        let score = self.config.structure_weight * structure_component
            + self.config.zone_weight * zone_component;

        let bias = if score >= self.config.threshold {
            Bias::Bullish
        } else if score <= -self.config.threshold {
            Bias::Bearish
        } else if report.is_two_sided()
            && report
                .dealing_range
                .as_ref()
                .is_some_and(|dr| dr.is_mid_range(last_close))
        {
            Bias::Ranging
        } else {
            Bias::Neutral
        };

        StructuralRead {
            bias,
            score,
            structure_component,
            zone_component,
        }
    }

    /// Step A: the configured (or default) HTF, else the next coarser one
    /// that has data. Only timeframes above `subject` qualify, so a weekly
    /// subject never reads its own structure as context.
    pub fn resolve_htf(
        &self,
        subject: Timeframe,
        reads: &BTreeMap<Timeframe, StructuralRead>,
    ) -> HtfBias {
        let preferred = self.htf_override.unwrap_or_else(|| subject.default_htf());
        if preferred <= subject {
            tracing::debug!("[BIAS] HTF {} is not above {}, skipping it", preferred, subject);
        }
        let resolved = std::iter::once(preferred)
            .chain(preferred.coarser_chain())
            .filter(|tf| *tf > subject)
            .find_map(|tf| reads.get(&tf).map(|r| (tf, r.bias)));

        match resolved {
            Some((tf, bias)) => {
                if tf != preferred {
                    tracing::debug!("[BIAS] HTF {} unavailable, using {}", preferred, tf);
                }
                HtfBias {
                    preferred,
                    resolved_from: Some(tf),
                    bias,
                }
            }
            None => {
                tracing::debug!("[BIAS] no HTF data above {}", subject);
                HtfBias {
                    preferred,
                    resolved_from: None,
                    bias: Bias::Neutral,
                }
            }
        }
    }

    /// Step C.
    pub fn decide(
        &self,
        policy: InstrumentPolicy,
        htf: HtfBias,
        own: StructuralRead,
        context: Option<Bias>,
    ) -> BiasDecision {
        let outcome = match policy {
            InstrumentPolicy::Primary => match htf.bias.to_direction() {
                Some(d) => BiasOutcome::Proceed(d),
                None => BiasOutcome::EarlyExit(format!("primary instrument with {} HTF bias", htf.bias)),
            },
            InstrumentPolicy::Independent => match own.bias.to_direction() {
                Some(d) => BiasOutcome::Proceed(d),
                None => BiasOutcome::EarlyExit(format!("own structural bias is {}", own.bias)),
            },
            InstrumentPolicy::Dependent => {
                let gate = context.unwrap_or(htf.bias);
                match gate.to_direction() {
                    Some(gate_dir) => {
                        BiasOutcome::Proceed(htf.bias.to_direction().unwrap_or(gate_dir))
                    }
                    None => BiasOutcome::EarlyExit(format!("context bias is {gate}")),
                }
            }
        };

        BiasDecision {
            policy,
            htf,
            own,
            context,
            outcome,
        }
    }
}
