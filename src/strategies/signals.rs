use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::bias::BiasDecision;
use crate::core::confidence::ConfidenceBreakdown;
use crate::core::consensus::ConsensusReport;
use crate::core::entry::EntryZone;
use crate::core::stop_loss::StopLoss;
use crate::core::take_profit::TakeProfit;
use crate::models::{Bias, Direction, Timeframe, ZoneRef};

/// Machine-readable reason for a Hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HoldReason {
    InsufficientData,
    EarlyExitHold,
    NoEntryZone,
    StopLossValidationFailed,
    ConsensusBelowThreshold,
    ConfidenceBelowThreshold,
}

impl fmt::Display for HoldReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HoldReason::InsufficientData => "InsufficientData",
            HoldReason::EarlyExitHold => "EarlyExitHold",
            HoldReason::NoEntryZone => "NoEntryZone",
            HoldReason::StopLossValidationFailed => "StopLossValidationFailed",
            HoldReason::ConsensusBelowThreshold => "ConsensusBelowThreshold",
            HoldReason::ConfidenceBelowThreshold => "ConfidenceBelowThreshold",
        };
        write!(f, "{s}")
    }
}

/// Orchestrator states, in the order they are reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipelineStage {
    Start,
    SeriesPrepared,
    StructureDetected,
    BiasDetermined,
    EntryZoneResolved,
    StopLossResolved,
    TakeProfitComputed,
    ConsensusChecked,
    ConfidenceComputed,
    SignalAssembled,
}

/// A "no good setup" outcome. Not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hold {
    pub reason: HoldReason,
    /// Last stage completed before the hold.
    pub stage: PipelineStage,
    pub detail: String,
}

impl Hold {
    pub fn new(reason: HoldReason, stage: PipelineStage, detail: impl Into<String>) -> Self {
        Self {
            reason,
            stage,
            detail: detail.into(),
        }
    }
}

/// What the duplicate store compares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalKey {
    pub instrument: String,
    pub direction: Direction,
    pub timeframe: Timeframe,
    pub entry_price: f64,
    pub timestamp: DateTime<Utc>,
}

/// The pipeline's only durable output. Immutable once assembled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub instrument: String,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub entry_price: f64,
    pub entry_zone: EntryZone,
    pub stop_loss: f64,
    pub stop: StopLoss,
    /// Stop distance in standard deviations of recent returns, 0 when the
    /// returns were flat.
    pub stop_sigma: f64,
    pub take_profits: Vec<TakeProfit>,
    /// 0..=100
    pub confidence: f64,
    pub breakdown: ConfidenceBreakdown,
    pub consensus: ConsensusReport,
    pub bias: Bias,
    pub bias_decision: BiasDecision,
    pub components: Vec<ZoneRef>,
    /// False when the stop came from the volatility fallback.
    pub compliant: bool,
    pub reasoning: Vec<String>,
    pub warnings: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

impl Signal {
    pub fn key(&self) -> SignalKey {
        SignalKey {
            instrument: self.instrument.clone(),
            direction: self.direction,
            timeframe: self.timeframe,
            entry_price: self.entry_price,
            timestamp: self.generated_at,
        }
    }

    pub fn tp1(&self) -> Option<&TakeProfit> {
        self.take_profits.first()
    }

    /// One-line summary for logs and delivery.
    pub fn headline(&self) -> String {
        let tps: Vec<String> = self
            .take_profits
            .iter()
            .map(|tp| format!("TP{} {:.2}", tp.tier, tp.price))
            .collect();
        format!(
            "{} {} {} @ {:.2} | SL {:.2} | {} | conf {:.1}{}",
            self.direction.side_label(),
            self.instrument,
            self.timeframe,
            self.entry_price,
            self.stop_loss,
            tps.join(" / "),
            self.confidence,
            if self.compliant { "" } else { " | NON-COMPLIANT" }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Signal(Box<Signal>),
    Hold(Hold),
}

impl PipelineOutcome {
    pub fn signal(&self) -> Option<&Signal> {
        match self {
            PipelineOutcome::Signal(s) => Some(s),
            PipelineOutcome::Hold(_) => None,
        }
    }

    pub fn hold(&self) -> Option<&Hold> {
        match self {
            PipelineOutcome::Hold(h) => Some(h),
            PipelineOutcome::Signal(_) => None,
        }
    }

    pub fn hold_reason(&self) -> Option<HoldReason> {
        self.hold().map(|h| h.reason)
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, PipelineOutcome::Signal(_))
    }
}
