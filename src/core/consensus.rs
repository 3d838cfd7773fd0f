use serde::{Deserialize, Serialize};

use crate::models::{Bias, Direction, Timeframe};

/// One ladder timeframe's vote. `None` means no data for that timeframe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeframeVote {
    pub timeframe: Timeframe,
    pub bias: Option<Bias>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusReport {
    pub aligned: usize,
    pub conflicting: usize,
    pub neutral: usize,
    pub unavailable: usize,
    /// 0..=100
    pub pct: f64,
    pub votes: Vec<TimeframeVote>,
}

impl ConsensusReport {
    pub fn passes(&self, min_pct: f64) -> bool {
        self.pct >= min_pct
    }

    pub fn summary(&self) -> String {
        format!(
            "{:.1}% ({} aligned, {} conflicting, {} neutral, {} unavailable)",
            self.pct, self.aligned, self.conflicting, self.neutral, self.unavailable
        )
    }
}

/// Neutral, ranging and unavailable timeframes stay out of the denominator.
pub fn tally(direction: Direction, votes: &[TimeframeVote]) -> ConsensusReport {
    let mut report = ConsensusReport {
        aligned: 0,
        conflicting: 0,
        neutral: 0,
        unavailable: 0,
        pct: 0.0,
        votes: votes.to_vec(),
    };

    for vote in votes {
        match vote.bias.and_then(|b| b.to_direction()) {
            Some(d) if d == direction => report.aligned += 1,
            Some(_) => report.conflicting += 1,
            None if vote.bias.is_none() => report.unavailable += 1,
            None => report.neutral += 1,
        }
    }

    let counted = report.aligned + report.conflicting;
    if counted > 0 {
        report.pct = report.aligned as f64 / counted as f64 * 100.0;
    }
    report
}
