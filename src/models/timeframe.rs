use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Candle interval. Variants are declared finest-first, so the derived `Ord`
/// sorts by interval length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
    #[serde(rename = "1w")]
    W1,
}

const ALL: [Timeframe; 8] = [
    Timeframe::M1,
    Timeframe::M5,
    Timeframe::M15,
    Timeframe::M30,
    Timeframe::H1,
    Timeframe::H4,
    Timeframe::D1,
    Timeframe::W1,
];

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
            Timeframe::W1 => "1w",
        }
    }

    pub fn as_duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::from_secs(60),
            Timeframe::M5 => Duration::from_secs(300),
            Timeframe::M15 => Duration::from_secs(900),
            Timeframe::M30 => Duration::from_secs(1800),
            Timeframe::H1 => Duration::from_secs(3600),
            Timeframe::H4 => Duration::from_secs(14400),
            Timeframe::D1 => Duration::from_secs(86400),
            Timeframe::W1 => Duration::from_secs(604800),
        }
    }

    pub fn from_str_loose(s: &str) -> Option<Timeframe> {
        match s.trim().to_lowercase().as_str() {
            "1m" => Some(Timeframe::M1),
            "5m" => Some(Timeframe::M5),
            "15m" => Some(Timeframe::M15),
            "30m" => Some(Timeframe::M30),
            "1h" => Some(Timeframe::H1),
            "4h" => Some(Timeframe::H4),
            "1d" => Some(Timeframe::D1),
            "1w" => Some(Timeframe::W1),
            _ => None,
        }
    }

    /// Next coarser interval, `None` for the weekly chart.
    pub fn coarser(&self) -> Option<Timeframe> {
        let idx = ALL.iter().position(|tf| tf == self)?;
        ALL.get(idx + 1).copied()
    }

    /// Every interval strictly coarser than this one, finest first.
    pub fn coarser_chain(&self) -> Vec<Timeframe> {
        ALL.iter().copied().filter(|tf| tf > self).collect()
    }

    /// The usual directional-context chart for a signal timeframe.
    pub fn default_htf(&self) -> Timeframe {
        match self {
            Timeframe::M1 | Timeframe::M5 => Timeframe::H1,
            Timeframe::M15 | Timeframe::M30 => Timeframe::H4,
            Timeframe::H1 | Timeframe::H4 => Timeframe::D1,
            Timeframe::D1 | Timeframe::W1 => Timeframe::W1,
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
