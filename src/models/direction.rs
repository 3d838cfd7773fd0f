use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Long => "long",
            Direction::Short => "short",
        }
    }

    /// Order side a delivery layer would show ("BUY" / "SELL").
    pub fn side_label(&self) -> &'static str {
        match self {
            Direction::Long => "BUY",
            Direction::Short => "SELL",
        }
    }

    /// +1 for longs, -1 for shorts. Prices move "in favor" along this sign.
    pub fn sign(&self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    pub fn polarity(&self) -> Polarity {
        match self {
            Direction::Long => Polarity::Bullish,
            Direction::Short => Polarity::Bearish,
        }
    }

    pub fn opposite(&self) -> Direction {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// Directional read of one timeframe. Recomputed per invocation, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
    Ranging,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Bullish => write!(f, "bullish"),
            Bias::Bearish => write!(f, "bearish"),
            Bias::Neutral => write!(f, "neutral"),
            Bias::Ranging => write!(f, "ranging"),
        }
    }
}

impl Bias {
    pub fn to_direction(self) -> Option<Direction> {
        match self {
            Bias::Bullish => Some(Direction::Long),
            Bias::Bearish => Some(Direction::Short),
            Bias::Neutral | Bias::Ranging => None,
        }
    }

    pub fn is_directional(self) -> bool {
        self.to_direction().is_some()
    }

    pub fn from_direction(direction: Direction) -> Self {
        match direction {
            Direction::Long => Bias::Bullish,
            Direction::Short => Bias::Bearish,
        }
    }
}

/// Polarity of a structural zone. Zones are never neutral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Polarity {
    Bullish,
    Bearish,
}

impl fmt::Display for Polarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarity::Bullish => write!(f, "bullish"),
            Polarity::Bearish => write!(f, "bearish"),
        }
    }
}

impl Polarity {
    pub fn flipped(self) -> Polarity {
        match self {
            Polarity::Bullish => Polarity::Bearish,
            Polarity::Bearish => Polarity::Bullish,
        }
    }

    pub fn to_direction(self) -> Direction {
        match self {
            Polarity::Bullish => Direction::Long,
            Polarity::Bearish => Direction::Short,
        }
    }

    pub fn matches(self, direction: Direction) -> bool {
        self == direction.polarity()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwingType {
    High,
    Low,
}

impl fmt::Display for SwingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwingType::High => write!(f, "high"),
            SwingType::Low => write!(f, "low"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BosType {
    #[serde(rename = "bullish_bos")]
    BullishBos,
    #[serde(rename = "bearish_bos")]
    BearishBos,
}

impl fmt::Display for BosType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BosType::BullishBos => write!(f, "bullish_bos"),
            BosType::BearishBos => write!(f, "bearish_bos"),
        }
    }
}

impl BosType {
    pub fn polarity(self) -> Polarity {
        match self {
            BosType::BullishBos => Polarity::Bullish,
            BosType::BearishBos => Polarity::Bearish,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ZoneKind {
    #[serde(rename = "OB")]
    OrderBlock,
    #[serde(rename = "FVG")]
    FairValueGap,
    #[serde(rename = "LIQ")]
    Liquidity,
    #[serde(rename = "BRK")]
    Breaker,
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ZoneKind::OrderBlock => write!(f, "OB"),
            ZoneKind::FairValueGap => write!(f, "FVG"),
            ZoneKind::Liquidity => write!(f, "LIQ"),
            ZoneKind::Breaker => write!(f, "BRK"),
        }
    }
}

/// How far price has revisited a zone since it formed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mitigation {
    Unmitigated,
    Tested,
    HalfFilled,
    Filled,
    /// A close went fully through the zone.
    Invalidated,
}

impl fmt::Display for Mitigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mitigation::Unmitigated => write!(f, "unmitigated"),
            Mitigation::Tested => write!(f, "tested"),
            Mitigation::HalfFilled => write!(f, "half_filled"),
            Mitigation::Filled => write!(f, "filled"),
            Mitigation::Invalidated => write!(f, "invalidated"),
        }
    }
}

impl Mitigation {
    /// Whether a zone in this state can still back an entry.
    pub fn is_active(self) -> bool {
        !matches!(self, Mitigation::Filled | Mitigation::Invalidated)
    }
}

/// Per-instrument bias policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentPolicy {
    /// Benchmark instrument: strictly follows its own higher-timeframe bias.
    Primary,
    /// Ignores the benchmark context, trades its own structure.
    Independent,
    /// Gated on the benchmark's context bias.
    #[default]
    Dependent,
}

impl fmt::Display for InstrumentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentPolicy::Primary => write!(f, "primary"),
            InstrumentPolicy::Independent => write!(f, "independent"),
            InstrumentPolicy::Dependent => write!(f, "dependent"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StopLossMode {
    /// Reject the setup when no structural stop validates.
    #[default]
    Strict,
    /// Substitute an ATR stop and mark the signal non-compliant.
    Fallback,
}

impl fmt::Display for StopLossMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopLossMode::Strict => write!(f, "strict"),
            StopLossMode::Fallback => write!(f, "fallback"),
        }
    }
}

impl StopLossMode {
    pub fn from_str_loose(s: &str) -> Option<StopLossMode> {
        match s.trim().to_lowercase().as_str() {
            "strict" => Some(StopLossMode::Strict),
            "fallback" => Some(StopLossMode::Fallback),
            _ => None,
        }
    }
}
