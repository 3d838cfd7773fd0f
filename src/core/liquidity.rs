use crate::config::DetectorConfig;
use crate::core::detector::ZoneDetector;
use crate::core::series::PreparedSeries;
use crate::models::{
    CandleSeries, Mitigation, Polarity, StructuralZone, SweepEvent, ZoneKind, ZoneMeta,
};

/// Equal highs / equal lows. Clusters of swing points within a price
/// tolerance become liquidity zones once they collect enough touches.
///
/// Clustered lows carry sell-side liquidity and read as bullish zones;
/// clustered highs carry buy-side liquidity and read as bearish zones.
#[derive(Debug, Clone)]
pub struct LiquidityMapper {
    swing_lookback: usize,
    tolerance_pct: f64,
    min_touches: usize,
    sweep_window: usize,
}

/// One swing point feeding a cluster.
#[derive(Debug, Clone, Copy)]
struct Touch {
    price: f64,
    index: usize,
}

impl LiquidityMapper {
    pub fn new(cfg: &DetectorConfig) -> Self {
        Self {
            swing_lookback: cfg.liquidity_swing_lookback.max(1),
            tolerance_pct: cfg.liquidity_tolerance_pct,
            min_touches: cfg.liquidity_min_touches.max(1),
            sweep_window: cfg.sweep_window.max(1),
        }
    }

    /// Sweeps of the given liquidity zones: price trades through the zone,
    /// then closes back on the zone's side within the sweep window. Only the
    /// latest sweep of each zone is reported; a close held beyond the zone
    /// for the whole window ends the scan of that zone.
    pub fn sweeps(&self, series: &PreparedSeries, zones: &[StructuralZone]) -> Vec<SweepEvent> {
        let candles = series.candles();
        let len = candles.len();
        let mut events = Vec::new();

        for zone in zones.iter().filter(|z| z.kind == ZoneKind::Liquidity) {
            let mut latest = None;
            let mut j = zone.origin_index + 1;
            while j < len {
                let pierced = match zone.polarity {
                    Polarity::Bullish => candles[j].low < zone.low,
                    Polarity::Bearish => candles[j].high > zone.high,
                };
                if !pierced {
                    j += 1;
                    continue;
                }

                let end = (j + self.sweep_window).min(len - 1);
                let mut extreme = match zone.polarity {
                    Polarity::Bullish => f64::INFINITY,
                    Polarity::Bearish => f64::NEG_INFINITY,
                };
                let mut reversal_at = None;
                for k in j..=end {
                    let c = &candles[k];
                    extreme = match zone.polarity {
                        Polarity::Bullish => extreme.min(c.low),
                        Polarity::Bearish => extreme.max(c.high),
                    };
                    let reclaimed = match zone.polarity {
                        Polarity::Bullish => c.close > zone.low,
                        Polarity::Bearish => c.close < zone.high,
                    };
                    if reclaimed {
                        reversal_at = Some(k);
                        break;
                    }
                }

                // Accepted beyond the zone: a break, not a sweep.
                let Some(k) = reversal_at else { break };

                let reversal = (candles[k].close - extreme).abs();
                let atr = series.atr_at(k);
                let size_score = if atr > 0.0 {
                    (reversal / (2.0 * atr)).min(1.0)
                } else {
                    0.0
                };
                let speed_score = 1.0 - (k - j) as f64 / (self.sweep_window + 1) as f64;

                latest = Some(SweepEvent {
                    zone: zone.zone_ref(),
                    polarity: zone.polarity,
                    extreme,
                    strength: (0.5 * size_score + 0.5 * speed_score).clamp(0.0, 1.0),
                    index: k,
                    timestamp: candles[k].timestamp,
                });
                j = k + 1;
            }
            events.extend(latest);
        }

        events.sort_by_key(|e| e.index);
        tracing::trace!("[LIQ] {} sweeps on {}", events.len(), series.timeframe);
        events
    }

    fn find_swings(&self, candles: &CandleSeries) -> (Vec<Touch>, Vec<Touch>) {
        let lb = self.swing_lookback;
        let len = candles.len();
        let mut highs = Vec::new();
        let mut lows = Vec::new();
        if len <= lb * 2 {
            return (highs, lows);
        }

        for i in lb..(len - lb) {
            let window = (i - lb)..=(i + lb);
            if window.clone().all(|j| j == i || candles[j].high <= candles[i].high) {
                highs.push(Touch {
                    price: candles[i].high,
                    index: i,
                });
            }
            if window.clone().all(|j| j == i || candles[j].low >= candles[i].low) {
                lows.push(Touch {
                    price: candles[i].low,
                    index: i,
                });
            }
        }
        (highs, lows)
    }

    /// Greedy clustering against the running cluster average.
    fn cluster(&self, touches: &[Touch]) -> Vec<Vec<Touch>> {
        let mut used = vec![false; touches.len()];
        let mut clusters = Vec::new();

        for i in 0..touches.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            let mut members = vec![touches[i]];

            for j in (i + 1)..touches.len() {
                if used[j] {
                    continue;
                }
                let avg = members.iter().map(|t| t.price).sum::<f64>() / members.len() as f64;
                if (touches[j].price - avg).abs() / avg <= self.tolerance_pct {
                    members.push(touches[j]);
                    used[j] = true;
                }
            }

            if members.len() >= self.min_touches {
                clusters.push(members);
            }
        }
        clusters
    }

    fn build(&self, series: &PreparedSeries, members: &[Touch], polarity: Polarity) -> StructuralZone {
        let candles = series.candles();
        let high = members.iter().map(|t| t.price).fold(f64::NEG_INFINITY, f64::max);
        let low = members.iter().map(|t| t.price).fold(f64::INFINITY, f64::min);
        let last = members.iter().map(|t| t.index).max().unwrap_or(0);
        let touches = members.len();

        let mut swept = false;
        let mut mitigation = Mitigation::Unmitigated;
        for c in candles.as_slice().iter().skip(last + 1) {
            let (closed_through, pierced) = match polarity {
                Polarity::Bullish => (c.close < low, c.low < low),
                Polarity::Bearish => (c.close > high, c.high > high),
            };
            if closed_through {
                mitigation = Mitigation::Invalidated;
                swept = true;
                break;
            }
            if pierced {
                swept = true;
                mitigation = Mitigation::Tested;
            }
        }

        StructuralZone {
            kind: ZoneKind::Liquidity,
            polarity,
            high,
            low,
            strength: (0.5 + 0.15 * (touches as f64 - 1.0)).min(1.0),
            mitigation,
            origin_index: last,
            timestamp: candles[last].timestamp,
            timeframe: series.timeframe,
            meta: ZoneMeta::Liquidity { touches, swept },
        }
    }
}

impl ZoneDetector for LiquidityMapper {
    fn kind(&self) -> ZoneKind {
        ZoneKind::Liquidity
    }

    fn detect(&self, series: &PreparedSeries) -> Vec<StructuralZone> {
        let (highs, lows) = self.find_swings(series.candles());

        let mut zones: Vec<StructuralZone> = self
            .cluster(&lows)
            .iter()
            .map(|m| self.build(series, m, Polarity::Bullish))
            .collect();
        zones.extend(
            self.cluster(&highs)
                .iter()
                .map(|m| self.build(series, m, Polarity::Bearish)),
        );
        zones.sort_by_key(|z| z.origin_index);

        tracing::trace!("[LIQ] {} zones on {}", zones.len(), series.timeframe);
        zones
    }
}
