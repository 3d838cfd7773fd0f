use chrono::{DateTime, Duration, Utc};

use crate::strategies::signals::SignalKey;

/// Externally owned record of signals already emitted.
pub trait DuplicateStore: Send {
    fn is_duplicate(&self, key: &SignalKey, now: DateTime<Utc>) -> bool;
    fn record(&mut self, key: SignalKey, now: DateTime<Utc>);
}

/// Same instrument, direction and timeframe, entry within a relative price
/// tolerance, recorded less than `cooldown` ago.
pub struct InMemoryDuplicateStore {
    cooldown: Duration,
    price_tolerance: f64,
    seen: Vec<(SignalKey, DateTime<Utc>)>,
}

impl InMemoryDuplicateStore {
    pub fn new(cooldown_minutes: i64, price_tolerance: f64) -> Self {
        Self {
            cooldown: Duration::minutes(cooldown_minutes.max(0)),
            price_tolerance: price_tolerance.max(0.0),
            seen: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    fn same_setup(&self, a: &SignalKey, b: &SignalKey) -> bool {
        a.instrument.eq_ignore_ascii_case(&b.instrument)
            && a.direction == b.direction
            && a.timeframe == b.timeframe
            && (a.entry_price - b.entry_price).abs() <= self.price_tolerance * b.entry_price.abs()
    }
}

impl DuplicateStore for InMemoryDuplicateStore {
    fn is_duplicate(&self, key: &SignalKey, now: DateTime<Utc>) -> bool {
        self.seen
            .iter()
            .any(|(prev, at)| now - *at < self.cooldown && self.same_setup(key, prev))
    }

    fn record(&mut self, key: SignalKey, now: DateTime<Utc>) {
        let cooldown = self.cooldown;
        self.seen.retain(|(_, at)| now - *at < cooldown);
        self.seen.push((key, now));
    }
}
