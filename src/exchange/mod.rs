pub mod historical;

pub use historical::HistoricalSource;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{CandleSeries, Timeframe};

/// Market-data collaborator. Retries and staleness are its concern; the
/// pipeline only ever sees the returned snapshot.
#[async_trait]
pub trait CandleSource: Send + Sync {
    async fn fetch_candles(
        &self,
        instrument: &str,
        tf: Timeframe,
        limit: usize,
    ) -> Result<CandleSeries>;
}
