use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ict_signal_engine::config::Config;
use ict_signal_engine::exchange::HistoricalSource;
use ict_signal_engine::scanner::SignalScanner;
use ict_signal_engine::strategies::pipeline::SignalPipeline;
use ict_signal_engine::trading::dedup::InMemoryDuplicateStore;

#[tokio::main]
async fn main() -> Result<()> {
    let cfg = Config::from_env();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .init();

    info!(
        "[MAIN] scanning {} instruments on {:?} from {}",
        cfg.instruments.len(),
        cfg.signal_timeframes,
        cfg.data_dir
    );

    let pipeline = SignalPipeline::new(cfg.pipeline.clone())?;
    let source = Arc::new(HistoricalSource::from_dir(&cfg.data_dir));
    let scanner = SignalScanner::new(&cfg, pipeline, source);
    let mut dedup = InMemoryDuplicateStore::new(cfg.dedup_cooldown_minutes, cfg.dedup_price_tolerance);

    let report = scanner.scan_once(&mut dedup).await;
    for signal in &report.signals {
        info!("[MAIN] {}", signal.headline());
        println!("{}", serde_json::to_string_pretty(signal)?);
    }
    for (instrument, tf, hold) in &report.holds {
        info!("[MAIN] {} {} HOLD {}: {}", instrument, tf, hold.reason, hold.detail);
    }

    Ok(())
}
