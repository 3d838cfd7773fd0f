pub mod candle;
pub mod direction;
pub mod timeframe;
pub mod zone;

pub use candle::{Candle, CandleSeries};
pub use direction::*;
pub use timeframe::Timeframe;
pub use zone::{StructuralZone, SweepEvent, ZoneMeta, ZoneRef};
