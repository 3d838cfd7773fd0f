pub mod bias;
pub mod breakers;
pub mod confidence;
pub mod consensus;
pub mod detector;
pub mod entry;
pub mod fvg;
pub mod liquidity;
pub mod order_blocks;
pub mod series;
pub mod stop_loss;
pub mod structure;
pub mod take_profit;
