pub mod pipeline;
pub mod signals;
