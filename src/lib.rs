pub mod config;
pub mod core;
pub mod error;
pub mod exchange;
pub mod models;
pub mod scanner;
pub mod strategies;
#[cfg(test)]
pub mod test_helpers;
pub mod trading;
