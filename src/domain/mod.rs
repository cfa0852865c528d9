//! Core simulation types and engines.

pub mod ohlcv;
pub mod position;
pub mod order;
pub mod intent;
pub mod stats;
pub mod costs;
pub mod risk;
pub mod performance;
pub mod strategy;
#[cfg(feature = "checkpoint")]
pub mod checkpoint;
pub mod backtest;
pub mod config_validation;
pub mod error;
