//! Core domain types and logic.

pub mod ohlcv;
pub mod error;
pub mod indicator;
pub mod indicator_helpers;
pub mod pattern;
pub mod condition;
pub mod condition_parser;
pub mod condition_eval;
pub mod strategy;
pub mod engine;
pub mod backtest;
pub mod metrics;
pub mod position;
pub mod portfolio;
pub mod sizing;
pub mod signals;
pub mod config_validation;
