//! Core domain types and logic.

pub mod ohlcv;
pub mod indicator;
pub mod indicator_cache;
pub mod regime;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod signal;
pub mod position;
pub mod risk;
pub mod strategy;
pub mod config_validation;
pub mod engine;
pub mod error;
