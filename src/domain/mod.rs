//! Core domain types and logic.

pub mod backtest;
pub mod bar;
pub mod bar_aggregator;
pub mod condition;
pub mod condition_eval;
pub mod condition_parser;
pub mod config_validation;
pub mod error;
pub mod execution;
pub mod indicator;
pub mod indicator_engine;
pub mod notification;
pub mod orchestrator;
pub mod order;
pub mod position;
pub mod reconcile;
pub mod resampler;
pub mod strategy;
pub mod strategy_loader;
pub mod timeframe;
