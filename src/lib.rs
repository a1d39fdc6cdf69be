//! mtftrader: a multi-timeframe strategy execution engine.
//!
//! Hexagonal architecture: domain logic in [`domain`], port traits in [`ports`],
//! concrete implementations in [`adapters`], and the tokio tasks that drive
//! live trading in [`live`].

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod live;
pub mod ports;
