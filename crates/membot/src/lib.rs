//! Solana new-token sniper.
//!
//! Watches program logs for freshly created mints, buys them through Jupiter
//! and exits either after a fixed hold (classic) or by walking a market-cap
//! ladder (stairs). An axum dashboard exposes status, analytics and the
//! tunables that may change at runtime.
//!
//! ## Modules
//!
//! - `config`: TOML, environment and CLI configuration
//! - `state`: shared control flags, metrics and tunables
//! - `watcher`: candidate discovery from `logsSubscribe`
//! - `strategy`: classic coordinator, sell scheduler and stairs rounds
//! - `executor`: live and paper trade execution
//! - `risk`: rate limiting, liquidity, fee and rug heuristics
//! - `janitor`: rent reclaim from empty token accounts
//! - `analytics`: in-memory trade log
//! - `dashboard`: HTTP endpoints

pub mod analytics;
pub mod config;
pub mod dashboard;
pub mod executor;
pub mod janitor;
pub mod risk;
pub mod state;
pub mod strategy;
pub mod watcher;

pub use analytics::{AnalyticsSummary, TradeAnalytics, TradeRecord};
pub use config::{BotConfig, StrategyMode, TradingMode};
pub use executor::{Executor, ExecutorError};
pub use state::{BotState, ControlFlags, MetricsCounters, MetricsSnapshot, RuntimeTunables, ServiceInfo};
