//! Shared state for the bot.
//!
//! One `BotState` is built at startup and handed to every task behind an
//! `Arc`. Counters are atomics; the few values that change at runtime from
//! the dashboard sit behind a `parking_lot::RwLock`.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::analytics::TradeAnalytics;
use crate::config::BotConfig;

/// State shared by the strategies, background tasks and the dashboard.
#[derive(Debug)]
pub struct BotState {
    /// Control flags (shutdown, trading enabled).
    pub control: ControlFlags,

    /// Metrics counters for observability.
    pub metrics: MetricsCounters,

    /// Executed trades.
    pub analytics: TradeAnalytics,

    /// Values editable from the dashboard.
    pub tunables: RwLock<RuntimeTunables>,

    /// Time of the last trading action.
    pub activity: ActivityClock,

    /// Static description of the running service.
    pub service: ServiceInfo,
}

impl BotState {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            control: ControlFlags::new(),
            metrics: MetricsCounters::new(),
            analytics: TradeAnalytics::new(),
            tunables: RwLock::new(RuntimeTunables::from_config(config)),
            activity: ActivityClock::new(),
            service: ServiceInfo::from_config(config),
        }
    }

    /// Check if new entries are allowed.
    #[inline]
    pub fn can_trade(&self) -> bool {
        self.control.trading_enabled.load(Ordering::Acquire) && !self.control.is_shutdown_requested()
    }

    /// Copy of the current tunables.
    pub fn tunables(&self) -> RuntimeTunables {
        self.tunables.read().clone()
    }
}

/// Control flags for the trading loops.
#[derive(Debug)]
pub struct ControlFlags {
    /// Global trading enable/disable.
    pub trading_enabled: AtomicBool,

    /// Graceful shutdown requested.
    pub shutdown_requested: AtomicBool,
}

impl ControlFlags {
    /// Create new control flags with trading enabled.
    pub fn new() -> Self {
        Self {
            trading_enabled: AtomicBool::new(true),
            shutdown_requested: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    pub fn is_trading_enabled(&self) -> bool {
        self.trading_enabled.load(Ordering::Acquire)
    }

    pub fn set_trading_enabled(&self, enabled: bool) {
        self.trading_enabled.store(enabled, Ordering::Release);
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters for observability.
#[derive(Debug, Default)]
pub struct MetricsCounters {
    /// Candidates received from the watcher.
    pub candidates_seen: AtomicU64,

    /// Candidates dropped by a gate (age, dedupe, limiter, rugpull).
    pub candidates_rejected: AtomicU64,

    /// Buy attempts that reached the swap step.
    pub buys_attempted: AtomicU64,

    pub buys_succeeded: AtomicU64,

    pub sells_succeeded: AtomicU64,

    /// Sells abandoned after exhausting retries.
    pub sells_failed: AtomicU64,

    /// Empty token accounts closed by the janitor.
    pub atas_closed: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub candidates_seen: u64,
    pub candidates_rejected: u64,
    pub buys_attempted: u64,
    pub buys_succeeded: u64,
    pub sells_succeeded: u64,
    pub sells_failed: u64,
    pub atas_closed: u64,
}

impl MetricsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            candidates_seen: self.candidates_seen.load(Ordering::Relaxed),
            candidates_rejected: self.candidates_rejected.load(Ordering::Relaxed),
            buys_attempted: self.buys_attempted.load(Ordering::Relaxed),
            buys_succeeded: self.buys_succeeded.load(Ordering::Relaxed),
            sells_succeeded: self.sells_succeeded.load(Ordering::Relaxed),
            sells_failed: self.sells_failed.load(Ordering::Relaxed),
            atas_closed: self.atas_closed.load(Ordering::Relaxed),
        }
    }
}

/// Values the dashboard may change while the bot runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RuntimeTunables {
    /// Stairs scalp hold time.
    pub hold_time_secs: f64,
    pub slippage_buy_bps: u16,
    pub slippage_sell_bps: u16,
    /// Ladder stop-loss market cap.
    pub stop_loss_usd: Decimal,
}

impl RuntimeTunables {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            hold_time_secs: config.stairs.scalp_hold.as_secs_f64(),
            slippage_buy_bps: config.trading.slippage_bps_buy,
            slippage_sell_bps: config.trading.slippage_bps_sell,
            stop_loss_usd: config.stairs.ladder.stop_loss,
        }
    }

    pub fn hold_time(&self) -> Duration {
        Duration::from_secs_f64(self.hold_time_secs.max(0.0))
    }
}

/// Records when the bot last traded.
#[derive(Debug)]
pub struct ActivityClock {
    last: Mutex<Instant>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    pub fn note(&self) {
        *self.last.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last.lock().elapsed()
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Service description shown on the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub rpc_url: String,
    pub ws_url: String,
    pub wallet_configured: bool,
    pub watch_program_ids: Vec<String>,
    pub mode: String,
    pub strategy: String,
}

impl ServiceInfo {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            rpc_url: config.network.rpc_url.clone(),
            ws_url: config.network.ws_url.clone(),
            wallet_configured: config.wallet.is_configured(),
            watch_program_ids: config.network.watch_program_ids.clone(),
            mode: config.mode.to_string(),
            strategy: config.strategy.to_string(),
        }
    }
}
