//! Pre-trade gates for the sniper.
//!
//! - Buy rate limiting
//! - Priority fee sizing
//! - Route liquidity heuristics
//! - Optional rug-pull heuristic

pub mod fees;
pub mod liquidity;
pub mod rugpull;

use std::time::Instant;

use membot_chain::TokenBucket;
use parking_lot::Mutex;

pub use fees::{priority_fee_lamports, sell_tip_lamports};
pub use liquidity::{estimated_liquidity_usd, looks_liquid_enough, quote_is_usable};
pub use rugpull::RugpullCheck;

/// Caps how many new entries may start per second.
#[derive(Debug)]
pub struct BuyLimiter {
    bucket: Mutex<TokenBucket>,
}

impl BuyLimiter {
    /// `max_buys_per_sec` tokens per second, burst of at least one.
    pub fn new(max_buys_per_sec: f64) -> Self {
        Self::starting_at(max_buys_per_sec, Instant::now())
    }

    pub fn starting_at(max_buys_per_sec: f64, now: Instant) -> Self {
        let burst = max_buys_per_sec.max(1.0);
        Self {
            bucket: Mutex::new(TokenBucket::new(max_buys_per_sec, burst, now)),
        }
    }

    /// Take a slot for a new entry. Never waits.
    pub fn try_acquire(&self) -> bool {
        self.try_acquire_at(Instant::now())
    }

    pub fn try_acquire_at(&self, now: Instant) -> bool {
        self.bucket.lock().try_take(now)
    }
}
