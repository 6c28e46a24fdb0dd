//! In-memory `Market` and `TradeFlow` for strategy tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use membot_chain::{JupiterError, Quote};
use membot_common::SOL_MINT;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde_json::json;

use super::Market;
use super::spike::TradeFlow;

const TOKEN_SCALE: u128 = 1_000_000;

/// Prices are lamports per whole token (6 decimals). At $150 SOL and a
/// supply of 1e9 tokens the market cap is `price * 150` USD.
#[derive(Debug)]
pub struct FakeMarket {
    sol_usd: Decimal,
    prices: Mutex<HashMap<String, u64>>,
    failures: AtomicU32,
    quotes: AtomicU32,
}

impl FakeMarket {
    pub fn new(sol_usd: Decimal) -> Self {
        Self {
            sol_usd,
            prices: Mutex::new(HashMap::new()),
            failures: AtomicU32::new(0),
            quotes: AtomicU32::new(0),
        }
    }

    pub fn set_price_lamports(&self, mint: &str, lamports: u64) {
        self.prices.lock().insert(mint.to_string(), lamports);
    }

    /// Price the mint so the estimated market cap is `mcap_usd`.
    pub fn set_mcap_usd(&self, mint: &str, mcap_usd: Decimal) {
        let lamports = (mcap_usd / self.sol_usd).floor().to_u64().unwrap_or(0);
        self.set_price_lamports(mint, lamports);
    }

    /// Fail the next `n` quote requests.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn quote_count(&self) -> u32 {
        self.quotes.load(Ordering::SeqCst)
    }

    fn price(&self, mint: &str) -> Option<u64> {
        self.prices.lock().get(mint).copied()
    }
}

#[async_trait]
impl Market for FakeMarket {
    async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64, _slippage_bps: u16) -> Result<Quote, JupiterError> {
        self.quotes.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(JupiterError::Status {
                status: 503,
                body: "unavailable".to_string(),
            });
        }

        let out_amount = if input_mint == SOL_MINT {
            let price = self.price(output_mint).filter(|p| *p > 0).ok_or_else(no_route)?;
            (amount as u128 * TOKEN_SCALE / price as u128) as u64
        } else {
            let price = self.price(input_mint).ok_or_else(no_route)?;
            (amount as u128 * price as u128 / TOKEN_SCALE) as u64
        };

        Ok(Quote {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            in_amount: amount,
            out_amount,
            price_impact_pct: Some(Decimal::new(1, 2)),
            raw: json!({}),
        })
    }

    async fn sol_usd(&self) -> Decimal {
        self.sol_usd
    }
}

fn no_route() -> JupiterError {
    JupiterError::Malformed("no route".to_string())
}

/// Scripted trade flow.
#[derive(Debug, Default)]
pub struct FakeFlow {
    pub spike: AtomicBool,
    pub next_pop: AtomicBool,
    pub spike_delay: Duration,
    pub spike_checks: AtomicU32,
}

impl FakeFlow {
    pub fn new(spike: bool, next_pop: bool) -> Self {
        Self {
            spike: AtomicBool::new(spike),
            next_pop: AtomicBool::new(next_pop),
            ..Default::default()
        }
    }

    pub fn with_spike_delay(mut self, delay: Duration) -> Self {
        self.spike_delay = delay;
        self
    }
}

#[async_trait]
impl TradeFlow for FakeFlow {
    async fn detect_spike(&self, _mint: &str) -> bool {
        self.spike_checks.fetch_add(1, Ordering::SeqCst);
        if !self.spike_delay.is_zero() {
            tokio::time::sleep(self.spike_delay).await;
        }
        self.spike.load(Ordering::SeqCst)
    }

    async fn wait_for_next_pop(&self, _mint: &str, _timeout: Duration) -> bool {
        self.next_pop.load(Ordering::SeqCst)
    }
}
