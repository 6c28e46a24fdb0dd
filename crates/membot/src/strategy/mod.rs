//! Entry and exit strategies.
//!
//! - `sniper`: classic coordinator, buy immediately and hand off to the seller
//! - `seller`: due-time ordered sell scheduler with retries
//! - `stairs`: spike/jump-triggered rounds managed by the mcap ladders
//!
//! Strategies read prices through the `Market` trait and trade through an
//! `Executor`, so both seams can be swapped for paper trading and tests.

pub mod ladder;
pub mod mcap;
pub mod seller;
pub mod sniper;
pub mod spike;
pub mod stairs;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use async_trait::async_trait;
use membot_chain::{JupiterClient, JupiterError, Quote, SolPriceOracle};
use rust_decimal::Decimal;

pub use ladder::{DynamicLadder, ExitReason, LadderStep, MilestoneLadder};
pub use mcap::McapEstimator;
pub use seller::{SellJob, SellScheduler};
pub use sniper::Coordinator;
pub use stairs::StairsDispatcher;

/// Quotes and the SOL price.
#[async_trait]
pub trait Market: Send + Sync {
    async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64, slippage_bps: u16) -> Result<Quote, JupiterError>;

    /// SOL price in USD. Never fails; implementations fall back to a stale value.
    async fn sol_usd(&self) -> Decimal;
}

/// `Market` backed by the Jupiter API.
#[derive(Debug)]
pub struct JupiterMarket {
    jupiter: JupiterClient,
    oracle: Arc<SolPriceOracle>,
}

impl JupiterMarket {
    pub fn new(jupiter: JupiterClient, oracle: Arc<SolPriceOracle>) -> Self {
        Self { jupiter, oracle }
    }
}

#[async_trait]
impl Market for JupiterMarket {
    async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64, slippage_bps: u16) -> Result<Quote, JupiterError> {
        self.jupiter.quote(input_mint, output_mint, amount, slippage_bps).await
    }

    async fn sol_usd(&self) -> Decimal {
        self.oracle.sol_usd().await
    }
}

/// Token amount in UI units and USD price per token for a SOL/token fill.
pub fn fill_price(token_raw: u64, lamports: u64, decimals: u32, sol_usd: Decimal) -> (Decimal, Decimal) {
    let scale = Decimal::from(10u64.saturating_pow(decimals.min(18)));
    let amount = Decimal::from(token_raw) / scale;
    if amount.is_zero() {
        return (amount, Decimal::ZERO);
    }
    let usd = membot_chain::lamports_to_usd(lamports, sol_usd);
    (amount, usd / amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fill_price() {
        // 1000 tokens (6 decimals) for 0.1 SOL at $150 => $0.015 each
        let (amount, price) = fill_price(1_000_000_000, 100_000_000, 6, dec!(150));
        assert_eq!(amount, dec!(1000));
        assert_eq!(price, dec!(0.015));
    }

    #[test]
    fn test_fill_price_zero_tokens() {
        assert_eq!(fill_price(0, 100, 6, dec!(150)), (Decimal::ZERO, Decimal::ZERO));
    }
}
