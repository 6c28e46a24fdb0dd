//! Market-cap estimation from Jupiter quotes.
//!
//! Price per token is the SOL received for selling one whole token, valued
//! at the cached SOL price; market cap is that price times total supply.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use membot_common::{LAMPORTS_PER_SOL, SOL_MINT};
use rust_decimal::Decimal;
use tracing::debug;

use super::Market;
use crate::config::McapConfig;

/// USD price of one token given the lamports quoted for it.
pub fn price_per_token_usd(out_lamports: u64, sol_usd: Decimal) -> Decimal {
    Decimal::from(out_lamports) / Decimal::from(LAMPORTS_PER_SOL) * sol_usd
}

/// Market-cap estimator with a per-mint price cache.
pub struct McapEstimator {
    market: Arc<dyn Market>,
    supply: Decimal,
    decimals: u32,
    min_interval: Duration,
    slippage_bps: u16,
    cache: DashMap<String, (Instant, Decimal)>,
}

impl McapEstimator {
    pub fn new(market: Arc<dyn Market>, config: &McapConfig, slippage_bps: u16) -> Self {
        Self {
            market,
            supply: config.token_total_supply,
            decimals: config.token_decimals,
            min_interval: config.quote_min_interval,
            slippage_bps,
            cache: DashMap::new(),
        }
    }

    /// Estimated market cap in USD; None when no price is available.
    pub async fn mcap_usd(&self, mint: &str) -> Option<Decimal> {
        let price = self.price_usd(mint).await?;
        let mcap = price * self.supply;
        (mcap > Decimal::ZERO).then_some(mcap)
    }

    /// USD price of one whole token, reusing a recent quote.
    pub async fn price_usd(&self, mint: &str) -> Option<Decimal> {
        if let Some(entry) = self.cache.get(mint)
            && entry.0.elapsed() < self.min_interval
        {
            return Some(entry.1).filter(|p| *p > Decimal::ZERO);
        }

        let one_token = 10u64.checked_pow(self.decimals)?;
        let quote = match self.market.quote(mint, SOL_MINT, one_token, self.slippage_bps).await {
            Ok(quote) => quote,
            Err(e) => {
                debug!("Price quote for {mint} failed: {e}");
                return None;
            }
        };
        let sol_usd = self.market.sol_usd().await;
        let price = price_per_token_usd(quote.out_amount, sol_usd);
        self.cache.insert(mint.to_string(), (Instant::now(), price));
        (price > Decimal::ZERO).then_some(price)
    }

    /// Drop the cached price for `mint`.
    pub fn forget(&self, mint: &str) {
        self.cache.remove(mint);
    }
}
