//! SOL/USD price from a Jupiter SOL→USDC quote, cached for a short TTL.

use std::time::{Duration, Instant};

use membot_common::{LAMPORTS_PER_SOL, SOL_MINT, USDC_DECIMALS, USDC_MINT};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::jupiter::JupiterClient;

/// Slippage used for the reference quote.
const PRICE_QUOTE_SLIPPAGE_BPS: u16 = 50;

/// Last observed price and when it was observed.
#[derive(Debug, Clone, Copy, Default)]
pub struct PriceCache {
    entry: Option<(Decimal, Instant)>,
}

impl PriceCache {
    /// Cached value if younger than `ttl`.
    pub fn fresh(&self, now: Instant, ttl: Duration) -> Option<Decimal> {
        self.entry
            .filter(|(_, at)| now.saturating_duration_since(*at) < ttl)
            .map(|(price, _)| price)
    }

    /// Cached value regardless of age.
    pub fn last(&self) -> Option<Decimal> {
        self.entry.map(|(price, _)| price)
    }

    pub fn store(&mut self, price: Decimal, now: Instant) {
        self.entry = Some((price, now));
    }
}

/// SOL/USD oracle.
#[derive(Debug)]
pub struct SolPriceOracle {
    jupiter: JupiterClient,
    ttl: Duration,
    fallback: Decimal,
    cache: Mutex<PriceCache>,
}

impl SolPriceOracle {
    pub fn new(jupiter: JupiterClient, ttl: Duration, fallback: Decimal) -> Self {
        Self {
            jupiter,
            ttl,
            fallback,
            cache: Mutex::new(PriceCache::default()),
        }
    }

    /// Current SOL price in USD.
    ///
    /// Never fails: a failed refresh returns the last known price, or the
    /// configured fallback if there is none.
    pub async fn sol_usd(&self) -> Decimal {
        let now = Instant::now();
        if let Some(price) = self.cache.lock().fresh(now, self.ttl) {
            return price;
        }

        match self
            .jupiter
            .quote(SOL_MINT, USDC_MINT, LAMPORTS_PER_SOL, PRICE_QUOTE_SLIPPAGE_BPS)
            .await
        {
            Ok(quote) if quote.out_amount > 0 => {
                let price = usdc_units_to_usd(quote.out_amount);
                debug!("SOL price refreshed: ${price}");
                self.cache.lock().store(price, Instant::now());
                price
            }
            Ok(_) => self.stale_or_fallback("zero out amount"),
            Err(e) => self.stale_or_fallback(&e.to_string()),
        }
    }

    fn stale_or_fallback(&self, reason: &str) -> Decimal {
        let last = self.cache.lock().last();
        warn!("SOL price refresh failed ({reason}), using {}", if last.is_some() { "stale price" } else { "fallback" });
        last.unwrap_or(self.fallback)
    }
}

/// Convert raw USDC units to dollars.
pub fn usdc_units_to_usd(units: u64) -> Decimal {
    Decimal::from(units) / Decimal::from(10u64.pow(USDC_DECIMALS))
}

/// Convert a USD amount to lamports at `sol_usd`. Zero if the price is not positive.
pub fn usd_to_lamports(usd: Decimal, sol_usd: Decimal) -> u64 {
    use rust_decimal::prelude::ToPrimitive;

    if sol_usd <= Decimal::ZERO || usd <= Decimal::ZERO {
        return 0;
    }
    (usd / sol_usd * Decimal::from(LAMPORTS_PER_SOL))
        .floor()
        .to_u64()
        .unwrap_or(0)
}

/// Convert lamports to USD at `sol_usd`.
pub fn lamports_to_usd(lamports: u64, sol_usd: Decimal) -> Decimal {
    Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL) * sol_usd
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cache_freshness() {
        let t0 = Instant::now();
        let mut cache = PriceCache::default();
        assert_eq!(cache.fresh(t0, Duration::from_secs(15)), None);

        cache.store(dec!(150.25), t0);
        assert_eq!(cache.fresh(t0 + Duration::from_secs(14), Duration::from_secs(15)), Some(dec!(150.25)));
        assert_eq!(cache.fresh(t0 + Duration::from_secs(15), Duration::from_secs(15)), None);
        assert_eq!(cache.last(), Some(dec!(150.25)));
    }

    #[test]
    fn test_usdc_units() {
        assert_eq!(usdc_units_to_usd(152_340_000), dec!(152.34));
        assert_eq!(usdc_units_to_usd(0), Decimal::ZERO);
    }

    #[test]
    fn test_usd_to_lamports() {
        assert_eq!(usd_to_lamports(dec!(10), dec!(200)), 50_000_000);
        assert_eq!(usd_to_lamports(dec!(10), Decimal::ZERO), 0);
        assert_eq!(usd_to_lamports(dec!(-1), dec!(200)), 0);
    }

    #[test]
    fn test_lamports_to_usd() {
        assert_eq!(lamports_to_usd(500_000_000, dec!(150)), dec!(75));
    }
}
