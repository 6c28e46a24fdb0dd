//! In-memory trade journal.
//!
//! Every executed buy and sell is appended here; the dashboard reads the
//! summary. Nothing is persisted across restarts.

use chrono::{DateTime, Utc};
use membot_common::TradeSide;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Serialize, Serializer};

/// Number of trades returned in a summary.
const RECENT_TRADES: usize = 10;

/// One executed trade.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeRecord {
    pub mint: String,
    #[serde(rename = "action")]
    pub side: TradeSide,
    /// Token amount in UI units.
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    /// USD per token at execution.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(serialize_with = "unix_seconds")]
    pub timestamp: DateTime<Utc>,
}

/// Fractional unix seconds.
fn unix_seconds<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(timestamp.timestamp_millis() as f64 / 1000.0)
}

impl TradeRecord {
    pub fn notional(&self) -> Decimal {
        self.amount * self.price
    }
}

/// Dashboard view of the journal.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsSummary {
    pub total_trades: usize,
    #[serde(with = "rust_decimal::serde::float")]
    pub profit: Decimal,
    pub trades: Vec<TradeRecord>,
}

/// Append-only trade journal shared between strategies and the dashboard.
#[derive(Debug, Default)]
pub struct TradeAnalytics {
    trades: Mutex<Vec<TradeRecord>>,
}

impl TradeAnalytics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a trade stamped with the current time.
    pub fn record(&self, mint: &str, side: TradeSide, amount: Decimal, price: Decimal) {
        self.record_at(mint, side, amount, price, Utc::now());
    }

    pub fn record_at(&self, mint: &str, side: TradeSide, amount: Decimal, price: Decimal, timestamp: DateTime<Utc>) {
        self.trades.lock().push(TradeRecord {
            mint: mint.to_string(),
            side,
            amount,
            price,
            timestamp,
        });
    }

    /// Sell notional minus buy notional over all recorded trades.
    pub fn profit(&self) -> Decimal {
        self.trades
            .lock()
            .iter()
            .map(|t| match t.side {
                TradeSide::Buy => -t.notional(),
                TradeSide::Sell => t.notional(),
            })
            .sum()
    }

    pub fn len(&self) -> usize {
        self.trades.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> AnalyticsSummary {
        let trades = self.trades.lock();
        let start = trades.len().saturating_sub(RECENT_TRADES);
        let profit = trades
            .iter()
            .map(|t| match t.side {
                TradeSide::Buy => -t.notional(),
                TradeSide::Sell => t.notional(),
            })
            .sum();
        AnalyticsSummary {
            total_trades: trades.len(),
            profit,
            trades: trades[start..].to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_profit_is_sells_minus_buys() {
        let analytics = TradeAnalytics::new();
        analytics.record("MintA", TradeSide::Buy, dec!(1000), dec!(0.01));
        analytics.record("MintB", TradeSide::Buy, dec!(500), dec!(0.02));
        analytics.record("MintA", TradeSide::Sell, dec!(995), dec!(0.012));

        // 995 * 0.012 - (10 + 10)
        assert_eq!(analytics.profit(), dec!(-8.06));
        assert_eq!(analytics.len(), 3);
    }

    #[test]
    fn test_summary_keeps_last_ten() {
        let analytics = TradeAnalytics::new();
        for i in 0..15 {
            analytics.record(&format!("Mint{i}"), TradeSide::Buy, dec!(1), dec!(1));
        }
        let summary = analytics.summary();
        assert_eq!(summary.total_trades, 15);
        assert_eq!(summary.trades.len(), 10);
        assert_eq!(summary.trades[0].mint, "Mint5");
        assert_eq!(summary.trades[9].mint, "Mint14");
        assert_eq!(summary.profit, dec!(-15));
    }

    #[test]
    fn test_empty_summary() {
        let analytics = TradeAnalytics::new();
        assert!(analytics.is_empty());
        let summary = analytics.summary();
        assert_eq!(summary.total_trades, 0);
        assert_eq!(summary.profit, Decimal::ZERO);
        assert!(summary.trades.is_empty());
    }

    #[test]
    fn test_record_serializes_side_as_action() {
        let analytics = TradeAnalytics::new();
        analytics.record("Mint", TradeSide::Sell, dec!(2), dec!(3));
        let json = serde_json::to_value(analytics.summary()).unwrap();
        assert_eq!(json["trades"][0]["action"], "sell");
        assert_eq!(json["total_trades"], 1);
    }

    #[test]
    fn test_summary_numbers_serialize_as_json_numbers() {
        let analytics = TradeAnalytics::new();
        let at = DateTime::from_timestamp_millis(1_700_000_000_250).unwrap();
        analytics.record_at("Mint", TradeSide::Buy, dec!(1000), dec!(0.015), at);
        let json = serde_json::to_value(analytics.summary()).unwrap();

        assert_eq!(json["profit"].as_f64(), Some(-15.0));
        let trade = &json["trades"][0];
        assert_eq!(trade["amount"].as_f64(), Some(1000.0));
        assert_eq!(trade["price"].as_f64(), Some(0.015));
        assert_eq!(trade["timestamp"].as_f64(), Some(1_700_000_000.25));
    }
}
