//! End-to-end classic flow against the paper executor: a candidate goes
//! through the coordinator, gets bought, and the sell scheduler exits it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use membot::analytics::TradeAnalytics;
use membot::config::BotConfig;
use membot::executor::{Executor, PaperExecutor};
use membot::state::BotState;
use membot::strategy::seller::SellerConfig;
use membot::strategy::sniper::SniperConfig;
use membot::strategy::{Coordinator, Market, SellScheduler};
use membot_chain::{JupiterError, Quote};
use membot_common::{Candidate, SOL_MINT, TradeSide, unix_now};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use tokio::sync::{broadcast, mpsc};

const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

/// One token priced at a fixed number of lamports per whole token.
struct FixedMarket {
    lamports_per_token: u128,
}

#[async_trait]
impl Market for FixedMarket {
    async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64, _slippage_bps: u16) -> Result<Quote, JupiterError> {
        let out_amount = if input_mint == SOL_MINT {
            amount as u128 * 1_000_000 / self.lamports_per_token
        } else {
            amount as u128 * self.lamports_per_token / 1_000_000
        };
        Ok(Quote {
            input_mint: input_mint.to_string(),
            output_mint: output_mint.to_string(),
            in_amount: amount,
            out_amount: out_amount as u64,
            price_impact_pct: Some(dec!(0.02)),
            raw: json!({}),
        })
    }

    async fn sol_usd(&self) -> Decimal {
        dec!(150)
    }
}

fn config() -> BotConfig {
    let mut config = BotConfig::default();
    config.trading.exit_after = Duration::from_millis(50);
    config.trading.sell_fraction = Decimal::ONE;
    config
}

struct Harness {
    state: Arc<BotState>,
    executor: Arc<PaperExecutor>,
    candidates: mpsc::Sender<Candidate>,
    shutdown: broadcast::Sender<()>,
}

fn start(config: &BotConfig) -> Harness {
    let state = Arc::new(BotState::new(config));
    let market: Arc<dyn Market> = Arc::new(FixedMarket { lamports_per_token: 1_000 });
    let executor = Arc::new(PaperExecutor::new(dec!(1)));
    let (shutdown, _) = broadcast::channel(1);

    let (sell_tx, sell_rx) = mpsc::channel(16);
    let seller = SellScheduler::new(
        SellerConfig::from_config(config),
        Arc::clone(&market),
        executor.clone(),
        Arc::clone(&state),
    );
    tokio::spawn(seller.run(sell_rx, shutdown.subscribe()));

    let (candidates, candidate_rx) = mpsc::channel(16);
    let coordinator = Coordinator::new(
        SniperConfig::from_config(config),
        market,
        executor.clone(),
        Arc::clone(&state),
        sell_tx,
    );
    tokio::spawn(coordinator.run(candidate_rx, shutdown.subscribe()));

    Harness {
        state,
        executor,
        candidates,
        shutdown,
    }
}

async fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if done() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    done()
}

fn sides(analytics: &TradeAnalytics) -> Vec<TradeSide> {
    analytics.summary().trades.iter().map(|t| t.side).collect()
}

// ============================================================================
// Buy then sell
// ============================================================================

#[tokio::test]
async fn test_candidate_is_bought_and_sold() {
    let h = start(&config());
    h.candidates
        .send(Candidate::new("sig1", MINT, unix_now(), 0))
        .await
        .unwrap();

    let state = Arc::clone(&h.state);
    assert!(wait_until(|| state.metrics.snapshot().sells_succeeded == 1).await);

    let metrics = h.state.metrics.snapshot();
    assert_eq!(metrics.candidates_seen, 1);
    assert_eq!(metrics.buys_succeeded, 1);
    assert_eq!(sides(&h.state.analytics), vec![TradeSide::Buy, TradeSide::Sell]);
    assert_eq!(h.executor.token_balance(MINT).await.unwrap(), 0);

    let _ = h.shutdown.send(());
}

#[tokio::test]
async fn test_duplicate_candidate_is_rejected() {
    let h = start(&config());
    for sig in ["sig1", "sig2"] {
        h.candidates
            .send(Candidate::new(sig, MINT, unix_now(), 0))
            .await
            .unwrap();
    }

    let state = Arc::clone(&h.state);
    assert!(wait_until(|| state.metrics.snapshot().candidates_rejected == 1).await);
    assert!(wait_until(|| state.metrics.snapshot().sells_succeeded == 1).await);
    assert_eq!(h.state.metrics.snapshot().buys_succeeded, 1);

    let _ = h.shutdown.send(());
}

// ============================================================================
// Trading pause
// ============================================================================

#[tokio::test]
async fn test_paused_trading_skips_candidates() {
    let h = start(&config());
    h.state.control.set_trading_enabled(false);
    h.candidates
        .send(Candidate::new("sig1", MINT, unix_now(), 0))
        .await
        .unwrap();

    let state = Arc::clone(&h.state);
    assert!(wait_until(|| state.metrics.snapshot().candidates_rejected == 1).await);
    assert_eq!(h.state.metrics.snapshot().buys_attempted, 0);
    assert!(h.state.analytics.is_empty());

    let _ = h.shutdown.send(());
}
