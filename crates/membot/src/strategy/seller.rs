//! Sell scheduler for the classic strategy.
//!
//! Buys hand a `SellJob` to the scheduler over a channel. Jobs sit in a
//! min-heap keyed by due time and a single task sleeps until the earliest
//! one, so a short retry enqueued late still runs before a long hold that
//! was enqueued first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::Duration;

use membot_chain::Quote;
use membot_common::{SOL_MINT, TradeSide};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Market, fill_price};
use crate::config::BotConfig;
use crate::executor::Executor;
use crate::risk::sell_tip_lamports;
use crate::state::{BotState, MetricsCounters};

/// Fractions at or above this sell the whole balance.
const SELL_ALL_THRESHOLD: Decimal = Decimal::from_parts(999_999, 0, 0, false, 6);

/// A pending sell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellJob {
    pub due: Instant,
    pub mint: String,
    /// Failed attempts so far.
    pub tries: u32,
}

impl SellJob {
    pub fn new(mint: impl Into<String>, due: Instant) -> Self {
        Self {
            due,
            mint: mint.into(),
            tries: 0,
        }
    }

    pub fn after(mint: impl Into<String>, delay: Duration) -> Self {
        Self::new(mint, Instant::now() + delay)
    }
}

// Reversed so `BinaryHeap` pops the earliest due job first.
impl Ord for SellJob {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.mint.cmp(&self.mint))
            .then_with(|| other.tries.cmp(&self.tries))
    }
}

impl PartialOrd for SellJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Delay before retry number `tries` (1-based).
pub fn retry_delay(schedule: &[Duration], tries: u32) -> Duration {
    let Some(first) = schedule.first() else {
        return Duration::ZERO;
    };
    if tries == 0 {
        return *first;
    }
    let idx = (tries as usize - 1).min(schedule.len() - 1);
    schedule[idx]
}

/// Raw amount to sell out of `balance`.
pub fn sell_amount(balance: u64, fraction: Decimal) -> u64 {
    let fraction = fraction.clamp(Decimal::ZERO, Decimal::ONE);
    if fraction >= SELL_ALL_THRESHOLD || balance == 0 {
        return balance;
    }
    let amount = (Decimal::from(balance) * fraction).floor().to_u64().unwrap_or(0);
    amount.clamp(1, balance)
}

/// Settings for the sell scheduler.
#[derive(Debug, Clone)]
pub struct SellerConfig {
    pub sell_fraction: Decimal,
    pub retry_schedule: Vec<Duration>,
    pub max_tries: u32,
    pub priority_fee_lamports: u64,
    pub priority_fee_override: u64,
    pub priority_fee_usd: Decimal,
    pub token_decimals: u32,
    pub quote_attempts: u32,
    pub quote_retry_delay: Duration,
}

impl SellerConfig {
    pub fn from_config(config: &BotConfig) -> Self {
        Self {
            sell_fraction: config.trading.sell_fraction,
            retry_schedule: config.trading.sell_retry_schedule.clone(),
            max_tries: config.trading.sell_retry_max_tries,
            priority_fee_lamports: config.trading.priority_fee_lamports_sell,
            priority_fee_override: config.trading.sell_priority_fee_override,
            priority_fee_usd: config.trading.priority_fee_usd,
            token_decimals: config.stairs.mcap.token_decimals,
            quote_attempts: 3,
            quote_retry_delay: Duration::from_millis(500),
        }
    }
}

/// Result of processing one job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SellOutcome {
    Sold { signature: String, amount: u64 },
    Retry(SellJob),
    GaveUp,
}

/// Single-task sell scheduler.
pub struct SellScheduler {
    config: SellerConfig,
    market: Arc<dyn Market>,
    executor: Arc<dyn Executor>,
    state: Arc<BotState>,
    queue: BinaryHeap<SellJob>,
}

impl SellScheduler {
    pub fn new(config: SellerConfig, market: Arc<dyn Market>, executor: Arc<dyn Executor>, state: Arc<BotState>) -> Self {
        Self {
            config,
            market,
            executor,
            state,
            queue: BinaryHeap::new(),
        }
    }

    /// Jobs waiting in the heap.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Run until shutdown, or until the inbox closes and the heap drains.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<SellJob>, mut shutdown: broadcast::Receiver<()>) {
        let mut inbox_open = true;
        info!("Sell scheduler started");

        loop {
            if !inbox_open && self.queue.is_empty() {
                break;
            }
            let next_due = self.queue.peek().map(|job| job.due);

            tokio::select! {
                job = inbox.recv(), if inbox_open => match job {
                    Some(job) => {
                        debug!("Sell scheduled for {} in {:?}", job.mint, job.due.saturating_duration_since(Instant::now()));
                        self.queue.push(job);
                    }
                    None => inbox_open = false,
                },

                _ = tokio::time::sleep_until(next_due.unwrap_or_else(Instant::now)), if next_due.is_some() => {
                    if let Some(job) = self.queue.pop()
                        && let SellOutcome::Retry(retry) = self.process(job).await
                    {
                        self.queue.push(retry);
                    }
                }

                _ = shutdown.recv() => break,
            }
        }

        if !self.queue.is_empty() {
            warn!("Sell scheduler stopping with {} pending sell(s)", self.queue.len());
        }
        info!("Sell scheduler stopped");
    }

    /// Attempt one sell.
    pub async fn process(&self, job: SellJob) -> SellOutcome {
        let mint = job.mint.clone();

        if let Err(e) = self.executor.ensure_token_account(&mint).await {
            debug!("Token account check for {mint} failed: {}", e.short());
        }

        let balance = match self.executor.token_balance(&mint).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Error checking balance for {mint}: {}", e.short());
                0
            }
        };
        if balance == 0 {
            return self.retry(job, "no balance yet");
        }

        let amount = sell_amount(balance, self.config.sell_fraction);
        let slippage = self.state.tunables().slippage_sell_bps;

        let quote = match self.quote(&mint, amount, slippage).await {
            Ok(quote) => quote,
            Err(reason) => return self.retry(job, &format!("no usable sell quote ({reason})")),
        };

        let sol_usd = self.market.sol_usd().await;
        let tip = sell_tip_lamports(
            self.config.priority_fee_override,
            self.config.priority_fee_lamports,
            self.config.priority_fee_usd,
            sol_usd,
        );

        match self.executor.swap(&quote, tip, slippage).await {
            Ok(signature) => {
                info!("Sell {mint} amount={amount} sig: {signature}");
                self.state.activity.note();
                MetricsCounters::inc(&self.state.metrics.sells_succeeded);
                let (ui_amount, price) = fill_price(amount, quote.out_amount, self.config.token_decimals, sol_usd);
                self.state.analytics.record(&mint, TradeSide::Sell, ui_amount, price);
                SellOutcome::Sold { signature, amount }
            }
            Err(e) => self.retry(job, &e.short()),
        }
    }

    async fn quote(&self, mint: &str, amount: u64, slippage: u16) -> Result<Quote, String> {
        let mut last_err = String::from("no attempts");
        for attempt in 1..=self.config.quote_attempts.max(1) {
            match self.market.quote(mint, SOL_MINT, amount, slippage).await {
                Ok(quote) if quote.out_amount > 0 => return Ok(quote),
                Ok(_) => last_err = "zero out amount".to_string(),
                Err(e) => {
                    last_err = e.to_string();
                    warn!(
                        "Sell quote fetch failed attempt {attempt}/{} for {mint}: {last_err}",
                        self.config.quote_attempts
                    );
                }
            }
            if attempt < self.config.quote_attempts {
                tokio::time::sleep(self.config.quote_retry_delay).await;
            }
        }
        Err(last_err)
    }

    fn retry(&self, job: SellJob, reason: &str) -> SellOutcome {
        let tries = job.tries + 1;
        if tries < self.config.max_tries {
            let delay = retry_delay(&self.config.retry_schedule, tries);
            info!(
                "Sell retry {tries}/{} for {} in {:.2}s: {reason}",
                self.config.max_tries,
                job.mint,
                delay.as_secs_f64()
            );
            SellOutcome::Retry(SellJob {
                due: Instant::now() + delay,
                mint: job.mint,
                tries,
            })
        } else {
            warn!("Gave up selling {} after {tries} tries: {reason}", job.mint);
            MetricsCounters::inc(&self.state.metrics.sells_failed);
            SellOutcome::GaveUp
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::PaperExecutor;
    use crate::strategy::testing::FakeMarket;
    use rust_decimal_macros::dec;

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

    fn schedule() -> Vec<Duration> {
        BotConfig::default().trading.sell_retry_schedule
    }

    #[test]
    fn test_retry_delay() {
        let s = schedule();
        assert_eq!(retry_delay(&s, 0), s[0]);
        assert_eq!(retry_delay(&s, 1), s[0]);
        assert_eq!(retry_delay(&s, 2), s[1]);
        assert_eq!(retry_delay(&s, 5), s[4]);
        assert_eq!(retry_delay(&s, 50), s[4]);
        assert_eq!(retry_delay(&[], 3), Duration::ZERO);
    }

    #[test]
    fn test_sell_amount() {
        assert_eq!(sell_amount(1_000_000, dec!(0.995)), 995_000);
        assert_eq!(sell_amount(1_000_000, dec!(1)), 1_000_000);
        assert_eq!(sell_amount(1_000_000, dec!(0.9999995)), 1_000_000);
        assert_eq!(sell_amount(1, dec!(0.5)), 1);
        assert_eq!(sell_amount(10, Decimal::ZERO), 1);
        assert_eq!(sell_amount(0, dec!(0.5)), 0);
    }

    #[test]
    fn test_heap_pops_earliest_first() {
        let now = Instant::now();
        let mut heap = BinaryHeap::new();
        heap.push(SellJob::new("late", now + Duration::from_secs(5)));
        heap.push(SellJob::new("early", now + Duration::from_millis(600)));
        heap.push(SellJob::new("middle", now + Duration::from_secs(2)));

        assert_eq!(heap.pop().unwrap().mint, "early");
        assert_eq!(heap.pop().unwrap().mint, "middle");
        assert_eq!(heap.pop().unwrap().mint, "late");
    }

    fn scheduler(market: Arc<FakeMarket>, paper: Arc<PaperExecutor>) -> (SellScheduler, Arc<BotState>) {
        let config = BotConfig::default();
        let state = Arc::new(BotState::new(&config));
        let mut seller = SellerConfig::from_config(&config);
        seller.quote_retry_delay = Duration::from_millis(1);
        (SellScheduler::new(seller, market, paper, Arc::clone(&state)), state)
    }

    #[tokio::test]
    async fn test_process_without_balance_retries() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        let paper = Arc::new(PaperExecutor::with_lamports(1_000_000_000));
        let (seller, state) = scheduler(market, paper);

        let outcome = seller.process(SellJob::after(MINT, Duration::ZERO)).await;
        match outcome {
            SellOutcome::Retry(job) => assert_eq!(job.tries, 1),
            other => panic!("expected retry, got {other:?}"),
        }
        assert_eq!(state.metrics.snapshot().sells_failed, 0);
    }

    #[tokio::test]
    async fn test_process_gives_up_at_max_tries() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        let paper = Arc::new(PaperExecutor::with_lamports(0));
        let (seller, state) = scheduler(market, paper);

        let mut job = SellJob::after(MINT, Duration::ZERO);
        job.tries = 4;
        assert_eq!(seller.process(job).await, SellOutcome::GaveUp);
        assert_eq!(state.metrics.snapshot().sells_failed, 1);
    }

    #[tokio::test]
    async fn test_process_sells_fraction_and_records() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        market.set_price_lamports(MINT, 100);
        let paper = Arc::new(PaperExecutor::with_lamports(1_000_000_000));

        // 0.1 SOL buys 1_000_000 tokens at 100 lamports per token
        let buy = market.quote(SOL_MINT, MINT, 100_000_000, 9000).await.unwrap();
        paper.swap(&buy, 0, 9000).await.unwrap();
        assert_eq!(paper.token_balance(MINT).await.unwrap(), 1_000_000_000_000);

        let (seller, state) = scheduler(Arc::clone(&market), Arc::clone(&paper));
        let outcome = seller.process(SellJob::after(MINT, Duration::ZERO)).await;
        assert!(matches!(outcome, SellOutcome::Sold { amount: 995_000_000_000, .. }));
        assert_eq!(paper.token_balance(MINT).await.unwrap(), 5_000_000_000);

        let summary = state.analytics.summary();
        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.trades[0].side, TradeSide::Sell);
        assert_eq!(summary.trades[0].amount, dec!(995000));
        assert_eq!(state.metrics.snapshot().sells_succeeded, 1);
    }

    #[tokio::test]
    async fn test_process_retries_when_quotes_fail() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        market.set_price_lamports(MINT, 100);
        let paper = Arc::new(PaperExecutor::with_lamports(1_000_000_000));
        let buy = market.quote(SOL_MINT, MINT, 1_000_000, 9000).await.unwrap();
        paper.swap(&buy, 0, 9000).await.unwrap();

        market.fail_next(3);
        let (seller, _) = scheduler(Arc::clone(&market), paper);
        assert!(matches!(
            seller.process(SellJob::after(MINT, Duration::ZERO)).await,
            SellOutcome::Retry(_)
        ));
    }

    #[tokio::test]
    async fn test_run_drains_inbox_in_due_order() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        market.set_price_lamports(MINT, 100);
        let paper = Arc::new(PaperExecutor::with_lamports(1_000_000_000));
        let buy = market.quote(SOL_MINT, MINT, 1_000_000, 9000).await.unwrap();
        paper.swap(&buy, 0, 9000).await.unwrap();

        let (seller, state) = scheduler(market, Arc::clone(&paper));
        let (tx, rx) = mpsc::channel(8);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);

        tx.send(SellJob::after(MINT, Duration::from_millis(50))).await.unwrap();
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), seller.run(rx, shutdown_rx))
            .await
            .expect("scheduler finishes once drained");

        assert_eq!(state.metrics.snapshot().sells_succeeded, 1);
    }
}
