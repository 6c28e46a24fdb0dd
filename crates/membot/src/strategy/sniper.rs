//! Classic sniper: buy a fresh mint right away, sell it after a fixed hold.
//!
//! The coordinator filters candidates (slot age, on-chain mint age, dedupe,
//! buy rate, optional rug-pull heuristic) and spawns one attempt task per
//! accepted mint. Each task retries `snipe_once` until the entry window
//! closes. Successful buys are handed to the `SellScheduler`.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use membot_chain::{Quote, RpcClient};
use membot_common::{Candidate, LAMPORTS_PER_SOL, SOL_MINT, TradeSide, unix_now};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::seller::SellJob;
use super::{Market, fill_price};
use crate::config::BotConfig;
use crate::executor::{Executor, ExecutorError};
use crate::risk::{BuyLimiter, RugpullCheck, priority_fee_lamports, quote_is_usable};
use crate::state::{BotState, MetricsCounters};
use crate::watcher::SeenSet;

/// Floor applied to the SOL price when sizing a buy.
const MIN_SOL_PRICE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

#[derive(Debug, Error)]
pub enum SnipeError {
    #[error("no usable quote: {0}")]
    NoQuote(String),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error("sell scheduler is gone")]
    SellerClosed,
}

/// Why a candidate was not traded.
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    TradingPaused,
    SlotAge { age: u64, max: u64 },
    MintAge(f64),
    AlreadySeen,
    RateLimited,
    Rugpull,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TradingPaused => write!(f, "trading paused"),
            SkipReason::SlotAge { age, max } => write!(f, "slot age {age} > {max}"),
            SkipReason::MintAge(age) => write!(f, "on-chain age {age:.2}s outside bounds"),
            SkipReason::AlreadySeen => write!(f, "already seen"),
            SkipReason::RateLimited => write!(f, "rate limited"),
            SkipReason::Rugpull => write!(f, "mint authority check failed"),
        }
    }
}

/// True when the candidate is more than `max` slots old. A zero guard or an
/// unknown detection slot disables the check.
pub fn slot_age_exceeded(current: u64, detected: u64, max: u64) -> bool {
    max > 0 && detected > 0 && current.saturating_sub(detected) > max
}

/// Mint-age gate for a known age in seconds. Zero disables a bound.
pub fn mint_age_allows(age: f64, min: Duration, max: Duration) -> bool {
    if !min.is_zero() && age < min.as_secs_f64() {
        return false;
    }
    max.is_zero() || age <= max.as_secs_f64()
}

/// Lamports to spend for `usd` at `sol_usd`, at least 1.
pub fn buy_lamports(usd: Decimal, sol_usd: Decimal) -> u64 {
    let sol = usd / sol_usd.max(MIN_SOL_PRICE);
    (sol * Decimal::from(LAMPORTS_PER_SOL))
        .floor()
        .to_u64()
        .unwrap_or(0)
        .max(1)
}

/// Seconds since the earliest transaction touching `mint`.
///
/// Pages `getSignaturesForAddress` backwards. Stops early once the age
/// exceeds `threshold`.
pub async fn true_mint_age(
    rpc: &RpcClient,
    mint: &str,
    threshold: Option<f64>,
    page_limit: usize,
    max_pages: usize,
) -> Option<f64> {
    let now = unix_now();
    let mut before: Option<String> = None;
    let mut earliest: Option<i64> = None;

    for _ in 0..max_pages {
        let page = match rpc.get_signatures_for_address(mint, before.as_deref(), page_limit).await {
            Ok(page) => page,
            Err(e) => {
                debug!("Signature page for {mint} failed: {e}");
                break;
            }
        };
        let Some(oldest) = page.last() else { break };

        let block_time = match oldest.block_time {
            Some(t) => Some(t),
            None => rpc.get_block_time(oldest.slot).await.ok().flatten(),
        };
        if let Some(t) = block_time {
            earliest = Some(earliest.map_or(t, |e| e.min(t)));
            let age = now - t as f64;
            if threshold.is_some_and(|limit| age > limit) {
                return Some(age);
            }
        }
        before = Some(oldest.signature.clone());
    }

    earliest.map(|t| now - t as f64)
}

/// Classic entry settings.
#[derive(Debug, Clone)]
pub struct SniperConfig {
    pub buy_usd: Decimal,
    pub entry_max_age: Duration,
    pub entry_max_age_slots: u64,
    pub exit_after: Duration,
    pub settle_buffer: Duration,
    pub min_liquidity_usd: Decimal,
    pub priority_fee_lamports: u64,
    pub priority_fee_usd: Decimal,
    pub mint_age_min: Duration,
    pub mint_age_max: Duration,
    pub mint_age_page_limit: usize,
    pub mint_age_max_pages: usize,
    pub max_buys_per_sec: f64,
    pub token_decimals: u32,
    pub quote_attempts: u32,
    pub retry_delay: Duration,
    pub confirm_timeout: Duration,
    pub balance_wait: Duration,
    pub balance_poll: Duration,
}

impl SniperConfig {
    pub fn from_config(config: &BotConfig) -> Self {
        let t = &config.trading;
        Self {
            buy_usd: t.buy_usd,
            entry_max_age: t.entry_max_age,
            entry_max_age_slots: t.entry_max_age_slots,
            exit_after: t.exit_after,
            settle_buffer: t.settle_buffer,
            min_liquidity_usd: t.min_liquidity_usd,
            priority_fee_lamports: t.priority_fee_lamports_buy,
            priority_fee_usd: t.priority_fee_usd,
            mint_age_min: t.mint_age_min,
            mint_age_max: t.mint_age_max,
            mint_age_page_limit: t.mint_age_page_limit,
            mint_age_max_pages: t.mint_age_max_pages,
            max_buys_per_sec: t.max_buys_per_sec,
            token_decimals: config.stairs.mcap.token_decimals,
            quote_attempts: 3,
            retry_delay: Duration::from_millis(200),
            confirm_timeout: Duration::from_millis(2500),
            balance_wait: Duration::from_millis(2500),
            balance_poll: Duration::from_millis(250),
        }
    }
}

/// Candidate filter and buy launcher for the classic strategy.
pub struct Coordinator {
    config: SniperConfig,
    market: Arc<dyn Market>,
    executor: Arc<dyn Executor>,
    state: Arc<BotState>,
    rpc: Option<Arc<RpcClient>>,
    rugpull: Option<RugpullCheck>,
    limiter: BuyLimiter,
    seen: Mutex<SeenSet>,
    sells: mpsc::Sender<SellJob>,
}

impl Coordinator {
    pub fn new(
        config: SniperConfig,
        market: Arc<dyn Market>,
        executor: Arc<dyn Executor>,
        state: Arc<BotState>,
        sells: mpsc::Sender<SellJob>,
    ) -> Self {
        let limiter = BuyLimiter::new(config.max_buys_per_sec);
        Self {
            config,
            market,
            executor,
            state,
            rpc: None,
            rugpull: None,
            limiter,
            seen: Mutex::new(SeenSet::default()),
            sells,
        }
    }

    /// Enable the slot-age and mint-age checks.
    pub fn with_rpc(mut self, rpc: Arc<RpcClient>) -> Self {
        self.rpc = Some(rpc);
        self
    }

    /// Refuse mints that fail the mint-authority heuristic.
    pub fn with_rugpull_check(mut self, check: RugpullCheck) -> Self {
        self.rugpull = Some(check);
        self
    }

    /// Consume candidates until shutdown or until the channel closes.
    pub async fn run(self, mut candidates: mpsc::Receiver<Candidate>, mut shutdown: broadcast::Receiver<()>) {
        let this = Arc::new(self);
        info!("Classic coordinator started (buy ${})", this.config.buy_usd);

        loop {
            tokio::select! {
                candidate = candidates.recv() => {
                    let Some(candidate) = candidate else { break };
                    match this.evaluate(&candidate).await {
                        Ok(()) => {
                            let task = Arc::clone(&this);
                            tokio::spawn(async move { task.attempt_until_window(candidate).await });
                        }
                        Err(reason) => {
                            MetricsCounters::inc(&this.state.metrics.candidates_rejected);
                            debug!("Skipped {} ({reason})", candidate.mint);
                        }
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        info!("Classic coordinator stopped");
    }

    /// Run all filters for one candidate.
    pub async fn evaluate(&self, candidate: &Candidate) -> Result<(), SkipReason> {
        MetricsCounters::inc(&self.state.metrics.candidates_seen);
        let mint = candidate.mint.as_str();
        info!("Evaluating {mint} | age={:.2}s", candidate.age_secs(unix_now()));

        if !self.state.can_trade() {
            return Err(SkipReason::TradingPaused);
        }

        if let Some(rpc) = &self.rpc {
            let max = self.config.entry_max_age_slots;
            if max > 0 && candidate.slot > 0 {
                match rpc.get_slot().await {
                    Ok(current) if slot_age_exceeded(current, candidate.slot, max) => {
                        return Err(SkipReason::SlotAge {
                            age: current - candidate.slot,
                            max,
                        });
                    }
                    Ok(_) => {}
                    Err(e) => warn!("getSlot failed, skipping slot-age check: {e}"),
                }
            }
        }

        let (min_age, max_age) = (self.config.mint_age_min, self.config.mint_age_max);
        // Bounds apply only to a known age.
        if (!min_age.is_zero() || !max_age.is_zero())
            && let Some(rpc) = &self.rpc
        {
            let threshold = (!max_age.is_zero()).then(|| max_age.as_secs_f64());
            let age = true_mint_age(
                rpc,
                mint,
                threshold,
                self.config.mint_age_page_limit,
                self.config.mint_age_max_pages,
            )
            .await;
            if let Some(age) = age
                && !mint_age_allows(age, min_age, max_age)
            {
                return Err(SkipReason::MintAge(age));
            }
        }

        if self.seen.lock().contains(mint) {
            return Err(SkipReason::AlreadySeen);
        }
        if !self.limiter.try_acquire() {
            return Err(SkipReason::RateLimited);
        }
        self.seen.lock().insert(mint);

        if let Some(check) = &self.rugpull {
            match check.is_suspicious(mint).await {
                Ok(false) => {}
                Ok(true) => return Err(SkipReason::Rugpull),
                Err(e) => {
                    warn!("Rug-pull check for {mint} failed: {e}");
                    return Err(SkipReason::Rugpull);
                }
            }
        }
        Ok(())
    }

    async fn attempt_until_window(&self, candidate: Candidate) {
        let mint = candidate.mint;
        let window = self.config.entry_max_age.as_secs_f64();
        let mut attempt = 0u32;

        while unix_now() - candidate.detected_at <= window {
            if self.state.control.is_shutdown_requested() {
                return;
            }
            attempt += 1;
            info!("Attempting buy (attempt {attempt}) for {mint}");
            MetricsCounters::inc(&self.state.metrics.buys_attempted);
            match self.snipe_once(&mint).await {
                Ok(signature) => {
                    MetricsCounters::inc(&self.state.metrics.buys_succeeded);
                    debug!("Buy for {mint} landed: {signature}");
                    return;
                }
                Err(SnipeError::SellerClosed) => {
                    warn!("Bought {mint} but the sell scheduler is gone");
                    return;
                }
                Err(e) => {
                    warn!("Buy attempt {attempt} failed for {mint}: {}", short(&e));
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }
        warn!("Window expired without buy for {mint}");
    }

    /// One buy attempt: quote, swap, wait for the balance, schedule the sell.
    pub async fn snipe_once(&self, mint: &str) -> Result<String, SnipeError> {
        let sol_usd = self.market.sol_usd().await;
        let lamports_in = buy_lamports(self.config.buy_usd, sol_usd);
        let tip = priority_fee_lamports(self.config.priority_fee_lamports, self.config.priority_fee_usd, sol_usd);
        let slippage = self.state.tunables().slippage_buy_bps;

        if let Err(e) = self.executor.ensure_token_account(mint).await {
            warn!("Token account ensure failed for {mint}: {}", e.short());
        }

        let quote = self.usable_quote(mint, lamports_in, slippage).await?;

        info!(
            "BUY ${} -> {mint} (~{:.6} SOL, tip~{tip} lamports)",
            self.config.buy_usd,
            lamports_in as f64 / LAMPORTS_PER_SOL as f64
        );
        let signature = self.executor.swap(&quote, tip, slippage).await?;
        info!("Buy sig: {signature}");
        self.state.activity.note();

        if !self.executor.confirm(&signature, self.config.confirm_timeout).await {
            debug!("Buy {signature} not confirmed within {:?}", self.config.confirm_timeout);
        }

        let balance_seen = self.wait_for_balance(mint).await;
        let (amount, price) = fill_price(quote.out_amount, quote.in_amount, self.config.token_decimals, sol_usd);
        self.state.analytics.record(mint, TradeSide::Buy, amount, price);

        let mut delay = self.config.exit_after;
        if !balance_seen {
            delay += self.config.settle_buffer;
        }
        self.sells
            .send(SellJob::after(mint, delay))
            .await
            .map_err(|_| SnipeError::SellerClosed)?;
        info!(
            "Scheduled sell for {mint} at +{:.1}s (balance_ready={balance_seen})",
            delay.as_secs_f64()
        );
        Ok(signature)
    }

    async fn usable_quote(&self, mint: &str, lamports_in: u64, slippage: u16) -> Result<Quote, SnipeError> {
        let attempts = self.config.quote_attempts.max(1);
        let mut last_err = String::from("no quote found");

        for attempt in 1..=attempts {
            match self.market.quote(SOL_MINT, mint, lamports_in, slippage).await {
                Ok(quote) => match quote_is_usable(&quote, self.config.buy_usd, self.config.min_liquidity_usd) {
                    Ok(()) => return Ok(quote),
                    Err(reason) => {
                        debug!("Unusable route attempt {attempt}/{attempts} for {mint}: {reason}");
                        last_err = reason;
                    }
                },
                Err(e) => {
                    warn!("Quote fetch failed attempt {attempt}/{attempts} for {mint}: {e}");
                    last_err = e.to_string();
                }
            }
            tokio::time::sleep(self.config.retry_delay).await;
        }

        warn!("No usable quote for {mint} ({last_err})");
        Err(SnipeError::NoQuote(last_err))
    }

    async fn wait_for_balance(&self, mint: &str) -> bool {
        let deadline = tokio::time::Instant::now() + self.config.balance_wait;
        while tokio::time::Instant::now() < deadline {
            match self.executor.token_balance(mint).await {
                Ok(balance) if balance > 0 => return true,
                Ok(_) => {}
                Err(e) => debug!("Balance poll for {mint} failed: {}", e.short()),
            }
            tokio::time::sleep(self.config.balance_poll).await;
        }
        false
    }
}

fn short(e: &SnipeError) -> String {
    match e {
        SnipeError::Executor(inner) => inner.short(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::PaperExecutor;
    use crate::strategy::testing::FakeMarket;
    use rust_decimal_macros::dec;

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";
    const OTHER: &str = "9BB6NFEcjBCtnNLFko2FqVQBq8HHM13kCyYcdQbgpump";

    #[test]
    fn test_slot_age_guard() {
        assert!(!slot_age_exceeded(103, 100, 3));
        assert!(slot_age_exceeded(104, 100, 3));
        assert!(!slot_age_exceeded(500, 100, 0));
        assert!(!slot_age_exceeded(500, 0, 3));
        assert!(!slot_age_exceeded(90, 100, 3));
    }

    #[test]
    fn test_mint_age_gate() {
        let off = Duration::ZERO;
        assert!(mint_age_allows(0.0, off, off));

        let min = Duration::from_secs(5);
        let max = Duration::from_secs(60);
        assert!(!mint_age_allows(2.0, min, max));
        assert!(mint_age_allows(30.0, min, max));
        assert!(!mint_age_allows(61.0, min, max));
        assert!(mint_age_allows(1_000.0, min, off));
        assert!(mint_age_allows(0.5, off, max));
    }

    #[test]
    fn test_buy_lamports() {
        assert_eq!(buy_lamports(dec!(10), dec!(200)), 50_000_000);
        assert_eq!(buy_lamports(dec!(0), dec!(200)), 1);
        // Price floor of one cent
        assert_eq!(buy_lamports(dec!(0.01), dec!(0)), 1_000_000_000);
    }

    fn coordinator(market: Arc<FakeMarket>, paper: Arc<PaperExecutor>) -> (Coordinator, Arc<BotState>, mpsc::Receiver<SellJob>) {
        let config = BotConfig::default();
        let state = Arc::new(BotState::new(&config));
        let mut sniper = SniperConfig::from_config(&config);
        sniper.retry_delay = Duration::from_millis(1);
        sniper.balance_poll = Duration::from_millis(1);
        let (tx, rx) = mpsc::channel(8);
        let coordinator = Coordinator::new(sniper, market, paper, Arc::clone(&state), tx);
        (coordinator, state, rx)
    }

    #[tokio::test]
    async fn test_evaluate_dedupes_and_rate_limits() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        let paper = Arc::new(PaperExecutor::with_lamports(1_000_000_000));
        let (coordinator, state, _rx) = coordinator(market, paper);

        let first = Candidate::new("sig1", MINT, unix_now(), 0);
        assert_eq!(coordinator.evaluate(&first).await, Ok(()));
        assert_eq!(coordinator.evaluate(&first).await, Err(SkipReason::AlreadySeen));

        // Burst of one at 0.5 buys/s
        let second = Candidate::new("sig2", OTHER, unix_now(), 0);
        assert_eq!(coordinator.evaluate(&second).await, Err(SkipReason::RateLimited));
        assert_eq!(state.metrics.snapshot().candidates_seen, 3);
    }

    #[tokio::test]
    async fn test_evaluate_passes_unknown_mint_age() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        let paper = Arc::new(PaperExecutor::with_lamports(1_000_000_000));
        let (mut coordinator, _state, _rx) = coordinator(market, paper);
        coordinator.config.mint_age_min = Duration::from_secs(5);
        coordinator.config.mint_age_max = Duration::from_secs(60);

        // No RPC attached, so the age cannot be looked up.
        let candidate = Candidate::new("sig", MINT, unix_now(), 0);
        assert_eq!(coordinator.evaluate(&candidate).await, Ok(()));
    }

    #[tokio::test]
    async fn test_evaluate_respects_pause() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        let paper = Arc::new(PaperExecutor::with_lamports(1_000_000_000));
        let (coordinator, state, _rx) = coordinator(market, paper);

        state.control.set_trading_enabled(false);
        let candidate = Candidate::new("sig", MINT, unix_now(), 0);
        assert_eq!(coordinator.evaluate(&candidate).await, Err(SkipReason::TradingPaused));
    }

    #[tokio::test]
    async fn test_snipe_once_buys_and_schedules_sell() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        market.set_price_lamports(MINT, 100);
        let paper = Arc::new(PaperExecutor::with_lamports(1_000_000_000));
        let (coordinator, state, mut rx) = coordinator(market, Arc::clone(&paper));

        let signature = coordinator.snipe_once(MINT).await.unwrap();
        assert!(signature.starts_with("paper-"));

        // $10 at $150/SOL
        let lamports_in = buy_lamports(dec!(10), dec!(150));
        assert_eq!(paper.token_balance(MINT).await.unwrap(), lamports_in * 1_000_000 / 100);

        let job = rx.recv().await.unwrap();
        assert_eq!(job.mint, MINT);
        assert_eq!(job.tries, 0);

        let summary = state.analytics.summary();
        assert_eq!(summary.total_trades, 1);
        assert_eq!(summary.trades[0].side, TradeSide::Buy);
    }

    #[tokio::test]
    async fn test_snipe_once_without_route_fails() {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        let paper = Arc::new(PaperExecutor::with_lamports(1_000_000_000));
        let (coordinator, _state, mut rx) = coordinator(Arc::clone(&market), paper);

        let err = coordinator.snipe_once(MINT).await.unwrap_err();
        assert!(matches!(err, SnipeError::NoQuote(_)));
        assert_eq!(market.quote_count(), 3);
        assert!(rx.try_recv().is_err());
    }
}
