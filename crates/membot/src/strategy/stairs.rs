//! Stairs strategy: wait for a trade-flow spike or market-cap jump, then
//! trade short rounds managed by the market-cap ladders.
//!
//! A round buys `entry_clip_usd`, polls the estimated market cap and feeds
//! it to a ladder until the ladder exits or time runs out. Round PnL is the
//! change in wallet lamports. Milestone rounds repeat until one loses; the
//! dynamic "moon bag" mode runs a single long round.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use membot_chain::JupiterError;
use membot_common::{Candidate, SOL_MINT, TradeSide};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{Semaphore, broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::ladder::{DynamicLadder, ExitReason, LadderStep, MilestoneLadder};
use super::mcap::McapEstimator;
use super::seller::sell_amount;
use super::sniper::buy_lamports;
use super::spike::TradeFlow;
use super::{Market, fill_price};
use crate::config::{BotConfig, JumpConfig, StairsConfig};
use crate::executor::{Executor, ExecutorError};
use crate::risk::{BuyLimiter, priority_fee_lamports};
use crate::state::{BotState, MetricsCounters};

const LIMITER_WAIT: Duration = Duration::from_millis(200);
const MIN_JUMP_CHECK: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum StairsError {
    #[error("quote failed: {0}")]
    Quote(#[from] JupiterError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),
}

/// Outcome of one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoundResult {
    pub pnl_lamports: i64,
    pub exit: ExitReason,
}

/// Jump trigger: low-to-high crossing, or an absolute rise when configured.
pub fn jump_triggered(baseline: Decimal, mcap: Decimal, config: &JumpConfig) -> bool {
    let crossed = baseline <= config.lo_usd && mcap >= config.hi_usd;
    let delta = config.require_delta_usd > Decimal::ZERO && mcap - baseline >= config.require_delta_usd;
    crossed || delta
}

/// Runs stairs rounds for individual mints.
pub struct StairsTrader {
    config: StairsConfig,
    token_decimals: u32,
    market: Arc<dyn Market>,
    executor: Arc<dyn Executor>,
    flow: Arc<dyn TradeFlow>,
    state: Arc<BotState>,
    mcap: McapEstimator,
    limiter: BuyLimiter,
}

impl StairsTrader {
    pub fn new(
        config: &BotConfig,
        market: Arc<dyn Market>,
        executor: Arc<dyn Executor>,
        flow: Arc<dyn TradeFlow>,
        state: Arc<BotState>,
    ) -> Self {
        let stairs = config.stairs.clone();
        let mcap = McapEstimator::new(Arc::clone(&market), &stairs.mcap, config.trading.slippage_bps);
        Self {
            token_decimals: stairs.mcap.token_decimals,
            config: stairs,
            market,
            executor,
            flow,
            state,
            mcap,
            limiter: BuyLimiter::new(config.trading.max_buys_per_sec),
        }
    }

    async fn tip_lamports(&self) -> u64 {
        let sol_usd = self.market.sol_usd().await;
        priority_fee_lamports(0, self.config.tip_usd, sol_usd)
    }

    /// Buy `usd` worth of `mint`.
    pub async fn buy_once(&self, mint: &str, usd: Decimal) -> Result<String, StairsError> {
        let sol_usd = self.market.sol_usd().await;
        let lamports_in = buy_lamports(usd, sol_usd);
        let slippage = self.state.tunables().slippage_buy_bps;

        MetricsCounters::inc(&self.state.metrics.buys_attempted);
        let quote = self.market.quote(SOL_MINT, mint, lamports_in, slippage).await?;
        let tip = self.tip_lamports().await;
        let signature = self.executor.swap(&quote, tip, slippage).await?;

        self.state.activity.note();
        MetricsCounters::inc(&self.state.metrics.buys_succeeded);
        let (amount, price) = fill_price(quote.out_amount, quote.in_amount, self.token_decimals, sol_usd);
        self.state.analytics.record(mint, TradeSide::Buy, amount, price);
        info!("BUY ${usd:.2} {mint} | {signature}");
        Ok(signature)
    }

    /// Sell `fraction` of the current balance. None when nothing is held.
    pub async fn sell_fraction(&self, mint: &str, fraction: Decimal) -> Result<Option<String>, StairsError> {
        let balance = self.executor.token_balance(mint).await?;
        if balance == 0 {
            return Ok(None);
        }
        let amount = sell_amount(balance, fraction);
        let slippage = self.state.tunables().slippage_sell_bps;

        let quote = self.market.quote(mint, SOL_MINT, amount, slippage).await?;
        let tip = self.tip_lamports().await;
        let signature = self.executor.swap(&quote, tip, slippage).await?;

        self.state.activity.note();
        MetricsCounters::inc(&self.state.metrics.sells_succeeded);
        let sol_usd = self.market.sol_usd().await;
        let (ui_amount, price) = fill_price(amount, quote.out_amount, self.token_decimals, sol_usd);
        self.state.analytics.record(mint, TradeSide::Sell, ui_amount, price);
        debug!("SELL {amount} of {mint} | {signature}");
        Ok(Some(signature))
    }

    async fn exit_all(&self, mint: &str, reason: ExitReason) {
        info!("{mint}: {reason} -> EXIT ALL");
        if let Err(e) = self.sell_fraction(mint, Decimal::ONE).await {
            MetricsCounters::inc(&self.state.metrics.sells_failed);
            warn!("Exit sell for {mint} failed: {e}");
        }
    }

    async fn apply_partials(&self, mint: &str, step: &LadderStep) {
        for fraction in &step.partial_sells {
            info!("{mint}: ladder level hit -> SELL {}%", (*fraction * Decimal::ONE_HUNDRED).round_dp(1));
            if let Err(e) = self.sell_fraction(mint, *fraction).await {
                MetricsCounters::inc(&self.state.metrics.sells_failed);
                warn!("Partial sell for {mint} failed: {e}");
            }
        }
    }

    async fn pnl_since(&self, before: u64) -> i64 {
        match self.executor.lamports().await {
            Ok(after) => after as i64 - before as i64,
            Err(e) => {
                warn!("Balance read after round failed: {}", e.short());
                0
            }
        }
    }

    /// Buy a clip and run the milestone ladder until exit or hold timeout.
    pub async fn scalp_round(&self, mint: &str) -> Result<RoundResult, StairsError> {
        let tunables = self.state.tunables();
        let before = self.executor.lamports().await?;
        self.buy_once(mint, self.config.entry_clip_usd).await?;

        let mut ladder = MilestoneLadder::with_stop_loss(&self.config.ladder, tunables.stop_loss_usd);
        let deadline = Instant::now() + tunables.hold_time();
        let mut exit = ExitReason::Timeout;

        while Instant::now() < deadline {
            if let Some(mcap) = self.mcap.mcap_usd(mint).await {
                let step = ladder.observe(mcap);
                self.apply_partials(mint, &step).await;
                if let Some(reason) = step.exit {
                    exit = reason;
                    break;
                }
            }
            tokio::time::sleep(self.config.mcap.check_interval).await;
        }

        self.exit_all(mint, exit).await;
        let pnl_lamports = self.pnl_since(before).await;
        info!("{mint}: round PnL {pnl_lamports} lamports ({exit})");
        Ok(RoundResult { pnl_lamports, exit })
    }

    /// Buy a clip and ride the dynamic ladder while trade flow continues.
    pub async fn dynamic_bag_round(&self, mint: &str) -> Result<RoundResult, StairsError> {
        let bag = &self.config.dynamic_bag;
        let tunables = self.state.tunables();
        let before = self.executor.lamports().await?;
        self.buy_once(mint, self.config.entry_clip_usd).await?;

        let mut ladder = DynamicLadder::new(bag, &self.config.ladder, tunables.stop_loss_usd);
        let max_deadline = Instant::now() + bag.max_duration;
        let mut idle_deadline = Instant::now() + bag.idle_timeout;
        let check = self.config.mcap.check_interval;

        let exit = loop {
            if Instant::now() >= max_deadline {
                break ExitReason::Timeout;
            }

            let Some(mcap) = self.mcap.mcap_usd(mint).await else {
                tokio::time::sleep(check).await;
                continue;
            };
            let step = ladder.observe(mcap);
            self.apply_partials(mint, &step).await;
            if let Some(reason) = step.exit {
                break reason;
            }

            if self.config.reenter_needs_next_pop && self.flow.wait_for_next_pop(mint, check).await {
                idle_deadline = Instant::now() + bag.idle_timeout;
            }
            if Instant::now() >= idle_deadline {
                break ExitReason::Idle;
            }
            tokio::time::sleep(check).await;
        };

        self.exit_all(mint, exit).await;
        let pnl_lamports = self.pnl_since(before).await;
        info!("{mint}: round PnL {pnl_lamports} lamports ({exit})");
        Ok(RoundResult { pnl_lamports, exit })
    }

    /// Watch early market caps for a jump within the configured window.
    pub async fn wait_for_mcap_jump(&self, mint: &str) -> bool {
        let jump = &self.config.jump;
        let check = jump.check_interval.max(MIN_JUMP_CHECK);
        let deadline = Instant::now() + jump.window;
        let mut baseline: Option<Decimal> = None;

        info!(
            "Watching mcap jump on {mint} for {:?} (lo={} hi={} delta={})",
            jump.window, jump.lo_usd, jump.hi_usd, jump.require_delta_usd
        );

        while Instant::now() < deadline {
            if let Some(mcap) = self.mcap.mcap_usd(mint).await {
                match baseline {
                    None => {
                        info!("{mint}: initial mcap ~{}", mcap.round());
                        baseline = Some(mcap);
                    }
                    Some(m0) if jump_triggered(m0, mcap, jump) => {
                        info!("{mint}: mcap jump {} -> {}", m0.round(), mcap.round());
                        return true;
                    }
                    Some(_) => {}
                }
            }
            tokio::time::sleep(check).await;
        }
        info!("{mint}: no mcap jump within window");
        false
    }

    async fn take_buy_slot(&self) -> bool {
        loop {
            if !self.state.can_trade() {
                return false;
            }
            if self.limiter.try_acquire() {
                return true;
            }
            tokio::time::sleep(LIMITER_WAIT).await;
        }
    }

    /// Full stairs lifecycle for one mint.
    pub async fn run_for_mint(&self, mint: &str) {
        let triggered = if self.config.jump.enabled {
            self.wait_for_mcap_jump(mint).await
        } else {
            self.flow.detect_spike(mint).await
        };
        if !triggered {
            info!("No step pattern for {mint}");
            return;
        }
        info!("Stairs active on {mint}");

        if self.config.dynamic_bag.enabled {
            if self.take_buy_slot().await
                && let Err(e) = self.dynamic_bag_round(mint).await
            {
                warn!("Dynamic round for {mint} failed: {e}");
            }
            info!("Finished stairs for {mint} (dynamic ladder)");
            self.mcap.forget(mint);
            return;
        }

        loop {
            if !self.take_buy_slot().await {
                break;
            }
            let round = match self.scalp_round(mint).await {
                Ok(round) => round,
                Err(e) => {
                    warn!("Stairs round for {mint} failed: {e}");
                    break;
                }
            };

            if round.pnl_lamports < 0 {
                warn!("Losing round on {mint}, blacklisting for {:?}", self.config.blacklist_cooldown);
                tokio::time::sleep(self.config.blacklist_cooldown).await;
                break;
            }
            if !self.config.reenter_until_loss {
                break;
            }
            if self.config.reenter_needs_next_pop
                && !self.flow.wait_for_next_pop(mint, self.config.reenter_pop_timeout).await
            {
                info!("No fresh flow for re-entry on {mint}");
                break;
            }
            tokio::time::sleep(self.config.cooldown).await;
        }
        info!("Finished stairs for {mint}");
        self.mcap.forget(mint);
    }
}

/// Removes a mint from the active set when its task ends.
struct ActiveGuard {
    active: Arc<Mutex<HashSet<String>>>,
    mint: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.active.lock().remove(&self.mint);
    }
}

/// Fans candidates out to stairs tasks, bounded by a semaphore.
pub struct StairsDispatcher {
    trader: Arc<StairsTrader>,
    permits: Arc<Semaphore>,
    active: Arc<Mutex<HashSet<String>>>,
}

impl StairsDispatcher {
    pub fn new(trader: Arc<StairsTrader>, max_concurrent: usize) -> Self {
        Self {
            trader,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            active: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Mints with a running task.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_active(&self, mint: &str) -> bool {
        self.active.lock().contains(mint)
    }

    /// Start a task for `mint` unless one is already running.
    pub fn dispatch(&self, mint: &str) -> bool {
        if !self.active.lock().insert(mint.to_string()) {
            return false;
        }
        let guard = ActiveGuard {
            active: Arc::clone(&self.active),
            mint: mint.to_string(),
        };
        let trader = Arc::clone(&self.trader);
        let permits = Arc::clone(&self.permits);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return;
            };
            trader.run_for_mint(&guard.mint).await;
        });
        true
    }

    /// Consume candidates until shutdown or until the channel closes.
    pub async fn run(self, mut candidates: mpsc::Receiver<Candidate>, mut shutdown: broadcast::Receiver<()>) {
        info!("Stairs dispatcher started ({} concurrent)", self.permits.available_permits());
        loop {
            tokio::select! {
                candidate = candidates.recv() => {
                    let Some(candidate) = candidate else { break };
                    let metrics = &self.trader.state.metrics;
                    MetricsCounters::inc(&metrics.candidates_seen);
                    if !self.dispatch(&candidate.mint) {
                        MetricsCounters::inc(&metrics.candidates_rejected);
                        debug!("{} already active", candidate.mint);
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        self.permits.close();
        info!("Stairs dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::PaperExecutor;
    use crate::strategy::testing::{FakeFlow, FakeMarket};
    use rust_decimal_macros::dec;

    const MINT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";

    fn bot_config() -> BotConfig {
        let mut config = BotConfig::default();
        config.stairs.mcap.check_interval = Duration::from_millis(1);
        config.stairs.mcap.quote_min_interval = Duration::ZERO;
        config.stairs.scalp_hold = Duration::from_millis(30);
        config.stairs.blacklist_cooldown = Duration::ZERO;
        config.stairs.cooldown = Duration::ZERO;
        config.trading.max_buys_per_sec = 100.0;
        config
    }

    struct Fixture {
        trader: Arc<StairsTrader>,
        market: Arc<FakeMarket>,
        paper: Arc<PaperExecutor>,
        state: Arc<BotState>,
    }

    fn fixture(config: BotConfig, flow: FakeFlow) -> Fixture {
        let market = Arc::new(FakeMarket::new(dec!(150)));
        let paper = Arc::new(PaperExecutor::with_lamports(10_000_000_000));
        let state = Arc::new(BotState::new(&config));
        let trader = Arc::new(StairsTrader::new(
            &config,
            Arc::clone(&market) as Arc<dyn Market>,
            Arc::clone(&paper) as Arc<dyn Executor>,
            Arc::new(flow),
            Arc::clone(&state),
        ));
        Fixture {
            trader,
            market,
            paper,
            state,
        }
    }

    #[test]
    fn test_jump_trigger() {
        let jump = JumpConfig::default();
        assert!(jump_triggered(dec!(14000), dec!(61000), &jump));
        assert!(!jump_triggered(dec!(16000), dec!(61000), &jump));
        assert!(!jump_triggered(dec!(14000), dec!(59000), &jump));

        let delta = JumpConfig {
            require_delta_usd: dec!(20000),
            ..JumpConfig::default()
        };
        assert!(jump_triggered(dec!(30000), dec!(50000), &delta));
        assert!(!jump_triggered(dec!(30000), dec!(49000), &delta));
    }

    #[tokio::test]
    async fn test_sell_fraction_without_balance() {
        let f = fixture(bot_config(), FakeFlow::new(true, true));
        assert_eq!(f.trader.sell_fraction(MINT, dec!(0.5)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scalp_round_times_out_and_exits() {
        let f = fixture(bot_config(), FakeFlow::new(true, true));
        f.market.set_mcap_usd(MINT, dec!(100000));

        let round = f.trader.scalp_round(MINT).await.unwrap();
        assert_eq!(round.exit, ExitReason::Timeout);
        // Flat price, tips charged on both legs
        assert!(round.pnl_lamports < 0);
        assert_eq!(f.paper.token_balance(MINT).await.unwrap(), 0);
        assert_eq!(f.state.analytics.len(), 2);
    }

    #[tokio::test]
    async fn test_scalp_round_sell_all_level() {
        let f = fixture(bot_config(), FakeFlow::new(true, true));
        f.market.set_mcap_usd(MINT, dec!(165000));

        let round = f.trader.scalp_round(MINT).await.unwrap();
        assert_eq!(round.exit, ExitReason::SellAll);
        assert_eq!(f.paper.token_balance(MINT).await.unwrap(), 0);
        // Buy, first milestone partial, exit
        assert_eq!(f.state.analytics.len(), 3);
    }

    #[tokio::test]
    async fn test_dynamic_round_goes_idle_without_flow() {
        let mut config = bot_config();
        config.stairs.dynamic_bag.enabled = true;
        config.stairs.dynamic_bag.idle_timeout = Duration::from_millis(20);
        let f = fixture(config, FakeFlow::new(true, false));
        f.market.set_mcap_usd(MINT, dec!(100000));

        let round = f.trader.dynamic_bag_round(MINT).await.unwrap();
        assert_eq!(round.exit, ExitReason::Idle);
        assert_eq!(f.paper.token_balance(MINT).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_mcap_jump() {
        let mut config = bot_config();
        config.stairs.jump.check_interval = Duration::from_millis(1);
        config.stairs.jump.window = Duration::from_millis(300);
        let f = fixture(config, FakeFlow::new(false, false));
        f.market.set_mcap_usd(MINT, dec!(12000));

        let market = Arc::clone(&f.market);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            market.set_mcap_usd(MINT, dec!(75000));
        });
        assert!(f.trader.wait_for_mcap_jump(MINT).await);
    }

    #[tokio::test]
    async fn test_run_for_mint_without_spike_never_buys() {
        let f = fixture(bot_config(), FakeFlow::new(false, true));
        f.market.set_mcap_usd(MINT, dec!(100000));
        f.trader.run_for_mint(MINT).await;
        assert!(f.state.analytics.is_empty());
    }

    #[tokio::test]
    async fn test_run_for_mint_stops_after_losing_round() {
        let f = fixture(bot_config(), FakeFlow::new(true, true));
        f.market.set_mcap_usd(MINT, dec!(100000));
        f.trader.run_for_mint(MINT).await;
        // One losing round: buy plus exit
        assert_eq!(f.state.analytics.len(), 2);
        assert_eq!(f.state.metrics.snapshot().buys_succeeded, 1);
    }

    #[tokio::test]
    async fn test_dispatcher_skips_active_mints() {
        let flow = FakeFlow::new(false, false).with_spike_delay(Duration::from_millis(100));
        let f = fixture(bot_config(), flow);
        let dispatcher = StairsDispatcher::new(Arc::clone(&f.trader), 2);

        assert!(dispatcher.dispatch(MINT));
        assert!(!dispatcher.dispatch(MINT));
        assert!(dispatcher.is_active(MINT));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(dispatcher.active_count(), 0);
        assert!(dispatcher.dispatch(MINT));
    }
}
