//! Reclaims rent from empty token accounts.
//!
//! Runs only in live mode. Closing waits for a quiet period after the last
//! trade, keeps a SOL reserve, requires each account to stay empty for a
//! cooldown and caps closes per rolling minute.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use membot_chain::{TokenAccount, Wallet};
use membot_common::LAMPORTS_PER_SOL;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::JanitorConfig;
use crate::state::{BotState, MetricsCounters};

const RATE_WINDOW: Duration = Duration::from_secs(60);
const IDLE_POLL: Duration = Duration::from_secs(1);
const RATE_LIMIT_PAUSE: Duration = Duration::from_secs(2);
const AFTER_CLOSE_PAUSE: Duration = Duration::from_secs(1);

/// Bookkeeping for empty accounts and recent closes.
#[derive(Debug)]
pub struct JanitorState {
    max_per_min: usize,
    cooldown: Duration,
    zero_since: HashMap<String, Instant>,
    recent: VecDeque<Instant>,
}

impl JanitorState {
    pub fn new(max_per_min: usize, cooldown: Duration) -> Self {
        Self {
            max_per_min,
            cooldown,
            zero_since: HashMap::new(),
            recent: VecDeque::new(),
        }
    }

    /// True when the rolling-minute cap is used up.
    pub fn is_rate_limited(&mut self, now: Instant) -> bool {
        while let Some(first) = self.recent.front()
            && now.saturating_duration_since(*first) > RATE_WINDOW
        {
            self.recent.pop_front();
        }
        self.recent.len() >= self.max_per_min
    }

    /// True once `mint` has been empty for the cooldown. The first sighting
    /// only starts the clock.
    pub fn cooldown_elapsed(&mut self, mint: &str, now: Instant) -> bool {
        match self.zero_since.get(mint) {
            None => {
                self.zero_since.insert(mint.to_string(), now);
                false
            }
            Some(first) => now.saturating_duration_since(*first) >= self.cooldown,
        }
    }

    pub fn record_close(&mut self, mint: &str, now: Instant) {
        self.recent.push_back(now);
        self.zero_since.remove(mint);
    }

    /// Drop tracking for mints no longer empty or no longer held.
    pub fn forget_missing(&mut self, current: &HashSet<&str>) {
        self.zero_since.retain(|mint, _| current.contains(mint.as_str()));
    }

    pub fn tracked(&self) -> usize {
        self.zero_since.len()
    }
}

/// Empty, non-excluded accounts whose cooldown has elapsed, in input order.
pub fn closable_accounts(
    state: &mut JanitorState,
    accounts: &[TokenAccount],
    exclude: &HashSet<String>,
    now: Instant,
) -> Vec<TokenAccount> {
    let empty: Vec<&TokenAccount> = accounts
        .iter()
        .filter(|a| a.amount == 0 && !exclude.contains(&a.mint))
        .collect();
    let current: HashSet<&str> = empty.iter().map(|a| a.mint.as_str()).collect();
    state.forget_missing(&current);

    empty
        .into_iter()
        .filter(|a| state.cooldown_elapsed(&a.mint, now))
        .cloned()
        .collect()
}

/// Background account closer.
pub struct Janitor {
    config: JanitorConfig,
    wallet: Arc<Wallet>,
    state: Arc<BotState>,
    book: JanitorState,
    exclude: HashSet<String>,
}

impl Janitor {
    pub fn new(config: JanitorConfig, wallet: Arc<Wallet>, state: Arc<BotState>) -> Self {
        let book = JanitorState::new(config.max_per_min, config.cooldown);
        let exclude = config.exclude_mints.iter().cloned().collect();
        Self {
            config,
            wallet,
            state,
            book,
            exclude,
        }
    }

    fn reserve_lamports(&self) -> u64 {
        (self.config.min_sol_reserve * Decimal::from(LAMPORTS_PER_SOL))
            .floor()
            .to_u64()
            .unwrap_or(0)
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        if !self.config.enabled {
            info!("Token account janitor disabled");
            return;
        }
        info!(
            "Token account janitor started (cooldown {:?}, max {}/min, reserve {} SOL)",
            self.config.cooldown, self.config.max_per_min, self.config.min_sol_reserve
        );

        loop {
            let pause = self.tick().await;
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.recv() => break,
            }
        }
        info!("Token account janitor stopped");
    }

    /// One pass; returns how long to wait before the next.
    async fn tick(&mut self) -> Duration {
        if !self.config.idle_window.is_zero() && self.state.activity.idle_for() < self.config.idle_window {
            return IDLE_POLL;
        }

        match self.wallet.lamports().await {
            Ok(lamports) if lamports < self.reserve_lamports() => {
                debug!("Janitor skipped: {lamports} lamports below reserve");
                return self.config.interval;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Janitor balance check failed: {e}");
                return self.config.interval;
            }
        }

        let now = Instant::now();
        if self.book.is_rate_limited(now) {
            return RATE_LIMIT_PAUSE;
        }

        let accounts = match self.wallet.token_accounts().await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!("Janitor account scan failed: {e}");
                return self.config.interval;
            }
        };

        let mut closed_any = false;
        for account in closable_accounts(&mut self.book, &accounts, &self.exclude, now) {
            match self.wallet.close_empty_account(&account).await {
                Ok(signature) => {
                    info!("Closed empty token account for {} ({signature})", account.mint);
                    self.book.record_close(&account.mint, now);
                    MetricsCounters::inc(&self.state.metrics.atas_closed);
                    closed_any = true;
                    if self.book.is_rate_limited(Instant::now()) {
                        break;
                    }
                }
                Err(e) => debug!("Close for {} failed: {e}", account.mint),
            }
        }

        if closed_any { AFTER_CLOSE_PAUSE } else { self.config.interval }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(mint: &str, amount: u64) -> TokenAccount {
        TokenAccount {
            address: format!("ata-{mint}"),
            mint: mint.to_string(),
            amount,
        }
    }

    #[test]
    fn test_cooldown_starts_on_first_sighting() {
        let t0 = Instant::now();
        let mut state = JanitorState::new(5, Duration::from_secs(10));
        assert!(!state.cooldown_elapsed("m", t0));
        assert!(!state.cooldown_elapsed("m", t0 + Duration::from_secs(5)));
        assert!(state.cooldown_elapsed("m", t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_rate_limit_rolls_off() {
        let t0 = Instant::now();
        let mut state = JanitorState::new(2, Duration::ZERO);
        state.record_close("a", t0);
        assert!(!state.is_rate_limited(t0));
        state.record_close("b", t0 + Duration::from_secs(1));
        assert!(state.is_rate_limited(t0 + Duration::from_secs(2)));
        assert!(!state.is_rate_limited(t0 + Duration::from_secs(61)));
    }

    #[test]
    fn test_closable_accounts() {
        let t0 = Instant::now();
        let mut state = JanitorState::new(5, Duration::from_secs(10));
        let exclude: HashSet<String> = ["excluded".to_string()].into_iter().collect();
        let accounts = vec![account("a", 0), account("b", 7), account("excluded", 0)];

        assert!(closable_accounts(&mut state, &accounts, &exclude, t0).is_empty());
        assert_eq!(state.tracked(), 1);

        let later = closable_accounts(&mut state, &accounts, &exclude, t0 + Duration::from_secs(11));
        assert_eq!(later, vec![account("a", 0)]);
    }

    #[test]
    fn test_refilled_account_resets_cooldown() {
        let t0 = Instant::now();
        let mut state = JanitorState::new(5, Duration::from_secs(10));
        let exclude = HashSet::new();

        closable_accounts(&mut state, &[account("a", 0)], &exclude, t0);
        closable_accounts(&mut state, &[account("a", 3)], &exclude, t0 + Duration::from_secs(5));
        assert_eq!(state.tracked(), 0);
        assert!(closable_accounts(&mut state, &[account("a", 0)], &exclude, t0 + Duration::from_secs(12)).is_empty());
    }
}
