//! Configuration for membot.
//!
//! Loaded from a TOML file, then overridden by environment variables (the
//! same names the bot has always used in `.env` files), then by CLI flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use membot_chain::{JupiterConfig, Keypair, KeypairError};
use membot_common::{PUMPFUN_PROGRAM_ID, SOL_MINT};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Top-level configuration for membot.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Execution mode: live or paper.
    pub mode: TradingMode,

    /// Entry/exit strategy: classic hold-and-sell or stairs.
    pub strategy: StrategyMode,

    /// Logging level.
    pub log_level: String,

    /// RPC, WebSocket and watched programs.
    pub network: NetworkConfig,

    /// Wallet key material (environment only).
    pub wallet: WalletConfig,

    /// Classic sniper parameters.
    pub trading: TradingConfig,

    /// Stairs strategy parameters.
    pub stairs: StairsConfig,

    /// Trade-flow spike detection.
    pub spike: SpikeConfig,

    /// Jupiter API access.
    pub jupiter: JupiterApiConfig,

    /// Empty token account cleanup.
    pub janitor: JanitorConfig,

    /// Dashboard HTTP server.
    pub dashboard: DashboardConfig,

    /// Paper-trading executor.
    pub paper: PaperConfig,
}

/// Execution mode determines the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradingMode {
    /// Real swaps signed by the configured wallet.
    Live,
    /// Real quotes, simulated fills.
    Paper,
}

impl TradingMode {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "live" => Some(TradingMode::Live),
            "paper" => Some(TradingMode::Paper),
            _ => None,
        }
    }
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Live => write!(f, "live"),
            TradingMode::Paper => write!(f, "paper"),
        }
    }
}

/// Strategy run against each candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyMode {
    /// Buy immediately, sell after a fixed hold.
    Classic,
    /// Wait for a flow spike or mcap jump, then trade the mcap ladder.
    Stairs,
}

impl StrategyMode {
    fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "classic" => Some(StrategyMode::Classic),
            "stairs" => Some(StrategyMode::Stairs),
            _ => None,
        }
    }
}

impl std::fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyMode::Classic => write!(f, "classic"),
            StrategyMode::Stairs => write!(f, "stairs"),
        }
    }
}

/// RPC endpoints and the programs to watch.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub rpc_url: String,
    pub ws_url: String,
    /// Program whose creations we react to.
    pub pumpfun_program_id: String,
    /// Programs subscribed via `logsSubscribe`.
    pub watch_program_ids: Vec<String>,
    /// Inject this mint once at startup (smoke test).
    pub force_token_mint: Option<String>,
    pub ws_ping_interval: Duration,
    pub rpc_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            ws_url: "wss://api.mainnet-beta.solana.com/".to_string(),
            pumpfun_program_id: PUMPFUN_PROGRAM_ID.to_string(),
            watch_program_ids: vec![PUMPFUN_PROGRAM_ID.to_string()],
            force_token_mint: None,
            ws_ping_interval: Duration::from_secs(20),
            rpc_timeout: Duration::from_secs(10),
        }
    }
}

/// Wallet key material. Never read from the TOML file.
#[derive(Debug, Clone, Default)]
pub struct WalletConfig {
    /// JSON array of 64 bytes, or a path to a file containing one.
    pub private_key_json: Option<String>,
    /// Legacy comma/space separated integers.
    pub secret_key: Option<String>,
}

impl WalletConfig {
    pub fn is_configured(&self) -> bool {
        self.private_key_json.as_deref().is_some_and(|v| !v.trim().is_empty())
            || self.secret_key.as_deref().is_some_and(|v| !v.trim().is_empty())
    }

    pub fn load_keypair(&self) -> Result<Keypair, KeypairError> {
        Keypair::from_env_values(self.private_key_json.as_deref(), self.secret_key.as_deref())
    }
}

/// Classic sniper parameters.
#[derive(Debug, Clone)]
pub struct TradingConfig {
    /// USD spent per classic entry.
    pub buy_usd: Decimal,
    /// Keep retrying a buy for this long after detection.
    pub entry_max_age: Duration,
    /// Skip candidates older than this many slots (0 disables).
    pub entry_max_age_slots: u64,
    /// Hold time before the first sell.
    pub exit_after: Duration,
    /// Extra wait when the bought balance has not shown up yet.
    pub settle_buffer: Duration,
    /// Fraction of the balance sold (0..=1).
    pub sell_fraction: Decimal,
    pub sell_retry_schedule: Vec<Duration>,
    pub sell_retry_max_tries: u32,
    pub max_buys_per_sec: f64,
    pub min_liquidity_usd: Decimal,
    /// Slippage for price probes.
    pub slippage_bps: u16,
    pub slippage_bps_buy: u16,
    pub slippage_bps_sell: u16,
    pub priority_fee_lamports_buy: u64,
    pub priority_fee_lamports_sell: u64,
    /// Sell-only tip override; wins over everything when > 0.
    pub sell_priority_fee_override: u64,
    /// Tip in USD when the lamport tip is 0.
    pub priority_fee_usd: Decimal,
    /// On-chain mint age bounds (zero disables a bound).
    pub mint_age_min: Duration,
    pub mint_age_max: Duration,
    pub mint_age_page_limit: usize,
    pub mint_age_max_pages: usize,
    /// Refuse mints whose authority has been renounced.
    pub rugpull_check: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            buy_usd: Decimal::from(10),
            entry_max_age: Duration::from_secs(60),
            entry_max_age_slots: 3,
            exit_after: Duration::from_secs(5),
            settle_buffer: Duration::from_millis(500),
            sell_fraction: Decimal::new(995, 3),
            sell_retry_schedule: default_retry_schedule(),
            sell_retry_max_tries: 5,
            max_buys_per_sec: 0.5,
            min_liquidity_usd: Decimal::ZERO,
            slippage_bps: 500,
            slippage_bps_buy: 9000,
            slippage_bps_sell: 800,
            priority_fee_lamports_buy: 1_100_000,
            priority_fee_lamports_sell: 1_100_000,
            sell_priority_fee_override: 0,
            priority_fee_usd: Decimal::ZERO,
            mint_age_min: Duration::ZERO,
            mint_age_max: Duration::ZERO,
            mint_age_page_limit: 1000,
            mint_age_max_pages: 6,
            rugpull_check: false,
        }
    }
}

fn default_retry_schedule() -> Vec<Duration> {
    [0.6, 1.3, 2.1, 3.0, 4.0].into_iter().map(Duration::from_secs_f64).collect()
}

/// Market-cap estimation.
#[derive(Debug, Clone)]
pub struct McapConfig {
    pub token_total_supply: Decimal,
    pub token_decimals: u32,
    /// Poll interval inside rounds.
    pub check_interval: Duration,
    /// Reuse a price quote for this long.
    pub quote_min_interval: Duration,
}

impl Default for McapConfig {
    fn default() -> Self {
        Self {
            token_total_supply: Decimal::from(1_000_000_000u64),
            token_decimals: 6,
            check_interval: Duration::from_millis(250),
            quote_min_interval: Duration::from_millis(750),
        }
    }
}

/// Milestone take-profit ladder.
#[derive(Debug, Clone)]
pub struct LadderConfig {
    pub tp_levels: Vec<Decimal>,
    pub tp_fractions: Vec<Decimal>,
    pub sell_all_level: Decimal,
    pub arm_stop_after: Decimal,
    pub stop_loss: Decimal,
    /// Percent drop between two observations that exits everything.
    pub instant_drop_stop_pct: Decimal,
}

impl Default for LadderConfig {
    fn default() -> Self {
        Self {
            tp_levels: [120_000, 130_000, 140_000, 150_000].into_iter().map(Decimal::from).collect(),
            tp_fractions: vec![
                Decimal::new(30, 2),
                Decimal::new(25, 2),
                Decimal::new(20, 2),
                Decimal::new(15, 2),
            ],
            sell_all_level: Decimal::from(160_000),
            arm_stop_after: Decimal::from(115_000),
            stop_loss: Decimal::from(110_000),
            instant_drop_stop_pct: Decimal::new(35, 1),
        }
    }
}

/// Open-ended "moon bag" ladder.
#[derive(Debug, Clone)]
pub struct DynamicBagConfig {
    pub enabled: bool,
    pub start_usd: Decimal,
    pub step_usd: Decimal,
    pub sell_fraction: Decimal,
    pub max_usd: Decimal,
    pub idle_timeout: Duration,
    pub max_duration: Duration,
}

impl Default for DynamicBagConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            start_usd: Decimal::from(120_000),
            step_usd: Decimal::from(10_000),
            sell_fraction: Decimal::new(10, 2),
            max_usd: Decimal::from(2_000_000),
            idle_timeout: Duration::from_secs(10),
            max_duration: Duration::from_secs(600),
        }
    }
}

/// Entry trigger on a fast market-cap jump.
#[derive(Debug, Clone)]
pub struct JumpConfig {
    pub enabled: bool,
    /// Baseline must start at or below this.
    pub lo_usd: Decimal,
    /// ...and reach at least this.
    pub hi_usd: Decimal,
    /// Alternative trigger: absolute rise from baseline (0 disables).
    pub require_delta_usd: Decimal,
    pub check_interval: Duration,
    pub window: Duration,
}

impl Default for JumpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            lo_usd: Decimal::from(15_000),
            hi_usd: Decimal::from(60_000),
            require_delta_usd: Decimal::ZERO,
            check_interval: Duration::from_millis(500),
            window: Duration::from_secs(60),
        }
    }
}

/// Stairs strategy parameters.
#[derive(Debug, Clone)]
pub struct StairsConfig {
    pub max_concurrent: usize,
    pub entry_clip_usd: Decimal,
    pub scalp_hold: Duration,
    pub reenter_until_loss: bool,
    pub cooldown: Duration,
    pub blacklist_cooldown: Duration,
    /// Priority tip per swap, in USD.
    pub tip_usd: Decimal,
    pub reenter_needs_next_pop: bool,
    pub reenter_pop_timeout: Duration,
    pub mcap: McapConfig,
    pub ladder: LadderConfig,
    pub dynamic_bag: DynamicBagConfig,
    pub jump: JumpConfig,
}

impl Default for StairsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            entry_clip_usd: Decimal::from(10),
            scalp_hold: Duration::from_secs(3),
            reenter_until_loss: true,
            cooldown: Duration::from_secs(1),
            blacklist_cooldown: Duration::from_secs(120),
            tip_usd: Decimal::new(5, 3),
            reenter_needs_next_pop: true,
            reenter_pop_timeout: Duration::from_millis(6000),
            mcap: McapConfig::default(),
            ladder: LadderConfig::default(),
            dynamic_bag: DynamicBagConfig::default(),
            jump: JumpConfig::default(),
        }
    }
}

/// Trade-flow spike detection on a mint's logs.
#[derive(Debug, Clone)]
pub struct SpikeConfig {
    pub window: Duration,
    pub required: u32,
    pub gap_min: Duration,
    pub gap_max: Duration,
    pub use_buckets: bool,
    pub bucket_secs: u64,
    pub cum_window: Duration,
    pub cum_min_usd: Decimal,
}

impl Default for SpikeConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60),
            required: 4,
            gap_min: Duration::from_millis(800),
            gap_max: Duration::from_millis(6000),
            use_buckets: false,
            bucket_secs: 2,
            cum_window: Duration::from_secs(12),
            cum_min_usd: Decimal::from(65_000),
        }
    }
}

/// Jupiter API access and SOL price caching.
#[derive(Debug, Clone)]
pub struct JupiterApiConfig {
    pub base_url: String,
    pub max_rps: f64,
    pub max_burst: f64,
    pub max_retries: u32,
    pub backoff_base: Duration,
    pub use_jito: bool,
    pub request_timeout: Duration,
    pub sol_price_ttl: Duration,
    pub sol_price_fallback_usd: Decimal,
}

impl Default for JupiterApiConfig {
    fn default() -> Self {
        let client = JupiterConfig::default();
        Self {
            base_url: client.base_url,
            max_rps: client.max_rps,
            max_burst: client.max_burst,
            max_retries: client.max_retries,
            backoff_base: client.backoff_base,
            use_jito: client.use_jito,
            request_timeout: client.request_timeout,
            sol_price_ttl: Duration::from_secs(15),
            sol_price_fallback_usd: Decimal::from(150),
        }
    }
}

impl JupiterApiConfig {
    /// Client settings for `membot_chain::JupiterClient`.
    pub fn client_config(&self) -> JupiterConfig {
        JupiterConfig {
            base_url: self.base_url.clone(),
            request_timeout: self.request_timeout,
            max_rps: self.max_rps,
            max_burst: self.max_burst,
            max_retries: self.max_retries,
            backoff_base: self.backoff_base,
            use_jito: self.use_jito,
        }
    }
}

/// Background cleanup of empty token accounts.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    pub enabled: bool,
    /// An account must stay empty this long before it is closed.
    pub cooldown: Duration,
    pub interval: Duration,
    pub max_per_min: usize,
    /// Do nothing while the wallet holds less than this.
    pub min_sol_reserve: Decimal,
    /// Wait for this much trading silence before closing.
    pub idle_window: Duration,
    pub tip_lamports: u64,
    pub exclude_mints: Vec<String>,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown: Duration::from_secs(172_800),
            interval: Duration::from_secs(12),
            max_per_min: 5,
            min_sol_reserve: Decimal::new(5, 1),
            idle_window: Duration::from_secs(20),
            tip_lamports: 150_000,
            exclude_mints: vec![SOL_MINT.to_string()],
        }
    }
}

/// Dashboard configuration.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
    pub enable_cors: bool,
    /// Served under `/static` when set.
    pub static_dir: Option<String>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
            enable_cors: true,
            static_dir: None,
        }
    }
}

/// Paper-trading executor.
#[derive(Debug, Clone)]
pub struct PaperConfig {
    pub starting_sol: Decimal,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            starting_sol: Decimal::from(10),
        }
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            mode: TradingMode::Paper,
            strategy: StrategyMode::Classic,
            log_level: "info".to_string(),
            network: NetworkConfig::default(),
            wallet: WalletConfig::default(),
            trading: TradingConfig::default(),
            stairs: StairsConfig::default(),
            spike: SpikeConfig::default(),
            jupiter: JupiterApiConfig::default(),
            janitor: JanitorConfig::default(),
            dashboard: DashboardConfig::default(),
            paper: PaperConfig::default(),
        }
    }
}

impl BotConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Ok(Self::from(file))
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from `lookup` (environment variable name → value).
    ///
    /// Unparsable values are ignored and the previous setting kept.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup: &lookup };

        if let Some(level) = env.string("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
        if let Some(stairs) = env.flag("STAIRS_MODE") {
            self.strategy = if stairs { StrategyMode::Stairs } else { StrategyMode::Classic };
        }
        if let Some(mode) = env.string("TRADING_MODE").and_then(|m| TradingMode::from_str(&m)) {
            self.mode = mode;
        }

        // Network
        let net = &mut self.network;
        env.set_string("SOLANA_RPC_URL", &mut net.rpc_url);
        env.set_string("SOLANA_WS_URL", &mut net.ws_url);
        let pumpfun_changed = env.set_string("PUMPFUN_PROGRAM_ID", &mut net.pumpfun_program_id);
        if let Some(ids) = env.list("WATCH_PROGRAM_IDS") {
            net.watch_program_ids = ids;
        } else if pumpfun_changed {
            net.watch_program_ids = vec![net.pumpfun_program_id.clone()];
        }
        if let Some(mint) = env.string("FORCE_TOKEN_MINT") {
            net.force_token_mint = Some(mint);
        }
        env.set_secs("WS_PING_INTERVAL", &mut net.ws_ping_interval);

        // Wallet credentials
        if let Some(key) = env.string("WALLET_PRIVATE_KEY_JSON") {
            self.wallet.private_key_json = Some(key);
        }
        if let Some(key) = env.string("WALLET_SECRET_KEY") {
            self.wallet.secret_key = Some(key);
        }

        // Classic trading
        let t = &mut self.trading;
        env.set_decimal("BUY_USD", &mut t.buy_usd);
        env.set_secs("ENTRY_MAX_AGE_SECONDS", &mut t.entry_max_age);
        env.set_parsed("ENTRY_MAX_AGE_SLOTS", &mut t.entry_max_age_slots);
        env.set_secs("EXIT_AFTER_SECONDS", &mut t.exit_after);
        env.set_secs("SETTLE_BUFFER_SECONDS", &mut t.settle_buffer);
        if let Some(pct) = env.decimal("SELL_PERCENT") {
            t.sell_fraction = normalize_fraction(pct);
        }
        if let Some(schedule) = env.list("SELL_RETRY_SCHEDULE") {
            let parsed: Option<Vec<Duration>> = schedule.iter().map(|s| parse_secs(s)).collect();
            if let Some(parsed) = parsed.filter(|p| !p.is_empty()) {
                t.sell_retry_schedule = parsed;
            }
        }
        env.set_parsed("SELL_RETRY_MAX_TRIES", &mut t.sell_retry_max_tries);
        env.set_parsed("MAX_BUYS_PER_SEC", &mut t.max_buys_per_sec);
        env.set_decimal("MIN_LIQUIDITY_USD", &mut t.min_liquidity_usd);
        env.set_parsed("SLIPPAGE_BPS", &mut t.slippage_bps);
        env.set_parsed("SLIPPAGE_BPS_BUY", &mut t.slippage_bps_buy);
        env.set_parsed("SLIPPAGE_BPS_SELL", &mut t.slippage_bps_sell);
        if let Some(fee) = env.parsed::<u64>("PRIORITY_FEE_LAMPORTS") {
            t.priority_fee_lamports_buy = fee;
            t.priority_fee_lamports_sell = fee;
        }
        env.set_parsed("PRIORITY_FEE_LAMPORTS_BUY", &mut t.priority_fee_lamports_buy);
        env.set_parsed("PRIORITY_FEE_LAMPORTS_SELL", &mut t.priority_fee_lamports_sell);
        env.set_parsed("SELL_PRIORITY_FEE_LAMPORTS", &mut t.sell_priority_fee_override);
        env.set_decimal("PRIORITY_FEE_USD", &mut t.priority_fee_usd);
        env.set_secs("MINT_AGE_MIN_SECONDS", &mut t.mint_age_min);
        env.set_secs("MINT_AGE_MAX_SECONDS", &mut t.mint_age_max);
        env.set_parsed("MINT_AGE_PAGE_LIMIT", &mut t.mint_age_page_limit);
        env.set_parsed("MINT_AGE_MAX_PAGES", &mut t.mint_age_max_pages);
        if let Some(on) = env.flag("RUGPULL_CHECK_ENABLED") {
            t.rugpull_check = on;
        }

        // Stairs
        let s = &mut self.stairs;
        env.set_parsed("STAIRS_MAX_CONCURRENT", &mut s.max_concurrent);
        env.set_decimal("ENTRY_CLIP_USD", &mut s.entry_clip_usd);
        env.set_secs("SCALP_HOLD_SEC", &mut s.scalp_hold);
        if let Some(on) = env.flag("SCALP_REENTER_UNTIL_LOSS") {
            s.reenter_until_loss = on;
        }
        env.set_secs("SCALP_COOLDOWN_SEC", &mut s.cooldown);
        env.set_secs("BLACKLIST_COOLDOWN_SEC", &mut s.blacklist_cooldown);
        env.set_decimal("STAIRS_TIP_USD", &mut s.tip_usd);
        if let Some(on) = env.flag("REENTER_NEEDS_NEXT_POP") {
            s.reenter_needs_next_pop = on;
        }
        env.set_millis("REENTER_POP_TIMEOUT_MS", &mut s.reenter_pop_timeout);

        env.set_decimal("TOKEN_TOTAL_SUPPLY", &mut s.mcap.token_total_supply);
        env.set_parsed("TOKEN_DECIMALS", &mut s.mcap.token_decimals);
        env.set_millis("MCAP_CHECK_INTERVAL_MS", &mut s.mcap.check_interval);
        env.set_millis("MCAP_QUOTE_MIN_INTERVAL_MS", &mut s.mcap.quote_min_interval);

        if let Some(levels) = env.decimal_list("MCAP_TP_LEVELS") {
            s.ladder.tp_levels = levels;
        }
        if let Some(fractions) = env.decimal_list("MCAP_TP_FRACTIONS") {
            s.ladder.tp_fractions = fractions;
        }
        env.set_decimal("MCAP_SELL_ALL_LEVEL", &mut s.ladder.sell_all_level);
        env.set_decimal("MCAP_ARM_STOP_AFTER", &mut s.ladder.arm_stop_after);
        env.set_decimal("MCAP_STOP_LOSS", &mut s.ladder.stop_loss);
        env.set_decimal("INSTANT_DROP_STOP_PCT", &mut s.ladder.instant_drop_stop_pct);

        let bag = &mut s.dynamic_bag;
        if let Some(on) = env.flag("DYNAMIC_BAG_ENABLED") {
            bag.enabled = on;
        }
        env.set_decimal("DYNAMIC_BAG_START_USD", &mut bag.start_usd);
        env.set_decimal("DYNAMIC_BAG_STEP_USD", &mut bag.step_usd);
        if let Some(frac) = env.decimal("DYNAMIC_BAG_SELL_FRAC") {
            bag.sell_fraction = frac.clamp(Decimal::ZERO, Decimal::ONE);
        }
        env.set_decimal("DYNAMIC_BAG_MAX_USD", &mut bag.max_usd);
        env.set_secs("DYNAMIC_BAG_IDLE_TIMEOUT_SEC", &mut bag.idle_timeout);
        env.set_secs("DYNAMIC_BAG_MAX_DURATION_SEC", &mut bag.max_duration);

        let jump = &mut s.jump;
        if let Some(on) = env.flag("MCAP_JUMP_MODE_ENABLED") {
            jump.enabled = on;
        }
        env.set_decimal("MCAP_JUMP_FROM_USD", &mut jump.lo_usd);
        env.set_decimal("MCAP_JUMP_TO_USD", &mut jump.hi_usd);
        env.set_decimal("MCAP_JUMP_REQUIRE_DELTA", &mut jump.require_delta_usd);
        env.set_millis("MCAP_JUMP_CHECK_MS", &mut jump.check_interval);
        env.set_secs("MCAP_JUMP_HOLD_SEC", &mut jump.window);
        env.set_secs("MCAP_JUMP_WINDOW_SEC", &mut jump.window);

        // Spike detection
        let sp = &mut self.spike;
        env.set_secs("SPIKE_WINDOW_SEC", &mut sp.window);
        env.set_parsed("SPIKE_REQUIRED", &mut sp.required);
        env.set_millis("SPIKE_GAP_MIN_MS", &mut sp.gap_min);
        env.set_millis("SPIKE_GAP_MAX_MS", &mut sp.gap_max);
        if let Some(on) = env.flag("SPIKE_USE_BUCKETS") {
            sp.use_buckets = on;
        }
        env.set_parsed("SPIKE_BUCKET_SECS", &mut sp.bucket_secs);
        env.set_secs("PUMP_CUM_WINDOW_SEC", &mut sp.cum_window);
        env.set_decimal("PUMP_CUM_MIN_USD", &mut sp.cum_min_usd);

        // Jupiter
        let j = &mut self.jupiter;
        env.set_string("JUP_BASE_URL", &mut j.base_url);
        env.set_parsed("JUP_MAX_RPS", &mut j.max_rps);
        env.set_parsed("JUP_MAX_BURST", &mut j.max_burst);
        env.set_parsed("JUP_MAX_RETRIES", &mut j.max_retries);
        env.set_millis("JUP_BACKOFF_BASE_MS", &mut j.backoff_base);
        if let Some(on) = env.flag("JUP_USE_JITO") {
            j.use_jito = on;
        }
        env.set_secs("SOL_PRICE_TTL_SEC", &mut j.sol_price_ttl);

        // Janitor
        let jn = &mut self.janitor;
        if let Some(on) = env.flag("CLOSE_ATA_ENABLED") {
            jn.enabled = on;
        }
        env.set_secs("CLOSE_ATA_COOLDOWN_SEC", &mut jn.cooldown);
        env.set_secs("CLOSE_ATA_INTERVAL_SEC", &mut jn.interval);
        env.set_parsed("CLOSE_ATA_MAX_PER_MIN", &mut jn.max_per_min);
        env.set_decimal("CLOSE_ATA_MIN_SOL_RESERVE", &mut jn.min_sol_reserve);
        env.set_secs("CLOSE_ATA_IDLE_WINDOW_SEC", &mut jn.idle_window);
        env.set_parsed("CLOSE_ATA_TIP_LAMPORTS", &mut jn.tip_lamports);
        if let Some(mints) = env.list("CLOSE_ATA_EXCLUDE_MINTS") {
            jn.exclude_mints = mints;
        }

        // Dashboard and paper trading
        env.set_parsed("PORT", &mut self.dashboard.port);
        if let Some(dir) = env.string("DASHBOARD_STATIC_DIR") {
            self.dashboard.static_dir = Some(dir);
        }
        env.set_decimal("PAPER_STARTING_SOL", &mut self.paper.starting_sol);
    }

    /// Apply CLI argument overrides.
    pub fn apply_cli_overrides(
        &mut self,
        mode: Option<String>,
        strategy: Option<String>,
        port: Option<u16>,
        force_mint: Option<String>,
    ) {
        if let Some(mode_str) = mode
            && let Some(m) = TradingMode::from_str(&mode_str)
        {
            self.mode = m;
        }

        if let Some(strategy_str) = strategy
            && let Some(s) = StrategyMode::from_str(&strategy_str)
        {
            self.strategy = s;
        }

        if let Some(port) = port {
            self.dashboard.port = port;
        }

        if let Some(mint) = force_mint
            && !mint.trim().is_empty()
        {
            self.network.force_token_mint = Some(mint.trim().to_string());
        }
    }

    /// Validate configuration and return errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        if self.mode == TradingMode::Live && !self.wallet.is_configured() {
            bail!("Live mode requires WALLET_PRIVATE_KEY_JSON or WALLET_SECRET_KEY");
        }

        if self.network.watch_program_ids.is_empty() && self.network.force_token_mint.is_none() {
            bail!("At least one program ID must be watched (WATCH_PROGRAM_IDS)");
        }

        let t = &self.trading;
        if t.buy_usd <= Decimal::ZERO {
            bail!("buy_usd must be positive");
        }
        for (name, bps) in [
            ("slippage_bps", t.slippage_bps),
            ("slippage_bps_buy", t.slippage_bps_buy),
            ("slippage_bps_sell", t.slippage_bps_sell),
        ] {
            if bps > 10_000 {
                bail!("{name} must be at most 10000");
            }
        }
        if !is_fraction(t.sell_fraction) {
            bail!("sell_percent must be between 0 and 1 (or 0 and 100)");
        }
        if t.sell_retry_schedule.is_empty() {
            bail!("sell_retry_schedule must not be empty");
        }
        if t.max_buys_per_sec <= 0.0 {
            bail!("max_buys_per_sec must be positive");
        }
        if !t.mint_age_max.is_zero() && t.mint_age_min > t.mint_age_max {
            bail!("mint_age_min cannot exceed mint_age_max");
        }

        let s = &self.stairs;
        if s.max_concurrent == 0 {
            bail!("stairs max_concurrent must be at least 1");
        }
        if s.entry_clip_usd <= Decimal::ZERO {
            bail!("entry_clip_usd must be positive");
        }
        if s.mcap.token_total_supply <= Decimal::ZERO {
            bail!("token_total_supply must be positive");
        }
        if s.mcap.token_decimals > 18 {
            bail!("token_decimals must be at most 18");
        }
        if s.ladder.tp_fractions.iter().any(|f| !is_fraction(*f)) {
            bail!("mcap_tp_fractions must each be between 0 and 1");
        }
        if s.dynamic_bag.enabled && s.dynamic_bag.step_usd <= Decimal::ZERO {
            bail!("dynamic_bag step_usd must be positive");
        }
        if !is_fraction(s.dynamic_bag.sell_fraction) {
            bail!("dynamic_bag sell_frac must be between 0 and 1");
        }

        if self.spike.gap_min > self.spike.gap_max {
            bail!("spike gap_min cannot exceed gap_max");
        }

        if self.jupiter.max_rps <= 0.0 {
            bail!("jupiter max_rps must be positive");
        }

        if self.janitor.max_per_min == 0 {
            bail!("janitor max_per_min must be at least 1");
        }

        Ok(())
    }
}

fn is_fraction(value: Decimal) -> bool {
    value >= Decimal::ZERO && value <= Decimal::ONE
}

/// Accept either a fraction (0.98) or a percentage (98) and clamp to 0..=1.
pub fn normalize_fraction(value: Decimal) -> Decimal {
    let fraction = if value > Decimal::ONE { value / Decimal::ONE_HUNDRED } else { value };
    fraction.clamp(Decimal::ZERO, Decimal::ONE)
}

fn parse_secs(s: &str) -> Option<Duration> {
    s.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v >= 0.0)
        .map(Duration::from_secs_f64)
}

fn parse_flag(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Typed access to environment-style key/value lookups.
struct EnvReader<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<'_, F> {
    fn string(&self, key: &str) -> Option<String> {
        (self.lookup)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.string(key)?.parse().ok()
    }

    fn decimal(&self, key: &str) -> Option<Decimal> {
        let raw = self.string(key)?;
        raw.parse::<Decimal>()
            .ok()
            .or_else(|| Decimal::from_scientific(&raw).ok())
    }

    fn flag(&self, key: &str) -> Option<bool> {
        parse_flag(&self.string(key)?)
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .string(key)?
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        (!items.is_empty()).then_some(items)
    }

    fn decimal_list(&self, key: &str) -> Option<Vec<Decimal>> {
        self.list(key)?.iter().map(|s| s.parse().ok()).collect()
    }

    fn set_string(&self, key: &str, target: &mut String) -> bool {
        match self.string(key) {
            Some(v) => {
                *target = v;
                true
            }
            None => false,
        }
    }

    fn set_parsed<T: std::str::FromStr>(&self, key: &str, target: &mut T) {
        if let Some(v) = self.parsed(key) {
            *target = v;
        }
    }

    fn set_decimal(&self, key: &str, target: &mut Decimal) {
        if let Some(v) = self.decimal(key) {
            *target = v;
        }
    }

    fn set_secs(&self, key: &str, target: &mut Duration) {
        if let Some(v) = self.string(key).and_then(|s| parse_secs(&s)) {
            *target = v;
        }
    }

    fn set_millis(&self, key: &str, target: &mut Duration) {
        if let Some(v) = self.parsed::<u64>(key) {
            *target = Duration::from_millis(v);
        }
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Deserialize, Default)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    network: NetworkToml,
    #[serde(default)]
    trading: TradingToml,
    #[serde(default)]
    stairs: StairsToml,
    #[serde(default)]
    spike: SpikeToml,
    #[serde(default)]
    jupiter: JupiterToml,
    #[serde(default)]
    janitor: JanitorToml,
    #[serde(default)]
    dashboard: DashboardToml,
    #[serde(default)]
    paper: PaperToml,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    mode: String,
    strategy: String,
    log_level: String,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            mode: "paper".to_string(),
            strategy: "classic".to_string(),
            log_level: "info".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct NetworkToml {
    rpc_url: String,
    ws_url: String,
    pumpfun_program_id: String,
    watch_program_ids: Vec<String>,
    force_token_mint: Option<String>,
    ws_ping_interval_secs: f64,
    rpc_timeout_secs: f64,
}

impl Default for NetworkToml {
    fn default() -> Self {
        let d = NetworkConfig::default();
        Self {
            rpc_url: d.rpc_url,
            ws_url: d.ws_url,
            pumpfun_program_id: d.pumpfun_program_id,
            watch_program_ids: Vec::new(),
            force_token_mint: None,
            ws_ping_interval_secs: d.ws_ping_interval.as_secs_f64(),
            rpc_timeout_secs: d.rpc_timeout.as_secs_f64(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct TradingToml {
    buy_usd: f64,
    entry_max_age_secs: f64,
    entry_max_age_slots: u64,
    exit_after_secs: f64,
    settle_buffer_secs: f64,
    sell_percent: f64,
    sell_retry_schedule_secs: Vec<f64>,
    sell_retry_max_tries: u32,
    max_buys_per_sec: f64,
    min_liquidity_usd: f64,
    slippage_bps: u16,
    slippage_bps_buy: u16,
    slippage_bps_sell: u16,
    priority_fee_lamports_buy: u64,
    priority_fee_lamports_sell: u64,
    sell_priority_fee_lamports: u64,
    priority_fee_usd: f64,
    mint_age_min_secs: f64,
    mint_age_max_secs: f64,
    mint_age_page_limit: usize,
    mint_age_max_pages: usize,
    rugpull_check: bool,
}

impl Default for TradingToml {
    fn default() -> Self {
        Self {
            buy_usd: 10.0,
            entry_max_age_secs: 60.0,
            entry_max_age_slots: 3,
            exit_after_secs: 5.0,
            settle_buffer_secs: 0.5,
            sell_percent: 99.5,
            sell_retry_schedule_secs: vec![0.6, 1.3, 2.1, 3.0, 4.0],
            sell_retry_max_tries: 5,
            max_buys_per_sec: 0.5,
            min_liquidity_usd: 0.0,
            slippage_bps: 500,
            slippage_bps_buy: 9000,
            slippage_bps_sell: 800,
            priority_fee_lamports_buy: 1_100_000,
            priority_fee_lamports_sell: 1_100_000,
            sell_priority_fee_lamports: 0,
            priority_fee_usd: 0.0,
            mint_age_min_secs: 0.0,
            mint_age_max_secs: 0.0,
            mint_age_page_limit: 1000,
            mint_age_max_pages: 6,
            rugpull_check: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct StairsToml {
    max_concurrent: usize,
    entry_clip_usd: f64,
    scalp_hold_secs: f64,
    reenter_until_loss: bool,
    cooldown_secs: f64,
    blacklist_cooldown_secs: f64,
    tip_usd: f64,
    reenter_needs_next_pop: bool,
    reenter_pop_timeout_ms: u64,
    token_total_supply: f64,
    token_decimals: u32,
    mcap_check_interval_ms: u64,
    mcap_quote_min_interval_ms: u64,
    tp_levels: Vec<f64>,
    tp_fractions: Vec<f64>,
    sell_all_level: f64,
    arm_stop_after: f64,
    stop_loss: f64,
    instant_drop_stop_pct: f64,
    dynamic_bag: DynamicBagToml,
    jump: JumpToml,
}

impl Default for StairsToml {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            entry_clip_usd: 10.0,
            scalp_hold_secs: 3.0,
            reenter_until_loss: true,
            cooldown_secs: 1.0,
            blacklist_cooldown_secs: 120.0,
            tip_usd: 0.005,
            reenter_needs_next_pop: true,
            reenter_pop_timeout_ms: 6000,
            token_total_supply: 1e9,
            token_decimals: 6,
            mcap_check_interval_ms: 250,
            mcap_quote_min_interval_ms: 750,
            tp_levels: vec![120_000.0, 130_000.0, 140_000.0, 150_000.0],
            tp_fractions: vec![0.30, 0.25, 0.20, 0.15],
            sell_all_level: 160_000.0,
            arm_stop_after: 115_000.0,
            stop_loss: 110_000.0,
            instant_drop_stop_pct: 3.5,
            dynamic_bag: DynamicBagToml::default(),
            jump: JumpToml::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DynamicBagToml {
    enabled: bool,
    start_usd: f64,
    step_usd: f64,
    sell_frac: f64,
    max_usd: f64,
    idle_timeout_secs: f64,
    max_duration_secs: f64,
}

impl Default for DynamicBagToml {
    fn default() -> Self {
        Self {
            enabled: false,
            start_usd: 120_000.0,
            step_usd: 10_000.0,
            sell_frac: 0.10,
            max_usd: 2_000_000.0,
            idle_timeout_secs: 10.0,
            max_duration_secs: 600.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct JumpToml {
    enabled: bool,
    from_usd: f64,
    to_usd: f64,
    require_delta_usd: f64,
    check_ms: u64,
    window_secs: f64,
}

impl Default for JumpToml {
    fn default() -> Self {
        Self {
            enabled: false,
            from_usd: 15_000.0,
            to_usd: 60_000.0,
            require_delta_usd: 0.0,
            check_ms: 500,
            window_secs: 60.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct SpikeToml {
    window_secs: f64,
    required: u32,
    gap_min_ms: u64,
    gap_max_ms: u64,
    use_buckets: bool,
    bucket_secs: u64,
    cum_window_secs: f64,
    cum_min_usd: f64,
}

impl Default for SpikeToml {
    fn default() -> Self {
        Self {
            window_secs: 60.0,
            required: 4,
            gap_min_ms: 800,
            gap_max_ms: 6000,
            use_buckets: false,
            bucket_secs: 2,
            cum_window_secs: 12.0,
            cum_min_usd: 65_000.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct JupiterToml {
    base_url: String,
    max_rps: f64,
    max_burst: f64,
    max_retries: u32,
    backoff_base_ms: u64,
    use_jito: bool,
    request_timeout_secs: f64,
    sol_price_ttl_secs: f64,
    sol_price_fallback_usd: f64,
}

impl Default for JupiterToml {
    fn default() -> Self {
        Self {
            base_url: membot_chain::jupiter::DEFAULT_JUPITER_URL.to_string(),
            max_rps: 6.0,
            max_burst: 6.0,
            max_retries: 5,
            backoff_base_ms: 200,
            use_jito: true,
            request_timeout_secs: 10.0,
            sol_price_ttl_secs: 15.0,
            sol_price_fallback_usd: 150.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct JanitorToml {
    enabled: bool,
    cooldown_secs: f64,
    interval_secs: f64,
    max_per_min: usize,
    min_sol_reserve: f64,
    idle_window_secs: f64,
    tip_lamports: u64,
    exclude_mints: Vec<String>,
}

impl Default for JanitorToml {
    fn default() -> Self {
        Self {
            enabled: true,
            cooldown_secs: 172_800.0,
            interval_secs: 12.0,
            max_per_min: 5,
            min_sol_reserve: 0.5,
            idle_window_secs: 20.0,
            tip_lamports: 150_000,
            exclude_mints: vec![SOL_MINT.to_string()],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DashboardToml {
    enabled: bool,
    port: u16,
    enable_cors: bool,
    static_dir: Option<String>,
}

impl Default for DashboardToml {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8000,
            enable_cors: true,
            static_dir: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PaperToml {
    starting_sol: f64,
}

impl Default for PaperToml {
    fn default() -> Self {
        Self { starting_sol: 10.0 }
    }
}

/// Convert f64 to Decimal.
fn f64_to_decimal(val: f64) -> Decimal {
    Decimal::try_from(val).unwrap_or(Decimal::ZERO)
}

fn secs(val: f64) -> Duration {
    if val.is_finite() && val > 0.0 {
        Duration::from_secs_f64(val)
    } else {
        Duration::ZERO
    }
}

impl From<TomlConfig> for BotConfig {
    fn from(toml: TomlConfig) -> Self {
        let net = toml.network;
        let watch_program_ids = if net.watch_program_ids.is_empty() {
            vec![net.pumpfun_program_id.clone()]
        } else {
            net.watch_program_ids
        };
        let t = toml.trading;
        let s = toml.stairs;

        Self {
            mode: TradingMode::from_str(&toml.general.mode).unwrap_or(TradingMode::Paper),
            strategy: StrategyMode::from_str(&toml.general.strategy).unwrap_or(StrategyMode::Classic),
            log_level: toml.general.log_level,
            network: NetworkConfig {
                rpc_url: net.rpc_url,
                ws_url: net.ws_url,
                pumpfun_program_id: net.pumpfun_program_id,
                watch_program_ids,
                force_token_mint: net.force_token_mint.filter(|m| !m.trim().is_empty()),
                ws_ping_interval: secs(net.ws_ping_interval_secs),
                rpc_timeout: secs(net.rpc_timeout_secs),
            },
            wallet: WalletConfig::default(), // Always from env vars
            trading: TradingConfig {
                buy_usd: f64_to_decimal(t.buy_usd),
                entry_max_age: secs(t.entry_max_age_secs),
                entry_max_age_slots: t.entry_max_age_slots,
                exit_after: secs(t.exit_after_secs),
                settle_buffer: secs(t.settle_buffer_secs),
                sell_fraction: normalize_fraction(f64_to_decimal(t.sell_percent)),
                sell_retry_schedule: t.sell_retry_schedule_secs.into_iter().map(secs).collect(),
                sell_retry_max_tries: t.sell_retry_max_tries,
                max_buys_per_sec: t.max_buys_per_sec,
                min_liquidity_usd: f64_to_decimal(t.min_liquidity_usd),
                slippage_bps: t.slippage_bps,
                slippage_bps_buy: t.slippage_bps_buy,
                slippage_bps_sell: t.slippage_bps_sell,
                priority_fee_lamports_buy: t.priority_fee_lamports_buy,
                priority_fee_lamports_sell: t.priority_fee_lamports_sell,
                sell_priority_fee_override: t.sell_priority_fee_lamports,
                priority_fee_usd: f64_to_decimal(t.priority_fee_usd),
                mint_age_min: secs(t.mint_age_min_secs),
                mint_age_max: secs(t.mint_age_max_secs),
                mint_age_page_limit: t.mint_age_page_limit,
                mint_age_max_pages: t.mint_age_max_pages,
                rugpull_check: t.rugpull_check,
            },
            stairs: StairsConfig {
                max_concurrent: s.max_concurrent,
                entry_clip_usd: f64_to_decimal(s.entry_clip_usd),
                scalp_hold: secs(s.scalp_hold_secs),
                reenter_until_loss: s.reenter_until_loss,
                cooldown: secs(s.cooldown_secs),
                blacklist_cooldown: secs(s.blacklist_cooldown_secs),
                tip_usd: f64_to_decimal(s.tip_usd),
                reenter_needs_next_pop: s.reenter_needs_next_pop,
                reenter_pop_timeout: Duration::from_millis(s.reenter_pop_timeout_ms),
                mcap: McapConfig {
                    token_total_supply: f64_to_decimal(s.token_total_supply),
                    token_decimals: s.token_decimals,
                    check_interval: Duration::from_millis(s.mcap_check_interval_ms),
                    quote_min_interval: Duration::from_millis(s.mcap_quote_min_interval_ms),
                },
                ladder: LadderConfig {
                    tp_levels: s.tp_levels.into_iter().map(f64_to_decimal).collect(),
                    tp_fractions: s.tp_fractions.into_iter().map(f64_to_decimal).collect(),
                    sell_all_level: f64_to_decimal(s.sell_all_level),
                    arm_stop_after: f64_to_decimal(s.arm_stop_after),
                    stop_loss: f64_to_decimal(s.stop_loss),
                    instant_drop_stop_pct: f64_to_decimal(s.instant_drop_stop_pct),
                },
                dynamic_bag: DynamicBagConfig {
                    enabled: s.dynamic_bag.enabled,
                    start_usd: f64_to_decimal(s.dynamic_bag.start_usd),
                    step_usd: f64_to_decimal(s.dynamic_bag.step_usd),
                    sell_fraction: f64_to_decimal(s.dynamic_bag.sell_frac).clamp(Decimal::ZERO, Decimal::ONE),
                    max_usd: f64_to_decimal(s.dynamic_bag.max_usd),
                    idle_timeout: secs(s.dynamic_bag.idle_timeout_secs),
                    max_duration: secs(s.dynamic_bag.max_duration_secs),
                },
                jump: JumpConfig {
                    enabled: s.jump.enabled,
                    lo_usd: f64_to_decimal(s.jump.from_usd),
                    hi_usd: f64_to_decimal(s.jump.to_usd),
                    require_delta_usd: f64_to_decimal(s.jump.require_delta_usd),
                    check_interval: Duration::from_millis(s.jump.check_ms),
                    window: secs(s.jump.window_secs),
                },
            },
            spike: SpikeConfig {
                window: secs(toml.spike.window_secs),
                required: toml.spike.required,
                gap_min: Duration::from_millis(toml.spike.gap_min_ms),
                gap_max: Duration::from_millis(toml.spike.gap_max_ms),
                use_buckets: toml.spike.use_buckets,
                bucket_secs: toml.spike.bucket_secs,
                cum_window: secs(toml.spike.cum_window_secs),
                cum_min_usd: f64_to_decimal(toml.spike.cum_min_usd),
            },
            jupiter: JupiterApiConfig {
                base_url: toml.jupiter.base_url,
                max_rps: toml.jupiter.max_rps,
                max_burst: toml.jupiter.max_burst,
                max_retries: toml.jupiter.max_retries,
                backoff_base: Duration::from_millis(toml.jupiter.backoff_base_ms),
                use_jito: toml.jupiter.use_jito,
                request_timeout: secs(toml.jupiter.request_timeout_secs),
                sol_price_ttl: secs(toml.jupiter.sol_price_ttl_secs),
                sol_price_fallback_usd: f64_to_decimal(toml.jupiter.sol_price_fallback_usd),
            },
            janitor: JanitorConfig {
                enabled: toml.janitor.enabled,
                cooldown: secs(toml.janitor.cooldown_secs),
                interval: secs(toml.janitor.interval_secs),
                max_per_min: toml.janitor.max_per_min,
                min_sol_reserve: f64_to_decimal(toml.janitor.min_sol_reserve),
                idle_window: secs(toml.janitor.idle_window_secs),
                tip_lamports: toml.janitor.tip_lamports,
                exclude_mints: toml.janitor.exclude_mints,
            },
            dashboard: DashboardConfig {
                enabled: toml.dashboard.enabled,
                port: toml.dashboard.port,
                enable_cors: toml.dashboard.enable_cors,
                static_dir: toml.dashboard.static_dir,
            },
            paper: PaperConfig {
                starting_sol: f64_to_decimal(toml.paper.starting_sol),
            },
        }
    }
}
