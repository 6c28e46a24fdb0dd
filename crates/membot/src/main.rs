//! membot: Solana new-token sniper with an operator dashboard.
//!
//! Usage:
//!   membot [OPTIONS]
//!
//! Options:
//!   -m, --mode <MODE>           Trading mode: live, paper
//!   -s, --strategy <STRATEGY>   Strategy: classic, stairs
//!   -c, --config <FILE>         Config file path (default: config/bot.toml)
//!   -p, --port <PORT>           Dashboard port (overrides PORT)
//!   --force-mint <MINT>         Inject one candidate at startup
//!   --dashboard-only            Serve the dashboard without trading

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use membot::config::{BotConfig, StrategyMode, TradingMode};
use membot::dashboard::spawn_dashboard;
use membot::executor::{Executor, LiveExecutor, PaperExecutor};
use membot::janitor::Janitor;
use membot::risk::RugpullCheck;
use membot::state::BotState;
use membot::strategy::seller::SellerConfig;
use membot::strategy::sniper::SniperConfig;
use membot::strategy::spike::LogFlow;
use membot::strategy::stairs::StairsTrader;
use membot::strategy::{Coordinator, JupiterMarket, Market, SellScheduler, StairsDispatcher};
use membot::watcher::{PoolWatcher, WatcherConfig};
use membot_chain::{JupiterClient, RpcClient, RpcConfig, SolPriceOracle, Wallet};

const CANDIDATE_QUEUE: usize = 1024;
const SELL_QUEUE: usize = 1024;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// CLI arguments for membot.
#[derive(Parser, Debug)]
#[command(name = "membot")]
#[command(about = "Solana new-token sniper with an operator dashboard")]
#[command(version)]
struct Args {
    /// Trading mode: live, paper
    #[arg(short, long)]
    mode: Option<String>,

    /// Strategy: classic, stairs
    #[arg(short, long)]
    strategy: Option<String>,

    /// Config file path
    #[arg(short, long, default_value = "config/bot.toml")]
    config: PathBuf,

    /// Dashboard port (overrides PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Inject this mint as a candidate at startup
    #[arg(long)]
    force_mint: Option<String>,

    /// Serve the dashboard without watching or trading
    #[arg(long)]
    dashboard_only: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    if let Err(e) = dotenvy::dotenv()
        && !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
    {
        eprintln!("Warning: Failed to load .env file: {}", e);
    }

    let args = Args::parse();

    let config_missing = !args.config.exists();
    let mut config = if config_missing {
        BotConfig::default()
    } else {
        BotConfig::from_file(&args.config).with_context(|| format!("Failed to load config from {:?}", args.config))?
    };
    config.apply_env_overrides();
    config.apply_cli_overrides(args.mode.clone(), args.strategy.clone(), args.port, args.force_mint.clone());

    let subscriber = FmtSubscriber::builder().with_max_level(log_level(&config.log_level)).finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set global tracing subscriber")?;

    if config_missing {
        warn!("Config file not found at {:?}, using defaults", args.config);
    }
    log_banner(&config, args.dashboard_only);

    if args.dashboard_only {
        if let Err(e) = config.validate() {
            warn!("Configuration incomplete ({e:#}); serving dashboard only");
        }
    } else {
        config.validate().context("Configuration validation failed")?;
    }

    let state = Arc::new(BotState::new(&config));
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    if config.dashboard.enabled {
        let handle = spawn_dashboard(config.dashboard.clone(), Arc::clone(&state), shutdown_tx.subscribe());
        tasks.push(tokio::spawn(async move {
            match handle.await {
                Ok(Err(e)) => error!("Dashboard server error: {e:#}"),
                Err(e) => error!("Dashboard task failed: {e}"),
                Ok(Ok(())) => {}
            }
        }));
    }

    if !args.dashboard_only {
        tasks.extend(start_trading(&config, &state, &shutdown_tx)?);
    }

    if let Err(e) = wait_for_shutdown().await {
        error!("Shutdown signal handler error: {}", e);
    }
    info!("Requesting shutdown...");
    state.control.request_shutdown();
    let _ = shutdown_tx.send(());

    let drain = async {
        for task in tasks {
            let _ = task.await;
        }
    };
    if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
        warn!("Tasks still running after {:?}; exiting", SHUTDOWN_GRACE);
    }

    info!("membot stopped");
    Ok(())
}

/// Build the chain clients, executor and strategy tasks.
fn start_trading(
    config: &BotConfig,
    state: &Arc<BotState>,
    shutdown: &broadcast::Sender<()>,
) -> Result<Vec<JoinHandle<()>>> {
    let rpc = Arc::new(
        RpcClient::new(RpcConfig {
            url: config.network.rpc_url.clone(),
            request_timeout: config.network.rpc_timeout,
        })
        .context("Failed to build RPC client")?,
    );
    let jupiter = JupiterClient::new(config.jupiter.client_config()).context("Failed to build Jupiter client")?;
    let oracle = Arc::new(SolPriceOracle::new(
        jupiter.clone(),
        config.jupiter.sol_price_ttl,
        config.jupiter.sol_price_fallback_usd,
    ));
    let market: Arc<dyn Market> = Arc::new(JupiterMarket::new(jupiter.clone(), oracle));

    let mut tasks = Vec::new();

    let executor: Arc<dyn Executor> = match config.mode {
        TradingMode::Live => {
            let keypair = config.wallet.load_keypair().context("Failed to load wallet key")?;
            let wallet = Arc::new(Wallet::new(keypair, Arc::clone(&rpc)));
            info!("Wallet: {}", wallet.pubkey());

            let janitor = Janitor::new(config.janitor.clone(), Arc::clone(&wallet), Arc::clone(state));
            tasks.push(tokio::spawn(janitor.run(shutdown.subscribe())));

            Arc::new(LiveExecutor::new(wallet, jupiter))
        }
        TradingMode::Paper => {
            info!("Paper trading with {} SOL", config.paper.starting_sol);
            Arc::new(PaperExecutor::new(config.paper.starting_sol))
        }
    };

    let (candidate_tx, candidate_rx) = mpsc::channel(CANDIDATE_QUEUE);
    let watcher = PoolWatcher::new(WatcherConfig::from_network(&config.network), Arc::clone(&rpc), candidate_tx);
    tasks.push(tokio::spawn(watcher.run(shutdown.subscribe())));

    match config.strategy {
        StrategyMode::Classic => {
            let (sell_tx, sell_rx) = mpsc::channel(SELL_QUEUE);
            let seller = SellScheduler::new(
                SellerConfig::from_config(config),
                Arc::clone(&market),
                Arc::clone(&executor),
                Arc::clone(state),
            );
            tasks.push(tokio::spawn(seller.run(sell_rx, shutdown.subscribe())));

            let mut coordinator = Coordinator::new(
                SniperConfig::from_config(config),
                market,
                executor,
                Arc::clone(state),
                sell_tx,
            )
            .with_rpc(Arc::clone(&rpc));
            if config.trading.rugpull_check {
                coordinator = coordinator.with_rugpull_check(RugpullCheck::new(rpc));
            }
            tasks.push(tokio::spawn(coordinator.run(candidate_rx, shutdown.subscribe())));
        }
        StrategyMode::Stairs => {
            let flow = Arc::new(LogFlow::new(config.network.ws_url.clone(), config.spike.clone()));
            let trader = Arc::new(StairsTrader::new(config, market, executor, flow, Arc::clone(state)));
            let dispatcher = StairsDispatcher::new(trader, config.stairs.max_concurrent);
            tasks.push(tokio::spawn(dispatcher.run(candidate_rx, shutdown.subscribe())));
        }
    }

    Ok(tasks)
}

fn log_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn log_banner(config: &BotConfig, dashboard_only: bool) {
    info!("Starting membot");
    info!("Mode: {} | Strategy: {}", config.mode, config.strategy);
    info!("RPC: {}", config.network.rpc_url);
    info!("WS: {}", config.network.ws_url);
    info!("Watching programs: {:?}", config.network.watch_program_ids);
    if let Some(ref mint) = config.network.force_token_mint {
        info!("Forced mint: {mint}");
    }
    let t = &config.trading;
    info!(
        "Buy ${} | exit after {:?} | sell {}",
        t.buy_usd, t.exit_after, t.sell_fraction
    );
    info!(
        "Slippage bps: probe {} / buy {} / sell {}",
        t.slippage_bps, t.slippage_bps_buy, t.slippage_bps_sell
    );
    info!(
        "Priority fee lamports: buy {} / sell {} (override {}, usd {})",
        t.priority_fee_lamports_buy, t.priority_fee_lamports_sell, t.sell_priority_fee_override, t.priority_fee_usd
    );
    if config.dashboard.enabled {
        info!("Dashboard on 0.0.0.0:{}", config.dashboard.port);
    }
    if dashboard_only {
        info!("Dashboard-only mode: trading disabled");
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(windows)]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
