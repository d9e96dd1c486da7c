//! FundingHedge - Main Entry Point
//!
//! Command-line front end for the hedged funding-rate subscription engine.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use funding_hedge::common::channels::create_shutdown_channel;
use funding_hedge::common::clock::{Clock, SystemClock};
use funding_hedge::config::{load_config, AppConfig};
use funding_hedge::engine::{
    AutoCancelEngine, AutoCancelPolicy, BalanceValidator, NotificationBus, PositionSizer,
    SubscribeIntent, SubscriptionCoordinator, TickerCache, RECONCILE_INTERVAL,
};
use funding_hedge::history::TradeHistoryQuery;
use funding_hedge::{BackendRestClient, Credential, Environment, Exchange, PositionType, TickerPrice};

/// How often the opportunity feed is pulled into the ticker cache
const OPPORTUNITY_REFRESH: Duration = Duration::from_secs(15);

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "HEDGE_CONFIG", default_value = "config.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile, run countdowns and the auto-cancel sweep until Ctrl-C
    Run,
    /// Print active subscriptions and completed deals
    List,
    /// Subscribe to a symbol's next funding event
    Subscribe(SubscribeArgs),
    /// Replace an existing subscription with new parameters
    Edit {
        id: String,
        #[command(flatten)]
        params: SubscribeArgs,
    },
    /// Cancel a subscription
    Cancel {
        id: String,
    },
    /// Execute a subscription now instead of at funding time
    Execute {
        id: String,
    },
    /// Show closed positions
    History {
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        exchange: Option<String>,
        #[arg(long)]
        limit: Option<String>,
    },
    /// Size a position without touching the backend
    Size {
        symbol: String,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        margin: Decimal,
        #[arg(long, default_value_t = 1)]
        leverage: u32,
    },
}

/// Parameters shared by `subscribe` and `edit`
#[derive(clap::Args, Debug)]
struct SubscribeArgs {
    symbol: String,
    /// Direction of the primary leg (long or short)
    #[arg(long)]
    position: PositionType,
    /// Margin in USDT before leverage
    #[arg(long)]
    margin: Decimal,
    #[arg(long, default_value_t = 1)]
    leverage: u32,
    #[arg(long)]
    primary_exchange: Exchange,
    #[arg(long)]
    primary_credential: String,
    #[arg(long)]
    hedge_exchange: Exchange,
    #[arg(long)]
    hedge_credential: String,
    #[arg(long, default_value = "mainnet")]
    environment: Environment,
    /// Seconds before funding at which the backend executes
    #[arg(long, default_value_t = 5)]
    execution_delay: u32,
    /// Price to size with instead of the feed's quote
    #[arg(long)]
    price: Option<Decimal>,
}

impl SubscribeArgs {
    fn into_intent(self) -> SubscribeIntent {
        let environment = self.environment;
        let credential = |id: String, exchange: Exchange| Credential {
            id,
            exchange,
            environment,
            is_active: true,
        };
        SubscribeIntent {
            primary: credential(self.primary_credential, self.primary_exchange),
            hedge: credential(self.hedge_credential, self.hedge_exchange),
            symbol: self.symbol,
            position_type: self.position,
            margin: self.margin,
            leverage: self.leverage,
            execution_delay: self.execution_delay,
            price: self.price,
        }
    }
}

fn init_logging(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    let config = load_config(Some(&args.config)).context("loading configuration")?;
    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.settings.log_level.clone());
    init_logging(&level, args.json || config.settings.json_logs)?;

    info!("Configuration file: {}", args.config);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let notifications = NotificationBus::from_config(&config.notifications, clock.clone());
    let client = Arc::new(BackendRestClient::from_config(&config.backend)?);
    let coordinator = Arc::new(SubscriptionCoordinator::new(
        client.clone(),
        notifications.clone(),
        clock.clone(),
    ));
    let sizer = PositionSizer::from_config(&config.sizing);

    match args.command {
        Command::Run => run(&config, client, coordinator, clock).await?,
        Command::List => {
            let outcome = coordinator.reconcile().await?;
            for sub in &outcome.active {
                println!(
                    "{}  {:<14} {:<5} qty={} lev={}x status={} funding={}",
                    sub.id,
                    sub.symbol,
                    sub.position_type,
                    sub.quantity,
                    sub.leverage,
                    sub.status,
                    sub.next_funding_time.to_rfc3339()
                );
            }
            for deal in &outcome.completed_deals {
                println!(
                    "{}  {:<14} {:<5} filled @ {} pnl={}",
                    deal.subscription_id,
                    deal.symbol,
                    deal.position_type,
                    deal.entry_price,
                    deal.realized_pnl.map(|p| p.to_string()).unwrap_or_else(|| "-".into())
                );
            }
            if outcome.dropped > 0 {
                warn!("{} malformed subscriptions skipped", outcome.dropped);
            }
        }
        Command::Subscribe(params) => {
            let balances = BalanceValidator::new(client.clone(), notifications.clone(), &config.balance);
            let prepared = params
                .into_intent()
                .prepare(&sizer, client.as_ref(), &balances)
                .await?;
            let sub = coordinator.create(prepared.request).await?;
            println!(
                "{}  {} {} qty={} lev={}x",
                sub.id, sub.symbol, sub.position_type, sub.quantity, sub.leverage
            );
        }
        Command::Edit { id, params } => {
            // Load the registry so the edit sees the current subscriptions
            coordinator.reconcile().await?;
            let balances = BalanceValidator::new(client.clone(), notifications.clone(), &config.balance);
            let prepared = params
                .into_intent()
                .prepare(&sizer, client.as_ref(), &balances)
                .await?;
            let sub = coordinator.edit(&id, prepared.request).await?;
            println!("{} replaced by {}", id, sub.id);
        }
        Command::Cancel { id } => coordinator.cancel(&id, false).await?,
        Command::Execute { id } => coordinator.execute_now(&id).await?,
        Command::History {
            symbol,
            exchange,
            limit,
        } => {
            let query = TradeHistoryQuery::from_params(
                symbol.as_deref(),
                exchange.as_deref(),
                limit.as_deref(),
            )?;
            let history = client.trade_history(&query).await?;
            println!("{}", serde_json::to_string_pretty(&history)?);
        }
        Command::Size {
            symbol,
            price,
            margin,
            leverage,
        } => {
            let calc = sizer.compute(&symbol, TickerPrice::new(Some(price), None), Some(margin), leverage)?;
            println!(
                "{}: quantity={} value={} margin={} fee~{}",
                calc.symbol, calc.quantity, calc.position_value, calc.required_margin, calc.estimated_fee
            );
        }
    }

    Ok(())
}

async fn run(
    config: &AppConfig,
    client: Arc<BackendRestClient>,
    coordinator: Arc<SubscriptionCoordinator>,
    clock: Arc<dyn Clock>,
) -> Result<()> {
    info!("Starting FundingHedge engine");

    let outcome = coordinator.reconcile().await?;
    info!(
        "Reconciled {} active subscriptions, {} completed deals",
        outcome.active.len(),
        outcome.completed_deals.len()
    );

    let ticker = Arc::new(TickerCache::new());
    let (shutdown_tx, shutdown_rx) = create_shutdown_channel();

    // Keep the ticker cache warm for the sweep
    let refresh = {
        let ticker = ticker.clone();
        let client = client.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            let mut every = interval(OPPORTUNITY_REFRESH);
            loop {
                tokio::select! {
                    _ = every.tick() => {
                        if let Err(e) = ticker.refresh(client.as_ref()).await {
                            warn!("Opportunity refresh failed: {}", e);
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        })
    };

    // Drop entries that completed or were cancelled elsewhere
    let resync = {
        let coordinator = coordinator.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { coordinator.run_reconciliation(RECONCILE_INTERVAL, shutdown).await })
    };

    let engine = Arc::new(AutoCancelEngine::new(
        coordinator.clone(),
        ticker,
        AutoCancelPolicy::from_config(&config.auto_cancel),
        clock,
    ));
    let sweep = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run(shutdown_rx).await })
    };

    // Keep the application running
    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    shutdown_tx.send(true).ok();
    let _ = tokio::join!(refresh, resync, sweep);
    Ok(())
}
