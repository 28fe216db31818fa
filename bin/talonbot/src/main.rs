use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, watch};
use tracing::{error, info, warn};

use common::{
    logging, BotConfig, Credentials, ExchangeClient, OrderRequest, OrderSide, TimeInForce,
};
use engine::{BinanceFuturesClient, OcoWatcher, UserDataStream};
use strategy::{GridSpec, OcoSpec, TwapSpec};

/// Binance USDT-M futures execution bot.
#[derive(Parser)]
#[command(name = "talonbot", about = "Binance USDT-M futures execution bot")]
struct Cli {
    /// API key (falls back to BINANCE_API_KEY).
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// API secret (falls back to BINANCE_API_SECRET).
    #[arg(long, global = true)]
    api_secret: Option<String>,

    /// Route orders to the futures testnet.
    #[arg(long, global = true)]
    testnet: bool,

    /// Optional TOML config file.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level when RUST_LOG is not set.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Directory for rotating JSON log files.
    #[arg(long, global = true)]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Place a market order.
    Market {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        side: String,
        #[arg(long)]
        quantity: f64,
    },
    /// Place a limit order.
    Limit {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        side: String,
        #[arg(long)]
        quantity: f64,
        #[arg(long)]
        price: f64,
        /// GTC, IOC, FOK or GTX. Defaults to the configured value.
        #[arg(long)]
        time_in_force: Option<String>,
    },
    /// Place a stop-limit order (stop trigger + limit price).
    StopLimit {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        side: String,
        #[arg(long)]
        quantity: f64,
        #[arg(long)]
        stop_price: f64,
        #[arg(long)]
        limit_price: f64,
    },
    /// Place a ladder of limit orders across a price range.
    Grid {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        lower: f64,
        #[arg(long)]
        upper: f64,
        #[arg(long)]
        levels: usize,
        /// Quantity per level.
        #[arg(long)]
        quantity: f64,
    },
    /// Execute a total quantity as time-spaced market-order slices.
    Twap {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        side: String,
        /// Total quantity across all slices.
        #[arg(long)]
        quantity: f64,
        #[arg(long, default_value_t = 10)]
        slices: usize,
        #[arg(long, default_value_t = 30)]
        interval_secs: u64,
    },
    /// Place a synthetic take-profit/stop-loss pair.
    Oco {
        #[arg(long)]
        symbol: String,
        /// Side of the entry position the pair protects.
        #[arg(long)]
        side: String,
        #[arg(long)]
        quantity: f64,
        #[arg(long)]
        take_profit: f64,
        #[arg(long)]
        stop_loss: f64,
        /// Watch the user-data stream and cancel the surviving leg when
        /// one leg fills. Runs until Ctrl+C.
        #[arg(long)]
        watch: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        error!(error = %e, "command failed");
        eprintln!("talonbot: {e}");
        process::exit(1);
    }
}

async fn run(cli: Cli) -> common::Result<()> {
    let mut cfg = match &cli.config {
        Some(path) => BotConfig::load(path)?,
        None => BotConfig::default(),
    };
    if cli.testnet {
        cfg.testnet = true;
    }

    let log_level = cli.log_level.as_deref().unwrap_or(&cfg.log_level);
    let log_dir = cli.log_dir.as_deref().or(cfg.log_dir.as_deref());
    logging::init_logging(log_level, log_dir, "talonbot");

    info!(testnet = cfg.testnet, "talonbot starting");

    let creds = Credentials::resolve(cli.api_key.clone(), cli.api_secret.clone())?;
    let client = BinanceFuturesClient::new(creds.api_key, creds.api_secret, cfg.testnet)
        .with_recv_window(cfg.recv_window);

    match cli.command {
        Command::Market {
            symbol,
            side,
            quantity,
        } => {
            let side: OrderSide = side.parse()?;
            let ack = client
                .place_order(&OrderRequest::market(symbol.as_str(), side, quantity))
                .await?;
            print_ack(&ack)?;
        }

        Command::Limit {
            symbol,
            side,
            quantity,
            price,
            time_in_force,
        } => {
            let side: OrderSide = side.parse()?;
            let tif: TimeInForce = match time_in_force {
                Some(s) => s.parse()?,
                None => cfg.time_in_force,
            };
            let ack = client
                .place_order(&OrderRequest::limit(symbol.as_str(), side, quantity, price, tif))
                .await?;
            print_ack(&ack)?;
        }

        Command::StopLimit {
            symbol,
            side,
            quantity,
            stop_price,
            limit_price,
        } => {
            let side: OrderSide = side.parse()?;
            let ack = client
                .place_order(&OrderRequest::stop_limit(
                    symbol.as_str(),
                    side,
                    quantity,
                    stop_price,
                    limit_price,
                ))
                .await?;
            print_ack(&ack)?;
        }

        Command::Grid {
            symbol,
            lower,
            upper,
            levels,
            quantity,
        } => {
            let spec = GridSpec {
                symbol,
                lower,
                upper,
                levels,
                quantity,
                time_in_force: cfg.time_in_force,
            };
            let placed = strategy::create_grid(&client, &spec).await?;
            println!("placed {} of {} grid orders", placed.len(), levels);
            for ack in &placed {
                print_ack(ack)?;
            }
        }

        Command::Twap {
            symbol,
            side,
            quantity,
            slices,
            interval_secs,
        } => {
            let spec = TwapSpec {
                symbol,
                side: side.parse()?,
                total_quantity: quantity,
                slices,
                interval: Duration::from_secs(interval_secs),
            };
            let placed = strategy::execute_twap(&client, &spec).await?;
            println!("placed {} of {} TWAP slices", placed.len(), slices);
        }

        Command::Oco {
            symbol,
            side,
            quantity,
            take_profit,
            stop_loss,
            watch,
        } => {
            let spec = OcoSpec {
                symbol,
                entry_side: side.parse()?,
                quantity,
                take_profit_price: take_profit,
                stop_loss_price: stop_loss,
            };
            let client = Arc::new(client);
            let orders = strategy::place_oco(client.as_ref(), &spec).await?;
            print_ack(&orders.take_profit)?;
            print_ack(&orders.stop_loss)?;

            if watch {
                watch_oco_pair(client, orders.pair(), cfg.testnet).await?;
            }
        }
    }

    Ok(())
}

/// Run the user-data stream, listen-key keepalive, and the OCO watcher
/// until Ctrl+C.
async fn watch_oco_pair(
    client: Arc<BinanceFuturesClient>,
    pair: common::OcoPair,
    testnet: bool,
) -> common::Result<()> {
    let listen_key = client.create_listen_key().await?;

    let (update_tx, update_rx) = broadcast::channel(1024);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let stream = UserDataStream::new(listen_key, testnet, update_tx);
    let stream_task = tokio::spawn(stream.run(shutdown_rx.clone()));

    let watcher = OcoWatcher::new(
        pair,
        client.clone() as Arc<dyn ExchangeClient>,
        update_rx,
        shutdown_rx.clone(),
    );
    let watcher_task = tokio::spawn(watcher.run());

    // The venue expires listen keys after 60 minutes without a keepalive.
    let keepalive_client = client.clone();
    let mut keepalive_shutdown = shutdown_rx;
    let keepalive_task = tokio::spawn(async move {
        let mut tick = tokio::time::interval(Duration::from_secs(30 * 60));
        tick.tick().await; // the first tick completes immediately
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = keepalive_client.keepalive_listen_key().await {
                        warn!(error = %e, "listen key keepalive failed");
                    }
                }
                _ = keepalive_shutdown.changed() => {
                    if *keepalive_shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    });

    info!("watching OCO pair; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    let _ = shutdown_tx.send(true);
    let _ = tokio::join!(stream_task, watcher_task, keepalive_task);

    if let Err(e) = client.close_listen_key().await {
        warn!(error = %e, "failed to close listen key");
    }
    Ok(())
}

fn print_ack(ack: &common::OrderAck) -> common::Result<()> {
    println!("{}", serde_json::to_string_pretty(ack)?);
    Ok(())
}
