//! PBFT Trade Monitor
//!
//! Command-line client for the trading demo server. `watch` keeps a live,
//! reconciled view of consensus results, blocks, balance and history;
//! the other subcommands are one-shot account and trading actions.
//! The login is persisted to disk and survives restarts.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use pbft_api_client::{ApiClient, OrderSide, Session, SnapshotFetcher};
use pbft_consensus_view::{
    EventChannel, QuorumRule, Reconciler, ServerAsserted, ThresholdQuorum,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod config;
mod view;

use config::MonitorConfig;

/// Order side
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    Buy,
    Sell,
}

impl From<Side> for OrderSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Buy => OrderSide::Buy,
            Side::Sell => OrderSide::Sell,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and remember the session
    Login {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Create an account
    Register {
        username: String,
        #[arg(long)]
        password: String,
    },
    /// Forget the stored session
    Logout,
    /// Show the account balance
    Balance,
    /// Deposit funds
    Deposit { amount: u64 },
    /// Submit a buy or sell order
    Trade {
        #[arg(value_enum)]
        side: Side,
        amount: u64,
    },
    /// Show trade history
    History,
    /// Show the latest block, or a specific one
    Block {
        #[arg(long)]
        id: Option<String>,
    },
    /// Follow consensus live
    Watch {
        /// Refresh every slice every N seconds (0 = only on reconnect)
        #[arg(long)]
        refresh_secs: Option<u64>,
        /// Log in first instead of reusing the stored session
        #[arg(long, requires = "password")]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
    },
}

/// PBFT trading demo client
#[derive(Parser, Debug)]
#[command(name = "pbft-monitor")]
#[command(about = "Observe PBFT consensus and trade against the demo server", long_about = None)]
struct Args {
    /// JSON config file; flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// REST prefix, e.g. http://127.0.0.1:5000/api
    #[arg(long)]
    api_url: Option<String>,

    /// Consensus feed URL
    #[arg(long)]
    ws_url: Option<String>,

    /// Data directory for the persisted session
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    fn resolve_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::load(path)?,
            None => MonitorConfig::default(),
        };

        if let Some(api_url) = &self.api_url {
            config.api_url = api_url.clone();
        }
        if let Some(ws_url) = &self.ws_url {
            config.ws_url = ws_url.clone();
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = data_dir.clone();
        }
        if let Command::Watch {
            refresh_secs: Some(secs),
            ..
        } = &self.command
        {
            config.refresh_secs = *secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.resolve_config()?;
    std::fs::create_dir_all(&config.data_dir)?;
    let session = Session::open(config.session_path())?;
    let client = ApiClient::new(config.api_config(), session)?;

    match args.command {
        Command::Login { username, password } => {
            client.login(&username, &password).await?;
            println!("Logged in as {}", username);
        }
        Command::Register { username, password } => {
            let ack = client.register(&username, &password).await?;
            println!("{}", ack.msg.unwrap_or_else(|| format!("Registered {}", username)));
        }
        Command::Logout => {
            client.logout();
            println!("Logged out");
        }
        Command::Balance => {
            println!("{:.2}", client.fetch_balance().await?);
        }
        Command::Deposit { amount } => {
            let ack = client.deposit(amount).await?;
            println!("{}", ack.msg.unwrap_or_else(|| format!("Deposited {}", amount)));
        }
        Command::Trade { side, amount } => {
            let ack = client.trade(side.into(), amount).await?;
            println!("{}", ack.msg.unwrap_or_else(|| "Order submitted".to_string()));
        }
        Command::History => {
            let records = client.fetch_history().await?;
            if records.is_empty() {
                println!("No trades yet");
            }
            for record in &records {
                println!("{}", view::history_row(record));
            }
        }
        Command::Block { id } => {
            let block = match id {
                Some(id) => client.block_by_id(&id).await?,
                None => client.fetch_consensus().await?.block,
            };
            match block {
                Some(block) => println!("{}", serde_json::to_string_pretty(&block)?),
                None => println!("No block"),
            }
        }
        Command::Watch {
            username, password, ..
        } => {
            if let (Some(username), Some(password)) = (username, password) {
                client.login(&username, &password).await?;
            }
            run_watch(client, config).await?;
        }
    }

    Ok(())
}

/// Live view: push channel plus reconciler until Ctrl+C
async fn run_watch(client: ApiClient, config: MonitorConfig) -> Result<()> {
    let identity = client
        .session()
        .current_identity()
        .ok_or_else(|| anyhow::anyhow!("Not logged in; run `pbft-monitor login` first"))?;

    tracing::info!("Starting PBFT trade monitor");
    tracing::info!("  User: {}", identity.username);
    tracing::info!("  REST: {}", client.base_url());
    tracing::info!("  Feed: {}", config.ws_url);
    if config.refresh_secs > 0 {
        tracing::info!("  Manual refresh every {}s", config.refresh_secs);
    }

    let rule: Arc<dyn QuorumRule> = match config.quorum {
        Some(thresholds) => Arc::new(ThresholdQuorum {
            commit: thresholds.commit,
            reject: thresholds.reject,
        }),
        None => Arc::new(ServerAsserted),
    };

    let channel = EventChannel::new(config.channel_config()).with_session(client.session().clone());
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(client),
        rule,
        config.reconciler_config(),
    ));

    reconciler.on_change(|state| println!("{}", view::summary(state)));
    reconciler.attach(&channel);
    reconciler.start();
    channel.start()?;

    // Log connection changes
    let mut status = channel.watch_status();
    let status_logger = tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = *status.borrow_and_update();
            tracing::info!("Feed {:?} (connection {})", current.state, current.epoch);
        }
    });

    let refresher = (config.refresh_secs > 0).then(|| {
        let reconciler = reconciler.clone();
        let period = Duration::from_secs(config.refresh_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick fires immediately; start() already loaded everything
            interval.tick().await;
            loop {
                interval.tick().await;
                reconciler.refresh_all();
            }
        })
    });

    tracing::info!("Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    channel.stop();
    reconciler.shutdown();
    status_logger.abort();
    if let Some(refresher) = refresher {
        refresher.abort();
    }

    let stats = reconciler.stats();
    tracing::info!(
        "{} events, {} snapshots applied; {} stale discards, {} superseded responses, {} fetch failures, {} reconnect refetches",
        stats.events_applied,
        stats.snapshots_applied,
        stats.stale_discarded,
        stats.superseded_responses,
        stats.fetch_failures,
        stats.refetches_after_reconnect
    );
    tracing::info!("Monitor stopped");

    Ok(())
}
