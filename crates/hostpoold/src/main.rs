//! hostpoold — the resource pool daemon.
//!
//! Single binary that assembles the pool:
//! - Inventory store (redb)
//! - Matcher + reservation gate
//! - Host loader (when the external catalogs are configured)
//! - Status sync loop
//! - REST API
//!
//! # Usage
//!
//! ```text
//! hostpoold standalone --config /etc/hostpool/hostpool.toml --port 8480
//! hostpoold print-config > hostpool.toml
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use hostpool_core::{LogFormat, PoolConfig};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,hostpoold=debug,hostpool=debug";

#[derive(Parser)]
#[command(name = "hostpoold", about = "Resource pool matcher daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and background sync in one process.
    Standalone {
        /// Path to hostpool.toml. Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides `[server] port`).
        #[arg(long)]
        port: Option<u16>,

        /// Data directory for the inventory (overrides `[server] data_dir`).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Log output format (overrides `[log] format`).
        #[arg(long, value_enum)]
        log_format: Option<LogFormatArg>,
    },

    /// Print the default configuration as TOML.
    PrintConfig,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Pretty => LogFormat::Pretty,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            config,
            port,
            data_dir,
            log_format,
        } => {
            let mut config = match config {
                Some(path) => PoolConfig::from_file(&path)?,
                None => PoolConfig::default(),
            };
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(data_dir) = data_dir {
                config.server.data_dir = data_dir;
            }
            if let Some(format) = log_format {
                config.log.format = format.into();
            }
            init_tracing(&config);
            run_standalone(config).await
        }
        Command::PrintConfig => {
            print!("{}", PoolConfig::default().to_toml_string()?);
            Ok(())
        }
    }
}

/// `RUST_LOG` wins over `[log] filter`, which wins over the built-in default.
fn init_tracing(config: &PoolConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directive = config.log.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

async fn run_standalone(config: PoolConfig) -> anyhow::Result<()> {
    info!("hostpool daemon starting in standalone mode");

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db_path = config.server.data_dir.join("hostpool.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = hostpool_state::InventoryStore::open(&db_path)?;
    info!(path = ?db_path, "inventory store opened");

    let loader = hostpool_import::HostLoader::from_config(store.clone(), &config);
    if loader.is_some() {
        info!("host loader initialized");
    } else {
        warn!("catalog.cmdb_addr or catalog.job_addr unset, import disabled");
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let sync_handle = match (&config.catalog.cmdb_addr, config.sync.enabled) {
        (Some(cmdb), true) => {
            let catalog = Arc::new(hostpool_import::HttpCatalog::new(
                cmdb.clone(),
                config.catalog_timeout(),
            ));
            let sync = hostpool_sync::StatusSync::from_config(store.clone(), catalog, &config);
            let interval = config.sync_interval();
            Some(tokio::spawn(sync.run(interval, shutdown_rx.clone())))
        }
        (None, true) => {
            warn!("catalog.cmdb_addr unset, status sync disabled");
            None
        }
        (_, false) => None,
    };

    // ── Start API server ───────────────────────────────────────

    let router = hostpool_api::build_router(hostpool_api::ApiState::new(store, loader));
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    if let Some(handle) = sync_handle {
        let _ = handle.await;
    }

    info!("hostpool daemon stopped");
    Ok(())
}
