use anyhow::{Context, Result};
use clap::Parser;
use plinko_execution::CenterBias;
use plinko_server::{Api, Backend, ServerConfig};
use plinko_types::AccountId;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host interface to bind (default: localhost).
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(short, long, default_value_t = 8080)]
    port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Account allowed to use administrator routes (repeatable).
    #[arg(long = "admin")]
    admins: Vec<String>,

    /// Seed for drop resolution (drawn from the OS when omitted).
    #[arg(long)]
    seed: Option<u64>,

    /// Extra probability of drifting back to the centre line on each row.
    #[arg(long)]
    center_bias: Option<f64>,

    /// Pause between rows of each drop in milliseconds.
    #[arg(long, default_value_t = 0)]
    row_delay_ms: u64,

    /// Snapshot file restored at startup and written on shutdown.
    #[arg(long)]
    snapshot_path: Option<PathBuf>,

    /// Max request body size in bytes (0 disables limit).
    #[arg(long)]
    http_body_limit_bytes: Option<usize>,

    /// Comma-separated browser origins allowed by CORS (`*` allows any).
    #[arg(long, value_delimiter = ',')]
    allowed_origins: Vec<String>,

    /// Payment method created at startup, as `name=number` (repeatable).
    #[arg(long = "payment-method")]
    payment_methods: Vec<String>,
}

fn parse_payment_method(raw: &str) -> Result<(String, String)> {
    let (name, number) = raw
        .split_once('=')
        .with_context(|| format!("payment method must be name=number: {raw}"))?;
    let (name, number) = (name.trim(), number.trim());
    if name.is_empty() || number.is_empty() {
        anyhow::bail!("payment method must be name=number: {raw}");
    }
    Ok((name.to_string(), number.to_string()))
}

fn build_config(args: &Args) -> Result<ServerConfig> {
    let defaults = ServerConfig::default();
    let admins = args
        .admins
        .iter()
        .map(|id| AccountId::new(id.trim()).with_context(|| format!("invalid admin id: {id}")))
        .collect::<Result<Vec<_>>>()?;
    let center_bias = match args.center_bias {
        Some(bias) => CenterBias::new(bias).context("invalid center_bias")?,
        None => defaults.center_bias,
    };
    let payment_methods = args
        .payment_methods
        .iter()
        .map(|raw| parse_payment_method(raw))
        .collect::<Result<Vec<_>>>()?;
    if !payment_methods.is_empty() && admins.is_empty() {
        anyhow::bail!("payment methods require at least one --admin");
    }

    Ok(ServerConfig {
        admins,
        seed: args.seed,
        center_bias,
        row_delay_ms: args.row_delay_ms,
        snapshot_path: args.snapshot_path.clone(),
        http_body_limit_bytes: match args.http_body_limit_bytes {
            Some(0) => None,
            Some(limit) => Some(limit),
            None => defaults.http_body_limit_bytes,
        },
        allowed_origins: args
            .allowed_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect(),
        payment_methods,
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!(?err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    let level = Level::from_str(&args.log_level).context("invalid log level")?;
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = build_config(&args)?;
    info!(
        admins = config.admins.len(),
        seed = ?config.seed,
        center_bias = config.center_bias.value(),
        snapshot = ?config.snapshot_path,
        "server config loaded"
    );

    let backend = Arc::new(Backend::load(config)?);
    backend.seed_payment_methods().await?;
    let _changes = backend.spawn_change_log();
    let app = Api::new(backend.clone()).router();

    // Start server
    let addr = SocketAddr::new(args.host, args.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Listening on {}", addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    backend.save().await?;
    Ok(())
}
