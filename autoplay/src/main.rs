use anyhow::Context;
use clap::{Arg, Command};
use plinko_autoplay::{load_state, save_state, Config, Engine};
use plinko_execution::Memory;
use std::{path::PathBuf, str::FromStr};
use tracing::{info, warn, Level};

fn main() -> anyhow::Result<()> {
    // Parse arguments
    let matches = Command::new("autoplay")
        .about("Play automatic plinko sequences with a set of bots.")
        .arg(Arg::new("config").long("config").required(true))
        .get_matches();

    // Load from config file
    let config_file = matches
        .get_one::<String>("config")
        .map(PathBuf::from)
        .context("missing --config")?;
    let config = Config::load(&config_file)?;

    // Setup logging
    let level = Level::from_str(&config.log_level).context("invalid log level")?;
    tracing_subscriber::fmt().with_max_level(level).init();

    // Initialize runtime
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.worker_threads.max(1))
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    runtime.block_on(async move {
        info!(
            players = config.players,
            seed = config.seed,
            stake = %config.sequence.stake,
            count = config.sequence.count,
            "Starting autoplay"
        );

        let memory = match &config.snapshot {
            Some(path) => load_state(path)?,
            None => Memory::new(),
        };
        let engine = Engine::new(config.engine(), memory)?;

        let stop = engine.stop_handle();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after current cycles");
                stop.stop();
            }
        });

        let summary = engine.run().await?;
        info!(
            bots = summary.reports.len(),
            staked = %summary.staked(),
            paid = %summary.paid(),
            rtp = ?summary.return_to_player(),
            "Autoplay finished"
        );

        if let Some(path) = &config.snapshot {
            save_state(engine.ledger().state(), path).await?;
            info!(path = %path.display(), "Saved snapshot");
        }
        Ok(())
    })
}
