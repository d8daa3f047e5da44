//! # edgesync
//!
//! Gateway agent entry point.
//!
//! ## Commands
//!
//! - `run`: Start the control loop until Ctrl-C
//! - `sync`: Run one sync cycle and exit
//! - `execute`: Apply every due command once and exit
//! - `cleanup`: Purge synced readings past retention and exit
//! - `status`: Print local store counters
//!
//! ## Example
//!
//! ```bash
//! EDGESYNC_SECURITY_KEY=secret edgesync --config /etc/edgesync.toml run
//! ```

use anyhow::{anyhow, Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use edgesync_core::{
    init_logging, Agent, AgentConfig, AgentSettings, DurableStore, ExecutionEngine,
    HttpCloudClient, LoggingActuator, SimulatedSensors, SyncEngine,
};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Offline-first irrigation gateway agent.
#[derive(Parser, Debug)]
#[command(name = "edgesync")]
#[command(version, about, long_about = None)]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the control loop until Ctrl-C
    Run,

    /// Run one sync cycle and exit
    Sync,

    /// Apply every due command once and exit
    Execute,

    /// Purge synced readings older than the retention window
    Cleanup,

    /// Print local store counters
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AgentConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AgentConfig::from_defaults().context("Invalid default configuration")?,
    };

    init_logging(
        &config.logging.level,
        config.logging.directory.as_deref(),
        config.logging.stderr,
    )
    .map_err(|err| anyhow!(err))
    .context("Failed to initialize logging")?;

    let store = DurableStore::open(&config.storage.database).with_context(|| {
        format!(
            "Failed to open store {}",
            config.storage.database.display()
        )
    })?;

    match cli.command {
        Commands::Run => run(config, store),
        Commands::Sync => sync_once(&config, &store),
        Commands::Execute => execute_once(&store),
        Commands::Cleanup => cleanup_once(&config, &store),
        Commands::Status => status(&store),
    }
}

fn build_client(config: &AgentConfig) -> Result<HttpCloudClient> {
    HttpCloudClient::new(config.cloud_client_config()).context("Failed to build cloud client")
}

fn run(config: AgentConfig, store: DurableStore) -> Result<()> {
    let client = build_client(&config)?;
    let settings = AgentSettings::from(&config);
    let mut agent = Agent::new(
        store,
        client,
        SimulatedSensors,
        LoggingActuator,
        &settings,
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    spawn_signal_listener(Arc::clone(&shutdown))?;

    agent.run(&shutdown);
    info!("event=shutdown module=cli status=ok");
    Ok(())
}

/// Flips `shutdown` on Ctrl-C from a dedicated signal thread.
fn spawn_signal_listener(shutdown: Arc<AtomicBool>) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    std::thread::Builder::new()
        .name("edgesync-signal".to_string())
        .spawn(move || {
            runtime.block_on(async {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => info!("event=shutdown_requested module=cli status=ok"),
                    Err(err) => warn!(
                        "event=shutdown_requested module=cli status=error error={}",
                        err
                    ),
                }
            });
            shutdown.store(true, Ordering::SeqCst);
        })
        .context("Failed to spawn signal thread")?;
    Ok(())
}

fn sync_once(config: &AgentConfig, store: &DurableStore) -> Result<()> {
    let client = build_client(config)?;
    let mut engine = SyncEngine::new(client, config.sync.batch_size);
    let report = engine.sync_cycle(store);

    println!("state:    {}", report.state.as_str());
    println!("pushed:   {}", report.pushed);
    match report.pulled {
        Some(pulled) => println!(
            "pulled:   {} (inserted {}, replaced {}, preserved {})",
            pulled, report.upsert.inserted, report.upsert.replaced, report.upsert.preserved
        ),
        None => println!("pulled:   -"),
    }
    for failure in &report.failures {
        println!("failure:  {failure}");
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow!("sync cycle finished with {} failure(s)", report.failures.len()))
    }
}

fn execute_once(store: &DurableStore) -> Result<()> {
    let mut engine = ExecutionEngine::new(LoggingActuator);
    let report = engine.execute_due(store, Utc::now());

    println!("executed: {}", report.executed.len());
    for id in &report.executed {
        println!("  {id}");
    }
    if !report.deferred.is_empty() {
        println!("deferred: {}", report.deferred.len());
    }
    for failure in &report.failures {
        println!("failure:  {failure}");
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(anyhow!("execution pass finished with {} failure(s)", report.failures.len()))
    }
}

fn cleanup_once(config: &AgentConfig, store: &DurableStore) -> Result<()> {
    let retention = Duration::days(i64::from(config.cleanup.retention_days));
    let cutoff = Utc::now() - retention;
    let purged = store
        .purge_synced_older_than(cutoff)
        .context("Failed to purge synced readings")?;
    println!("purged:   {purged}");
    Ok(())
}

fn status(store: &DurableStore) -> Result<()> {
    let stats = store.stats().context("Failed to read store counters")?;
    println!("readings: {} total, {} unsynced", stats.readings.total, stats.readings.unsynced);
    println!(
        "commands: {} total, {} pending, {} executed",
        stats.commands.total, stats.commands.pending, stats.commands.executed
    );
    Ok(())
}
