// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - adaptive multi-agent delivery scheduler.
//!
//! Administration entry point: validates configuration and inspects or
//! cleans up the shared state store. Hosts embed `courier-scheduler`
//! directly with their own platform adapters to run the delivery loop.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

use courier_config::model::CourierConfig;

/// Courier - adaptive multi-agent delivery scheduler.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Load this configuration file instead of the standard search path.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate the configuration and print a summary.
    Check,
    /// Show agent restriction state and open contact requests.
    Status {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },
    /// Expire stale contact requests and purge expired state rows.
    Sweep,
}

fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(config: &CourierConfig) {
    println!("courier: config OK");
    println!(
        "  scheduler: tick {}ms, {} worker(s), {} attempt(s)",
        config.scheduler.tick_interval_ms, config.scheduler.max_workers, config.scheduler.max_attempts
    );
    println!(
        "  cooldown:  per-recipient {}s, per-group min {}s, {} send(s)/min",
        config.cooldown.per_recipient_secs,
        config.cooldown.per_group_min_secs,
        config.cooldown.max_sends_per_minute
    );
    println!(
        "  interval:  {}s..{}s, default {}s",
        config.interval.min_floor_secs, config.interval.max_ceiling_secs, config.interval.default_secs
    );
    println!("  storage:   {}", config.storage.database_path);
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.scheduler.log_level);
    courier_scheduler::recording::register_metrics();

    let result = match cli.command {
        Commands::Check => {
            print_summary(&config);
            Ok(())
        }
        Commands::Status { json } => admin::run_status(&config, json).await,
        Commands::Sweep => admin::run_sweep(&config).await,
    };

    if let Err(e) = result {
        error!(error = %e, "command failed");
        eprintln!("courier: {e}");
        std::process::exit(1);
    }
}
