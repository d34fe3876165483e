// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the WTP RTU bridge

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::{error, info};
use tokio::signal;

use wtp_rtu_bridge::config::Config;
use wtp_rtu_bridge::daemon::Daemon;

/// Water treatment plant RTU simulator with a Modbus TCP register bank
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Modbus TCP port (default 502, use 5020 if port 502 needs sudo)
    #[arg(long)]
    modbus_port: Option<u16>,

    /// Web dashboard port; the push feed binds this port plus one
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Simulation speed multiplier (e.g. 60 = 1 sim-minute per wall-second)
    #[arg(long)]
    speed: Option<f64>,

    /// Random seed for reproducible simulation
    #[arg(long)]
    seed: Option<u64>,

    /// Disable automatic rain events in simulation
    #[arg(long)]
    no_auto_events: bool,

    /// Path to configuration file (YAML format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level)
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Disable all logging output
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// Exit code for configuration problems found after argument parsing.
const EXIT_BAD_ARGS: u8 = 2;
/// Exit code for internal or network failures.
const EXIT_INTERNAL: u8 = 70;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let log_level = if args.quiet {
        log::LevelFilter::Off
    } else if args.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let config = {
        let config_path = args
            .config
            .clone()
            .unwrap_or_else(|| PathBuf::from("config.yaml"));
        let mut config = match Config::from_file(&config_path) {
            Ok(config) => config,
            Err(e) => {
                error!("Configuration error: {e:#}");
                return ExitCode::from(EXIT_BAD_ARGS);
            }
        };
        config.apply_args(
            args.modbus_port,
            args.dashboard_port,
            args.speed,
            args.seed,
            args.no_auto_events,
        );
        if let Err(e) = config.validate() {
            error!("Configuration error: {e:#}");
            return ExitCode::from(EXIT_BAD_ARGS);
        }
        config
    };

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {e:#}");
            ExitCode::from(EXIT_INTERNAL)
        }
    }
}

async fn run(config: Config) -> Result<()> {
    let mut daemon = Daemon::new();
    daemon.launch(config).await?;

    tokio::select! {
        result = signal::ctrl_c() => {
            match result {
                Ok(()) => info!("Received shutdown signal, terminating daemon"),
                Err(err) => error!("Error waiting for shutdown signal: {err}"),
            }
        }
        _ = wait_for_stop(&daemon) => {
            // A fatal loop error cleared the running flag; join() below
            // surfaces it.
        }
    }

    daemon.shutdown();
    daemon.join().await
}

async fn wait_for_stop(daemon: &Daemon) {
    while daemon.is_running() {
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    }
}
