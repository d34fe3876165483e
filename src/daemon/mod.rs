// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Daemon Module
//!
//! Background service coordination for the RTU bridge: the scan loops, the
//! Modbus TCP server, the live-push feed and the command intake all run as
//! tasks owned by one [`launch::Daemon`].
//!
//! ## Usage
//!
//! ```no_run
//! use wtp_rtu_bridge::{config::Config, daemon::launch::Daemon};
//!
//! async fn run() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.yaml")?;
//!
//!     let mut daemon = Daemon::new();
//!     daemon.launch(config).await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!
//!     daemon.shutdown();
//!     daemon.join().await?;
//!     Ok(())
//! }
//! ```

pub mod launch;

pub use launch::Daemon;
