// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Configuration Module
//!
//! Loading, validation and command-line overriding of the RTU bridge
//! configuration. The configuration lives in a YAML file with one section
//! per component; every field has a default so an absent file yields a
//! usable configuration.
//!
//! ## Example
//!
//! ```no_run
//! use wtp_rtu_bridge::config::Config;
//!
//! let mut config = Config::from_file("config.yaml").unwrap();
//! config.simulation.speed = 60.0;
//! config.validate().unwrap();
//! ```

mod dashboard;
mod modbus;
mod simulation;

pub use dashboard::DashboardConfig;
pub use modbus::ModbusConfig;
pub use simulation::SimulationConfig;

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};

/// Root configuration for the RTU bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Modbus TCP server settings.
    #[serde(default)]
    pub modbus: ModbusConfig,

    /// Dashboard push feed settings.
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Process simulation and scan cadence settings.
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    ///
    /// A missing file is not an error: the defaults are returned so the
    /// bridge can run from the command line alone.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Configuration file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let config: Config = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;

        config.validate()?;
        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded configuration.
    ///
    /// Only values the operator actually passed override the file.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_args(
        &mut self,
        modbus_port: Option<u16>,
        dashboard_port: Option<u16>,
        speed: Option<f64>,
        seed: Option<u64>,
        no_auto_events: bool,
    ) {
        if let Some(port) = modbus_port {
            self.modbus.port = port;
        }
        if let Some(port) = dashboard_port {
            self.dashboard.port = port;
        }
        if let Some(speed) = speed {
            self.simulation.speed = speed;
        }
        if let Some(seed) = seed {
            self.simulation.seed = Some(seed);
        }
        if no_auto_events {
            self.simulation.auto_events = false;
        }
    }

    /// Validate the configuration beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        if !self.simulation.speed.is_finite() || self.simulation.speed <= 0.0 {
            bail!(
                "simulation speed must be a positive number, got {}",
                self.simulation.speed
            );
        }
        if self.modbus.port == 0 || self.modbus.port == u16::MAX {
            bail!("modbus port must be in 1-65534, got {}", self.modbus.port);
        }
        if self.dashboard.enabled && self.dashboard.port >= u16::MAX - 1 {
            bail!(
                "dashboard port {} leaves no room for the push endpoint",
                self.dashboard.port
            );
        }
        if self.simulation.tick_interval_ms == 0 || self.simulation.drain_interval_ms == 0 {
            bail!("scan cadences must be non-zero");
        }
        Ok(())
    }
}
