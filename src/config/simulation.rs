// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Process simulation configuration
//!
//! Settings for the virtual clock, the stochastic process model and the scan
//! cadences. Cadences are wall-clock and independent of the time-compression
//! factor; they are configurable so tests can run the scan loops faster, but
//! the defaults (1 s tick, 0.5 s command drain, 1 s push) are the normative
//! cadences of the scan orchestrator.

use serde::{Deserialize, Serialize};

/// Configuration for the process data generator and scan loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Time-compression factor. At `speed = 60.0`, one wall second advances
    /// the simulated clock by one minute. Must be positive.
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Random seed for reproducible runs. When absent the seed is drawn from
    /// the OS and logged at startup so a run can still be replayed.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Whether rain events fire on their own via the Poisson scheduler.
    /// When false, rain only happens through operator injection.
    #[serde(default = "default_auto_events")]
    pub auto_events: bool,

    /// Scan (tick) cadence in wall milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Pending-write drain cadence in wall milliseconds.
    #[serde(default = "default_drain_interval_ms")]
    pub drain_interval_ms: u64,

    /// Live-push cadence in wall milliseconds.
    #[serde(default = "default_push_interval_ms")]
    pub push_interval_ms: u64,
}

fn default_speed() -> f64 {
    1.0
}

fn default_auto_events() -> bool {
    true
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_drain_interval_ms() -> u64 {
    500
}

fn default_push_interval_ms() -> u64 {
    1000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            speed: default_speed(),
            seed: None,
            auto_events: default_auto_events(),
            tick_interval_ms: default_tick_interval_ms(),
            drain_interval_ms: default_drain_interval_ms(),
            push_interval_ms: default_push_interval_ms(),
        }
    }
}
