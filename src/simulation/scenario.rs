// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scenario injection state
//!
//! The mutable surface the command intake pokes at: sensor faults, the data
//! glitch window and the dosing gate. The process model reads this once per
//! tick; the intake loop mutates it under its own lock.

use std::fmt;
use std::str::FromStr;

/// Simulated duration of a data glitch, seconds.
pub const GLITCH_DURATION: f64 = 30.0;

/// Sensor channels that can be forced into a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorKind {
    Turbidity,
    Chlorine,
    Flow,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [SensorKind::Turbidity, SensorKind::Chlorine, SensorKind::Flow];
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SensorKind::Turbidity => "turbidity",
            SensorKind::Chlorine => "chlorine",
            SensorKind::Flow => "flow",
        };
        f.write_str(name)
    }
}

impl FromStr for SensorKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "turbidity" => Ok(SensorKind::Turbidity),
            "chlorine" => Ok(SensorKind::Chlorine),
            "flow" => Ok(SensorKind::Flow),
            _ => Err(()),
        }
    }
}

/// Injection state shared between the intake loop and the process model.
///
/// Faulted sensors read a deterministic stuck value: the turbidity analyser
/// sticks high (900 NTU, above the shutdown threshold so the plant stays
/// down until the fault clears), the chlorine analyser and the flow meter
/// stick at zero.
#[derive(Debug, Clone)]
pub struct ScenarioState {
    turbidity_fault: bool,
    chlorine_fault: bool,
    flow_fault: bool,
    /// Simulated time until which the glitch burst is active.
    glitch_until: f64,
    /// Gate for the chlorine dose sawtooth.
    dosing_enabled: bool,
}

/// Stuck-high reading for a faulted turbidity analyser, NTU.
pub const TURBIDITY_FAULT_NTU: f64 = 900.0;

impl ScenarioState {
    pub fn new() -> Self {
        Self {
            turbidity_fault: false,
            chlorine_fault: false,
            flow_fault: false,
            glitch_until: 0.0,
            dosing_enabled: true,
        }
    }

    pub fn set_fault(&mut self, sensor: SensorKind, faulted: bool) {
        match sensor {
            SensorKind::Turbidity => self.turbidity_fault = faulted,
            SensorKind::Chlorine => self.chlorine_fault = faulted,
            SensorKind::Flow => self.flow_fault = faulted,
        }
    }

    pub fn is_faulted(&self, sensor: SensorKind) -> bool {
        match sensor {
            SensorKind::Turbidity => self.turbidity_fault,
            SensorKind::Chlorine => self.chlorine_fault,
            SensorKind::Flow => self.flow_fault,
        }
    }

    /// Names of the currently faulted sensors, for status dumps.
    pub fn faulted_sensors(&self) -> Vec<SensorKind> {
        SensorKind::ALL
            .into_iter()
            .filter(|s| self.is_faulted(*s))
            .collect()
    }

    pub fn start_glitch(&mut self, sim_now: f64) {
        self.glitch_until = sim_now + GLITCH_DURATION;
    }

    pub fn glitch_active(&self, sim_now: f64) -> bool {
        sim_now < self.glitch_until
    }

    pub fn set_dosing_enabled(&mut self, enabled: bool) {
        self.dosing_enabled = enabled;
    }

    pub fn dosing_enabled(&self) -> bool {
        self.dosing_enabled
    }
}

impl Default for ScenarioState {
    fn default() -> Self {
        Self::new()
    }
}
