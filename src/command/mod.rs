// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Command Intake Module
//!
//! Scenario injection commands from the interactive stdin loop and the
//! dashboard WebSocket. The grammar:
//!
//! ```text
//! rain [peak_ntu]     - Trigger rain event (default 400)
//! dose on|off         - Resume / stop chlorine dosing
//! fault <sensor>      - Inject sensor fault (turbidity, chlorine, flow)
//! clear <sensor>      - Clear sensor fault
//! glitch              - Random data glitch for 30 sim-seconds
//! status              - Print simulation state
//! help                - Show commands
//! ```
//!
//! Invalid commands never unwind the intake loop: parsing yields a typed
//! error and the caller gets a one-line `error: <reason>` response.

use std::sync::{Arc, Mutex, RwLock};

use log::info;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::engine::StatusFrame;
use crate::simulation::{RainEventSource, ScenarioState, SensorKind};

/// A malformed or unknown command from an operator surface.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0}. Type 'help' for commands")]
    Unknown(String),
    #[error("unknown sensor: {0} (expected turbidity, chlorine or flow)")]
    UnknownSensor(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    Internal(&'static str),
}

/// A parsed scenario command.
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    Rain(Option<f64>),
    Dose(bool),
    Fault(SensorKind),
    Clear(SensorKind),
    Glitch,
    Status,
    Help,
}

const HELP_TEXT: &str =
    "Commands: rain [ntu], dose on/off, fault <sensor>, clear <sensor>, glitch, status, help";

/// Parse a command line as typed at the console.
pub fn parse_command(line: &str) -> Result<Option<SimCommand>, CommandError> {
    let lower = line.trim().to_lowercase();
    let mut parts = lower.split_whitespace();
    let Some(cmd) = parts.next() else {
        return Ok(None);
    };

    let command = match cmd {
        "rain" => {
            let peak = match parts.next() {
                Some(raw) => Some(raw.parse::<f64>().map_err(|_| {
                    CommandError::InvalidArgument(format!("rain peak '{raw}' is not a number"))
                })?),
                None => None,
            };
            if let Some(peak) = peak {
                if !peak.is_finite() || peak <= 0.0 {
                    return Err(CommandError::InvalidArgument(format!(
                        "rain peak must be positive, got {peak}"
                    )));
                }
            }
            SimCommand::Rain(peak)
        }
        "dose" => match parts.next() {
            Some("off") => SimCommand::Dose(false),
            // `dose` and `dose on` both resume dosing.
            Some("on") | None => SimCommand::Dose(true),
            Some(other) => {
                return Err(CommandError::InvalidArgument(format!(
                    "dose takes on/off, got '{other}'"
                )))
            }
        },
        "fault" => SimCommand::Fault(parse_sensor(parts.next())?),
        "clear" => SimCommand::Clear(parse_sensor(parts.next())?),
        "glitch" => SimCommand::Glitch,
        "status" => SimCommand::Status,
        "help" => SimCommand::Help,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

fn parse_sensor(token: Option<&str>) -> Result<SensorKind, CommandError> {
    // Chlorine is the sensor staff usually mean when they say "the dosing
    // is playing up", so it is the default.
    let name = token.unwrap_or("chlorine");
    name.parse()
        .map_err(|_| CommandError::UnknownSensor(name.to_string()))
}

/// A command plus an optional reply channel for the issuing surface.
#[derive(Debug)]
pub struct CommandRequest {
    pub line: String,
    pub reply: Option<oneshot::Sender<String>>,
}

/// Executes parsed commands against the injection surfaces.
///
/// Owned by the intake loop; all mutation goes through the rain source and
/// scenario locks, never through the engine itself.
pub struct CommandExecutor {
    rain: Arc<Mutex<RainEventSource>>,
    scenario: Arc<Mutex<ScenarioState>>,
    status: Arc<RwLock<StatusFrame>>,
}

impl CommandExecutor {
    pub fn new(
        rain: Arc<Mutex<RainEventSource>>,
        scenario: Arc<Mutex<ScenarioState>>,
        status: Arc<RwLock<StatusFrame>>,
    ) -> Self {
        Self {
            rain,
            scenario,
            status,
        }
    }

    /// Run one command line and produce the one-line response.
    pub fn run_line(&self, line: &str) -> String {
        match parse_command(line) {
            Ok(Some(command)) => match self.execute(command) {
                Ok(response) => response,
                Err(e) => format!("error: {e}"),
            },
            Ok(None) => String::new(),
            Err(e) => format!("error: {e}"),
        }
    }

    pub fn execute(&self, command: SimCommand) -> Result<String, CommandError> {
        match command {
            SimCommand::Rain(peak) => {
                let mut rain = self
                    .rain
                    .lock()
                    .map_err(|_| CommandError::Internal("rain source lock poisoned"))?;
                rain.inject(peak);
                Ok("ok".to_string())
            }
            SimCommand::Dose(enabled) => {
                let mut scenario = self.lock_scenario()?;
                scenario.set_dosing_enabled(enabled);
                info!(
                    "Chlorine dosing {}",
                    if enabled { "ENABLED" } else { "DISABLED" }
                );
                Ok("ok".to_string())
            }
            SimCommand::Fault(sensor) => {
                let mut scenario = self.lock_scenario()?;
                scenario.set_fault(sensor, true);
                info!("Fault injected: {sensor}");
                Ok("ok".to_string())
            }
            SimCommand::Clear(sensor) => {
                let mut scenario = self.lock_scenario()?;
                scenario.set_fault(sensor, false);
                info!("Fault cleared: {sensor}");
                Ok("ok".to_string())
            }
            SimCommand::Glitch => {
                let t_sim = self.latest_frame()?.t_sim;
                let mut scenario = self.lock_scenario()?;
                scenario.start_glitch(t_sim);
                info!("Data glitch injected (30 sim-seconds)");
                Ok("ok".to_string())
            }
            SimCommand::Status => {
                let frame = self.latest_frame()?;
                let faults = if frame.faults.is_empty() {
                    "none".to_string()
                } else {
                    frame.faults.join(",")
                };
                Ok(format!(
                    "Sim time: {:.0}s | Hour: {:.1} | Day: {} | Speed: {}x | Rain events: {} | Dosing: {} | Faults: {}",
                    frame.t_sim,
                    frame.sim_hour,
                    frame.sim_day,
                    frame.speed,
                    frame.active_rain_events,
                    if frame.dosing_active { "ON" } else { "OFF" },
                    faults,
                ))
            }
            SimCommand::Help => Ok(HELP_TEXT.to_string()),
        }
    }

    fn lock_scenario(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, ScenarioState>, CommandError> {
        self.scenario
            .lock()
            .map_err(|_| CommandError::Internal("scenario state lock poisoned"))
    }

    fn latest_frame(&self) -> Result<StatusFrame, CommandError> {
        self.status
            .read()
            .map(|f| f.clone())
            .map_err(|_| CommandError::Internal("status lock poisoned"))
    }
}
