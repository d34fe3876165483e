// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Simulation Module
//!
//! The stochastic process model behind the register bank: a virtual clock
//! with a time-compression factor, Ornstein-Uhlenbeck sensor channels,
//! diurnal demand and temperature baselines, Poisson-scheduled rain event
//! cascades, the chlorine dose sawtooth and the scenario injection surface
//! (faults, glitches, dosing gate).
//!
//! The [`process::ProcessModel`] composes the leaves into one correlated
//! reading set per tick; everything downstream (plant logic, alarms,
//! register projection) is pure function application over that snapshot.

pub mod clock;
pub mod diurnal;
pub mod dosing;
pub mod ou;
pub mod process;
pub mod rain;
pub mod scenario;

pub use clock::VirtualClock;
pub use process::{ProcessModel, SensorReadings};
pub use rain::{RainContribution, RainEventSource};
pub use scenario::{ScenarioState, SensorKind};
