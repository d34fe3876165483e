// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Scan engine
//!
//! One owning aggregate ties the virtual clock, the process model, the
//! plant logic and the register bank together. The scan orchestrator calls
//! [`Engine::tick`] once per scan and [`Engine::apply_commands`] from the
//! command drain; the command intake mutates the rain source and scenario
//! state through their own locks without touching the engine.

use std::sync::{Arc, Mutex, RwLock};

use anyhow::{anyhow, Result};
use log::info;
use serde::Serialize;

use crate::plant::{evaluate_alarms, CoilSet, PlantLogic, PlantState, ProcessSnapshot};
use crate::registers::map::{HR_FILTER_DP, CO_INTAKE_CMD};
use crate::registers::{PendingWrites, RegisterBank, WriteOp};
use crate::simulation::process::STREAM_RAIN;
use crate::simulation::{
    ou, ProcessModel, RainEventSource, ScenarioState, VirtualClock,
};

/// Snapshot pushed to live dashboard subscribers once per second.
#[derive(Debug, Clone, Serialize, Default)]
pub struct StatusFrame {
    pub t_sim: f64,
    pub state: u16,
    pub turb_raw: f64,
    pub turb_filt: f64,
    pub ph: f64,
    pub chlorine: f64,
    pub flow_raw: f64,
    pub flow_treated: f64,
    pub level_pct: f64,
    pub temperature: f64,
    pub filter_dp: f64,
    pub alarm_word: u16,
    pub coils: Vec<bool>,
    pub dinputs: Vec<bool>,
    // Simulation state summary for the dashboard status panel.
    pub sim_hour: f64,
    pub sim_day: u64,
    pub speed: f64,
    pub active_rain_events: usize,
    pub dosing_active: bool,
    pub faults: Vec<String>,
}

/// The simulator core shared by the scan loops.
pub struct Engine {
    clock: VirtualClock,
    process: ProcessModel,
    plant: PlantLogic,
    coils: CoilSet,
    rain: Arc<Mutex<RainEventSource>>,
    scenario: Arc<Mutex<ScenarioState>>,
    bank: Arc<RwLock<RegisterBank>>,
    comm_fault: bool,
    tick_index: u64,
}

impl Engine {
    pub fn new(seed: u64, speed: f64, auto_events: bool) -> Self {
        let rain_seed = ou::derive_stream_seed(seed, STREAM_RAIN);
        Self {
            clock: VirtualClock::new(speed),
            process: ProcessModel::new(seed),
            plant: PlantLogic::new(),
            coils: CoilSet::default(),
            rain: Arc::new(Mutex::new(RainEventSource::new(rain_seed, auto_events))),
            scenario: Arc::new(Mutex::new(ScenarioState::new())),
            bank: Arc::new(RwLock::new(RegisterBank::new())),
            comm_fault: false,
            tick_index: 0,
        }
    }

    /// Shared handle to the register bank for the Modbus server and tests.
    pub fn bank(&self) -> Arc<RwLock<RegisterBank>> {
        Arc::clone(&self.bank)
    }

    /// Shared handle to the rain source for the command intake.
    pub fn rain(&self) -> Arc<Mutex<RainEventSource>> {
        Arc::clone(&self.rain)
    }

    /// Shared handle to the scenario state for the command intake.
    pub fn scenario(&self) -> Arc<Mutex<ScenarioState>> {
        Arc::clone(&self.scenario)
    }

    /// Flag a Modbus server outage; reflected in alarm bit 7 and the
    /// comm-fault discrete input on the next tick.
    pub fn set_comm_fault(&mut self, fault: bool) {
        self.comm_fault = fault;
    }

    pub fn state(&self) -> PlantState {
        self.plant.state()
    }

    pub fn coils(&self) -> CoilSet {
        self.coils
    }

    pub fn tick_index(&self) -> u64 {
        self.tick_index
    }

    /// Run one scan: advance the clock, generate sensors, run the plant
    /// logic, recompute alarms and commit the whole projection to the bank
    /// in one write-lock hold.
    pub fn tick(&mut self, wall_dt: f64) -> Result<StatusFrame> {
        let sim_dt = self.clock.advance(wall_dt);
        let sim_now = self.clock.sim_now();
        let hour = self.clock.hour_of_day();

        let mut rain = self
            .rain
            .lock()
            .map_err(|_| anyhow!("rain source lock poisoned"))?;
        let mut scenario = self
            .scenario
            .lock()
            .map_err(|_| anyhow!("scenario state lock poisoned"))?;

        // Alum is dosed only while commanded with water moving (previous
        // tick's state; the contactor physically lags the sequencer).
        let alum_dosing = self.coils.alum_cmd && self.plant.state().is_treating();

        let readings = self.process.tick(
            sim_now,
            sim_dt,
            hour,
            alum_dosing,
            self.coils.chlorine_cmd,
            &mut rain,
            &mut scenario,
        );
        let snapshot = self
            .plant
            .tick(sim_now, sim_dt, hour, &readings, &self.coils);
        let status = self
            .plant
            .discrete_status(&snapshot, &self.coils, self.comm_fault);
        let alarm_word = evaluate_alarms(&snapshot, &self.coils, &status, self.comm_fault);

        {
            let mut bank = self
                .bank
                .write()
                .map_err(|_| anyhow!("register bank lock poisoned"))?;
            bank.commit_tick(&snapshot, self.plant.state(), alarm_word, &self.coils, &status);
        }

        self.tick_index += 1;

        Ok(self.build_frame(sim_now, &snapshot, alarm_word, &rain, &scenario, &status.to_array()))
    }

    fn build_frame(
        &self,
        sim_now: f64,
        snapshot: &ProcessSnapshot,
        alarm_word: u16,
        rain: &RainEventSource,
        scenario: &ScenarioState,
        dinputs: &[bool],
    ) -> StatusFrame {
        StatusFrame {
            t_sim: sim_now,
            state: self.plant.state().code(),
            turb_raw: snapshot.turb_raw,
            turb_filt: snapshot.turb_filtered,
            ph: snapshot.ph,
            chlorine: snapshot.chlorine,
            flow_raw: snapshot.flow_raw,
            flow_treated: snapshot.flow_treated,
            level_pct: snapshot.level_pct,
            temperature: snapshot.temperature,
            filter_dp: snapshot.filter_dp,
            alarm_word,
            coils: self.coils.to_array().to_vec(),
            dinputs: dinputs.to_vec(),
            sim_hour: self.clock.hour_of_day(),
            sim_day: self.clock.sim_day(),
            speed: self.clock.speed(),
            active_rain_events: rain.active_count(),
            dosing_active: scenario.dosing_enabled(),
            faults: scenario
                .faulted_sensors()
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }

    /// Apply a batch of drained client writes, in arrival order.
    ///
    /// Coil writes update the command set (and are mirrored into the bank
    /// so read-backs see them before the next tick); an asserted intake
    /// write doubles as the operator restart gesture after a turbidity
    /// shutdown. A write to the filter-dP holding register overrides the
    /// simulated dP, which is how test procedures force a backwash.
    pub fn apply_commands(&mut self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.is_empty() {
            return Ok(());
        }

        for op in &ops {
            match *op {
                WriteOp::Coil { addr, value } => {
                    let index = addr as usize;
                    if self.coils.get(index) != Some(value) {
                        info!("SCADA command: {}={}", CoilSet::name(index), value as u8);
                    }
                    self.coils.set(index, value);
                    if addr == CO_INTAKE_CMD {
                        self.plant.note_intake_write(value);
                    }
                }
                WriteOp::Holding { addr, value } => {
                    if addr == HR_FILTER_DP {
                        self.plant.override_filter_dp(f64::from(value) / 10.0);
                    }
                }
            }
        }

        let mut bank = self
            .bank
            .write()
            .map_err(|_| anyhow!("register bank lock poisoned"))?;
        bank.apply_writes(&ops);
        Ok(())
    }

    /// Drain the pending-write queue into the engine.
    pub fn drain_pending(&mut self, pending: &PendingWrites) -> Result<()> {
        self.apply_commands(pending.drain())
    }
}
