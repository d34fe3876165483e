// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Plant state machine and derived process quantities
//!
//! The high-turbidity auto-shutdown is the real behaviour at the plant this
//! simulates: when raw turbidity exceeds safe levels the plant shuts itself
//! down and staff must restart it manually once the creek clears.

use log::{info, warn};

use crate::simulation::{diurnal, SensorReadings};

use super::{CoilSet, DiscreteStatus, ProcessSnapshot};

/// Plant operating state, exposed as the status code in input register 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlantState {
    Offline,
    Starting,
    Running,
    Shutdown,
    Backwash,
    Fault,
}

impl PlantState {
    pub fn code(self) -> u16 {
        match self {
            PlantState::Offline => 0,
            PlantState::Starting => 1,
            PlantState::Running => 2,
            PlantState::Shutdown => 3,
            PlantState::Backwash => 4,
            PlantState::Fault => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PlantState::Offline => "Offline",
            PlantState::Starting => "Starting",
            PlantState::Running => "Running",
            PlantState::Shutdown => "Shutdown",
            PlantState::Backwash => "Backwash",
            PlantState::Fault => "Fault",
        }
    }

    /// Whether water is moving through the filters in this state.
    pub fn is_treating(self) -> bool {
        matches!(self, PlantState::Running | PlantState::Backwash)
    }
}

/// Raw turbidity that trips the automatic shutdown, NTU.
pub const TURB_SHUTDOWN_NTU: f64 = 500.0;
/// Raw turbidity below which a restart is permitted, NTU.
pub const TURB_RESTART_NTU: f64 = 400.0;
/// Time spent in Starting before the plant is considered up, simulated s.
const START_DURATION: f64 = 60.0;
/// Backwash cycle length, simulated seconds.
const BACKWASH_DURATION: f64 = 20.0 * 60.0;
/// Filter differential pressure that forces a backwash, kPa.
pub const FILTER_DP_HIGH_KPA: f64 = 150.0;
/// dP accumulation constant, kPa per (L/s * NTU * s) of filter loading.
const FILTER_DP_GROWTH: f64 = 6.0e-7;
/// dP relief rate while the backwash valve is open, kPa/s.
const FILTER_DP_FLUSH_RATE: f64 = 0.15;
/// Fraction of raw turbidity surviving filtration while treating.
const FILTER_PASSTHROUGH: f64 = 0.02;
/// Instrument floor on filtered turbidity, NTU.
const FILTERED_FLOOR_NTU: f64 = 0.02;
/// Time constant for filtered turbidity drifting to raw when idle, s.
const FILTERED_DRIFT_TAU: f64 = 600.0;
/// Fraction of raw flow that leaves as treated water (rest to waste).
const TREATED_FRACTION: f64 = 0.95;
/// Reservoir calibration: 500 L/s of net flow moves the level 3.6%/hour.
const LEVEL_PCT_PER_SEC_AT_500: f64 = 3.6 / 3600.0;
/// 100% of level is a 30 m shaft.
const LEVEL_CM_PER_PCT: f64 = 30.0;

/// The PLC scan logic: state transitions plus the derived quantities.
#[derive(Debug, Clone)]
pub struct PlantLogic {
    state: PlantState,
    entered_at_sim: f64,
    filter_dp: f64,
    filtered_turbidity: f64,
    treated_flow: f64,
    reservoir_level: f64,
    backwash_count: u16,
    totaliser_ml: f64,
    runtime_hours: f64,
    /// Set when the command drain sees an intake-coil write asserted while
    /// the plant is shut down; this is the operator's restart gesture.
    intake_reasserted: bool,
}

impl PlantLogic {
    pub fn new() -> Self {
        Self {
            state: PlantState::Offline,
            entered_at_sim: 0.0,
            filter_dp: 0.0,
            filtered_turbidity: 0.0,
            treated_flow: 0.0,
            reservoir_level: 65.0,
            backwash_count: 0,
            totaliser_ml: 0.0,
            runtime_hours: 0.0,
            intake_reasserted: false,
        }
    }

    pub fn state(&self) -> PlantState {
        self.state
    }

    pub fn filter_dp(&self) -> f64 {
        self.filter_dp
    }

    /// Maintenance hook: force the filter dP reading (HR9 write path).
    pub fn override_filter_dp(&mut self, kpa: f64) {
        self.filter_dp = kpa.max(0.0);
    }

    /// Record an intake-coil write observed by the command drain. Only a
    /// write asserting the coil counts as a restart gesture.
    pub fn note_intake_write(&mut self, value: bool) {
        if value {
            self.intake_reasserted = true;
        }
    }

    fn transition(&mut self, to: PlantState, sim_now: f64) {
        if self.state == to {
            return;
        }
        info!("Plant state: {} -> {}", self.state.name(), to.name());
        self.state = to;
        self.entered_at_sim = sim_now;
        match to {
            PlantState::Backwash => self.backwash_count = self.backwash_count.wrapping_add(1),
            PlantState::Shutdown => self.intake_reasserted = false,
            _ => {}
        }
    }

    /// Evaluate the transition table. First match wins; the emergency stop
    /// outranks everything, the turbidity trip outranks normal sequencing.
    fn step_state(&mut self, sim_now: f64, turb_raw: f64, coils: &CoilSet) {
        if coils.estop {
            if self.state != PlantState::Fault {
                warn!("EMERGENCY STOP asserted");
            }
            self.transition(PlantState::Fault, sim_now);
            return;
        }
        if self.state == PlantState::Fault {
            // E-stop released: back to a safe idle, never straight to run.
            self.transition(PlantState::Offline, sim_now);
            return;
        }

        if turb_raw > TURB_SHUTDOWN_NTU {
            if self.state != PlantState::Shutdown {
                warn!(
                    "HIGH TURBIDITY SHUTDOWN: {:.0} NTU > {:.0} NTU",
                    turb_raw, TURB_SHUTDOWN_NTU
                );
            }
            self.transition(PlantState::Shutdown, sim_now);
            return;
        }

        match self.state {
            PlantState::Offline => {
                if coils.auto_mode && coils.intake_cmd {
                    self.transition(PlantState::Starting, sim_now);
                }
            }
            PlantState::Starting => {
                if sim_now - self.entered_at_sim >= START_DURATION {
                    self.transition(PlantState::Running, sim_now);
                }
            }
            PlantState::Running => {
                if coils.backwash_cmd || self.filter_dp >= FILTER_DP_HIGH_KPA {
                    self.transition(PlantState::Backwash, sim_now);
                }
            }
            PlantState::Backwash => {
                if sim_now - self.entered_at_sim >= BACKWASH_DURATION {
                    self.transition(PlantState::Running, sim_now);
                }
            }
            PlantState::Shutdown => {
                // Restart gate: the creek must clear below the restart
                // threshold and the operator must re-assert the intake.
                if turb_raw < TURB_RESTART_NTU {
                    if coils.auto_mode && coils.intake_cmd && self.intake_reasserted {
                        self.transition(PlantState::Starting, sim_now);
                    } else if !coils.intake_cmd {
                        self.transition(PlantState::Offline, sim_now);
                    }
                }
            }
            PlantState::Fault => unreachable!("handled above"),
        }
    }

    /// One PLC scan: run the state machine and integrate the derived
    /// quantities over `sim_dt` simulated seconds.
    pub fn tick(
        &mut self,
        sim_now: f64,
        sim_dt: f64,
        hour_of_day: f64,
        readings: &SensorReadings,
        coils: &CoilSet,
    ) -> ProcessSnapshot {
        self.step_state(sim_now, readings.turb_raw, coils);

        let treating = self.state.is_treating();
        let running = self.state == PlantState::Running;

        // Filtration: ~98% removal with an instrument floor while water is
        // moving; with the plant idle the filtered analyser slowly reads
        // back toward raw as untreated water sits in the sample line.
        if treating {
            self.filtered_turbidity =
                (readings.turb_raw * FILTER_PASSTHROUGH).max(FILTERED_FLOOR_NTU);
        } else {
            let alpha = (sim_dt / FILTERED_DRIFT_TAU).min(1.0);
            self.filtered_turbidity += (readings.turb_raw - self.filtered_turbidity) * alpha;
        }

        // Filter loading rises with the solids throughput; a backwash
        // flushes it back to zero before the cycle completes.
        match self.state {
            PlantState::Running => {
                self.filter_dp +=
                    FILTER_DP_GROWTH * readings.flow_raw * readings.turb_raw * sim_dt;
            }
            PlantState::Backwash => {
                self.filter_dp =
                    (self.filter_dp - FILTER_DP_FLUSH_RATE * sim_dt).max(0.0);
            }
            _ => {}
        }

        // Treated flow, totaliser and runtime only accrue while Running.
        self.treated_flow = if running {
            readings.flow_raw * TREATED_FRACTION
        } else {
            0.0
        };
        if running {
            self.totaliser_ml += self.treated_flow * sim_dt / 1.0e6;
            self.runtime_hours += sim_dt / 3600.0;
        }

        // Reservoir level: inflow only while water is moving through the
        // plant; consumers keep drawing regardless.
        let inflow = if treating { readings.flow_raw } else { 0.0 };
        let demand = diurnal::demand_flow(hour_of_day);
        self.reservoir_level +=
            (inflow - demand) / 500.0 * LEVEL_PCT_PER_SEC_AT_500 * sim_dt;
        self.reservoir_level = self.reservoir_level.clamp(0.0, 100.0);

        ProcessSnapshot {
            turb_raw: readings.turb_raw,
            turb_filtered: self.filtered_turbidity,
            ph: readings.ph,
            chlorine: readings.chlorine,
            flow_raw: readings.flow_raw,
            flow_treated: self.treated_flow,
            level_pct: self.reservoir_level,
            level_cm: self.reservoir_level * LEVEL_CM_PER_PCT,
            temperature: readings.temperature,
            alum_dose: readings.alum_dose,
            filter_dp: self.filter_dp,
            dam_release: readings.flow_raw * 0.0864,
            backwash_count: self.backwash_count,
            totaliser_ml: self.totaliser_ml,
            runtime_hours: self.runtime_hours,
        }
    }

    /// Equipment status as seen by the field wiring.
    ///
    /// A pump only runs when it is commanded and the plant state energises
    /// its motor contactor; the backwash valve tracks the Backwash state.
    pub fn discrete_status(
        &self,
        snapshot: &ProcessSnapshot,
        coils: &CoilSet,
        comm_fault: bool,
    ) -> DiscreteStatus {
        let energised = matches!(
            self.state,
            PlantState::Starting | PlantState::Running | PlantState::Backwash
        );
        DiscreteStatus {
            intake_running: coils.intake_cmd && energised,
            alum_running: coils.alum_cmd && energised,
            chlorine_running: coils.chlorine_cmd && energised,
            backwash_valve_open: self.state == PlantState::Backwash,
            level_high: snapshot.level_pct > 95.0,
            level_low: snapshot.level_pct < 20.0,
            backwash_active: self.state == PlantState::Backwash,
            turb_shutdown: self.state == PlantState::Shutdown,
            chlorine_low: snapshot.chlorine < 0.2,
            comm_fault,
        }
    }
}

impl Default for PlantLogic {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::RainContribution;

    fn readings(turb: f64, flow: f64) -> SensorReadings {
        SensorReadings {
            turb_raw: turb,
            ph: 7.2,
            chlorine: 1.5,
            flow_raw: flow,
            temperature: 26.0,
            alum_dose: 45.0,
            rain: RainContribution::default(),
        }
    }

    fn auto_coils() -> CoilSet {
        CoilSet {
            intake_cmd: true,
            alum_cmd: true,
            chlorine_cmd: true,
            auto_mode: true,
            ..CoilSet::default()
        }
    }

    /// Drive the logic to Running with clean water.
    fn start_plant(plant: &mut PlantLogic) -> f64 {
        let coils = auto_coils();
        let mut t = 0.0;
        for _ in 0..120 {
            plant.tick(t, 1.0, 8.0, &readings(3.5, 450.0), &coils);
            t += 1.0;
        }
        assert_eq!(plant.state(), PlantState::Running);
        t
    }

    #[test]
    fn cold_start_sequences_through_starting() {
        let mut plant = PlantLogic::new();
        let coils = auto_coils();
        plant.tick(0.0, 1.0, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Starting);
        // Not up yet at 30 s.
        plant.tick(30.0, 1.0, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Starting);
        plant.tick(61.0, 1.0, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Running);
    }

    #[test]
    fn stays_offline_without_auto_mode() {
        let mut plant = PlantLogic::new();
        let mut coils = auto_coils();
        coils.auto_mode = false;
        plant.tick(0.0, 1.0, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Offline);
    }

    #[test]
    fn high_turbidity_trips_shutdown_and_gates_restart() {
        let mut plant = PlantLogic::new();
        let mut t = start_plant(&mut plant);
        let coils = auto_coils();

        plant.tick(t, 1.0, 8.0, &readings(650.0, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Shutdown);
        t += 1.0;

        // Clean water alone is not enough to restart.
        plant.tick(t, 1.0, 8.0, &readings(300.0, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Shutdown);
        t += 1.0;

        // An intake re-assert with the creek below 400 NTU restarts.
        plant.note_intake_write(true);
        plant.tick(t, 1.0, 8.0, &readings(300.0, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Starting);
    }

    #[test]
    fn shutdown_holds_while_turbidity_is_above_restart_threshold() {
        let mut plant = PlantLogic::new();
        let t = start_plant(&mut plant);
        let coils = auto_coils();
        plant.tick(t, 1.0, 8.0, &readings(650.0, 450.0), &coils);
        plant.note_intake_write(true);
        // 450 NTU is below the trip but above the restart threshold.
        plant.tick(t + 1.0, 1.0, 8.0, &readings(450.0, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Shutdown);
    }

    #[test]
    fn shutdown_returns_offline_when_intake_dropped() {
        let mut plant = PlantLogic::new();
        let t = start_plant(&mut plant);
        let mut coils = auto_coils();
        plant.tick(t, 1.0, 8.0, &readings(650.0, 450.0), &coils);
        coils.intake_cmd = false;
        plant.tick(t + 1.0, 1.0, 8.0, &readings(300.0, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Offline);
    }

    #[test]
    fn estop_faults_from_any_state_and_recovers_offline() {
        let mut plant = PlantLogic::new();
        let t = start_plant(&mut plant);
        let mut coils = auto_coils();
        coils.estop = true;
        let snap = plant.tick(t, 1.0, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Fault);
        // Running equipment drops out under e-stop.
        let status = plant.discrete_status(&snap, &coils, false);
        assert!(!status.intake_running);
        assert!(!status.alum_running);
        assert!(!status.chlorine_running);

        coils.estop = false;
        plant.tick(t + 1.0, 1.0, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Offline);
    }

    #[test]
    fn backwash_on_command_resets_dp_and_returns_to_running() {
        let mut plant = PlantLogic::new();
        let mut t = start_plant(&mut plant);
        let mut coils = auto_coils();

        plant.override_filter_dp(120.0);
        coils.backwash_cmd = true;
        plant.tick(t, 1.0, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Backwash);
        assert_eq!(plant.backwash_count, 1);
        coils.backwash_cmd = false;

        // 20 simulated minutes of backwash flush the filter completely.
        let flush = BACKWASH_DURATION - 2.0;
        let snap = plant.tick(t + flush, flush, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Backwash);
        assert!(snap.filter_dp <= 2.0, "dp {}", snap.filter_dp);
        plant.tick(t + BACKWASH_DURATION + 1.0, 1.0, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Running);
    }

    #[test]
    fn high_dp_forces_backwash() {
        let mut plant = PlantLogic::new();
        let t = start_plant(&mut plant);
        let coils = auto_coils();
        plant.override_filter_dp(155.0);
        plant.tick(t, 1.0, 8.0, &readings(3.5, 450.0), &coils);
        assert_eq!(plant.state(), PlantState::Backwash);
    }

    #[test]
    fn level_drains_when_not_treating_and_rises_when_running() {
        let mut plant = PlantLogic::new();
        let coils = CoilSet::default();
        let before = plant.reservoir_level;
        // One idle simulated hour at overnight demand.
        let snap = plant.tick(0.0, 3600.0, 3.0, &readings(3.5, 0.0), &coils);
        assert!(snap.level_pct < before);

        let mut running = PlantLogic::new();
        let t = start_plant(&mut running);
        let lvl = running.reservoir_level;
        let snap = running.tick(t, 3600.0, 3.0, &readings(3.5, 450.0), &auto_coils());
        assert!(snap.level_pct > lvl, "{} vs {}", snap.level_pct, lvl);
    }

    #[test]
    fn totaliser_tracks_treated_flow() {
        let mut plant = PlantLogic::new();
        let mut t = start_plant(&mut plant);
        let coils = auto_coils();
        let start_ml = plant.totaliser_ml;
        let mut integrated = 0.0;
        for _ in 0..600 {
            let snap = plant.tick(t, 1.0, 8.0, &readings(3.5, 450.0), &coils);
            integrated += snap.flow_treated * 1.0;
            t += 1.0;
        }
        let delta_l = (plant.totaliser_ml - start_ml) * 1.0e6;
        assert!((delta_l - integrated).abs() <= integrated * 0.01);
    }

    #[test]
    fn filtered_turbidity_floors_while_treating() {
        let mut plant = PlantLogic::new();
        let t = start_plant(&mut plant);
        let snap = plant.tick(t, 1.0, 8.0, &readings(0.5, 450.0), &auto_coils());
        assert_eq!(snap.turb_filtered, FILTERED_FLOOR_NTU);
        let snap = plant.tick(t + 1.0, 1.0, 8.0, &readings(300.0, 450.0), &auto_coils());
        assert!((snap.turb_filtered - 6.0).abs() < 1e-9);
    }
}
