// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Plant Module
//!
//! The control logic a SCADAPack RTU or Modicon PLC would run at the real
//! plant: the plant state machine, the derived process quantities (filtered
//! turbidity, treated flow, filter differential pressure, reservoir level,
//! totalisers) and the alarm word projection.

pub mod alarms;
pub mod state;

pub use alarms::evaluate_alarms;
pub use state::{PlantLogic, PlantState};

/// Operator command coils, written by SCADA through the Modbus server.
///
/// Layout matches coils 00001..00008 of the register map.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoilSet {
    /// 00001 - intake pump command.
    pub intake_cmd: bool,
    /// 00002 - alum dosing command.
    pub alum_cmd: bool,
    /// 00003 - chlorinator command.
    pub chlorine_cmd: bool,
    /// 00004 - backwash command.
    pub backwash_cmd: bool,
    /// 00005 - auto mode.
    pub auto_mode: bool,
    /// 00006 - emergency stop.
    pub estop: bool,
    /// 00007 - alarm acknowledge.
    pub alarm_ack: bool,
    /// 00008 - turbidity shutdown acknowledge.
    pub turb_shutdown_ack: bool,
}

impl CoilSet {
    pub const COUNT: usize = 8;

    pub fn get(&self, index: usize) -> Option<bool> {
        match index {
            0 => Some(self.intake_cmd),
            1 => Some(self.alum_cmd),
            2 => Some(self.chlorine_cmd),
            3 => Some(self.backwash_cmd),
            4 => Some(self.auto_mode),
            5 => Some(self.estop),
            6 => Some(self.alarm_ack),
            7 => Some(self.turb_shutdown_ack),
            _ => None,
        }
    }

    pub fn set(&mut self, index: usize, value: bool) -> bool {
        match index {
            0 => self.intake_cmd = value,
            1 => self.alum_cmd = value,
            2 => self.chlorine_cmd = value,
            3 => self.backwash_cmd = value,
            4 => self.auto_mode = value,
            5 => self.estop = value,
            6 => self.alarm_ack = value,
            7 => self.turb_shutdown_ack = value,
            _ => return false,
        }
        true
    }

    pub fn to_array(&self) -> [bool; Self::COUNT] {
        [
            self.intake_cmd,
            self.alum_cmd,
            self.chlorine_cmd,
            self.backwash_cmd,
            self.auto_mode,
            self.estop,
            self.alarm_ack,
            self.turb_shutdown_ack,
        ]
    }

    /// SCADA-facing name of a coil, for the command audit log.
    pub fn name(index: usize) -> &'static str {
        match index {
            0 => "INTAKE",
            1 => "ALUM",
            2 => "CHLORINE",
            3 => "BACKWASH",
            4 => "AUTO",
            5 => "ESTOP",
            6 => "ACK",
            7 => "TURB_SHUTDOWN",
            _ => "?",
        }
    }
}

/// Equipment and alarm status bits, exposed as discrete inputs 10001..10010.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscreteStatus {
    /// 10001 - intake pump running.
    pub intake_running: bool,
    /// 10002 - alum dosing pump running.
    pub alum_running: bool,
    /// 10003 - chlorinator running.
    pub chlorine_running: bool,
    /// 10004 - backwash valve open.
    pub backwash_valve_open: bool,
    /// 10005 - reservoir level high.
    pub level_high: bool,
    /// 10006 - reservoir level low.
    pub level_low: bool,
    /// 10007 - backwash in progress.
    pub backwash_active: bool,
    /// 10008 - turbidity shutdown latched.
    pub turb_shutdown: bool,
    /// 10009 - chlorine residual low.
    pub chlorine_low: bool,
    /// 10010 - communications fault.
    pub comm_fault: bool,
}

impl DiscreteStatus {
    pub const COUNT: usize = 10;

    pub fn to_array(&self) -> [bool; Self::COUNT] {
        [
            self.intake_running,
            self.alum_running,
            self.chlorine_running,
            self.backwash_valve_open,
            self.level_high,
            self.level_low,
            self.backwash_active,
            self.turb_shutdown,
            self.chlorine_low,
            self.comm_fault,
        ]
    }
}

/// One coherent view of the plant in engineering units, taken per tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessSnapshot {
    /// Raw-water turbidity, NTU.
    pub turb_raw: f64,
    /// Post-filtration turbidity, NTU.
    pub turb_filtered: f64,
    /// Raw-water pH.
    pub ph: f64,
    /// Chlorine residual, mg/L.
    pub chlorine: f64,
    /// Raw intake flow, L/s.
    pub flow_raw: f64,
    /// Treated water flow, L/s.
    pub flow_treated: f64,
    /// Reservoir level, percent.
    pub level_pct: f64,
    /// Reservoir level, centimetres.
    pub level_cm: f64,
    /// Raw-water temperature, degrees Celsius.
    pub temperature: f64,
    /// Alum dose rate, mg/L.
    pub alum_dose: f64,
    /// Filter differential pressure, kPa.
    pub filter_dp: f64,
    /// Dam release (raw intake draw), ML/day.
    pub dam_release: f64,
    /// Completed backwash cycles since startup.
    pub backwash_count: u16,
    /// Treated water totaliser, ML.
    pub totaliser_ml: f64,
    /// Plant runtime, hours.
    pub runtime_hours: f64,
}
