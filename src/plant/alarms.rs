// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Alarm word evaluation
//!
//! The 16-bit alarm word is a pure projection of the current snapshot and
//! equipment status: no latching, no acknowledge logic in the bits. The
//! operator acknowledge coil is observable only as a coil.

use super::{CoilSet, DiscreteStatus, ProcessSnapshot};

/// Raw turbidity warning level, NTU.
pub const TURB_WARNING_NTU: f64 = 200.0;
/// Filtered water turbidity alarm, NTU.
pub const TURB_FILTERED_HIGH_NTU: f64 = 1.0;
/// Minimum chlorine residual, mg/L.
pub const CL2_LOW_MG_L: f64 = 0.2;
pub const PH_HIGH: f64 = 8.5;
pub const PH_LOW: f64 = 6.5;
pub const LEVEL_HIGH_PCT: f64 = 95.0;
pub const LEVEL_LOW_PCT: f64 = 20.0;

/// Bit positions in the alarm word.
pub mod bits {
    pub const TURB_RAW_HIGH: u16 = 0;
    pub const TURB_FILTERED_HIGH: u16 = 1;
    pub const CL2_LOW: u16 = 2;
    pub const PH_HIGH: u16 = 3;
    pub const PH_LOW: u16 = 4;
    pub const LEVEL_HIGH: u16 = 5;
    pub const LEVEL_LOW: u16 = 6;
    pub const COMM_FAULT: u16 = 7;
    pub const PUMP_FAULT: u16 = 8;
    pub const VALVE_FAULT: u16 = 9;
}

/// Recompute the alarm word for this tick.
pub fn evaluate_alarms(
    snapshot: &ProcessSnapshot,
    coils: &CoilSet,
    status: &DiscreteStatus,
    comm_fault: bool,
) -> u16 {
    let mut word = 0u16;
    let mut set = |bit: u16, on: bool| {
        if on {
            word |= 1 << bit;
        }
    };

    set(bits::TURB_RAW_HIGH, snapshot.turb_raw > TURB_WARNING_NTU);
    set(
        bits::TURB_FILTERED_HIGH,
        snapshot.turb_filtered > TURB_FILTERED_HIGH_NTU,
    );
    set(bits::CL2_LOW, snapshot.chlorine < CL2_LOW_MG_L);
    set(bits::PH_HIGH, snapshot.ph > PH_HIGH);
    set(bits::PH_LOW, snapshot.ph < PH_LOW);
    set(bits::LEVEL_HIGH, snapshot.level_pct > LEVEL_HIGH_PCT);
    set(bits::LEVEL_LOW, snapshot.level_pct < LEVEL_LOW_PCT);
    set(bits::COMM_FAULT, comm_fault);

    // A commanded pump that is not actually turning is a drive fault.
    let pump_fault = (coils.intake_cmd && !status.intake_running)
        || (coils.alum_cmd && !status.alum_running)
        || (coils.chlorine_cmd && !status.chlorine_running);
    set(bits::PUMP_FAULT, pump_fault);

    // Backwash valve position disagreeing with its command.
    set(
        bits::VALVE_FAULT,
        coils.backwash_cmd != status.backwash_valve_open,
    );

    word
}
