// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register map and fixed-point encoding
//!
//! Address layout and scaling for the SCADA-facing register bank. Values
//! are scaled to unsigned 16-bit integers the standard Modbus way: a fixed
//! decimal multiplier per register, saturating at the ends of the range.
//!
//! | Addr | Channel             | Scale |
//! |------|---------------------|-------|
//! | HR0  | turb_raw (NTU)      | x10   |
//! | HR1  | turb_filtered (NTU) | x100  |
//! | HR2  | pH                  | x100  |
//! | HR3  | chlorine (mg/L)     | x100  |
//! | HR4  | flow_raw (L/s)      | x10   |
//! | HR5  | flow_treated (L/s)  | x10   |
//! | HR6  | level_pct (%)       | x10   |
//! | HR7  | temperature (degC)  | x10   |
//! | HR8  | alum_dose (mg/L)    | x10   |
//! | HR9  | filter_dp (kPa)     | x10   |
//! | HR10 | dam_release (ML/d)  | x10   |
//! | HR11 | level_cm (cm)       | x1    |
//! | HR12 | backwash_count      | x1    |
//! | HR13 | totaliser (ML)      | x1    |
//! | HR14 | runtime (h)         | x1    |
//! | IR0  | turb_raw backup     | x10   |
//! | IR1  | plant status code   | x1    |
//! | IR2  | alarm word          | bits  |

// Holding register offsets (0-indexed, SCADA sees 40001+).
pub const HR_TURB_RAW: u16 = 0;
pub const HR_TURB_FILTERED: u16 = 1;
pub const HR_PH: u16 = 2;
pub const HR_CL2: u16 = 3;
pub const HR_FLOW_RAW: u16 = 4;
pub const HR_FLOW_TREATED: u16 = 5;
pub const HR_LEVEL_PCT: u16 = 6;
pub const HR_TEMP: u16 = 7;
pub const HR_ALUM_DOSE: u16 = 8;
pub const HR_FILTER_DP: u16 = 9;
pub const HR_DAM_RELEASE: u16 = 10;
pub const HR_LEVEL_CM: u16 = 11;
pub const HR_BW_COUNT: u16 = 12;
pub const HR_TOTAL_FLOW: u16 = 13;
pub const HR_RUNTIME: u16 = 14;

// Input register offsets (SCADA sees 30001+).
pub const IR_TURB_BACKUP: u16 = 0;
pub const IR_PLANT_STATUS: u16 = 1;
pub const IR_ALARM_WORD: u16 = 2;

// Coil offsets (SCADA sees 00001+).
pub const CO_INTAKE_CMD: u16 = 0;
pub const CO_ALUM_CMD: u16 = 1;
pub const CO_CL2_CMD: u16 = 2;
pub const CO_BW_CMD: u16 = 3;
pub const CO_AUTO_MODE: u16 = 4;
pub const CO_ESTOP: u16 = 5;
pub const CO_ALARM_ACK: u16 = 6;
pub const CO_TURB_SHUTDOWN: u16 = 7;

pub const NUM_HOLDING_REGISTERS: usize = 15;
pub const NUM_INPUT_REGISTERS: usize = 3;
pub const NUM_COILS: usize = 8;
pub const NUM_DISCRETE_INPUTS: usize = 10;

/// Encode an engineering value into a fixed-point register.
///
/// Round-half-to-even, then saturate into the unsigned 16-bit range so an
/// off-scale sensor pegs the register instead of wrapping.
pub fn encode_fixed(value: f64, scale: f64) -> u16 {
    let scaled = (value * scale).round_ties_even();
    if scaled.is_nan() || scaled <= 0.0 {
        0
    } else if scaled >= f64::from(u16::MAX) {
        u16::MAX
    } else {
        scaled as u16
    }
}

/// Decode a fixed-point register back to engineering units.
pub fn decode_fixed(raw: u16, scale: f64) -> f64 {
    f64::from(raw) / scale
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_with_declared_scales() {
        assert_eq!(encode_fixed(3.5, 10.0), 35);
        assert_eq!(encode_fixed(7.21, 100.0), 721);
        assert_eq!(encode_fixed(450.0, 10.0), 4500);
    }

    #[test]
    fn rounds_half_to_even() {
        assert_eq!(encode_fixed(0.25, 10.0), 2); // 2.5 -> 2
        assert_eq!(encode_fixed(0.35, 10.0), 4); // 3.5 -> 4
    }

    #[test]
    fn saturates_instead_of_wrapping() {
        assert_eq!(encode_fixed(99999.0, 10.0), u16::MAX);
        assert_eq!(encode_fixed(-5.0, 10.0), 0);
        assert_eq!(encode_fixed(f64::NAN, 10.0), 0);
    }

    #[test]
    fn round_trip_is_stable_within_one_lsb() {
        for raw in [0u16, 1, 35, 721, 4999, 65535] {
            let value = decode_fixed(raw, 100.0);
            let back = encode_fixed(value, 100.0);
            assert!(back.abs_diff(raw) <= 1, "{raw} -> {value} -> {back}");
        }
    }
}
