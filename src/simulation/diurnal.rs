// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Diurnal baseline curves
//!
//! Daily demand and temperature cycles for a tropical coastal town. The
//! flow curve is an overnight floor plus Gaussian bumps for the morning and
//! evening peaks; temperature is a phase-shifted sinusoid, coolest before
//! dawn and warmest mid-afternoon.

use std::f64::consts::PI;

/// Overnight intake floor in L/s.
const FLOW_FLOOR: f64 = 300.0;
/// Peak-to-peak swing added on top of the floor in L/s.
const FLOW_SWING: f64 = 300.0;
/// Morning peak centre (hours) and relative height.
const AM_PEAK_HOUR: f64 = 7.5;
const AM_PEAK_GAIN: f64 = 0.60;
/// Evening peak centre (hours) and relative height.
const PM_PEAK_HOUR: f64 = 18.0;
const PM_PEAK_GAIN: f64 = 0.45;
/// Width of both demand peaks (hours).
const PEAK_SIGMA: f64 = 1.5;

/// Consumer demand as a fraction of the intake curve. The intake is sized
/// with headroom so the reservoir refills while the plant runs.
const DEMAND_FRACTION: f64 = 0.85;

fn gaussian_bump(h: f64, centre: f64) -> f64 {
    let d = h - centre;
    (-d * d / (2.0 * PEAK_SIGMA * PEAK_SIGMA)).exp()
}

/// Raw-water intake baseline in L/s for a simulated hour of day.
pub fn intake_flow(hour_of_day: f64) -> f64 {
    let h = hour_of_day.rem_euclid(24.0);
    let am = AM_PEAK_GAIN * gaussian_bump(h, AM_PEAK_HOUR);
    let pm = PM_PEAK_GAIN * gaussian_bump(h, PM_PEAK_HOUR);
    FLOW_FLOOR + FLOW_SWING * (am + pm)
}

/// Consumer draw on the reservoir in L/s for a simulated hour of day.
pub fn demand_flow(hour_of_day: f64) -> f64 {
    DEMAND_FRACTION * intake_flow(hour_of_day)
}

/// Raw-water temperature baseline in degrees Celsius.
///
/// Sinusoid between 22 and 28 degrees, warmest at 14:00.
pub fn water_temperature(hour_of_day: f64) -> f64 {
    const BASE_MIN: f64 = 22.0;
    const BASE_MAX: f64 = 28.0;
    let h = hour_of_day.rem_euclid(24.0);
    let mid = (BASE_MIN + BASE_MAX) / 2.0;
    let amp = (BASE_MAX - BASE_MIN) / 2.0;
    let phase = 2.0 * PI * (h - 14.0) / 24.0;
    mid + amp * phase.cos()
}

/// Diurnal pH baseline: slight alkalinity swing around 7.2.
pub fn ph_baseline(hour_of_day: f64) -> f64 {
    let h = hour_of_day.rem_euclid(24.0);
    7.2 + 0.2 * (2.0 * PI * h / 24.0).sin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overnight_flow_sits_near_the_floor() {
        let f = intake_flow(3.0);
        assert!(f > 295.0 && f < 320.0, "overnight flow {f}");
    }

    #[test]
    fn morning_peak_dominates() {
        let peak = intake_flow(7.5);
        assert!(peak > intake_flow(3.0));
        assert!(peak > intake_flow(12.0));
        assert!((peak - (300.0 + 300.0 * 0.60)).abs() < 10.0);
    }

    #[test]
    fn demand_leaves_refill_headroom() {
        for h in 0..24 {
            assert!(demand_flow(h as f64) < intake_flow(h as f64));
        }
    }

    #[test]
    fn temperature_extremes_at_expected_hours() {
        assert!((water_temperature(14.0) - 28.0).abs() < 1e-9);
        assert!((water_temperature(2.0) - 22.0).abs() < 1e-9);
        assert!(water_temperature(2.0) < water_temperature(5.0));
    }
}
