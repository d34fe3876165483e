// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Chlorine dose sawtooth
//!
//! Real plants dose continuously but the measured residual fluctuates with
//! demand, so the residual reads as a sawtooth: a periodic pulse back up to
//! the dose peak followed by exponential decay until the next cycle.

/// Sawtooth residual generator.
///
/// Invariant: `0 <= current <= peak` at every step.
#[derive(Debug, Clone)]
pub struct DoseSawtooth {
    period: f64,
    peak: f64,
    decay_rate: f64,
    enabled: bool,
    time_since_pulse: f64,
    current: f64,
}

/// Dosing cycle length in simulated seconds (~15 min).
pub const DOSE_PERIOD: f64 = 900.0;
/// Residual immediately after a dose pulse, mg/L.
pub const DOSE_PEAK: f64 = 2.0;
/// Base residual decay rate per simulated second.
pub const DOSE_DECAY_RATE: f64 = 3.0e-4;

impl DoseSawtooth {
    pub fn new() -> Self {
        Self {
            period: DOSE_PERIOD,
            peak: DOSE_PEAK,
            decay_rate: DOSE_DECAY_RATE,
            enabled: true,
            time_since_pulse: 0.0,
            // Start mid-cycle so the first pulse is not immediate.
            current: 1.5,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn residual(&self) -> f64 {
        self.current
    }

    /// Advance the residual by `dt` simulated seconds.
    ///
    /// During rain the organics load consumes chlorine roughly twice as
    /// fast; the caller signals this with `rain_active`. With dosing
    /// disabled there are no pulses and the existing residual decays at the
    /// same accelerated rate (the contact tank keeps consuming what is
    /// left).
    pub fn step(&mut self, dt: f64, rain_active: bool) -> f64 {
        if dt <= 0.0 {
            return self.current;
        }

        let decay = if rain_active || !self.enabled {
            self.decay_rate * 2.0
        } else {
            self.decay_rate
        };
        self.current *= (-decay * dt).exp();

        if self.enabled {
            self.time_since_pulse += dt;
            if self.time_since_pulse >= self.period {
                self.time_since_pulse = 0.0;
                self.current = self.peak;
            }
        }

        self.current = self.current.clamp(0.0, self.peak);
        self.current
    }
}

impl Default for DoseSawtooth {
    fn default() -> Self {
        Self::new()
    }
}
