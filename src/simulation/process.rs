// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Process data generator
//!
//! Composes the OU channels, diurnal baselines, rain envelopes and the dose
//! sawtooth into one correlated set of raw sensor readings per tick. The
//! correlation DAG is rain -> turbidity -> pH / flow / temperature /
//! chlorine: a single rain envelope perturbs every channel with its own
//! magnitude, and a positive rain turbidity load doubles chlorine
//! consumption.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use super::diurnal;
use super::dosing::DoseSawtooth;
use super::ou::{derive_stream_seed, OuChannel};
use super::rain::{RainContribution, RainEventSource};
use super::scenario::{ScenarioState, SensorKind, TURBIDITY_FAULT_NTU};

// Stable per-channel stream ids; changing these changes seeded replays.
const STREAM_TURBIDITY: u64 = 0;
const STREAM_PH: u64 = 1;
const STREAM_FLOW: u64 = 2;
const STREAM_TEMPERATURE: u64 = 3;
const STREAM_ALUM: u64 = 4;
const STREAM_NOISE: u64 = 5;
/// Stream id reserved for the rain event source.
pub const STREAM_RAIN: u64 = 6;

/// Raw correlated sensor readings for one tick, engineering units.
#[derive(Debug, Clone, Copy)]
pub struct SensorReadings {
    /// Raw-water turbidity, NTU.
    pub turb_raw: f64,
    /// Raw-water pH.
    pub ph: f64,
    /// Chlorine residual, mg/L.
    pub chlorine: f64,
    /// Raw intake flow, L/s.
    pub flow_raw: f64,
    /// Raw-water temperature, degrees Celsius.
    pub temperature: f64,
    /// Alum dose rate, mg/L.
    pub alum_dose: f64,
    /// The rain contribution this tick was built from.
    pub rain: RainContribution,
}

/// The stochastic process model for the seven base channels.
pub struct ProcessModel {
    turb_ou: OuChannel,
    ph_ou: OuChannel,
    flow_ou: OuChannel,
    temp_ou: OuChannel,
    alum_ou: OuChannel,
    dose: DoseSawtooth,
    noise_rng: StdRng,
}

impl ProcessModel {
    pub fn new(seed: u64) -> Self {
        Self {
            // Raw turbidity wanders slowly around 3.5 NTU; the clamp floor
            // keeps the creek from reading cleaner than it ever does.
            turb_ou: OuChannel::new(seed, STREAM_TURBIDITY, 3.5, 0.001, 0.4)
                .with_clamp(0.5, 50.0),
            ph_ou: OuChannel::new(seed, STREAM_PH, 7.2, 0.005, 0.03).with_clamp(4.0, 10.0),
            // Offset from the diurnal flow curve, not an absolute flow.
            flow_ou: OuChannel::new(seed, STREAM_FLOW, 0.0, 0.01, 15.0),
            // Offset from the diurnal temperature curve.
            temp_ou: OuChannel::new(seed, STREAM_TEMPERATURE, 0.0, 0.01, 0.1),
            alum_ou: OuChannel::new(seed, STREAM_ALUM, 45.0, 0.05, 0.8).with_clamp(0.0, 80.0),
            dose: DoseSawtooth::new(),
            noise_rng: StdRng::seed_from_u64(derive_stream_seed(seed, STREAM_NOISE)),
        }
    }

    pub fn chlorine_residual(&self) -> f64 {
        self.dose.residual()
    }

    /// Advance every channel by `sim_dt` and produce one reading set.
    ///
    /// `alum_dosing` gates the alum channel (commanded and treating) and
    /// `chlorine_commanded` carries the chlorinator coil; `rain` and
    /// `scenario` are the injection surfaces owned by the caller.
    pub fn tick(
        &mut self,
        sim_now: f64,
        sim_dt: f64,
        hour_of_day: f64,
        alum_dosing: bool,
        chlorine_commanded: bool,
        rain: &mut RainEventSource,
        scenario: &mut ScenarioState,
    ) -> SensorReadings {
        let contributions = rain.active_contributions(sim_now);

        // Turbidity: slow OU walk plus the summed rain load, with
        // proportional measurement noise (2% with a 0.3 NTU floor).
        self.turb_ou.step(sim_dt);
        let mut turb_raw = self.turb_ou.value() + contributions.turbidity;
        let turb_sigma = (turb_raw * 0.02).max(0.3);
        turb_raw += Normal::new(0.0, turb_sigma)
            .expect("positive sigma")
            .sample(&mut self.noise_rng);
        turb_raw = turb_raw.max(0.0);

        // pH: diurnal mean, acidic runoff pulls it down during rain.
        self.ph_ou.set_mu(diurnal::ph_baseline(hour_of_day));
        self.ph_ou.step(sim_dt);
        let mut ph = (self.ph_ou.value() - contributions.ph_drop).clamp(4.0, 10.0);

        // Flow: diurnal baseline plus OU offset, boosted by the rain
        // fraction, with 3% measurement noise.
        self.flow_ou.step(sim_dt);
        let base_flow = diurnal::intake_flow(hour_of_day);
        let mut flow_raw =
            (base_flow + self.flow_ou.value()) * (1.0 + contributions.flow_boost_frac);
        flow_raw += Normal::new(0.0, (flow_raw.abs() * 0.03).max(1.0))
            .expect("positive sigma")
            .sample(&mut self.noise_rng);
        flow_raw = flow_raw.max(0.0);

        // Temperature: diurnal baseline plus OU offset, dipped by rain.
        self.temp_ou.step(sim_dt);
        let temperature = (diurnal::water_temperature(hour_of_day) + self.temp_ou.value()
            - contributions.temp_drop)
            .clamp(10.0, 45.0);

        // Chlorine: sawtooth residual, consumed twice as fast while the
        // rain load is up. Pulses need both the chlorinator coil and the
        // scenario dosing gate.
        self.dose
            .set_enabled(chlorine_commanded && scenario.dosing_enabled());
        let mut chlorine = self.dose.step(sim_dt, contributions.is_raining());

        // Alum: only dosed while commanded and treating.
        self.alum_ou.step(sim_dt);
        let alum_dose = if alum_dosing { self.alum_ou.value() } else { 0.0 };

        // Sensor faults read deterministic stuck values.
        if scenario.is_faulted(SensorKind::Turbidity) {
            turb_raw = TURBIDITY_FAULT_NTU;
        }
        if scenario.is_faulted(SensorKind::Chlorine) {
            chlorine = 0.0;
        }
        if scenario.is_faulted(SensorKind::Flow) {
            flow_raw = 0.0;
        }

        // Data glitch: wide uniform bursts across the analog channels.
        if scenario.glitch_active(sim_now) {
            turb_raw = (turb_raw + self.noise_rng.gen_range(-50.0..200.0)).max(0.0);
            ph = (ph + self.noise_rng.gen_range(-2.0..2.0)).clamp(0.0, 14.0);
            flow_raw = (flow_raw + self.noise_rng.gen_range(-200.0..200.0)).max(0.0);
        }

        SensorReadings {
            turb_raw,
            ph,
            chlorine,
            flow_raw,
            temperature,
            alum_dose,
            rain: contributions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet_inputs() -> (RainEventSource, ScenarioState) {
        (RainEventSource::new(99, false), ScenarioState::new())
    }

    fn tick_at(
        model: &mut ProcessModel,
        rain: &mut RainEventSource,
        scenario: &mut ScenarioState,
        sim_now: f64,
    ) -> SensorReadings {
        let hour = (sim_now / 3600.0 + 6.0) % 24.0;
        model.tick(sim_now, 1.0, hour, true, true, rain, scenario)
    }

    #[test]
    fn baseline_readings_sit_in_engineering_ranges() {
        let mut model = ProcessModel::new(42);
        let (mut rain, mut scenario) = quiet_inputs();
        for i in 0..600 {
            let r = tick_at(&mut model, &mut rain, &mut scenario, i as f64);
            assert!(r.turb_raw >= 0.0 && r.turb_raw < 60.0, "turb {}", r.turb_raw);
            assert!((4.0..=10.0).contains(&r.ph));
            assert!((0.0..=2.0).contains(&r.chlorine));
            assert!(r.flow_raw >= 0.0 && r.flow_raw < 1000.0);
            assert!((10.0..=45.0).contains(&r.temperature));
        }
    }

    #[test]
    fn rain_cascades_across_channels() {
        // Twin models with the same seed draw identical noise, so the
        // same-tick comparison isolates the rain contributions exactly.
        let mut soaked_model = ProcessModel::new(42);
        let mut dry_model = ProcessModel::new(42);
        let (mut soaked_rain, mut soaked_scenario) = quiet_inputs();
        let (mut dry_rain, mut dry_scenario) = quiet_inputs();

        soaked_rain.inject(Some(700.0));

        // Sample at the top of the ramp (10% of a 6 h event).
        let at_peak = 6.0 * 3600.0 * 0.1;
        let soaked = tick_at(&mut soaked_model, &mut soaked_rain, &mut soaked_scenario, at_peak);
        let dry = tick_at(&mut dry_model, &mut dry_rain, &mut dry_scenario, at_peak);

        assert!(soaked.turb_raw > 500.0, "turb {}", soaked.turb_raw);
        assert!(soaked.ph < dry.ph);
        assert!(soaked.flow_raw > dry.flow_raw);
        assert!(soaked.temperature < dry.temperature);
    }

    #[test]
    fn faults_stick_deterministically() {
        let mut model = ProcessModel::new(42);
        let (mut rain, mut scenario) = quiet_inputs();
        scenario.set_fault(SensorKind::Turbidity, true);
        scenario.set_fault(SensorKind::Flow, true);
        let r = tick_at(&mut model, &mut rain, &mut scenario, 0.0);
        assert_eq!(r.turb_raw, TURBIDITY_FAULT_NTU);
        assert_eq!(r.flow_raw, 0.0);
    }

    #[test]
    fn identical_seeds_replay_identically() {
        let mut a = ProcessModel::new(42);
        let mut b = ProcessModel::new(42);
        let (mut rain_a, mut scenario_a) = quiet_inputs();
        let (mut rain_b, mut scenario_b) = quiet_inputs();
        for i in 0..300 {
            let ra = tick_at(&mut a, &mut rain_a, &mut scenario_a, i as f64);
            let rb = tick_at(&mut b, &mut rain_b, &mut scenario_b, i as f64);
            assert_eq!(ra.turb_raw.to_bits(), rb.turb_raw.to_bits());
            assert_eq!(ra.flow_raw.to_bits(), rb.flow_raw.to_bits());
            assert_eq!(ra.ph.to_bits(), rb.ph.to_bits());
        }
    }

    #[test]
    fn dose_cutoff_bleeds_residual_down() {
        let mut model = ProcessModel::new(42);
        let (mut rain, mut scenario) = quiet_inputs();
        scenario.set_dosing_enabled(false);
        let mut last = f64::INFINITY;
        for i in 0..1800 {
            let r = tick_at(&mut model, &mut rain, &mut scenario, i as f64);
            assert!(r.chlorine <= last);
            last = r.chlorine;
        }
        assert!(last < 1.0);
    }
}
