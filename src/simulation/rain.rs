// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Rain event source
//!
//! Models tropical rain events hitting the catchment. Each event drives a
//! shaped envelope: raw turbidity spikes sharply then decays exponentially,
//! pH drops (acidic runoff), creek flow rises and water temperature dips, all
//! tracking the same envelope scaled to their own magnitudes.
//!
//! Events arrive on their own via a Poisson process, or on demand through
//! operator injection.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Exp};

/// Default peak for operator-injected events, NTU.
pub const DEFAULT_INJECT_PEAK: f64 = 400.0;
/// Default duration for operator-injected events, hours.
const DEFAULT_INJECT_DURATION_H: f64 = 6.0;

/// One rain event over the catchment.
#[derive(Debug, Clone)]
pub struct RainEvent {
    start: f64,
    duration: f64,
    peak_ntu: f64,
    ph_drop: f64,
    flow_boost_frac: f64,
    temp_drop: f64,
}

impl RainEvent {
    /// Build an event starting at `start` simulated seconds.
    ///
    /// The pH, flow and temperature magnitudes scale with severity the way
    /// the catchment actually behaves: a 800 NTU cell drops pH by 0.8 and
    /// boosts creek flow by 20%.
    pub fn new(start: f64, peak_ntu: f64, duration_hours: f64) -> Self {
        let severity = peak_ntu / 800.0;
        Self {
            start,
            duration: duration_hours * 3600.0,
            peak_ntu,
            ph_drop: 0.2 + 0.6 * severity,
            flow_boost_frac: 0.1 + 0.1 * severity,
            temp_drop: 1.0 + 1.0 * severity,
        }
    }

    pub fn is_active(&self, sim_now: f64) -> bool {
        let elapsed = sim_now - self.start;
        (0.0..self.duration).contains(&elapsed)
    }

    pub fn is_expired(&self, sim_now: f64) -> bool {
        sim_now - self.start >= self.duration
    }

    /// Envelope fraction in `[0, 1]`: linear ramp over the first 10% of the
    /// duration, then exponential decay with time-constant `0.35 * duration`.
    fn envelope(&self, sim_now: f64) -> f64 {
        let elapsed = sim_now - self.start;
        if elapsed < 0.0 || elapsed >= self.duration {
            return 0.0;
        }
        let rise_time = self.duration * 0.1;
        if elapsed < rise_time {
            elapsed / rise_time
        } else {
            let decay_tau = self.duration * 0.35;
            (-(elapsed - rise_time) / decay_tau).exp()
        }
    }

    pub fn turbidity_contribution(&self, sim_now: f64) -> f64 {
        self.peak_ntu * self.envelope(sim_now)
    }

    pub fn ph_contribution(&self, sim_now: f64) -> f64 {
        self.ph_drop * self.envelope(sim_now)
    }

    pub fn flow_contribution(&self, sim_now: f64) -> f64 {
        self.flow_boost_frac * self.envelope(sim_now)
    }

    pub fn temp_contribution(&self, sim_now: f64) -> f64 {
        self.temp_drop * self.envelope(sim_now)
    }
}

/// Aggregate rain effect over all active events at one instant.
///
/// Turbidity loads sum across overlapping cells; the pH, flow and
/// temperature effects are dominated by the strongest cell.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RainContribution {
    /// Added raw turbidity, NTU.
    pub turbidity: f64,
    /// Subtracted pH.
    pub ph_drop: f64,
    /// Fractional flow boost, multiply flow by `1 + flow_boost_frac`.
    pub flow_boost_frac: f64,
    /// Subtracted temperature, degrees Celsius.
    pub temp_drop: f64,
}

impl RainContribution {
    pub fn is_raining(&self) -> bool {
        self.turbidity > 0.0
    }
}

/// Schedules, injects and expires rain events.
pub struct RainEventSource {
    events: Vec<RainEvent>,
    auto_events: bool,
    next_rain_at: f64,
    last_sim: f64,
    rng: StdRng,
}

impl RainEventSource {
    pub fn new(seed: u64, auto_events: bool) -> Self {
        let mut source = Self {
            events: Vec::new(),
            auto_events,
            next_rain_at: f64::INFINITY,
            last_sim: 0.0,
            rng: StdRng::seed_from_u64(seed),
        };
        source.next_rain_at = source.schedule_next(0.0);
        source
    }

    /// Poisson arrival: mean inter-arrival drawn uniformly in 18-36
    /// simulated hours, then an exponential gap with that mean.
    fn schedule_next(&mut self, sim_now: f64) -> f64 {
        if !self.auto_events {
            return f64::INFINITY;
        }
        let mean_interval = self.rng.gen_range(18.0..36.0) * 3600.0;
        let gap = Exp::new(1.0 / mean_interval)
            .expect("positive rate")
            .sample(&mut self.rng);
        sim_now + gap
    }

    /// Inject an operator-commanded event at the current simulated time.
    pub fn inject(&mut self, peak_ntu: Option<f64>) {
        let peak = peak_ntu.unwrap_or(DEFAULT_INJECT_PEAK);
        info!(
            "Rain event injected: peak={:.0} NTU, duration={:.0}h",
            peak, DEFAULT_INJECT_DURATION_H
        );
        self.events
            .push(RainEvent::new(self.last_sim, peak, DEFAULT_INJECT_DURATION_H));
    }

    /// Number of currently active events.
    pub fn active_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| e.is_active(self.last_sim))
            .count()
    }

    /// Advance the scheduler to `sim_now`, prune expired events and return
    /// the aggregate contribution.
    pub fn active_contributions(&mut self, sim_now: f64) -> RainContribution {
        self.last_sim = sim_now;

        if self.auto_events && sim_now >= self.next_rain_at {
            let peak = self.rng.gen_range(200.0..800.0);
            let duration = self.rng.gen_range(2.0..8.0);
            info!(
                "Auto rain event: peak={:.0} NTU, duration={:.1}h",
                peak, duration
            );
            self.events.push(RainEvent::new(sim_now, peak, duration));
            self.next_rain_at = self.schedule_next(sim_now);
        }

        self.events.retain(|e| !e.is_expired(sim_now));

        let mut total = RainContribution::default();
        for event in &self.events {
            total.turbidity += event.turbidity_contribution(sim_now);
            total.ph_drop = total.ph_drop.max(event.ph_contribution(sim_now));
            total.flow_boost_frac = total
                .flow_boost_frac
                .max(event.flow_contribution(sim_now));
            total.temp_drop = total.temp_drop.max(event.temp_contribution(sim_now));
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_ramps_then_decays() {
        let event = RainEvent::new(0.0, 700.0, 6.0);
        let rise_end = 6.0 * 3600.0 * 0.1;
        // Half-way up the ramp.
        assert!((event.turbidity_contribution(rise_end / 2.0) - 350.0).abs() < 1e-6);
        // Peak at the top of the ramp.
        assert!((event.turbidity_contribution(rise_end) - 700.0).abs() < 1e-6);
        // Decaying afterwards.
        assert!(event.turbidity_contribution(rise_end + 3600.0) < 700.0);
        // Gone after the duration.
        assert_eq!(event.turbidity_contribution(7.0 * 3600.0), 0.0);
    }

    #[test]
    fn severity_scales_side_effects() {
        let severe = RainEvent::new(0.0, 800.0, 6.0);
        let mild = RainEvent::new(0.0, 200.0, 6.0);
        assert!(severe.ph_drop > mild.ph_drop);
        assert!((severe.ph_drop - 0.8).abs() < 1e-9);
        assert!((severe.flow_boost_frac - 0.2).abs() < 1e-9);
        assert!((severe.temp_drop - 2.0).abs() < 1e-9);
    }

    #[test]
    fn overlapping_events_sum_turbidity_and_max_the_rest() {
        let mut source = RainEventSource::new(1, false);
        source.inject(Some(400.0));
        source.inject(Some(200.0));
        let rise_end = 6.0 * 3600.0 * 0.1;
        let c = source.active_contributions(rise_end);
        assert!((c.turbidity - 600.0).abs() < 1e-6);
        // pH drop comes from the stronger event alone.
        let stronger = RainEvent::new(0.0, 400.0, 6.0);
        assert!((c.ph_drop - stronger.ph_contribution(rise_end)).abs() < 1e-9);
    }

    #[test]
    fn expired_events_are_pruned() {
        let mut source = RainEventSource::new(1, false);
        source.inject(Some(400.0));
        assert_eq!(source.active_count(), 1);
        let c = source.active_contributions(10.0 * 3600.0);
        assert_eq!(c, RainContribution::default());
        assert_eq!(source.active_count(), 0);
    }

    #[test]
    fn manual_mode_never_self_schedules() {
        let mut source = RainEventSource::new(42, false);
        for day in 0..30 {
            let c = source.active_contributions(day as f64 * 86_400.0);
            assert!(!c.is_raining());
        }
    }

    #[test]
    fn auto_mode_eventually_rains() {
        let mut source = RainEventSource::new(42, true);
        let mut rained = false;
        for hour in 0..24 * 14 {
            let c = source.active_contributions(hour as f64 * 3600.0);
            if c.is_raining() {
                rained = true;
                break;
            }
        }
        assert!(rained, "no rain in two simulated weeks");
    }
}
