// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! End-to-end scenarios against the scan engine
//!
//! These drive the engine tick-by-tick with a fixed wall delta, the same
//! way the scan loop does at a steady cadence, so every scenario is
//! deterministic for a given seed and command timeline.

use std::sync::{Arc, RwLock};

use wtp_rtu_bridge::command::CommandExecutor;
use wtp_rtu_bridge::engine::{Engine, StatusFrame};
use wtp_rtu_bridge::plant::PlantState;
use wtp_rtu_bridge::registers::map;
use wtp_rtu_bridge::registers::WriteOp;

fn write_coil(engine: &mut Engine, addr: u16, value: bool) {
    engine
        .apply_commands(vec![WriteOp::Coil { addr, value }])
        .unwrap();
}

/// Bring a seeded engine to Running, one simulated second per tick.
fn start_running(engine: &mut Engine) {
    write_coil(engine, map::CO_AUTO_MODE, true);
    write_coil(engine, map::CO_INTAKE_CMD, true);
    write_coil(engine, map::CO_ALUM_CMD, true);
    write_coil(engine, map::CO_CL2_CMD, true);
    for _ in 0..120 {
        engine.tick(1.0 / 60.0).unwrap();
    }
    assert_eq!(engine.state(), PlantState::Running);
}

fn executor_for(engine: &Engine) -> (CommandExecutor, Arc<RwLock<StatusFrame>>) {
    let status = Arc::new(RwLock::new(StatusFrame::default()));
    (
        CommandExecutor::new(engine.rain(), engine.scenario(), Arc::clone(&status)),
        status,
    )
}

#[test]
fn wall_and_sim_time_agree_at_unit_speed() {
    let mut engine = Engine::new(42, 1.0, false);
    let mut frame = StatusFrame::default();
    for _ in 0..90 {
        frame = engine.tick(1.0).unwrap();
    }
    let drift = (frame.t_sim - 90.0).abs() / 90.0;
    assert!(drift < 0.05, "sim drifted {:.1}% from wall", drift * 100.0);
}

#[test]
fn registers_hold_their_declared_ranges_over_a_quiet_day() {
    let mut engine = Engine::new(7, 60.0, false);
    start_running(&mut engine);

    let bank = engine.bank();
    // 24 simulated hours at one simulated minute per tick.
    for _ in 0..1440 {
        engine.tick(1.0).unwrap();
        let bank = bank.read().unwrap();
        let hr = bank.holding();
        assert!(hr[map::HR_TURB_RAW as usize] <= 10_000);
        assert!(hr[map::HR_PH as usize] <= 1_400);
        assert!(hr[map::HR_CL2 as usize] <= 500);
        assert!(hr[map::HR_LEVEL_PCT as usize] <= 1_000);
        assert!(hr[map::HR_TEMP as usize] <= 450);
        assert!(hr[map::HR_LEVEL_CM as usize] <= 3_000);
        let status = bank.input()[map::IR_PLANT_STATUS as usize];
        assert!(status <= 5);
    }
}

#[test]
fn dose_failure_bleeds_chlorine_and_raises_the_low_alarm() {
    let mut engine = Engine::new(42, 60.0, false);
    start_running(&mut engine);
    let (executor, _status) = executor_for(&engine);

    assert_eq!(executor.run_line("dose off"), "ok");

    let bank = engine.bank();
    let start_hr3 = bank.read().unwrap().holding()[map::HR_CL2 as usize];
    assert!(start_hr3 > 100, "residual should start near 1.5 mg/L");

    // Two dose periods is 1800 simulated seconds.
    let mut last = start_hr3;
    let mut alarm_seen = false;
    for _ in 0..3600 {
        engine.tick(1.0 / 60.0).unwrap();
        let bank = bank.read().unwrap();
        let hr3 = bank.holding()[map::HR_CL2 as usize];
        assert!(hr3 <= last, "HR3 rose from {last} to {hr3} with dosing off");
        last = hr3;
        let bit2 = bank.input()[map::IR_ALARM_WORD as usize] & (1 << 2);
        if hr3 < 20 {
            assert_ne!(bit2, 0, "low-chlorine alarm missing at HR3={hr3}");
            alarm_seen = true;
        } else if hr3 > 20 {
            // HR3 exactly 20 straddles the 0.2 mg/L threshold at x100.
            assert_eq!(bit2, 0, "low-chlorine alarm early at HR3={hr3}");
        }
    }
    // 3600 sim-seconds of doubled decay from ~1.5 mg/L lands well below
    // the 0.2 mg/L alarm threshold.
    assert!(alarm_seen, "HR3 never fell below 20 (ended at {last})");
    assert_eq!(executor.run_line("dose on"), "ok");
}

#[test]
fn glitch_perturbs_for_thirty_simulated_seconds_then_clears() {
    let mut engine = Engine::new(42, 60.0, false);
    start_running(&mut engine);
    let (executor, status) = executor_for(&engine);

    // The executor reads sim time from the latest pushed frame.
    let frame = engine.tick(1.0 / 60.0).unwrap();
    *status.write().unwrap() = frame.clone();
    assert_eq!(executor.run_line("glitch"), "ok");

    // During the glitch window the turbidity can jump by up to 200 NTU;
    // afterwards it returns to the quiet band.
    let mut max_during = 0.0f64;
    for _ in 0..30 {
        let f = engine.tick(1.0 / 60.0).unwrap();
        max_during = max_during.max(f.turb_raw);
    }
    let mut max_after = 0.0f64;
    for _ in 0..60 {
        let f = engine.tick(1.0 / 60.0).unwrap();
        max_after = max_after.max(f.turb_raw);
    }
    assert!(max_during > max_after, "{max_during} vs {max_after}");
    assert!(max_after < 60.0, "glitch did not clear: {max_after}");
}

#[test]
fn sensor_fault_holds_the_plant_down_until_cleared() {
    let mut engine = Engine::new(42, 60.0, false);
    start_running(&mut engine);
    let (executor, _status) = executor_for(&engine);

    // A stuck-high turbidity analyser reads 900 NTU and trips the plant.
    assert_eq!(executor.run_line("fault turbidity"), "ok");
    engine.tick(1.0 / 60.0).unwrap();
    assert_eq!(engine.state(), PlantState::Shutdown);

    // Re-asserting the intake does not help while the analyser is stuck.
    write_coil(&mut engine, map::CO_INTAKE_CMD, true);
    for _ in 0..10 {
        engine.tick(1.0 / 60.0).unwrap();
    }
    assert_eq!(engine.state(), PlantState::Shutdown);

    // Clearing the fault and re-asserting the intake restarts the plant.
    assert_eq!(executor.run_line("clear turbidity"), "ok");
    write_coil(&mut engine, map::CO_INTAKE_CMD, true);
    let mut reached_running = false;
    for _ in 0..90 {
        engine.tick(1.0 / 60.0).unwrap();
        if engine.state() == PlantState::Running {
            reached_running = true;
            break;
        }
    }
    assert!(reached_running);
}

#[test]
fn scripted_runs_replay_identically_through_the_command_surface() {
    let run = || {
        let mut engine = Engine::new(42, 60.0, false);
        let (executor, status) = executor_for(&engine);
        let mut trace = Vec::new();
        for i in 0..600u32 {
            match i {
                5 => {
                    write_coil(&mut engine, map::CO_AUTO_MODE, true);
                    write_coil(&mut engine, map::CO_INTAKE_CMD, true);
                }
                100 => assert_eq!(executor.run_line("rain 650"), "ok"),
                200 => assert_eq!(executor.run_line("dose off"), "ok"),
                300 => assert_eq!(executor.run_line("fault flow"), "ok"),
                400 => assert_eq!(executor.run_line("clear flow"), "ok"),
                450 => assert_eq!(executor.run_line("glitch"), "ok"),
                _ => {}
            }
            let frame = engine.tick(1.0).unwrap();
            *status.write().unwrap() = frame;
            let bank = engine.bank();
            let bank = bank.read().unwrap();
            trace.push((bank.holding().to_vec(), bank.input().to_vec()));
        }
        trace
    };

    assert_eq!(run(), run(), "600-tick register traces diverged");
}
