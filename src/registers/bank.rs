// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register bank and pending-write queue
//!
//! The bank is the single substantial piece of shared state in the bridge.
//! Ownership rules: only the scan orchestrator mutates it (one tick-atomic
//! commit under the write lock); the Modbus server reads coherent slices
//! through the read lock, and every Modbus write lands in the bounded
//! pending queue until the next command drain.

use std::collections::VecDeque;
use std::sync::Mutex;

use log::warn;

use crate::plant::{CoilSet, DiscreteStatus, PlantState, ProcessSnapshot};

use super::map::{self, encode_fixed};

/// One write received from a Modbus client, waiting for the drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOp {
    Coil { addr: u16, value: bool },
    Holding { addr: u16, value: u16 },
}

/// Bounded queue of client writes, filled by the Modbus server tasks and
/// drained by the orchestrator every 0.5 s. Arrival order is preserved so
/// two writes to the same coil apply in the order they came in.
#[derive(Debug, Default)]
pub struct PendingWrites {
    queue: Mutex<VecDeque<WriteOp>>,
}

/// Queue depth bound; a SCADA that outruns two drain periods is broken.
const PENDING_WRITES_CAP: usize = 256;

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, op: WriteOp) {
        let mut queue = self.queue.lock().expect("pending-writes lock poisoned");
        if queue.len() >= PENDING_WRITES_CAP {
            warn!("Pending-write queue full, dropping oldest write");
            queue.pop_front();
        }
        queue.push_back(op);
    }

    /// Take everything queued so far, preserving arrival order.
    pub fn drain(&self) -> Vec<WriteOp> {
        let mut queue = self.queue.lock().expect("pending-writes lock poisoned");
        queue.drain(..).collect()
    }
}

/// The four Modbus address spaces as plain arrays.
#[derive(Debug, Clone)]
pub struct RegisterBank {
    holding: [u16; map::NUM_HOLDING_REGISTERS],
    input: [u16; map::NUM_INPUT_REGISTERS],
    coils: [bool; map::NUM_COILS],
    discrete: [bool; map::NUM_DISCRETE_INPUTS],
}

impl RegisterBank {
    pub fn new() -> Self {
        Self {
            holding: [0; map::NUM_HOLDING_REGISTERS],
            input: [0; map::NUM_INPUT_REGISTERS],
            coils: [false; map::NUM_COILS],
            discrete: [false; map::NUM_DISCRETE_INPUTS],
        }
    }

    /// Project one tick into the bank. Called under the write lock; all
    /// registers change together so clients never see a torn tick.
    pub fn commit_tick(
        &mut self,
        snapshot: &ProcessSnapshot,
        state: PlantState,
        alarm_word: u16,
        coils: &CoilSet,
        status: &DiscreteStatus,
    ) {
        let hr = &mut self.holding;
        hr[map::HR_TURB_RAW as usize] = encode_fixed(snapshot.turb_raw, 10.0);
        hr[map::HR_TURB_FILTERED as usize] = encode_fixed(snapshot.turb_filtered, 100.0);
        hr[map::HR_PH as usize] = encode_fixed(snapshot.ph, 100.0);
        hr[map::HR_CL2 as usize] = encode_fixed(snapshot.chlorine, 100.0);
        hr[map::HR_FLOW_RAW as usize] = encode_fixed(snapshot.flow_raw, 10.0);
        hr[map::HR_FLOW_TREATED as usize] = encode_fixed(snapshot.flow_treated, 10.0);
        hr[map::HR_LEVEL_PCT as usize] = encode_fixed(snapshot.level_pct, 10.0);
        hr[map::HR_TEMP as usize] = encode_fixed(snapshot.temperature, 10.0);
        hr[map::HR_ALUM_DOSE as usize] = encode_fixed(snapshot.alum_dose, 10.0);
        hr[map::HR_FILTER_DP as usize] = encode_fixed(snapshot.filter_dp, 10.0);
        hr[map::HR_DAM_RELEASE as usize] = encode_fixed(snapshot.dam_release, 10.0);
        hr[map::HR_LEVEL_CM as usize] = encode_fixed(snapshot.level_cm, 1.0);
        hr[map::HR_BW_COUNT as usize] = snapshot.backwash_count;
        hr[map::HR_TOTAL_FLOW as usize] = encode_fixed(snapshot.totaliser_ml, 1.0);
        hr[map::HR_RUNTIME as usize] = encode_fixed(snapshot.runtime_hours, 1.0);

        self.input[map::IR_TURB_BACKUP as usize] = hr[map::HR_TURB_RAW as usize];
        self.input[map::IR_PLANT_STATUS as usize] = state.code();
        self.input[map::IR_ALARM_WORD as usize] = alarm_word;

        self.coils = coils.to_array();
        self.discrete = status.to_array();
    }

    /// Apply drained client writes. Coil writes patch the coil block so a
    /// read-back straight after the drain already reflects the command;
    /// holding writes patch the named register until the next tick
    /// projection overwrites it.
    pub fn apply_writes(&mut self, ops: &[WriteOp]) {
        for op in ops {
            match *op {
                WriteOp::Coil { addr, value } => {
                    if let Some(slot) = self.coils.get_mut(addr as usize) {
                        *slot = value;
                    }
                }
                WriteOp::Holding { addr, value } => {
                    if let Some(slot) = self.holding.get_mut(addr as usize) {
                        *slot = value;
                    }
                }
            }
        }
    }

    /// Coherent slice of holding registers, or `None` if any address is
    /// outside the map.
    pub fn read_holding(&self, addr: u16, cnt: u16) -> Option<Vec<u16>> {
        read_slice(&self.holding, addr, cnt)
    }

    pub fn read_input(&self, addr: u16, cnt: u16) -> Option<Vec<u16>> {
        read_slice(&self.input, addr, cnt)
    }

    pub fn read_coils(&self, addr: u16, cnt: u16) -> Option<Vec<bool>> {
        read_slice(&self.coils, addr, cnt)
    }

    pub fn read_discrete(&self, addr: u16, cnt: u16) -> Option<Vec<bool>> {
        read_slice(&self.discrete, addr, cnt)
    }

    pub fn holding(&self) -> &[u16] {
        &self.holding
    }

    pub fn input(&self) -> &[u16] {
        &self.input
    }

    pub fn coil_values(&self) -> &[bool] {
        &self.coils
    }

    pub fn discrete_values(&self) -> &[bool] {
        &self.discrete
    }

    /// Validate that a write target exists before queueing it.
    pub fn writable(op: &WriteOp) -> bool {
        match *op {
            WriteOp::Coil { addr, .. } => (addr as usize) < map::NUM_COILS,
            WriteOp::Holding { addr, .. } => (addr as usize) < map::NUM_HOLDING_REGISTERS,
        }
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

fn read_slice<T: Copy>(block: &[T], addr: u16, cnt: u16) -> Option<Vec<T>> {
    let start = addr as usize;
    let end = start.checked_add(cnt as usize)?;
    block.get(start..end).map(|s| s.to_vec())
}
