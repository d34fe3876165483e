// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Registers Module
//!
//! The SCADA-facing fixed-point register bank: address map, scaling,
//! tick-atomic projection and the pending-write queue between the Modbus
//! server and the scan orchestrator.

pub mod bank;
pub mod map;

pub use bank::{PendingWrites, RegisterBank, WriteOp};
