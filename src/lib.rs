// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # WTP RTU Bridge
//!
//! Real-time process simulator for a surface water treatment plant,
//! exposed as a standards-compliant Modbus TCP register bank. This is what
//! a SCADAPack 300 series RTU or a Modicon M340 PLC would look like on the
//! wire at the real plant, minus the plant: correlated sensor channels
//! driven by a stochastic catchment model, the plant state machine and
//! alarm logic, and a live-push feed for dashboard clients.
//!
//! ## Architecture
//!
//! - [`simulation`] - virtual clock, OU sensor channels, diurnal curves,
//!   rain event cascades, dose sawtooth, scenario injection
//! - [`plant`] - plant state machine, derived quantities, alarm word
//! - [`registers`] - fixed-point register bank and pending-write queue
//! - [`engine`] - the per-tick composition of all of the above
//! - [`modbus`] - Modbus TCP service over the register bank
//! - [`push`] - WebSocket live-push feed
//! - [`command`] - scenario command grammar and execution
//! - [`daemon`] - scan loops and task lifecycle
//! - [`config`] - YAML configuration with CLI overrides

pub mod command;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod modbus;
pub mod plant;
pub mod push;
pub mod registers;
pub mod simulation;
