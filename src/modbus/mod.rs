// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus communication module
//!
//! This module provides Modbus TCP server functionality for the RTU bridge,
//! allowing SCADA systems to read the simulated plant registers and issue
//! operator commands via the Modbus protocol.
//!
//! ## Key Components
//!
//! - `WtpModbusServer`: The per-connection service that answers Modbus
//!   requests against the shared register bank.
//!
//! For avoiding confusion with the Modbus master/slave terminology, this
//! module uses the terms "server" and "client" instead: the server is the
//! device that provides data (this process), the client is the SCADA host
//! that requests it.
//!
//! Register map, coil and discrete-input layout are documented in
//! [`crate::registers::map`].

pub mod server;
pub use server::WtpModbusServer;
