// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP server configuration
//!
//! This module defines the structures for configuring the Modbus TCP server
//! component of the RTU bridge.

use serde::{Deserialize, Serialize};

/// Configuration for the Modbus TCP server component.
///
/// This structure contains settings that control the Modbus TCP server
/// functionality, including network binding parameters and whether the
/// server is enabled.
///
/// # Example
///
/// ```
/// use wtp_rtu_bridge::config::ModbusConfig;
///
/// let modbus_config = ModbusConfig {
///     enabled: true,
///     port: 5020,
///     address: "0.0.0.0".to_string(),
/// };
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusConfig {
    /// Flag to enable or disable the Modbus server.
    ///
    /// When enabled, the server will start and respond to Modbus TCP requests.
    /// When disabled, no server will be started and no resources will be used.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// The TCP port the Modbus server will listen on.
    ///
    /// Valid range is 1-65534. Default value is 502, which is the standard
    /// Modbus TCP port. Use 5020 if binding 502 needs elevated privileges.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The network address the Modbus server will bind to.
    ///
    /// Can be an IPv4/IPv6 address or a hostname. Default is "0.0.0.0" so
    /// SCADA hosts elsewhere on the network can poll the simulator.
    #[serde(default = "default_address")]
    pub address: String,
}

fn default_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    502
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

impl Default for ModbusConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            port: default_port(),
            address: default_address(),
        }
    }
}
