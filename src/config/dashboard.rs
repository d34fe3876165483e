// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the wtp-rtu-bridge project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Dashboard / live-push feed configuration

use serde::{Deserialize, Serialize};

/// Configuration for the live-push feed serving dashboard clients.
///
/// The HTTP dashboard itself is an external collaborator; this process only
/// exposes the WebSocket push endpoint. By convention the push endpoint
/// listens on `port + 1`, so a dashboard served on 8080 connects to 8081.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    /// Flag to enable or disable the push feed.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Base dashboard port. The WebSocket push feed binds `port + 1`.
    #[serde(default = "default_port")]
    pub port: u16,

    /// The network address the push feed will bind to.
    #[serde(default = "default_address")]
    pub address: String,
}

fn default_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    8080
}

fn default_address() -> String {
    "0.0.0.0".to_string()
}

impl DashboardConfig {
    /// Port the WebSocket push feed actually binds.
    pub fn push_port(&self) -> u16 {
        self.port.saturating_add(1)
    }
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            port: default_port(),
            address: default_address(),
        }
    }
}
