// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default `User-Agent` sent with every request.
pub const DEFAULT_USER_AGENT: &str = concat!(
    "scanwerk/",
    env!("CARGO_PKG_VERSION"),
    " (+https://github.com/hyperpolymath/scanwerk)"
);

/// Settings consumed once, when a client and its transport are built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Speak HTTPS (`_uscans._tcp`) instead of plain HTTP.
    pub use_tls: bool,
    /// Accept any server certificate. Many scanners ship self-signed ones.
    pub skip_cert_verify: bool,
    /// Per-candidate connect timeout, in seconds.
    pub connect_timeout_secs: u64,
    /// Identifying client-agent header.
    pub user_agent: String,
    /// Path prefix of the eSCL endpoints (TXT key `rs`).
    pub resource_path: String,
}

impl ClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            use_tls: false,
            skip_cert_verify: false,
            connect_timeout_secs: 30,
            user_agent: DEFAULT_USER_AGENT.into(),
            resource_path: "eSCL".into(),
        }
    }
}
