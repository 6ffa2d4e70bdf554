//! Server configuration snapshot, read once at start and optionally
//! re-applied to live sessions through the deferred refresh flag.

use log::error;
use shared::DEFAULT_PORT;
use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

pub const DEFAULT_MAX_CLIENTS: i32 = 20;
pub const DEFAULT_PORT_RANGE: i32 = 10;
pub const DEFAULT_LISTEN_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 60;

/// Everything the server reads from the host's settings store.
///
/// Values arrive unvalidated; [`ServerConfig::sanitized`] clamps anything
/// out of range to a safe default with a logged error instead of failing.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// UDP port to bind; probing continues forward through `port_range`
    /// ports when it is taken.
    pub port: u16,
    /// Number of ports to probe, clamped to 1..=100.
    pub port_range: i32,
    /// Bind every interface instead of loopback only.
    pub bind_all_interfaces: bool,
    /// Admission limit for concurrent sessions.
    pub max_clients: i32,
    /// Upper bound on one blocking socket wait; also the worst-case
    /// latency of a stop request.
    pub listen_timeout_ms: u64,
    /// A session that stays silent longer than this is evicted.
    pub session_timeout_secs: u64,
    /// Name published with the service advertisement.
    pub device_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            port_range: DEFAULT_PORT_RANGE,
            bind_all_interfaces: false,
            max_clients: DEFAULT_MAX_CLIENTS,
            listen_timeout_ms: DEFAULT_LISTEN_TIMEOUT_MS,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
            device_name: "remote-events".to_string(),
        }
    }
}

impl ServerConfig {
    /// Clamps invalid values to safe defaults. Configuration problems are
    /// never fatal; each clamp is logged as an error so the host can spot
    /// the bad setting.
    pub fn sanitized(mut self) -> Self {
        if self.max_clients < 0 {
            error!(
                "Invalid maximum number of clients specified {}, defaulting to {}",
                self.max_clients, DEFAULT_MAX_CLIENTS
            );
            self.max_clients = DEFAULT_MAX_CLIENTS;
        }
        if !(1..=100).contains(&self.port_range) {
            error!(
                "Invalid port range specified {}, defaulting to {}",
                self.port_range, DEFAULT_PORT_RANGE
            );
            self.port_range = DEFAULT_PORT_RANGE;
        }
        if self.port == 0 {
            error!("Invalid port 0 specified, defaulting to {}", DEFAULT_PORT);
            self.port = DEFAULT_PORT;
        }
        if self.listen_timeout_ms == 0 {
            error!(
                "Invalid listen timeout 0 specified, defaulting to {} ms",
                DEFAULT_LISTEN_TIMEOUT_MS
            );
            self.listen_timeout_ms = DEFAULT_LISTEN_TIMEOUT_MS;
        }
        if self.session_timeout_secs == 0 {
            error!(
                "Invalid session timeout 0 specified, defaulting to {} s",
                DEFAULT_SESSION_TIMEOUT_SECS
            );
            self.session_timeout_secs = DEFAULT_SESSION_TIMEOUT_SECS;
        }
        self
    }

    pub fn max_clients(&self) -> usize {
        self.max_clients.max(0) as usize
    }

    pub fn bind_ip(&self) -> IpAddr {
        if self.bind_all_interfaces {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }
}
