use crate::error::{BifrostError, Result};
use serde::Deserialize;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

/// Server configuration. Defaults match a production deployment; every field
/// can be overridden from a TOML file and again from the command line.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to bind the DNS listeners to
    pub bind_addr: SocketAddr,

    /// Authoritative zone suffix; queries outside it get NXDOMAIN
    pub zone: String,

    /// Public address written into spoofed source fields so replies come back here
    pub public_ip: Ipv4Addr,

    /// First source port available for spoofing (inclusive)
    pub port_range_start: u16,

    /// End of the spoofable port range (exclusive)
    pub port_range_end: u16,

    /// Seconds a forwarder worker keeps collecting replies for one packet
    pub capture_window_secs: u64,

    /// Response cache TTL in seconds; must outlive recursor retry intervals
    pub cache_ttl_secs: u64,

    /// Maximum number of cached responses
    pub cache_capacity: usize,

    /// Upper bound on concurrently assembling transmissions
    pub max_active_transmissions: usize,

    /// High-water mark for a session's pending response queue
    pub max_pending_packets: usize,

    /// Soft byte budget for one `r` drain, sized to fit a DNS answer
    pub max_response_bytes: usize,

    /// Zone files with fixed records served ahead of the transmission API
    pub fixed_zone_files: Vec<String>,

    /// Whether to serve DNS over TCP in addition to UDP
    pub enable_tcp: bool,

    /// Idle timeout for TCP connections in seconds
    pub tcp_idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:53".parse().expect("default bind address is valid"),
            zone: "tunnel.example.com".to_string(),
            public_ip: Ipv4Addr::UNSPECIFIED,
            port_range_start: 30000,
            port_range_end: 50000,
            capture_window_secs: 60,
            cache_ttl_secs: 70,
            cache_capacity: 100_000,
            max_active_transmissions: 1024,
            max_pending_packets: 1024,
            max_response_bytes: 8000,
            fixed_zone_files: Vec::new(),
            enable_tcp: true,
            tcp_idle_timeout_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from a TOML file, starting from defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        toml::from_str(&contents).map_err(|e| BifrostError::ConfigParseError(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let zone = self.zone.trim_matches('.');
        if zone.is_empty() {
            return Err(BifrostError::InvalidZone(self.zone.clone()));
        }
        if self.port_range_start >= self.port_range_end {
            return Err(BifrostError::InvalidPortRange(
                self.port_range_start,
                self.port_range_end,
            ));
        }
        Ok(())
    }

    /// Zone suffix as lowercase labels, root and trailing dots stripped
    pub fn zone_labels(&self) -> Vec<String> {
        self.zone
            .trim_matches('.')
            .split('.')
            .filter(|l| !l.is_empty())
            .map(|l| l.to_lowercase())
            .collect()
    }

    pub fn capture_window(&self) -> Duration {
        Duration::from_secs(self.capture_window_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn tcp_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.tcp_idle_timeout_secs)
    }
}
