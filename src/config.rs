//! Configuration types and name validation for fab-dns.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::OnceLock;

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "fab_dns=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

static CLUSTER_NAME_RE: OnceLock<Regex> = OnceLock::new();
static ZONE_NAME_RE: OnceLock<Regex> = OnceLock::new();

/// Whether `name` is a valid cluster name: an RFC 1123 DNS subdomain,
/// unique across the federation by convention.
pub fn is_valid_cluster_name(name: &str) -> bool {
    let re = CLUSTER_NAME_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .expect("cluster name pattern")
    });
    re.is_match(name)
}

/// Whether `name` is a valid zone or region name: letters and digits only.
pub fn is_valid_zone_name(name: &str) -> bool {
    let re = ZONE_NAME_RE
        .get_or_init(|| Regex::new(r"^[a-zA-Z0-9]+$").expect("zone name pattern"));
    re.is_match(name)
}
