//! Gateway configuration via CLI args and environment variables.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use crate::error::ConfigError;
use crate::policy::{GatePolicy, RouteLimit};

// CLI argument structure
#[derive(Parser, Debug, Clone)]
#[command(name = "course-gate", version)]
#[command(about = "Rate-limiting gateway for the education center API")]
pub struct Args {
    // Bind address
    #[arg(long, default_value = "0.0.0.0", env = "COURSE_GATE_HOST")]
    pub host: String,

    // Port to run the server on
    #[arg(short, long, default_value_t = 8080, env = "COURSE_GATE_PORT")]
    pub port: u16,

    // Upstream application servers (comma-separated)
    // Example: "localhost:3000,localhost:3001"
    #[arg(short, long, default_value = "localhost:3000", env = "COURSE_GATE_BACKENDS")]
    pub backends: String,

    // Default max admitted requests per client per window
    #[arg(long, default_value_t = 50, env = "COURSE_GATE_RATE_LIMIT",
          value_parser = clap::value_parser!(u32).range(1..))]
    pub rate_limit: u32,

    // Default window in milliseconds
    #[arg(long, default_value_t = 60_000, env = "COURSE_GATE_RATE_WINDOW_MS",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub rate_window_ms: u64,

    // Per-route overrides, "<prefix>=<limit>/<window_ms>", repeatable
    // Example: --route-limit /api/auth=5/60000
    #[arg(long = "route-limit", env = "COURSE_GATE_ROUTE_LIMITS", value_delimiter = ',')]
    pub route_limits: Vec<RouteLimit>,

    // Expired window sweep interval in seconds
    #[arg(long, default_value_t = 60, env = "COURSE_GATE_SWEEP_INTERVAL",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub sweep_interval: u64,

    // Backend health check interval in seconds
    #[arg(long, default_value_t = 30, env = "COURSE_GATE_HEALTH_INTERVAL",
          value_parser = clap::value_parser!(u64).range(1..))]
    pub health_interval: u64,

    // Upstream request timeout in seconds
    #[arg(long, default_value_t = 30, env = "COURSE_GATE_UPSTREAM_TIMEOUT")]
    pub upstream_timeout: u64,

    // Use the peer address when X-Forwarded-For is missing instead of the shared "unknown" key
    #[arg(long, default_value_t = false, env = "COURSE_GATE_PEER_FALLBACK")]
    pub peer_fallback: bool,

    // Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info", env = "COURSE_GATE_LOG_LEVEL")]
    pub log_level: String,

    // Log format: "text" or "json"
    #[arg(long, default_value = "text", env = "COURSE_GATE_LOG_FORMAT")]
    pub log_format: String,
}

impl Args {
    pub fn default_policy(&self) -> GatePolicy {
        GatePolicy::from_millis(self.rate_limit, self.rate_window_ms)
    }

    pub fn sweep_every(&self) -> Duration {
        Duration::from_secs(self.sweep_interval)
    }

    pub fn health_every(&self) -> Duration {
        Duration::from_secs(self.health_interval)
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout)
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|_| ConfigError::InvalidAddress(addr))
    }
}
