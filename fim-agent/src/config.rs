//! CLI/environment configuration (spec §6 "Environment / config") and the
//! host-identity fields a registration payload needs but this crate cannot
//! derive itself — hardware-ID derivation is explicitly out of scope
//! (spec §1) and is supplied by whatever installs this binary.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(name = "fim-agent", about = "Host-side file integrity monitoring agent")]
pub struct AgentConfig {
    /// Stable identifier for this host, used as the event-id namespace and
    /// the registration client_id.
    #[arg(long, env = "FIM_HOST_ID")]
    pub host_id: String,

    /// Base URL of the verification server.
    #[arg(long, env = "FIM_SERVER_URL", default_value = "https://fim-distribution.vercel.app")]
    pub server_url: String,

    /// Directory the persistent state document lives under.
    #[arg(long, env = "FIM_STATE_DIR")]
    pub state_dir: PathBuf,

    /// Directory to watch on startup.
    #[arg(long, env = "FIM_WATCH_DIR")]
    pub watch_dir: PathBuf,

    /// Opaque hardware-identity blob, JSON-encoded, supplied by the host
    /// (this crate never derives it itself).
    #[arg(long, env = "FIM_HARDWARE_INFO", default_value = "{}")]
    pub hardware_info: String,

    /// Matches `original_source/src/core/config.py`'s `self.baseline_id =
    /// 1`: an integer on the wire, not a string.
    #[arg(long, env = "FIM_BASELINE_ID", default_value_t = 1)]
    pub baseline_id: u64,

    #[arg(long, env = "FIM_PLATFORM", default_value_t = default_platform())]
    pub platform: String,

    #[arg(long, default_value_t = 360)]
    pub heartbeat_interval_secs: u64,

    #[arg(long, default_value_t = 1)]
    pub backoff_base_secs: u64,

    #[arg(long, default_value_t = 600)]
    pub backoff_cap_secs: u64,

    /// Bound on connection attempts during startup specifically (spec
    /// §4.7 supplemented from `background.py`'s `max_attempts = 10`); the
    /// steady-state backoff cap stays unbounded in attempt count.
    #[arg(long, default_value_t = 10)]
    pub initial_connect_max_attempts: u32,

    /// Inter-attempt sleep during the startup retry loop is `min(backoff,
    /// this)`, distinct from the steady-state 600s backoff cap.
    #[arg(long, default_value_t = 60)]
    pub initial_connect_sleep_cap_secs: u64,

    #[arg(long, default_value_t = 5)]
    pub main_loop_tick_secs: u64,
}

impl AgentConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_secs(self.backoff_cap_secs)
    }

    pub fn initial_connect_sleep_cap(&self) -> Duration {
        Duration::from_secs(self.initial_connect_sleep_cap_secs)
    }

    pub fn main_loop_tick(&self) -> Duration {
        Duration::from_secs(self.main_loop_tick_secs)
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.join("state.json")
    }

    pub fn identity(&self) -> HostIdentity {
        HostIdentity {
            host_id: self.host_id.clone(),
            hardware_info: serde_json::from_str(&self.hardware_info)
                .unwrap_or(serde_json::Value::Null),
            baseline_id: self.baseline_id,
            platform: self.platform.clone(),
        }
    }
}

fn default_platform() -> String {
    std::env::consts::OS.to_string()
}

/// The fields a registration payload needs beyond what this crate can
/// compute on its own.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub host_id: String,
    pub hardware_info: serde_json::Value,
    pub baseline_id: u64,
    pub platform: String,
}
