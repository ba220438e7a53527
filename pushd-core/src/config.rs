//! Broker configuration values (§6). Loading this from a TOML file and CLI
//! flags is the job of the `pushd` binary crate (`pushd::config`); this
//! type is the shared shape both that loader and the broker agree on.

use std::time::Duration;

use serde::Deserialize;

fn default_tcp_listen_addr() -> String {
    "0.0.0.0:7890".to_string()
}
fn default_s2s_listen_addr() -> String {
    "0.0.0.0:7891".to_string()
}
const fn default_conn_timeout_secs() -> u64 {
    30
}
const fn default_session_timeout_secs() -> u64 {
    300
}
const fn default_stats_output_interval_secs() -> u64 {
    60
}
const fn default_max_channel_items() -> usize {
    100_000
}
const fn default_writer_capacity() -> usize {
    crate::writer::DEFAULT_WRITER_CAPACITY
}
const fn default_workers() -> usize {
    0 // 0 means "use the host's logical core count", resolved by the binary crate.
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_metrics_logfile() -> String {
    "pushd-stats.log".to_string()
}

/// Broker-wide configuration (§6 "Configuration (enumerated)").
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_tcp_listen_addr")]
    pub tcp_listen_addr: String,

    #[serde(default = "default_s2s_listen_addr")]
    pub s2s_listen_addr: String,

    #[serde(default)]
    pub peers: Vec<String>,

    #[serde(default = "default_conn_timeout_secs")]
    pub conn_timeout_secs: u64,

    #[serde(default = "default_session_timeout_secs")]
    pub session_timeout_secs: u64,

    #[serde(default = "default_stats_output_interval_secs")]
    pub stats_output_interval_secs: u64,

    #[serde(default = "default_metrics_logfile")]
    pub metrics_logfile: String,

    #[serde(default = "default_max_channel_items")]
    pub max_channel_items: usize,

    #[serde(default)]
    pub is_dist_mode: bool,

    #[serde(default)]
    pub enable_storage: bool,

    #[serde(default)]
    pub app_id: String,

    #[serde(default)]
    pub secret_key: String,

    #[serde(default = "default_workers")]
    pub workers: usize,

    #[serde(default = "default_writer_capacity")]
    pub writer_capacity: usize,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tcp_listen_addr: default_tcp_listen_addr(),
            s2s_listen_addr: default_s2s_listen_addr(),
            peers: Vec::new(),
            conn_timeout_secs: default_conn_timeout_secs(),
            session_timeout_secs: default_session_timeout_secs(),
            stats_output_interval_secs: default_stats_output_interval_secs(),
            metrics_logfile: default_metrics_logfile(),
            max_channel_items: default_max_channel_items(),
            is_dist_mode: false,
            enable_storage: false,
            app_id: String::new(),
            secret_key: String::new(),
            workers: default_workers(),
            writer_capacity: default_writer_capacity(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn conn_timeout(&self) -> Duration {
        Duration::from_secs(self.conn_timeout_secs)
    }

    #[must_use]
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    #[must_use]
    pub fn stats_output_interval(&self) -> Duration {
        Duration::from_secs(self.stats_output_interval_secs)
    }

    /// Distributed mode is only actually active with at least one
    /// configured peer; a lone node with `is_dist_mode = true` and no
    /// peers behaves as standalone (broadcasts to an empty peer set).
    #[must_use]
    pub fn is_dist_mode(&self) -> bool {
        self.is_dist_mode
    }

    #[must_use]
    pub fn enable_storage(&self) -> bool {
        self.enable_storage
    }

    #[must_use]
    pub fn resolved_workers(&self) -> usize {
        if self.workers == 0 {
            num_cpus::get().max(1)
        } else {
            self.workers
        }
    }
}
