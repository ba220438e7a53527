//! Command-line flags (§6, §9 scenario 7: file config with CLI overrides).
//!
//! Every [`pushd_core::config::Config`] field has a matching optional flag;
//! a flag present on the command line wins over whatever `config_loader`
//! loaded from the TOML file. Two fields exist only here, to seed the
//! in-process reference sinks for standalone/dev runs without a real
//! credential store behind `ClientAuthenticator`/`UserStore`.

use std::path::PathBuf;

use clap::Parser;
use pushd_core::config::Config;

#[derive(Debug, Parser)]
#[command(name = "pushd", about = "Distributed publish/subscribe push server")]
pub struct Cli {
    /// Path to a TOML config file. Missing is not an error: the broker
    /// falls back to `Config::default()` plus whatever flags are given.
    #[arg(long, default_value = "pushd.toml")]
    pub config: PathBuf,

    #[arg(long)]
    pub tcp_listen_addr: Option<String>,

    #[arg(long)]
    pub s2s_listen_addr: Option<String>,

    #[arg(long, value_delimiter = ',')]
    pub peers: Option<Vec<String>>,

    #[arg(long)]
    pub conn_timeout_secs: Option<u64>,

    #[arg(long)]
    pub session_timeout_secs: Option<u64>,

    #[arg(long)]
    pub stats_output_interval_secs: Option<u64>,

    #[arg(long)]
    pub metrics_logfile: Option<String>,

    #[arg(long)]
    pub max_channel_items: Option<usize>,

    #[arg(long)]
    pub dist_mode: bool,

    #[arg(long)]
    pub enable_storage: bool,

    #[arg(long)]
    pub app_id: Option<String>,

    #[arg(long)]
    pub secret_key: Option<String>,

    #[arg(long)]
    pub workers: Option<usize>,

    #[arg(long)]
    pub writer_capacity: Option<usize>,

    #[arg(long)]
    pub log_level: Option<String>,

    /// Pre-seeds the in-process token pool for standalone/dev runs. Repeat
    /// the flag for more than one token. A production deployment backs
    /// `ClientAuthenticator` with a real issuance store instead.
    #[arg(long = "auth-token")]
    pub auth_tokens: Vec<String>,

    /// Pre-seeds the in-process S2S credential store, `appId:secretKey`
    /// per flag. Repeat for more than one configured peer.
    #[arg(long = "peer-credential")]
    pub peer_credentials: Vec<String>,
}

impl Cli {
    /// Applies present flags on top of a loaded `Config`, flag wins.
    #[must_use]
    pub fn apply_overrides(&self, mut base: Config) -> Config {
        if let Some(v) = &self.tcp_listen_addr {
            base.tcp_listen_addr = v.clone();
        }
        if let Some(v) = &self.s2s_listen_addr {
            base.s2s_listen_addr = v.clone();
        }
        if let Some(v) = &self.peers {
            base.peers = v.clone();
        }
        if let Some(v) = self.conn_timeout_secs {
            base.conn_timeout_secs = v;
        }
        if let Some(v) = self.session_timeout_secs {
            base.session_timeout_secs = v;
        }
        if let Some(v) = self.stats_output_interval_secs {
            base.stats_output_interval_secs = v;
        }
        if let Some(v) = &self.metrics_logfile {
            base.metrics_logfile = v.clone();
        }
        if let Some(v) = self.max_channel_items {
            base.max_channel_items = v;
        }
        if self.dist_mode {
            base.is_dist_mode = true;
        }
        if self.enable_storage {
            base.enable_storage = true;
        }
        if let Some(v) = &self.app_id {
            base.app_id = v.clone();
        }
        if let Some(v) = &self.secret_key {
            base.secret_key = v.clone();
        }
        if let Some(v) = self.workers {
            base.workers = v;
        }
        if let Some(v) = self.writer_capacity {
            base.writer_capacity = v;
        }
        if let Some(v) = &self.log_level {
            base.log_level = v.clone();
        }
        base
    }

    /// Parses `appId:secretKey` pairs from `--peer-credential`, skipping
    /// (and logging) any that don't have the separator.
    #[must_use]
    pub fn parsed_peer_credentials(&self) -> Vec<(String, String)> {
        self.peer_credentials
            .iter()
            .filter_map(|raw| match raw.split_once(':') {
                Some((app_id, secret_key)) => Some((app_id.to_string(), secret_key.to_string())),
                None => {
                    tracing::warn!(value = %raw, "ignoring malformed --peer-credential (want appId:secretKey)");
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("pushd").chain(args.iter().copied()))
    }

    #[test]
    fn flags_override_file_config() {
        let base = Config { tcp_listen_addr: "0.0.0.0:1".into(), workers: 4, ..Config::default() };
        let cli = cli(&["--tcp-listen-addr", "0.0.0.0:9999", "--workers", "2"]);
        let merged = cli.apply_overrides(base);
        assert_eq!(merged.tcp_listen_addr, "0.0.0.0:9999");
        assert_eq!(merged.workers, 2);
    }

    #[test]
    fn absent_flags_keep_file_values() {
        let base = Config { app_id: "file-app".into(), ..Config::default() };
        let merged = cli(&[]).apply_overrides(base);
        assert_eq!(merged.app_id, "file-app");
    }

    #[test]
    fn peer_credentials_parse_app_id_and_secret() {
        let cli = cli(&["--peer-credential", "node-a:s3cr3t", "--peer-credential", "malformed"]);
        assert_eq!(cli.parsed_peer_credentials(), vec![("node-a".to_string(), "s3cr3t".to_string())]);
    }
}
