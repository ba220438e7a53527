//! Loads [`Config`] from a TOML file, falling back to defaults when the
//! file doesn't exist (a fresh `pushd.toml` is not a deployment error, the
//! source shipped a committed default config instead — here the default
//! is just `Config::default()`). CLI overrides are layered on by
//! [`crate::cli::Cli::apply_overrides`] afterward.

use std::path::Path;

use pushd_core::config::Config;
use pushd_core::error::{PushdError, Result};

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no config file found, using defaults");
        return Ok(Config::default());
    }

    let raw = std::fs::read_to_string(path).map_err(PushdError::Io)?;
    toml::from_str(&raw).map_err(|e| PushdError::Config(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    struct ScratchFile(PathBuf);

    impl ScratchFile {
        fn write(name: &str, contents: &str) -> Self {
            let path = std::env::temp_dir().join(format!("pushd-config-loader-test-{}-{name}", std::process::id()));
            std::fs::write(&path, contents).unwrap();
            Self(path)
        }
    }

    impl Drop for ScratchFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.0);
        }
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = load_config(Path::new("/nonexistent/pushd.toml")).unwrap();
        assert_eq!(config.tcp_listen_addr, Config::default().tcp_listen_addr);
    }

    #[test]
    fn parses_a_partial_toml_file() {
        let scratch = ScratchFile::write("partial.toml", "tcp_listen_addr = \"0.0.0.0:12345\"\nworkers = 3\n");

        let config = load_config(&scratch.0).unwrap();
        assert_eq!(config.tcp_listen_addr, "0.0.0.0:12345");
        assert_eq!(config.workers, 3);
        assert_eq!(config.session_timeout_secs, Config::default().session_timeout_secs);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let scratch = ScratchFile::write("malformed.toml", "not valid toml {{\n");
        assert!(matches!(load_config(&scratch.0), Err(PushdError::Config(_))));
    }
}
