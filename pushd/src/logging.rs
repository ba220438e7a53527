//! Production logging bootstrap.
//!
//! Elevates `dev_tracing::init_tracing()`'s dev/bench convenience (env-gated,
//! best-effort) to a real startup step: the configured `log_level` is the
//! floor, `RUST_LOG` still wins when set so an operator can crank one
//! target up without a redeploy.

use tracing_subscriber::EnvFilter;

pub fn init(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing subscriber already installed, skipping");
    }
}
