//! Diagnostic logging
//!
//! The terminal belongs to the live display, so diagnostics are silent by
//! default and only written when a log file is requested (or `RUST_LOG` is
//! set explicitly).

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used without a log file and without `RUST_LOG`
pub const QUIET_FILTER: &str = "off";

/// Filter used with a log file and without `RUST_LOG`
pub const FILE_FILTER: &str = "backhub=debug";

/// Default filter directive for the chosen sink
#[must_use]
pub const fn default_filter(to_file: bool) -> &'static str {
    if to_file {
        FILE_FILTER
    } else {
        QUIET_FILTER
    }
}

fn env_filter(to_file: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(to_file)))
}

/// Install the global subscriber.
///
/// With `log_file`, events are appended to that file without colours;
/// otherwise they go to stderr.
pub fn init(log_file: Option<&Path>) -> Result<()> {
    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            tracing_subscriber::registry()
                .with(env_filter(true))
                .with(fmt::layer().with_writer(Mutex::new(file)).with_ansi(false))
                .try_init()
                .context("Failed to install log subscriber")
        }
        None => tracing_subscriber::registry()
            .with(env_filter(false))
            .with(fmt::layer().with_writer(io::stderr))
            .try_init()
            .context("Failed to install log subscriber"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_filter_is_quiet_without_file() {
        assert_eq!(default_filter(false), "off");
        assert_eq!(default_filter(true), "backhub=debug");
    }

    #[test]
    fn test_init_rejects_unwritable_log_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("backhub.log");
        let err = init(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("backhub.log"));
    }
}
