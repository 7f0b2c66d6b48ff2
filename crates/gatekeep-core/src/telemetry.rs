//! Tracing setup for the `gatekeep` binary.
//!
//! Logs go to stderr; stdout carries command output (and `--json` reports)
//! only. Without `RUST_LOG` the chosen level applies to Gatekeep's own
//! crates and everything else stays at `warn`. The audit log is the durable
//! record of executor runs; nothing here replaces it.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const OWN_TARGETS: [&str; 3] = ["gatekeep", "gatekeep_core", "gatekeep_state"];

/// Filter directives used when `RUST_LOG` is unset.
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_TARGETS.iter().map(|t| format!("{t}={level}")));
    directives.join(",")
}

/// Install the global subscriber. Only the first call in a process wins.
///
/// `json` switches to newline-delimited JSON events, matching the CLI's
/// `--json` flag.
pub fn init_tracing(json: bool, level: Level) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let installed = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer.json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
