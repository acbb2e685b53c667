//! Structured logging setup using **tracing**.
//!
//! All diagnostics go to stderr so stdout stays clean for reports.
//! Filtering follows `RUST_LOG` (e.g. `RUST_LOG=deadscript_core=debug`
//! shows every unresolved reference).

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Call once at process start. `json` selects machine-readable JSON lines;
/// otherwise a compact human format is used. Defaults to `info` when
/// `RUST_LOG` is unset. Later calls are no-ops.
pub fn init_structured_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if json {
        tracing_subscriber::fmt()
            .json()
            .with_ansi(false)
            .with_level(true)
            .with_target(true)
            .with_current_span(true)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .compact()
            .with_target(false)
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
