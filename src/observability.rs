//! Logging initialization.
//!
//! Structured logging via `tracing` with an environment-driven filter.
//! Initialization is idempotent so tests and library embedders can call it
//! freely.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<()> = OnceLock::new();

/// Options for log initialization.
#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    /// Whether verbose output was requested via CLI.
    pub verbose: bool,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

/// Initializes the global tracing subscriber.
///
/// The filter comes from `RUST_LOG` when set; otherwise `--verbose` selects
/// `debug` for this crate and `info` selects everything else. Subsequent
/// calls are no-ops.
pub fn init(options: InitOptions) {
    INIT.get_or_init(|| {
        let default_filter = if options.verbose {
            "info,stampsync=debug"
        } else {
            "info"
        };
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter));

        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(options.verbose);
        if options.json {
            let _ = builder.json().try_init();
        } else {
            let _ = builder.try_init();
        }
    });
}
