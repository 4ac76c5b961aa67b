//! Logging and tracing configuration
//!
//! The subscriber is installed once, at process start, by the binary.
//! Library code never installs one; it logs through `tracing` macros and
//! inherits per-scenario context from the spans the runner enters.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing for the CLI (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable. Without it,
/// the level is WARN for this crate, raised to INFO with one `-v` and to
/// DEBUG with two or more; dependencies stay at WARN.
pub fn init_cli(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "verify=warn,warn",
        1 => "verify=info,warn",
        _ => "verify=debug,warn",
    }
}
