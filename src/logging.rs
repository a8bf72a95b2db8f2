//! logging
//!
//! Diagnostic logging through `tracing`.
//!
//! Events go to stderr so they never mix with command output. The filter
//! comes from `GFLOW_LOG` (EnvFilter syntax) when set; otherwise `--debug`
//! selects `debug`, `--quiet` selects `error`, and the default is `warn`.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Environment variable overriding the log filter.
pub const LOG_ENV: &str = "GFLOW_LOG";

/// Filter directive for the given flags when `GFLOW_LOG` is unset.
///
/// # Example
///
/// ```
/// use gflow::logging::default_directive;
///
/// assert_eq!(default_directive(true, false), "debug");
/// assert_eq!(default_directive(false, true), "error");
/// assert_eq!(default_directive(false, false), "warn");
/// ```
pub fn default_directive(debug: bool, quiet: bool) -> &'static str {
    if debug {
        "debug"
    } else if quiet {
        "error"
    } else {
        "warn"
    }
}

fn filter(debug: bool, quiet: bool) -> EnvFilter {
    match std::env::var(LOG_ENV) {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(directive)
            .unwrap_or_else(|_| EnvFilter::new(default_directive(debug, quiet))),
        _ => EnvFilter::new(default_directive(debug, quiet)),
    }
}

/// Install the global subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init_logging(debug: bool, quiet: bool) {
    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(debug)
        .with_level(true)
        .with_filter(filter(debug, quiet));

    let _ = tracing_subscriber::registry().with(layer).try_init();
}
