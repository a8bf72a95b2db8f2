//! cli
//!
//! Command-line interface layer for gflow.
//!
//! # Responsibilities
//!
//! - Parse command-line arguments and global flags
//! - Install logging
//! - Delegate to command handlers
//!
//! # Architecture
//!
//! The CLI layer is thin. It parses arguments via clap and dispatches to
//! the handlers in [`commands`], which load configuration, build the
//! gateways and hand them to the [`crate::engine`].

pub mod args;
pub mod commands;

pub use args::{Cli, Shell};

use crate::engine::{self, Outcome};
use crate::logging;
use anyhow::Result;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. Expected failures
/// (conflicts, blocked branches, host rejections) come back as an
/// [`Outcome`]; `Err` is an internal error.
pub fn run() -> Result<Outcome> {
    let cli = Cli::parse_args();
    logging::init_logging(cli.debug, cli.quiet);

    // The flag only ever disables hooks; otherwise config decides.
    let ctx = engine::Context {
        cwd: cli.cwd.clone(),
        debug: cli.debug,
        quiet: cli.quiet,
        verify: cli.verify_flag(),
    };

    commands::dispatch(cli.command, &ctx)
}
