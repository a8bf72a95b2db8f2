//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! Output is formatted consistently and respects the quiet flag. Reports go
//! to stdout; warnings, errors and echoed git commands go to stderr so that
//! `gflow current-branch` and friends stay scriptable.

use std::fmt::Display;
use std::io::IsTerminal;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Quiet mode - minimal output
    Quiet,
    /// Normal mode - standard output
    Normal,
    /// Debug mode - verbose output
    Debug,
}

impl Verbosity {
    /// Create verbosity from flags.
    pub fn from_flags(quiet: bool, debug: bool) -> Self {
        if quiet {
            Verbosity::Quiet
        } else if debug {
            Verbosity::Debug
        } else {
            Verbosity::Normal
        }
    }
}

/// Print a message (respects quiet mode).
pub fn print(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("error: {}", message);
}

/// Print a warning message (respects quiet mode).
pub fn warn(message: impl Display, verbosity: Verbosity) {
    if verbosity != Verbosity::Quiet {
        eprintln!("warning: {}", message);
    }
}

/// Echo a git command line before it runs.
///
/// Dimmed on a terminal, prefixed with `> ` otherwise.
pub fn git_command(args: &[&str]) {
    eprintln!("{}", format_git_command(args, std::io::stderr().is_terminal()));
}

/// Format an echoed git command.
///
/// # Example
///
/// ```
/// use gflow::ui::output::format_git_command;
///
/// assert_eq!(format_git_command(&["fetch", "origin"], false), "> git fetch origin");
/// assert_eq!(
///     format_git_command(&["fetch", "origin"], true),
///     "\x1b[2mgit fetch origin\x1b[0m"
/// );
/// ```
pub fn format_git_command(args: &[&str], tty: bool) -> String {
    let line = std::iter::once("git")
        .chain(args.iter().copied())
        .collect::<Vec<_>>()
        .join(" ");
    if tty {
        format!("\x1b[2m{}\x1b[0m", line)
    } else {
        format!("> {}", line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_quiet_wins() {
        assert_eq!(Verbosity::from_flags(true, true), Verbosity::Quiet);
        assert_eq!(Verbosity::from_flags(false, true), Verbosity::Debug);
        assert_eq!(Verbosity::from_flags(false, false), Verbosity::Normal);
    }
}
