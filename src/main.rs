use std::process::ExitCode;

use gflow::ui::output;

fn main() -> ExitCode {
    match gflow::cli::run() {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            output::error(format!("{e:#}"));
            ExitCode::from(1)
        }
    }
}
