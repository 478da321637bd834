//! gatekeeper binary
//!
//! Argument parsing, boot order and shutdown all live in `cli`; this only
//! turns a failed command into a non-zero exit.

use std::process::ExitCode;

use gatekeeper::cli;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            ExitCode::FAILURE
        }
    }
}
