/// Main entry point for the matching engine application
///
/// This serves as a thin wrapper that delegates to the interfaces layer.
/// The actual application logic is implemented in `interfaces::cli`.

use rapid_match::interfaces::cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rapid-match: {}", e);
            ExitCode::FAILURE
        }
    }
}
