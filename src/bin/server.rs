//! Covers agent HTTP server.
//! Run with: cargo run --bin covers-server

use std::process::ExitCode;

use covers_agent::start_covers_agent;

fn main() -> ExitCode {
    start_covers_agent::run()
}
