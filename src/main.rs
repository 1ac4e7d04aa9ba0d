// LayerPaint headless entry point.
//
// All editing runs through the library's `EditorFacade`; this binary only
// parses arguments, starts the session log and replays the action script.

use std::process::ExitCode;

use clap::Parser;

use layerpaint::cli::{self, CliArgs};
use layerpaint::logger;

fn main() -> ExitCode {
    let args = CliArgs::parse();

    // Initialize session log (overwrites previous session log)
    logger::echo_to_stderr(args.verbose);
    logger::init();

    cli::run(args)
}
