// Oneauth — Application Entry Point
//
// Parses CLI arguments, initializes structured logging (console plus a
// daily-rotated file under the data directory), and dispatches to the
// command handler.

use clap::Parser;

use oneauth::cli::{execute, Cli};
use oneauth::config::Paths;

fn main() {
    let cli = Cli::parse();

    let paths = match cli.data_dir {
        Some(dir) => Paths::new(dir),
        None => Paths::default(),
    };

    // The guard flushes the file appender on drop; keep it for the whole
    // process lifetime.
    let _log_guard = oneauth::logging::init(&paths.logs_dir());

    if let Err(e) = execute(paths, cli.command) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
