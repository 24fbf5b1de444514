//! portadb CLI entry point
//!
//! Parses arguments and dispatches to the matching CLI command; never
//! touches the store/backend layer directly.

use std::process;

use portadb::cli::{run_command, Cli};

fn main() {
    let cli = Cli::parse_args();

    if let Err(e) = run_command(cli.command) {
        let error_json = serde_json::json!({
            "status": "error",
            "code": e.code_str(),
            "message": e.message()
        });

        eprintln!("{}", error_json);
        process::exit(1);
    }
}
