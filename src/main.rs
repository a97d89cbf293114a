use std::process::ExitCode;

use cerebras_chat::{cli::Cli, logging};

fn main() -> ExitCode {
    let cli = Cli::new();
    logging::init(cli.verbose());
    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
