//! Template interpreter CLI
//!
//! Entry point. Parses CLI arguments and delegates to a [`Session`].

use clap::Parser as ClapParser;
use interp_cli::{logger, Cli, CliError, Session};

fn main() {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    let session = match Session::from_config_file(cli.config.as_deref()) {
        Ok(session) => session,
        Err(CliError::Io(e)) => {
            eprintln!("Error: could not read config: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match session.execute(&cli.command) {
        Ok(text) => print!("{}", text),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
