#![deny(clippy::pedantic, clippy::all, clippy::nursery)]
#![allow(clippy::must_use_candidate)]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mailgate::{Mailgate, config};

/// An SMTP relay edge server
#[derive(Parser, Debug)]
#[command(name = "mailgate")]
#[command(about = "Accept mail over SMTP and relay it onward", long_about = None)]
struct Cli {
    /// Configuration file; see `MAILGATE_CONFIG` for the search order
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, Default)]
enum Commands {
    /// Run the relay until interrupted (default)
    #[default]
    Start,
    /// Validate the configuration and exit
    Check,
    /// Print the version and exit
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or_default() {
        Commands::Version => {
            println!("mailgate {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Check => {
            let path = config::find_config_file(cli.config.as_deref())?;
            let config = config::load(&path)?;
            println!(
                "{}: OK ({} listener(s), default relay {})",
                path.display(),
                config.listeners.len(),
                config.default_relay
            );
            Ok(())
        }
        Commands::Start => {
            let path = config::find_config_file(cli.config.as_deref())?;
            Mailgate::new(config::load(&path)?)?.run().await
        }
    }
}
