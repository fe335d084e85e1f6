// ABOUTME: Entry point for the relevo CLI application.
// ABOUTME: Parses arguments and dispatches to appropriate command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands, OutputArg};
use relevo::commands::{self, DeployArgs};
use relevo::config::{self, Config};
use relevo::error::Result;
use relevo::output::{Output, OutputMode};
use std::env;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing subscriber based on verbose flag
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let mode = match cli.output {
        OutputArg::Normal => OutputMode::Normal,
        OutputArg::Quiet => OutputMode::Quiet,
        OutputArg::Json => OutputMode::Json,
    };
    let mut output = Output::new(mode);
    output.start_timer();

    if let Err(e) = run(cli, &output).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> Result<()> {
    match cli.command {
        Commands::Init { name, image, force } => {
            let cwd = env::current_dir().expect("Failed to get current directory");
            config::init_config(&cwd, name.as_deref(), image.as_deref(), force)?;
            output.success("Wrote relevo.yml");
            Ok(())
        }
        Commands::Deploy {
            destination,
            tag,
            registry,
            account,
            force,
        } => {
            let config = load_config(destination.as_deref())?;
            let args = DeployArgs {
                tag,
                registry,
                account,
                force,
            };
            commands::deploy(&config, destination.as_deref(), &args, output).await
        }
        Commands::Rollback { destination } => {
            let config = load_config(destination.as_deref())?;
            commands::rollback(&config, destination.as_deref(), output).await
        }
        Commands::Destroy { destination, yes } => {
            let config = load_config(destination.as_deref())?;
            commands::destroy(&config, destination.as_deref(), yes, output).await
        }
        Commands::Exec {
            destination,
            command,
        } => {
            let config = load_config(destination.as_deref())?;
            let command = command.join(" ");
            commands::exec(&config, destination.as_deref(), &command, output).await
        }
    }
}

fn load_config(destination: Option<&str>) -> Result<Config> {
    let cwd = env::current_dir().expect("Failed to get current directory");
    let config = Config::discover(&cwd)?;
    match destination {
        Some(dest) => config.for_destination(dest),
        None => Ok(config),
    }
}
