// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(name = "relevo")]
#[command(about = "Versioned deployment of containers, Swarm services, stacks, and Kubernetes configs")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputArg::Normal)]
    pub output: OutputArg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputArg {
    Normal,
    Quiet,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new relevo.yml configuration file
    Init {
        /// Entity name to write into the template
        #[arg(short, long)]
        name: Option<String>,

        /// Image reference to write into the template
        #[arg(short, long)]
        image: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Update the entity on all configured hosts, keeping a rollback point
    Deploy {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,

        /// Override the image tag for this deploy
        #[arg(short, long)]
        tag: Option<String>,

        /// Override the image registry for this deploy
        #[arg(long)]
        registry: Option<String>,

        /// Override the registry account for this deploy
        #[arg(long)]
        account: Option<String>,

        /// Redeploy even if the configuration is unchanged
        #[arg(short, long)]
        force: bool,
    },

    /// Restore the previous version on all configured hosts
    Rollback {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Tear down the entity and its rollback state on all configured hosts
    Destroy {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Run a command inside the deployed container on every host
    Exec {
        /// Target destination (defined in config)
        #[arg(short, long)]
        destination: Option<String>,

        /// Command to run
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
}
