//! # strand CLI
//!
//! Command-line interface for running strand programs and actors.

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "strand")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults apply when it does not exist)
    #[arg(long, default_value = "strand.yml")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a statement program and print its top-level variables
    Run {
        /// Program source file
        file: PathBuf,

        /// Log every kernel step (use with RUST_LOG=trace)
        #[arg(long)]
        trace: bool,
    },

    /// Print the lowered kernel form of a program or actor
    Lower {
        /// Source file
        file: PathBuf,

        /// Emit the kernel tree as JSON
        #[arg(long)]
        json: bool,
    },

    /// Spawn an actor and ask it one message
    Ask {
        /// Actor source file
        file: PathBuf,

        /// Message, as a strand expression
        message: String,

        /// Actor arguments, each a strand expression
        #[arg(long = "arg")]
        args: Vec<String>,

        /// Address to register the actor under
        #[arg(long)]
        address: Option<String>,

        /// Response timeout in milliseconds (overrides the config)
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Resolve addresses against a route table
    Routes {
        /// YAML file mapping patterns to targets
        table: PathBuf,

        /// Addresses to resolve
        addresses: Vec<String>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// List modules under the configured module root
    Modules {
        /// Only list module paths with this prefix
        #[arg(default_value = "")]
        prefix: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::INFO.into()
            }),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Run { file, trace } => commands::run_program(&file, trace),
        Commands::Lower { file, json } => commands::lower_source(&file, json),
        Commands::Ask {
            file,
            message,
            args,
            address,
            timeout_ms,
        } => {
            let opts = commands::AskOptions {
                args,
                address,
                timeout_ms,
            };
            commands::ask_actor(&cli.config, &file, &message, opts)
        }
        Commands::Routes {
            table,
            addresses,
            json,
        } => commands::resolve_routes(&table, &addresses, json),
        Commands::Modules { prefix } => commands::list_modules(&cli.config, &prefix),
    }
}
