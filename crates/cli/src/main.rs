//! mapwatch - regenerate tileset images whenever Tiled maps change

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use cli_lib::{init_logging, level_for, Overrides};
use std::path::PathBuf;

mod cmd;

/// Watch a directory of Tiled maps and render them to PNG images
#[derive(Parser)]
#[command(name = "mapwatch")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: ./mapwatch.toml when present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Also write logs to this file (truncated on start)
    #[arg(long, global = true, value_name = "FILE")]
    log_file: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every map, then keep watching for changes (default)
    Watch,
    /// Render every map once and exit
    Build,
    /// Show the effective configuration
    Config {
        /// Print an annotated example configuration file instead
        #[arg(long)]
        example: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let _logging = init_logging(level_for(cli.verbose, cli.quiet), cli.log_file.as_deref())?;

    let config_path = cli.config.as_deref();
    match cli.command.unwrap_or(Commands::Watch) {
        Commands::Watch => cmd::watch::run(config_path, &cli.overrides).await,
        Commands::Build => cmd::build::run(config_path, &cli.overrides).await,
        Commands::Config { example } => cmd::config::run(config_path, &cli.overrides, example),
    }
}
