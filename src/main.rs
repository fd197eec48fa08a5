//! Kiln - build app images from buildpack builders
//!
//! CLI entry point that dispatches to subcommands.

use clap::Parser;
use console::style;
use kiln::cli::commands::{self, deprecated};
use kiln::cli::{Cli, Commands};
use kiln::config::ConfigManager;
use kiln::error::{KilnError, KilnResult};
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> KilnResult<()> {
    let cli = Cli::parse();

    // Initialize logging: 0 = warn (spinners only), 1 = info, 2+ = debug
    let filter = match cli.verbose {
        0 => EnvFilter::new("kiln=warn"),
        1 => EnvFilter::new("kiln=info"),
        _ => EnvFilter::new("kiln=debug"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    kiln::ui::init_theme();

    // Completions need no config
    if let Commands::Completions { shell } = cli.command {
        return commands::completions(shell);
    }

    // The config path is decided here, once
    let manager = ConfigManager::with_path(
        cli.config
            .clone()
            .unwrap_or_else(ConfigManager::default_config_path),
    );
    debug!("Using config {}", manager.path().display());
    let config = manager.load().await?;

    let command = match cli.command {
        Commands::Deprecated(old) => deprecated::redirect(old)?,
        command => command,
    };

    match command {
        Commands::Completions { shell } => commands::completions(shell),
        Commands::Build(args) => commands::build(args, cli.verbose, &manager, &config).await,
        Commands::Config(args) => commands::config(args, &manager, &config).await,
        Commands::Builder(args) => commands::builder(args, &manager, &config).await,
        Commands::Stack(args) => commands::stack(args).await,
        Commands::Cache(args) => commands::cache(args, &config).await,
        Commands::Lifecycle(args) => commands::lifecycle(args, &config).await,
        Commands::Deprecated(old) => Err(KilnError::Internal(format!(
            "'{}' redirected to another deprecated command",
            old.name()
        ))),
    }
}
