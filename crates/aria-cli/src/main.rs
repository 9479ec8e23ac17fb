//! Aria CLI - Agent Host Runtime
//!
//! Looks up artist metadata through a supervised MCP worker, either a native
//! process or a sandboxed WebAssembly module, and inspects the layered
//! configuration that drives it.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use aria_config::{Config, LoadOptions};
use aria_mcp::ToolName;
use aria_telemetry::LogGuard;
use clap::{Args, Parser, Subcommand};

mod commands;
mod theme;

use commands::{artist, config};

/// Aria - Agent Host Runtime
#[derive(Parser)]
#[command(name = "aria")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Additional configuration file, merged last
    #[arg(short, long, global = true, env = "ARIA_CONFIG")]
    config: Option<PathBuf>,

    /// Workspace root whose `.aria/config.toml` is merged (defaults to the
    /// current directory)
    #[arg(short, long, global = true)]
    workspace: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch an artist's biography
    Bio(ArtistOpts),

    /// Fetch an artist's URL
    Url(ArtistOpts),

    /// View and check configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Args)]
struct ArtistOpts {
    /// Host-side artist identifier
    #[arg(long)]
    id: String,

    /// Artist name
    #[arg(long)]
    name: String,

    /// MusicBrainz id, if known
    #[arg(long, default_value = "")]
    mbid: String,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the resolved configuration
    Show {
        /// Output format (toml, json or sources)
        #[arg(short, long, default_value = "toml")]
        format: String,
    },
    /// Validate the current configuration
    Validate,
}

impl Cli {
    fn load_options(&self) -> LoadOptions {
        let mut options = LoadOptions::default();
        if let Some(root) = self
            .workspace
            .clone()
            .or_else(|| std::env::current_dir().ok())
        {
            options = options.with_workspace(root);
        }
        if let Some(path) = &self.config {
            options = options.with_explicit_file(path);
        }
        options
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    let options = cli.load_options();

    // Validation reports load errors itself.
    if matches!(
        cli.command,
        Commands::Config {
            command: ConfigCommands::Validate
        }
    ) {
        return Ok(config::validate_config(&options));
    }

    let resolved = Config::load(&options)?;
    let _log_guard = init_logging(&resolved.config, cli.log_level.as_deref());

    match cli.command {
        Commands::Bio(opts) => {
            artist::run_lookup(&resolved.config, ToolName::ArtistBiography, &opts.into_args())
                .await
        },
        Commands::Url(opts) => {
            artist::run_lookup(&resolved.config, ToolName::ArtistUrl, &opts.into_args()).await
        },
        Commands::Config { command } => match command {
            ConfigCommands::Show { format } => {
                config::show_config(&resolved, &format)?;
                Ok(ExitCode::SUCCESS)
            },
            ConfigCommands::Validate => Ok(ExitCode::SUCCESS),
        },
    }
}

impl ArtistOpts {
    fn into_args(self) -> aria_mcp::ArtistArgs {
        aria_mcp::ArtistArgs::new(self.id, self.name).with_mbid(self.mbid)
    }
}

fn init_logging(config: &Config, level_override: Option<&str>) -> Option<LogGuard> {
    let mut log_config = aria_telemetry::LogConfig::from(&config.logging);
    if let Some(level) = level_override {
        level.clone_into(&mut log_config.level);
    }
    match aria_telemetry::setup_logging(&log_config) {
        Ok(guard) => Some(guard),
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        },
    }
}
