//! CLI handlers for the `aria config` subcommand.

use std::process::ExitCode;

use anyhow::Result;
use aria_config::{Config, LoadOptions, ResolvedConfig, ShowFormat};

use crate::theme;

/// Print the resolved configuration.
pub(crate) fn show_config(resolved: &ResolvedConfig, format: &str) -> Result<()> {
    let show_format = match format {
        "json" => ShowFormat::Json,
        "sources" => ShowFormat::Sources,
        _ => ShowFormat::Toml,
    };

    let output = resolved
        .render(show_format)
        .map_err(|e| anyhow::anyhow!("failed to format config: {e}"))?;

    println!("{output}");
    Ok(())
}

/// Load and validate the configuration, reporting the outcome.
pub(crate) fn validate_config(options: &LoadOptions) -> ExitCode {
    match Config::load(options) {
        Ok(resolved) => {
            println!("{}", theme::ok("Configuration is valid."));
            if resolved.loaded_files.is_empty() {
                println!("{}", theme::note("No config files found; using defaults."));
            } else {
                println!("\n{}", theme::heading("Loaded files:"));
                for path in &resolved.loaded_files {
                    println!("  - {path}");
                }
            }
            if resolved.config.agent.worker_path.is_none() {
                println!(
                    "{}",
                    theme::warn("agent.worker_path is not set; lookups are disabled")
                );
            }
            ExitCode::SUCCESS
        },
        Err(e) => {
            eprintln!("{}", theme::fail(&format!("Configuration error: {e}")));
            ExitCode::FAILURE
        },
    }
}
