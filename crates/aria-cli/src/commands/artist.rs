//! `aria bio` and `aria url`.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use aria_agent::{ArtistAgent, gate_from_config};
use aria_config::Config;
use aria_mcp::{ArtistArgs, ToolName};
use aria_sandbox::HttpFetcher;

use crate::theme;

/// Exit status when the worker had nothing for the artist.
const EXIT_NOT_FOUND: u8 = 2;

/// Run one lookup against a freshly built agent, then shut it down.
pub(crate) async fn run_lookup(
    config: &Config,
    tool: ToolName,
    args: &ArtistArgs,
) -> Result<ExitCode> {
    let max_response_bytes = usize::try_from(config.fetch.max_response_bytes).unwrap_or(usize::MAX);
    let fetcher = HttpFetcher::new(config.fetch.user_agent.as_deref(), max_response_bytes)
        .context("failed to build HTTP client")?;

    let Some(agent) =
        ArtistAgent::from_config(config, gate_from_config(config), Arc::new(fetcher)).await
    else {
        eprintln!(
            "{}",
            theme::fail("No usable worker configured (set agent.worker_path)")
        );
        return Ok(ExitCode::FAILURE);
    };

    let result = agent.call(tool, args).await;
    agent.shutdown().await;

    match result {
        Ok(text) => {
            println!("{text}");
            Ok(ExitCode::SUCCESS)
        },
        Err(e) if e.is_not_found() => {
            eprintln!(
                "{}",
                theme::warn(&format!("No {} found for {}", noun(tool), args.name))
            );
            Ok(ExitCode::from(EXIT_NOT_FOUND))
        },
        Err(e) => Err(anyhow::Error::new(e).context(format!("{tool} failed"))),
    }
}

fn noun(tool: ToolName) -> &'static str {
    match tool {
        ToolName::ArtistBiography => "biography",
        ToolName::ArtistUrl => "URL",
    }
}
