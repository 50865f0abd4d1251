//! Pulse CLI
//!
//! Main entry point for the pulse command-line tool.

use clap::Parser;
use colored::Colorize;
use orchestrator::{EnvCredentialProvider, WorkflowOrchestrator};
use pulse::cli::check::{handle_check, handle_config, handle_watch};
use pulse::cli::run::{handle_run, members_request, stderr_progress, team_request};
use pulse::{exit_code, logging, Cli, Commands, ConfigLoader};
use std::sync::Arc;
use tracing::{debug, warn};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {}", "✗".red().bold(), e);
            1
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_explicit_path(path);
    }
    let config = loader.load().await?;
    logging::init(&config.logging, cli.verbose)?;
    debug!(paths = ?loader.search_paths(), "Configuration resolved");

    if let Commands::Config = cli.command {
        handle_config(&config)?;
        return Ok(0);
    }

    let orchestrator = Arc::new(
        WorkflowOrchestrator::new(config, Arc::new(EnvCredentialProvider::new()))
            .with_progress(stderr_progress()),
    );

    // Ctrl-C requests cooperative cancellation; the run stops at the next stage boundary.
    let token = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling");
            token.cancel();
        }
    });

    let code = match cli.command {
        Commands::Run {
            members,
            window,
            summary,
        } => {
            let request = members_request(members, window.resolve()?, summary.overrides().await?);
            exit_code(handle_run(&orchestrator, request, summary.json).await?)
        }
        Commands::Team {
            manager,
            depth,
            window,
            summary,
        } => {
            let request =
                team_request(manager, depth, window.resolve()?, summary.overrides().await?);
            exit_code(handle_run(&orchestrator, request, summary.json).await?)
        }
        Commands::Check { json, watch } => {
            let healthy = match watch {
                Some(minutes) => handle_watch(Arc::clone(&orchestrator), minutes).await?,
                None => handle_check(&orchestrator, json).await?,
            };
            if healthy {
                0
            } else {
                1
            }
        }
        Commands::Config => 0,
    };
    Ok(code)
}
