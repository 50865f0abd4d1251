//! `check` and `config` command handlers

use crate::cli::output::{credential_event_line, render_health};
use crate::error::{PulseError, Result};
use colored::Colorize;
use orchestrator::{CredentialMonitor, PulseConfig, WorkflowOrchestrator};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Check every configured service. Returns whether all of them are healthy.
pub async fn handle_check(orchestrator: &WorkflowOrchestrator, json: bool) -> Result<bool> {
    let health = orchestrator.test_connections().await;
    let healthy = health.values().all(|h| h.healthy);

    if json {
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(healthy);
    }

    println!("{}", render_health(&health));
    if healthy {
        println!("{}", "✓ All services reachable".green().bold());
    } else {
        println!("{}", "✗ Some services are unreachable".red().bold());
    }
    Ok(healthy)
}

/// Re-check every `minutes` until the orchestrator's cancellation token
/// fires, printing each credential event as it happens. Returns whether every
/// service was healthy at the last check.
pub async fn handle_watch(orchestrator: Arc<WorkflowOrchestrator>, minutes: u64) -> Result<bool> {
    let cancel = orchestrator.cancellation_token();
    let operations = Arc::clone(orchestrator.operations());
    let config = orchestrator.config().monitoring.clone();
    let (monitor, mut events) = CredentialMonitor::new(orchestrator, &config)
        .with_interval(Duration::from_secs(minutes * 60))
        .with_operations(operations)
        .channel();

    info!(interval_minutes = minutes, "Watching service credentials");
    eprintln!("Checking every {} minute(s); press Ctrl-C to stop", minutes);

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            println!("{}", credential_event_line(&event));
        }
    });
    monitor.run(cancel).await;
    // Dropping the monitor closes the channel and ends the printer.
    let summary = monitor.summary();
    drop(monitor);
    let _ = printer.await;

    Ok(summary.all_healthy())
}

/// Print the effective configuration as TOML, followed by any problems.
pub fn handle_config(config: &PulseConfig) -> Result<()> {
    let rendered = config
        .to_toml_string()
        .map_err(|e| PulseError::Config(e.to_string()))?;
    print!("{}", rendered);

    for problem in config.validate() {
        eprintln!("{} {}", "⚠".yellow(), problem);
    }
    Ok(())
}
