//! End-to-end checks of the CLI layer that need no network.

use chrono::NaiveDate;
use integrations::DateRange;
use orchestrator::{
    PulseConfig, StaticCredentials, SummaryOverrides, WorkflowOrchestrator, WorkflowStatus,
};
use pulse::cli::run::{handle_run, members_request};
use pulse::{exit_code, Cli, Commands, ConfigLoader};
use std::sync::Arc;
use tempfile::TempDir;

fn range() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_unconfigured_run_fails_with_exit_code_one() {
    let orchestrator =
        WorkflowOrchestrator::new(PulseConfig::default(), Arc::new(StaticCredentials::new()));
    let request = members_request(vec!["alice".to_string()], range(), SummaryOverrides::default());

    let status = handle_run(&orchestrator, request, true).await.unwrap();
    assert_eq!(status, WorkflowStatus::Failed);
    assert_eq!(exit_code(status), 1);
}

#[tokio::test]
async fn test_cancelled_run_exits_130() {
    let orchestrator =
        WorkflowOrchestrator::new(PulseConfig::default(), Arc::new(StaticCredentials::new()));
    orchestrator.cancellation_token().cancel();
    let request = members_request(vec!["alice".to_string()], range(), SummaryOverrides::default());

    let status = handle_run(&orchestrator, request, false).await.unwrap();
    assert_eq!(exit_code(status), 130);
}

#[tokio::test]
async fn test_config_flag_feeds_loader() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("pulse.toml");
    tokio::fs::write(
        &path,
        "[tracker]\nurl = \"https://issues.example.com\"\n\n[summarizer]\ntemperature = 0.2\n",
    )
    .await
    .unwrap();

    let cli = <Cli as clap::Parser>::parse_from([
        "pulse".to_string(),
        "--config".to_string(),
        path.display().to_string(),
        "config".to_string(),
    ]);
    assert!(matches!(cli.command, Commands::Config));

    let config = ConfigLoader::new()
        .with_env(|_| None)
        .with_explicit_path(cli.config.unwrap())
        .load()
        .await
        .unwrap();
    assert_eq!(config.tracker.url, "https://issues.example.com");
    assert_eq!(config.summarizer.temperature, 0.2);
    assert!(config.validate().is_empty());
}
