//! Workflow orchestrator
//!
//! `validate_configuration → initialize_clients → fetch_activity_data →
//! generate_summary → finalize`, each run through one wrapper that reports
//! progress, records completion and wraps failures with the stage name.
//! Cancellation is polled between stages only.

use crate::cancel::CancellationToken;
use crate::config::PulseConfig;
use crate::credentials::CredentialProvider;
use crate::error::{OrchestratorError, Result};
use crate::factory::{ClientFactory, ServiceClients, ServiceFactory, SUMMARIZER, TRACKER};
use crate::monitor::{HealthCheck, OperationMonitor};
use crate::progress::{NoProgress, ProgressSink};
use crate::request::{ConnectionHealth, Targets, WorkflowRequest, WorkflowResult};
use crate::status::{Stage, WorkflowStatus};
use hierarchy::{email_local_part, Expansion, HierarchyTree, MemberIdentity};
use async_trait::async_trait;
use integrations::{org_context_for, ActivityQuery, ActivityRecord, ActivityStats};
use llm::{SummaryOptions, SummaryPayload};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use transport::{ErrorKind, MetricsSnapshot};

/// Why the pipeline stopped early.
enum Halt {
    Failed(OrchestratorError),
    Cancelled {
        after: Option<Stage>,
        error: Option<OrchestratorError>,
    },
}

/// Output of the fetch stage.
struct Fetched {
    activities: Vec<ActivityRecord>,
    warnings: Vec<String>,
    hierarchy: Option<HierarchyTree>,
}

/// Runs activity-digest workflows.
///
/// Each call to [`execute`](Self::execute) creates its own clients and closes
/// them before returning, so one orchestrator can serve many runs.
pub struct WorkflowOrchestrator {
    config: PulseConfig,
    credentials: Arc<dyn CredentialProvider>,
    factory: Arc<dyn ClientFactory>,
    progress: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    operations: Arc<OperationMonitor>,
}

impl WorkflowOrchestrator {
    pub fn new(config: PulseConfig, credentials: Arc<dyn CredentialProvider>) -> Self {
        let operations = Arc::new(OperationMonitor::from_config(&config.monitoring));
        Self {
            config,
            credentials,
            factory: Arc::new(ServiceFactory),
            progress: Arc::new(NoProgress),
            cancel: CancellationToken::new(),
            operations,
        }
    }

    pub fn with_factory(mut self, factory: Arc<dyn ClientFactory>) -> Self {
        self.factory = factory;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Share stage timings with another monitor.
    pub fn with_operation_monitor(mut self, operations: Arc<OperationMonitor>) -> Self {
        self.operations = operations;
        self
    }

    /// Durations of every stage run so far, across runs.
    pub fn operations(&self) -> &Arc<OperationMonitor> {
        &self.operations
    }

    pub fn config(&self) -> &PulseConfig {
        &self.config
    }

    /// Token that cancels runs of this orchestrator.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the whole pipeline. Never fails; the outcome is in the result.
    pub async fn execute(&self, request: WorkflowRequest) -> WorkflowResult {
        let started = Instant::now();
        let mut result = WorkflowResult::new();
        result.status = WorkflowStatus::Running;
        let mut clients = ServiceClients::new();

        info!(
            run_id = %result.run_id,
            start = %request.range.start,
            end = %request.range.end,
            "Starting workflow"
        );

        match self.run_pipeline(&request, &mut clients, &mut result).await {
            Ok(()) => {
                result.status = WorkflowStatus::Completed;
                result.current_stage = None;
                self.progress.report("Completed", 100);
            }
            Err(Halt::Failed(e)) => {
                error!(run_id = %result.run_id, error = %e, "Workflow failed");
                result.status = WorkflowStatus::Failed;
                result.error_message = Some(e.to_string());
            }
            Err(Halt::Cancelled { after, error }) => {
                info!(
                    run_id = %result.run_id,
                    after = ?after.map(|s| s.name()),
                    stages_completed = result.stages_completed.len(),
                    "Workflow cancelled"
                );
                result.status = WorkflowStatus::Cancelled;
                result.error_message = Some(match error {
                    Some(e) => format!("workflow cancelled; last stage failed: {}", e),
                    None => "workflow was cancelled".to_string(),
                });
            }
        }

        self.cleanup(&mut clients).await;
        result.elapsed = started.elapsed();

        info!(
            run_id = %result.run_id,
            status = %result.status,
            activities = result.activity_count,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Workflow finished"
        );
        result
    }

    async fn run_pipeline(
        &self,
        request: &WorkflowRequest,
        clients: &mut ServiceClients,
        result: &mut WorkflowResult,
    ) -> std::result::Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled {
                after: None,
                error: None,
            });
        }

        self.run_stage(Stage::ValidateConfiguration, result, self.validate_configuration(request))
            .await
            .map_err(|e| self.halt(Stage::ValidateConfiguration, e))?;
        self.checkpoint(Stage::ValidateConfiguration)?;

        self.run_stage(Stage::InitializeClients, result, self.initialize_clients(request, clients))
            .await
            .map_err(|e| self.halt(Stage::InitializeClients, e))?;
        self.checkpoint(Stage::InitializeClients)?;

        let fetched = self
            .run_stage(Stage::FetchActivityData, result, self.fetch_activity_data(request, clients))
            .await
            .map_err(|e| self.halt(Stage::FetchActivityData, e))?;
        result.activity_count = fetched.activities.len();
        result.warnings.extend(fetched.warnings);
        result.hierarchy = fetched.hierarchy;
        result.activities = fetched.activities;
        self.checkpoint(Stage::FetchActivityData)?;

        let activities = std::mem::take(&mut result.activities);
        let outcome = self
            .run_stage(
                Stage::GenerateSummary,
                result,
                self.generate_summary(request, clients, &activities),
            )
            .await;
        result.activities = activities;
        let summary = outcome.map_err(|e| self.halt(Stage::GenerateSummary, e))?;
        if let Some(reason) = summary.error.as_deref().filter(|_| summary.fallback) {
            result
                .warnings
                .push(format!("summary is a statistical fallback: {}", reason));
        }
        result.summary = Some(summary);
        self.checkpoint(Stage::GenerateSummary)?;

        result.metrics = self
            .run_stage(Stage::Finalize, result, self.finalize(clients))
            .await
            .map_err(Halt::Failed)?;

        Ok(())
    }

    /// Stage wrapper: mark current, report progress, record completion, wrap
    /// failures with the stage.
    async fn run_stage<T>(
        &self,
        stage: Stage,
        result: &mut WorkflowResult,
        work: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        result.current_stage = Some(stage);
        self.progress.report(&stage.label(), stage.percent());
        info!(stage = stage.name(), number = stage.ordinal() + 1, "Executing stage");

        let started = Instant::now();
        let outcome = work.await;
        let elapsed = started.elapsed();
        result.stage_durations.insert(stage.name().to_string(), elapsed);

        match outcome {
            Ok(value) => {
                self.operations.record(stage.name(), elapsed, Ok(()));
                result.stages_completed.push(stage);
                info!(
                    stage = stage.name(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Stage completed"
                );
                Ok(value)
            }
            Err(e) => {
                let err = OrchestratorError::at_stage(stage, e);
                self.operations
                    .record(stage.name(), elapsed, Err(err.to_string()));
                error!(stage = stage.name(), kind = %err.kind(), error = %err, "Stage failed");
                Err(err)
            }
        }
    }

    /// A failed stage ends the run; as cancelled if cancellation was
    /// requested while it ran.
    fn halt(&self, stage: Stage, err: OrchestratorError) -> Halt {
        if self.cancel.is_cancelled() {
            Halt::Cancelled {
                after: Some(stage),
                error: Some(err),
            }
        } else {
            Halt::Failed(err)
        }
    }

    /// Stop between stages when cancellation was requested.
    fn checkpoint(&self, after: Stage) -> std::result::Result<(), Halt> {
        if self.cancel.is_cancelled() {
            return Err(Halt::Cancelled {
                after: Some(after),
                error: None,
            });
        }
        Ok(())
    }

    async fn validate_configuration(&self, request: &WorkflowRequest) -> Result<()> {
        request.validate()?;

        let problems = self.config.validate();
        if !problems.is_empty() {
            return Err(OrchestratorError::Configuration(problems.join("; ")));
        }

        for (service, key) in [(TRACKER, "api_token"), (SUMMARIZER, "api_key")] {
            if self.credentials.get(service, key).is_none() {
                return Err(OrchestratorError::Configuration(format!(
                    "missing credential {}/{}",
                    service, key
                )));
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }

    async fn initialize_clients(
        &self,
        request: &WorkflowRequest,
        clients: &mut ServiceClients,
    ) -> Result<()> {
        let credentials = self.credentials.as_ref();

        clients.set_activity(self.factory.activity_source(&self.config, credentials)?);
        if request.targets.needs_directory() {
            if let Some(directory) = self.factory.directory(&self.config, credentials)? {
                clients.set_directory(directory);
            }
        }
        clients.set_summarizer(self.factory.summarizer(&self.config, credentials)?);

        info!(clients = clients.len(), "Service clients initialized");
        Ok(())
    }

    async fn fetch_activity_data(
        &self,
        request: &WorkflowRequest,
        clients: &ServiceClients,
    ) -> Result<Fetched> {
        let mut warnings = Vec::new();
        let mut expansion = None;

        let members = match &request.targets {
            Targets::Members(members) => {
                let identities = self.map_members(clients, members, &mut warnings).await;
                dedupe(identities.iter().map(|m| m.username.as_str()))
            }
            Targets::Manager {
                identifier,
                max_depth,
            } => {
                let depth = max_depth.unwrap_or(self.config.directory.max_depth);
                match self.expand_team(clients, identifier, depth, &mut warnings).await {
                    Some(found) => {
                        let members = dedupe(found.members.iter().map(|m| m.username.as_str()));
                        expansion = Some(found);
                        members
                    }
                    None => vec![MemberIdentity::fallback(identifier).username],
                }
            }
        };

        let tracker = &self.config.tracker;
        let query = ActivityQuery::new(members, request.range)
            .with_projects(tracker.projects.clone())
            .with_max_results(tracker.max_results)
            .with_comments(tracker.include_comments);

        let source = clients.activity()?;
        let mut activities = source
            .fetch_activities(&query)
            .await
            .map_err(|e| OrchestratorError::service(source.name(), e.kind(), e))?;

        let failed: Vec<&ActivityRecord> = activities.iter().filter(|a| a.is_failed()).collect();
        info!(
            members = query.members.len(),
            activities = activities.len(),
            failed = failed.len(),
            "Fetched activity data"
        );
        for record in &failed {
            warn!(
                id = %record.id,
                error = record.processing_error.as_deref().unwrap_or("unknown error"),
                "Activity could not be processed"
            );
        }
        if activities.is_empty() {
            warn!("No activity data found for the requested members and range");
        }

        let hierarchy = expansion.map(|expansion| {
            for record in activities.iter_mut() {
                if let Some(username) = record.assignee_username.clone() {
                    record.org = org_context_for(&expansion, &username);
                }
            }
            expansion.tree
        });

        Ok(Fetched {
            activities,
            warnings,
            hierarchy,
        })
    }

    /// Map explicit members to tracker usernames. Email addresses go through
    /// the directory when there is one; every guessed username is reported.
    async fn map_members(
        &self,
        clients: &ServiceClients,
        members: &[String],
        warnings: &mut Vec<String>,
    ) -> Vec<MemberIdentity> {
        let directory = clients.directory();
        let mut identities = Vec::with_capacity(members.len());

        for member in dedupe(members.iter().map(String::as_str)) {
            if email_local_part(&member).is_none() {
                identities.push(MemberIdentity::fallback(&member));
                continue;
            }
            let identity = match &directory {
                Some(directory) => directory.map_identity(&member).await,
                None => MemberIdentity::fallback(&member),
            };
            if identity.is_fallback() {
                warnings.push(guessed_username(&identity));
            } else {
                debug!(email = %member, username = %identity.username, "Mapped member through directory");
            }
            identities.push(identity);
        }

        identities
    }

    /// Expand `manager` through the directory, recording every degraded
    /// outcome in `warnings`. `None` means the caller must fall back.
    async fn expand_team(
        &self,
        clients: &ServiceClients,
        manager: &str,
        depth: usize,
        warnings: &mut Vec<String>,
    ) -> Option<Expansion> {
        let fallback = MemberIdentity::fallback(manager).username;

        let Some(directory) = clients.directory() else {
            warn!(manager = manager, "No directory configured, using manager as the only member");
            warnings.push(format!(
                "no directory configured; fetched activity for '{}' only",
                fallback
            ));
            return None;
        };

        self.progress
            .report(&format!("Expanding team of {}", manager), Stage::FetchActivityData.percent());

        match directory.expand_manager(manager, depth).await {
            Ok(expansion) if !expansion.is_empty() => {
                info!(
                    manager = manager,
                    members = expansion.members.len(),
                    depth = depth,
                    "Team expanded"
                );
                warnings.extend(expansion.warnings.iter().cloned());
                warnings.extend(
                    expansion
                        .members
                        .iter()
                        .filter(|m| m.is_fallback())
                        .map(guessed_username),
                );
                Some(expansion)
            }
            Ok(_) => {
                warn!(manager = manager, "Directory returned no members, using manager only");
                warnings.push(format!(
                    "directory returned no members for '{}'; fetched activity for '{}' only",
                    manager, fallback
                ));
                None
            }
            Err(e) => {
                warn!(manager = manager, error = %e, "Team expansion failed, using manager only");
                warnings.push(format!(
                    "team expansion for '{}' failed ({}); fetched activity for '{}' only",
                    manager, e, fallback
                ));
                None
            }
        }
    }

    async fn generate_summary(
        &self,
        request: &WorkflowRequest,
        clients: &ServiceClients,
        activities: &[ActivityRecord],
    ) -> Result<SummaryPayload> {
        let valid: Vec<ActivityRecord> = activities
            .iter()
            .filter(|a| !a.is_failed())
            .cloned()
            .collect();
        if valid.is_empty() {
            let message = if activities.is_empty() {
                "no activities found to summarize".to_string()
            } else {
                format!(
                    "no valid activities to summarize; all {} failed processing",
                    activities.len()
                )
            };
            return Err(OrchestratorError::service(
                SUMMARIZER,
                ErrorKind::Integration,
                message,
            ));
        }

        let configured = &self.config.summarizer;
        let overrides = &request.overrides;
        let options = SummaryOptions {
            custom_prompt: overrides
                .custom_prompt
                .clone()
                .or_else(|| configured.custom_prompt.clone()),
            temperature: overrides.temperature.unwrap_or(configured.temperature),
            max_tokens: overrides.max_tokens.unwrap_or(configured.max_tokens),
        };

        let summarizer = clients.summarizer()?;
        let summary = summarizer
            .summarize(&valid, &options)
            .await
            .map_err(|e| OrchestratorError::service(summarizer.name(), e.kind(), e))?;

        if summary.fallback {
            warn!(model = %summary.model, "Summarizer returned a fallback summary");
        }
        Ok(summary)
    }

    async fn finalize(&self, clients: &ServiceClients) -> Result<BTreeMap<String, MetricsSnapshot>> {
        let metrics = clients.metrics();
        for (service, snapshot) in &metrics {
            debug!(
                service = %service,
                requests = snapshot.total_requests,
                failed = snapshot.failed_requests,
                "Client metrics"
            );
        }
        Ok(metrics)
    }

    async fn cleanup(&self, clients: &mut ServiceClients) {
        let closed = clients.close_all().await;
        debug!(closed = closed, "Cleanup finished");
    }

    /// Check every configured service with an authenticated call.
    ///
    /// Configuration problems mark every service unhealthy. Clients are
    /// always closed afterwards.
    pub async fn test_connections(&self) -> BTreeMap<String, ConnectionHealth> {
        let mut health = BTreeMap::new();
        let credentials = self.credentials.as_ref();

        let problems = self.config.validate();
        if !problems.is_empty() {
            let message = problems.join("; ");
            for service in [TRACKER, SUMMARIZER] {
                health.insert(service.to_string(), ConnectionHealth::unhealthy(message.clone()));
            }
            return health;
        }

        let mut clients = ServiceClients::new();
        match self.factory.activity_source(&self.config, credentials) {
            Ok(source) => clients.set_activity(source),
            Err(e) => {
                health.insert(TRACKER.to_string(), ConnectionHealth::unhealthy(e.to_string()));
            }
        }
        match self.factory.directory(&self.config, credentials) {
            Ok(Some(directory)) => clients.set_directory(directory),
            Ok(None) => {}
            Err(e) => {
                health.insert(
                    crate::factory::DIRECTORY.to_string(),
                    ConnectionHealth::unhealthy(e.to_string()),
                );
            }
        }
        match self.factory.summarizer(&self.config, credentials) {
            Ok(summarizer) => clients.set_summarizer(summarizer),
            Err(e) => {
                health.insert(SUMMARIZER.to_string(), ConnectionHealth::unhealthy(e.to_string()));
            }
        }

        if let Ok(source) = clients.activity() {
            let started = Instant::now();
            let outcome = source.validate_connection().await.map_err(|e| e.to_string());
            health.insert(source.name().to_string(), health_of(outcome, started.elapsed()));
        }
        if let Some(directory) = clients.directory() {
            let started = Instant::now();
            let outcome = directory.validate_connection().await.map_err(|e| e.to_string());
            health.insert(directory.name().to_string(), health_of(outcome, started.elapsed()));
        }
        if let Ok(summarizer) = clients.summarizer() {
            let started = Instant::now();
            let outcome = summarizer.validate_connection().await.map_err(|e| e.to_string());
            health.insert(summarizer.name().to_string(), health_of(outcome, started.elapsed()));
        }

        self.cleanup(&mut clients).await;
        info!(
            healthy = health.values().filter(|h| h.healthy).count(),
            services = health.len(),
            "Connection test finished"
        );
        health
    }
}

#[async_trait]
impl HealthCheck for WorkflowOrchestrator {
    async fn check_health(&self) -> BTreeMap<String, ConnectionHealth> {
        self.test_connections().await
    }
}

fn health_of(outcome: std::result::Result<(), String>, latency: Duration) -> ConnectionHealth {
    match outcome {
        Ok(()) => ConnectionHealth::healthy(latency),
        Err(e) => ConnectionHealth::unhealthy(e),
    }
}

fn guessed_username(member: &MemberIdentity) -> String {
    format!(
        "username '{}' for {} was guessed ({})",
        member.username,
        member.email.as_deref().unwrap_or(&member.username),
        member.source
    )
}

/// Trimmed, non-empty, first occurrence wins.
fn dedupe<'a>(members: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    members
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .filter(|m| seen.insert(m.to_string()))
        .map(str::to_string)
        .collect()
}

/// Counts of `activities` by status, assignee, project, priority and type.
pub fn activity_breakdown(activities: &[ActivityRecord]) -> ActivityStats {
    ActivityStats::from_records(activities)
}
