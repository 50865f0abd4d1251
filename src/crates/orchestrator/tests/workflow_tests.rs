//! Pipeline behavior with mock service clients.

use async_trait::async_trait;
use hierarchy::{
    DirectoryBackend, Expansion, MappingSource, MemberIdentity, NodeData, NodeKind, OrgResolver,
    Person, TreeBuilder,
};
use integrations::{
    ActivityQuery, ActivityRecord, ActivitySource, DirectorySource, IntegrationError,
};
use llm::{LlmError, Summarizer, SummaryOptions, SummaryPayload};
use orchestrator::{
    CancellationToken, ChannelProgress, ClientFactory, CredentialEvent, CredentialMonitor,
    CredentialProvider, DateRange, OperationMonitor, OrchestratorError, PulseConfig, Stage,
    StaticCredentials, Targets, WorkflowOrchestrator, WorkflowRequest, WorkflowStatus,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use transport::{ErrorKind, MetricsSnapshot, RequestError, RequestMetrics};

fn snapshot(service: &str) -> MetricsSnapshot {
    RequestMetrics::new().snapshot(service, 0.0)
}

#[derive(Default)]
struct MockTracker {
    activities: Vec<ActivityRecord>,
    error: Option<IntegrationError>,
    cancel_during_fetch: Option<CancellationToken>,
    queries: Mutex<Vec<ActivityQuery>>,
    closes: AtomicUsize,
}

#[async_trait]
impl ActivitySource for MockTracker {
    fn name(&self) -> &str {
        "tracker"
    }

    async fn fetch_activities(&self, query: &ActivityQuery) -> integrations::Result<Vec<ActivityRecord>> {
        self.queries.lock().push(query.clone());
        if let Some(token) = &self.cancel_during_fetch {
            token.cancel();
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(self.activities.clone()),
        }
    }

    async fn validate_connection(&self) -> integrations::Result<()> {
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        snapshot("tracker")
    }

    async fn close(&self) -> bool {
        self.closes.fetch_add(1, Ordering::SeqCst) == 0
    }
}

/// People API answering from a fixed list.
struct MockPeople {
    people: Vec<Person>,
    lookups: Mutex<Vec<String>>,
}

#[async_trait]
impl DirectoryBackend for MockPeople {
    async fn lookup(&self, identifier: &str) -> hierarchy::Result<Vec<Person>> {
        self.lookups.lock().push(identifier.to_string());
        Ok(self
            .people
            .iter()
            .filter(|p| p.email.as_deref() == Some(identifier) || p.uid == identifier)
            .cloned()
            .collect())
    }

    async fn direct_reports(&self, manager_uids: &[String]) -> hierarchy::Result<Vec<Person>> {
        Ok(self
            .people
            .iter()
            .filter(|p| {
                p.manager_uid
                    .as_ref()
                    .is_some_and(|m| manager_uids.contains(m))
            })
            .cloned()
            .collect())
    }
}

struct MockDirectory {
    expansion: Result<Expansion, IntegrationError>,
    resolver: Option<OrgResolver>,
    closes: AtomicUsize,
}

impl MockDirectory {
    fn new(expansion: Result<Expansion, IntegrationError>) -> Self {
        Self {
            expansion,
            resolver: None,
            closes: AtomicUsize::new(0),
        }
    }

    fn backed_by(backend: Arc<MockPeople>) -> Self {
        Self {
            expansion: Err(IntegrationError::Configuration("unused".into())),
            resolver: Some(OrgResolver::new(backend, Duration::from_secs(60), 100)),
            closes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DirectorySource for MockDirectory {
    fn name(&self) -> &str {
        "directory"
    }

    async fn expand_manager(&self, manager: &str, max_depth: usize) -> integrations::Result<Expansion> {
        match &self.resolver {
            Some(resolver) => Ok(resolver.expand(manager, max_depth).await?),
            None => self.expansion.clone(),
        }
    }

    async fn map_identity(&self, identifier: &str) -> MemberIdentity {
        match &self.resolver {
            Some(resolver) => resolver.map_identity(identifier).await,
            None => MemberIdentity::fallback(identifier),
        }
    }

    async fn validate_connection(&self) -> integrations::Result<()> {
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        snapshot("directory")
    }

    async fn close(&self) -> bool {
        self.closes.fetch_add(1, Ordering::SeqCst) == 0
    }
}

#[derive(Default)]
struct MockSummarizer {
    fallback: bool,
    unreachable: bool,
    calls: Mutex<Vec<(usize, SummaryOptions)>>,
    closes: AtomicUsize,
}

#[async_trait]
impl Summarizer for MockSummarizer {
    fn name(&self) -> &str {
        "summarizer"
    }

    async fn summarize(
        &self,
        activities: &[ActivityRecord],
        options: &SummaryOptions,
    ) -> llm::Result<SummaryPayload> {
        self.calls.lock().push((activities.len(), options.clone()));
        let mut payload = SummaryPayload::new(
            format!("Summary of {} activities", activities.len()),
            "mock-model",
        );
        if self.fallback {
            payload.fallback = true;
            payload.error = Some("AI generation blocked: SAFETY".to_string());
        }
        Ok(payload)
    }

    async fn validate_connection(&self) -> llm::Result<()> {
        if self.unreachable {
            return Err(LlmError::Request(RequestError::Authentication { status: 401 }));
        }
        Ok(())
    }

    fn metrics(&self) -> MetricsSnapshot {
        snapshot("summarizer")
    }

    async fn close(&self) -> bool {
        self.closes.fetch_add(1, Ordering::SeqCst) == 0
    }
}

struct MockFactory {
    tracker: Arc<MockTracker>,
    directory: Option<Arc<MockDirectory>>,
    summarizer: Arc<MockSummarizer>,
    created: AtomicUsize,
}

impl MockFactory {
    fn new(tracker: MockTracker, summarizer: MockSummarizer) -> Self {
        Self {
            tracker: Arc::new(tracker),
            directory: None,
            summarizer: Arc::new(summarizer),
            created: AtomicUsize::new(0),
        }
    }

    fn with_directory(mut self, directory: MockDirectory) -> Self {
        self.directory = Some(Arc::new(directory));
        self
    }
}

impl ClientFactory for MockFactory {
    fn activity_source(
        &self,
        _config: &PulseConfig,
        _credentials: &dyn CredentialProvider,
    ) -> orchestrator::Result<Arc<dyn ActivitySource>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.tracker) as Arc<dyn ActivitySource>)
    }

    fn directory(
        &self,
        _config: &PulseConfig,
        _credentials: &dyn CredentialProvider,
    ) -> orchestrator::Result<Option<Arc<dyn DirectorySource>>> {
        Ok(self.directory.as_ref().map(|d| {
            self.created.fetch_add(1, Ordering::SeqCst);
            Arc::clone(d) as Arc<dyn DirectorySource>
        }))
    }

    fn summarizer(
        &self,
        _config: &PulseConfig,
        _credentials: &dyn CredentialProvider,
    ) -> orchestrator::Result<Arc<dyn Summarizer>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::clone(&self.summarizer) as Arc<dyn Summarizer>)
    }
}

fn config() -> PulseConfig {
    let mut config = PulseConfig::default();
    config.tracker.url = "https://issues.example.com".to_string();
    config
}

fn credentials() -> Arc<StaticCredentials> {
    Arc::new(
        StaticCredentials::new()
            .with("tracker", "api_token", "tracker-token")
            .with("summarizer", "api_key", "gemini-key"),
    )
}

fn orchestrator(factory: &Arc<MockFactory>) -> WorkflowOrchestrator {
    WorkflowOrchestrator::new(config(), credentials())
        .with_factory(Arc::clone(factory) as Arc<dyn ClientFactory>)
}

fn request(targets: Targets) -> WorkflowRequest {
    WorkflowRequest::new(targets, DateRange::parse("2024-01-01", "2024-01-07").unwrap())
}

fn team_activities() -> Vec<ActivityRecord> {
    vec![
        ActivityRecord::new("PROJ-1", "issue", "Ship login")
            .with_status("Done")
            .with_assignee("alice", "Alice")
            .with_project("PROJ"),
        ActivityRecord::new("PROJ-2", "issue", "Fix deploy")
            .with_status("In Progress")
            .with_assignee("alice", "Alice")
            .with_project("PROJ"),
        ActivityRecord::new("PROJ-3", "issue", "Write docs")
            .with_status("Done")
            .with_assignee("bob", "Bob")
            .with_project("PROJ"),
    ]
}

fn assert_closed_once(factory: &MockFactory) {
    assert_eq!(factory.tracker.closes.load(Ordering::SeqCst), 1);
    assert_eq!(factory.summarizer.closes.load(Ordering::SeqCst), 1);
    if let Some(directory) = &factory.directory {
        assert!(directory.closes.load(Ordering::SeqCst) <= 1);
    }
}

fn team_expansion(bob_source: MappingSource) -> Expansion {
    let mut builder = TreeBuilder::new();
    builder
        .add_root(NodeData::new("boss", NodeKind::Person, "Boss"))
        .unwrap();
    builder
        .add_child("boss", NodeData::new("alice", NodeKind::Person, "Alice"))
        .unwrap();
    builder
        .add_child("boss", NodeData::new("bob", NodeKind::Person, "Bob"))
        .unwrap();

    let identity = |username: &str, source: MappingSource| MemberIdentity {
        username: username.to_string(),
        email: Some(format!("{}@example.com", username)),
        display_name: None,
        source,
    };
    let root = identity("boss", MappingSource::Directory);
    Expansion {
        members: vec![
            root.clone(),
            identity("alice", MappingSource::Directory),
            identity("bob", bob_source),
        ],
        root,
        tree: builder.build(),
        warnings: Vec::new(),
    }
}

#[tokio::test]
async fn test_end_to_end_for_two_members() {
    let factory = Arc::new(MockFactory::new(
        MockTracker {
            activities: team_activities(),
            ..Default::default()
        },
        MockSummarizer::default(),
    ));
    let (progress, mut events) = ChannelProgress::channel();
    let orchestrator = orchestrator(&factory).with_progress(Arc::new(progress));

    let result = orchestrator
        .execute(request(Targets::members(["alice", "bob"])))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed, "{:?}", result.error_message);
    assert_eq!(result.stages_completed, Stage::ALL.to_vec());
    assert_eq!(result.activity_count, 3);
    assert_eq!(
        result.summary.as_ref().unwrap().content,
        "Summary of 3 activities"
    );
    assert!(result.error_message.is_none());
    assert!(result.warnings.is_empty());
    assert!(result.metrics.contains_key("tracker"));
    assert!(result.metrics.contains_key("summarizer"));

    let queries = factory.tracker.queries.lock();
    assert_eq!(queries.len(), 1);
    assert_eq!(queries[0].members, vec!["alice", "bob"]);
    assert_eq!(queries[0].max_results, 1000);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push((event.message, event.percent));
    }
    let percents: Vec<u8> = seen.iter().map(|(_, p)| *p).collect();
    assert_eq!(percents, vec![0, 20, 40, 60, 80, 100]);
    assert_eq!(seen[0].0, "Stage 1: Validate Configuration");
    assert_eq!(seen[5].0, "Completed");

    assert_closed_once(&factory);
}

#[tokio::test]
async fn test_stage_durations_are_recorded() {
    let factory = Arc::new(MockFactory::new(
        MockTracker {
            activities: team_activities(),
            ..Default::default()
        },
        MockSummarizer::default(),
    ));
    let operations = Arc::new(OperationMonitor::default());
    let orchestrator = orchestrator(&factory).with_operation_monitor(Arc::clone(&operations));

    let result = orchestrator
        .execute(request(Targets::members(["alice"])))
        .await;
    orchestrator
        .execute(request(Targets::members(["bob"])))
        .await;

    assert_eq!(result.stage_durations.len(), Stage::ALL.len());
    assert!(result.stage_durations.contains_key("fetch_activity_data"));
    let fetch = operations.stats("fetch_activity_data").unwrap();
    assert_eq!(fetch.count, 2);
    assert_eq!(fetch.errors, 0);
    assert_eq!(operations.all_stats().len(), Stage::ALL.len());
    assert!(operations.slow_operations(None).is_empty());
}

#[tokio::test]
async fn test_fetch_failure_stops_pipeline() {
    let factory = Arc::new(MockFactory::new(
        MockTracker {
            error: Some(IntegrationError::Request(RequestError::Authentication {
                status: 401,
            })),
            ..Default::default()
        },
        MockSummarizer::default(),
    ));

    let result = orchestrator(&factory)
        .execute(request(Targets::members(["alice"])))
        .await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(
        result.stages_completed,
        vec![Stage::ValidateConfiguration, Stage::InitializeClients]
    );
    assert_eq!(result.current_stage, Some(Stage::FetchActivityData));
    let message = result.error_message.unwrap();
    assert!(message.starts_with("stage fetch_activity_data failed"), "{}", message);
    assert!(result.summary.is_none());
    assert!(factory.summarizer.calls.lock().is_empty());
    assert_closed_once(&factory);
    // The failed stage is timed too.
    assert_eq!(result.stage_durations.len(), 3);
}

#[tokio::test]
async fn test_cancellation_waits_for_running_stage() {
    let token = CancellationToken::new();
    let factory = Arc::new(MockFactory::new(
        MockTracker {
            activities: team_activities(),
            cancel_during_fetch: Some(token.clone()),
            ..Default::default()
        },
        MockSummarizer::default(),
    ));

    let result = orchestrator(&factory)
        .with_cancellation(token)
        .execute(request(Targets::members(["alice", "bob"])))
        .await;

    assert_eq!(result.status, WorkflowStatus::Cancelled);
    assert_eq!(
        result.stages_completed,
        vec![
            Stage::ValidateConfiguration,
            Stage::InitializeClients,
            Stage::FetchActivityData
        ]
    );
    assert_eq!(result.activity_count, 3);
    assert!(factory.summarizer.calls.lock().is_empty());
    assert_closed_once(&factory);
}

#[tokio::test]
async fn test_stage_failure_during_cancellation_reports_cancelled() {
    let token = CancellationToken::new();
    let factory = Arc::new(MockFactory::new(
        MockTracker {
            error: Some(IntegrationError::Request(RequestError::Timeout)),
            cancel_during_fetch: Some(token.clone()),
            ..Default::default()
        },
        MockSummarizer::default(),
    ));

    let result = orchestrator(&factory)
        .with_cancellation(token)
        .execute(request(Targets::members(["alice"])))
        .await;

    assert_eq!(result.status, WorkflowStatus::Cancelled);
    assert_eq!(
        result.stages_completed,
        vec![Stage::ValidateConfiguration, Stage::InitializeClients]
    );
    assert_eq!(result.current_stage, Some(Stage::FetchActivityData));
    let message = result.error_message.unwrap();
    assert!(message.starts_with("workflow cancelled; last stage failed"), "{}", message);
    assert!(message.contains("stage fetch_activity_data failed"), "{}", message);
    assert!(result.summary.is_none());
    assert!(factory.summarizer.calls.lock().is_empty());
    assert_closed_once(&factory);
}

#[tokio::test]
async fn test_cancelled_before_start_creates_nothing() {
    let factory = Arc::new(MockFactory::new(MockTracker::default(), MockSummarizer::default()));
    let orchestrator = orchestrator(&factory);
    orchestrator.cancellation_token().cancel();

    let result = orchestrator.execute(request(Targets::members(["alice"]))).await;

    assert_eq!(result.status, WorkflowStatus::Cancelled);
    assert!(result.stages_completed.is_empty());
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_credential_fails_validation() {
    let factory = Arc::new(MockFactory::new(MockTracker::default(), MockSummarizer::default()));
    let credentials = Arc::new(StaticCredentials::new().with("tracker", "api_token", "t"));
    let orchestrator = WorkflowOrchestrator::new(config(), credentials)
        .with_factory(Arc::clone(&factory) as Arc<dyn ClientFactory>);

    let result = orchestrator.execute(request(Targets::members(["alice"]))).await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert!(result.stages_completed.is_empty());
    assert!(result
        .error_message
        .unwrap()
        .contains("missing credential summarizer/api_key"));
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_manager_expansion_queries_whole_team() {
    let factory = Arc::new(
        MockFactory::new(
            MockTracker {
                activities: team_activities(),
                ..Default::default()
            },
            MockSummarizer::default(),
        )
        .with_directory(MockDirectory::new(Ok(team_expansion(
            MappingSource::EmailLocalPart,
        )))),
    );

    let result = orchestrator(&factory)
        .execute(request(Targets::manager("boss@example.com")))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed, "{:?}", result.error_message);
    assert_eq!(
        factory.tracker.queries.lock()[0].members,
        vec!["boss", "alice", "bob"]
    );
    assert_eq!(result.hierarchy.as_ref().unwrap().len(), 3);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("'bob'"));

    let alice = &result.activities[0];
    let org = alice.org.as_ref().unwrap();
    assert_eq!(org.manager.as_deref(), Some("Boss"));

    let directory = factory.directory.as_ref().unwrap();
    assert_eq!(directory.closes.load(Ordering::SeqCst), 1);
    assert_closed_once(&factory);
}

#[tokio::test]
async fn test_failed_expansion_falls_back_with_warning() {
    let factory = Arc::new(
        MockFactory::new(
            MockTracker {
                activities: team_activities(),
                ..Default::default()
            },
            MockSummarizer::default(),
        )
        .with_directory(MockDirectory::new(Err(IntegrationError::Configuration(
            "directory offline".into(),
        )))),
    );

    let result = orchestrator(&factory)
        .execute(request(Targets::manager("boss@example.com")))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(factory.tracker.queries.lock()[0].members, vec!["boss"]);
    assert!(result.hierarchy.is_none());
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("team expansion for 'boss@example.com' failed"));
}

#[tokio::test]
async fn test_member_emails_are_mapped_through_directory() {
    let people = Arc::new(MockPeople {
        people: vec![
            Person::new("asmith", "Alice Smith").with_email("alice@example.com"),
            Person::new("bob1", "Bob One").with_email("bob@example.com"),
            Person::new("bob2", "Bob Two").with_email("bob@example.com"),
        ],
        lookups: Mutex::new(Vec::new()),
    });
    let factory = Arc::new(
        MockFactory::new(
            MockTracker {
                activities: team_activities(),
                ..Default::default()
            },
            MockSummarizer::default(),
        )
        .with_directory(MockDirectory::backed_by(Arc::clone(&people))),
    );

    let result = orchestrator(&factory)
        .execute(request(Targets::members([
            "alice@example.com",
            "bob@example.com",
            "ghost@example.com",
            "carol",
        ])))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed, "{:?}", result.error_message);
    assert_eq!(
        factory.tracker.queries.lock()[0].members,
        vec!["asmith", "bob", "ghost", "carol"]
    );
    // Plain usernames never reach the directory.
    assert_eq!(
        *people.lookups.lock(),
        vec!["alice@example.com", "bob@example.com", "ghost@example.com"]
    );
    assert_eq!(
        result.warnings,
        vec![
            "username 'bob' for bob@example.com was guessed (email_local_part)",
            "username 'ghost' for ghost@example.com was guessed (email_local_part)",
        ]
    );
    let directory = factory.directory.as_ref().unwrap();
    assert_eq!(directory.closes.load(Ordering::SeqCst), 1);
    assert_closed_once(&factory);
}

#[tokio::test]
async fn test_member_emails_without_directory_are_guessed() {
    let factory = Arc::new(MockFactory::new(
        MockTracker {
            activities: team_activities(),
            ..Default::default()
        },
        MockSummarizer::default(),
    ));

    let result = orchestrator(&factory)
        .execute(request(Targets::members(["dave@example.com", "erin"])))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(factory.tracker.queries.lock()[0].members, vec!["dave", "erin"]);
    assert_eq!(result.warnings.len(), 1);
    assert!(result.warnings[0].contains("username 'dave' for dave@example.com was guessed"));
}

#[tokio::test]
async fn test_plain_usernames_skip_directory() {
    let people = Arc::new(MockPeople {
        people: Vec::new(),
        lookups: Mutex::new(Vec::new()),
    });
    let factory = Arc::new(
        MockFactory::new(
            MockTracker {
                activities: team_activities(),
                ..Default::default()
            },
            MockSummarizer::default(),
        )
        .with_directory(MockDirectory::backed_by(Arc::clone(&people))),
    );

    let result = orchestrator(&factory)
        .execute(request(Targets::members(["alice", "bob"])))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.warnings.is_empty());
    assert!(people.lookups.lock().is_empty());
    let directory = factory.directory.as_ref().unwrap();
    assert_eq!(directory.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_manager_expansion_through_org_resolver() {
    let people = Arc::new(MockPeople {
        people: vec![
            Person::new("boss", "Boss").with_email("boss@example.com"),
            Person::new("alice", "Alice").with_manager("boss"),
            Person::new("bob", "Bob").with_manager("boss"),
        ],
        lookups: Mutex::new(Vec::new()),
    });
    let factory = Arc::new(
        MockFactory::new(
            MockTracker {
                activities: team_activities(),
                ..Default::default()
            },
            MockSummarizer::default(),
        )
        .with_directory(MockDirectory::backed_by(people)),
    );

    let result = orchestrator(&factory)
        .execute(request(Targets::manager("boss@example.com")))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed, "{:?}", result.error_message);
    assert_eq!(
        factory.tracker.queries.lock()[0].members,
        vec!["boss", "alice", "bob"]
    );
    assert!(result.warnings.is_empty());
    assert_eq!(result.hierarchy.as_ref().unwrap().len(), 3);
}

#[tokio::test]
async fn test_manager_without_directory_warns() {
    let factory = Arc::new(MockFactory::new(
        MockTracker {
            activities: team_activities(),
            ..Default::default()
        },
        MockSummarizer::default(),
    ));

    let result = orchestrator(&factory)
        .execute(request(Targets::manager("boss")))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(factory.tracker.queries.lock()[0].members, vec!["boss"]);
    assert!(result.warnings[0].contains("no directory configured"));
}

#[tokio::test]
async fn test_only_failed_activities_fail_summary_stage() {
    let factory = Arc::new(MockFactory::new(
        MockTracker {
            activities: vec![
                ActivityRecord::failed("PROJ-1", "bad payload"),
                ActivityRecord::failed("PROJ-2", "bad payload"),
            ],
            ..Default::default()
        },
        MockSummarizer::default(),
    ));

    let result = orchestrator(&factory)
        .execute(request(Targets::members(["alice"])))
        .await;

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.activity_count, 2);
    assert_eq!(result.current_stage, Some(Stage::GenerateSummary));
    assert!(result.error_message.unwrap().contains("all 2 failed processing"));
    assert!(factory.summarizer.calls.lock().is_empty());
}

#[tokio::test]
async fn test_failed_records_are_not_summarized() {
    let mut activities = team_activities();
    activities.push(ActivityRecord::failed("PROJ-9", "bad payload"));
    let factory = Arc::new(MockFactory::new(
        MockTracker {
            activities,
            ..Default::default()
        },
        MockSummarizer {
            fallback: true,
            ..Default::default()
        },
    ));

    let result = orchestrator(&factory)
        .execute(request(Targets::members(["alice"])).with_prompt("Digest: {activity_data}"))
        .await;

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.activity_count, 4);
    let calls = factory.summarizer.calls.lock();
    assert_eq!(calls[0].0, 3);
    assert_eq!(calls[0].1.custom_prompt.as_deref(), Some("Digest: {activity_data}"));
    assert!(result.warnings[0].starts_with("summary is a statistical fallback"));
}

#[tokio::test]
async fn test_connection_health() {
    let factory = Arc::new(MockFactory::new(
        MockTracker::default(),
        MockSummarizer {
            unreachable: true,
            ..Default::default()
        },
    ));

    let health = orchestrator(&factory).test_connections().await;

    assert_eq!(health.len(), 2);
    assert!(health["tracker"].healthy);
    assert!(!health["summarizer"].healthy);
    assert!(health["summarizer"].error.as_deref().unwrap().contains("401"));
    assert_closed_once(&factory);
}

#[tokio::test]
async fn test_credential_monitor_checks_through_orchestrator() {
    let factory = Arc::new(MockFactory::new(
        MockTracker::default(),
        MockSummarizer {
            unreachable: true,
            ..Default::default()
        },
    ));
    let orchestrator = Arc::new(orchestrator(&factory));
    let (monitor, mut events) =
        CredentialMonitor::new(orchestrator, &PulseConfig::default().monitoring).channel();

    monitor.check_once().await;
    monitor.check_once().await;

    assert_eq!(
        events.try_recv().unwrap(),
        CredentialEvent::StatusChanged {
            service: "summarizer".to_string(),
            healthy: false
        }
    );
    assert_eq!(
        events.try_recv().unwrap(),
        CredentialEvent::StatusChanged {
            service: "tracker".to_string(),
            healthy: true
        }
    );
    assert!(events.try_recv().is_err());

    let summarizer = monitor.status("summarizer").unwrap();
    assert_eq!(summarizer.consecutive_failures, 2);
    assert!(summarizer.last_error.unwrap().contains("401"));
    assert_eq!(monitor.summary().unhealthy, vec!["summarizer"]);
    // Every check closes the clients it created.
    assert_eq!(factory.tracker.closes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_invalid_config_reports_every_service_unhealthy() {
    let factory = Arc::new(MockFactory::new(MockTracker::default(), MockSummarizer::default()));
    let orchestrator = WorkflowOrchestrator::new(PulseConfig::default(), credentials())
        .with_factory(Arc::clone(&factory) as Arc<dyn ClientFactory>);

    let health = orchestrator.test_connections().await;

    assert!(health.values().all(|h| !h.healthy));
    assert!(health["tracker"].error.as_deref().unwrap().contains("tracker.url"));
    assert_eq!(factory.created.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stage_errors_carry_kind() {
    let err = OrchestratorError::Stage {
        stage: Stage::InitializeClients,
        kind: ErrorKind::Configuration,
        message: "missing credential".into(),
    };
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.stage(), Some(Stage::InitializeClients));
}
