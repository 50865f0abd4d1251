//! Workflow orchestration for pulse
//!
//! [`WorkflowOrchestrator`] drives one activity-digest run through a fixed
//! pipeline of [`Stage`]s:
//!
//! 1. validate configuration and credentials
//! 2. create the service clients through a [`ClientFactory`]
//! 3. fetch activity, expanding a manager into their team when asked
//! 4. generate the summary
//! 5. collect client metrics
//!
//! [`WorkflowOrchestrator::execute`] never returns an error: failures,
//! cancellation and degraded outcomes are all recorded on the returned
//! [`WorkflowResult`]. Clients created during a run are closed before it
//! returns.
//!
//! Stage durations are recorded in an [`OperationMonitor`] shared across
//! runs. A [`CredentialMonitor`] re-runs the connection checks in the
//! background and reports credentials that stop working.
//!
//! # Example
//!
//! ```rust,ignore
//! use orchestrator::{EnvCredentialProvider, PulseConfig, Targets, WorkflowOrchestrator, WorkflowRequest};
//! use integrations::DateRange;
//! use std::sync::Arc;
//!
//! let orchestrator = WorkflowOrchestrator::new(config, Arc::new(EnvCredentialProvider::new()));
//! let request = WorkflowRequest::new(
//!     Targets::members(["alice", "bob"]),
//!     DateRange::parse("2024-01-01", "2024-01-07")?,
//! );
//! let result = orchestrator.execute(request).await;
//! ```

pub mod cancel;
pub mod config;
pub mod credentials;
pub mod error;
pub mod factory;
pub mod monitor;
pub mod progress;
pub mod request;
pub mod status;
pub mod workflow;

pub use cancel::CancellationToken;
pub use config::{
    DirectoryConfig, LoggingConfig, MonitoringConfig, PulseConfig, SummarizerConfig,
    TrackerConfig, TransportConfig,
};
pub use credentials::{CredentialProvider, EnvCredentialProvider, StaticCredentials};
pub use error::{OrchestratorError, Result};
pub use factory::{ClientFactory, ServiceClients, ServiceFactory};
pub use monitor::{
    CredentialEvent, CredentialMonitor, CredentialStatus, HealthCheck, HealthSummary,
    OperationAlert, OperationMonitor, OperationRecord, OperationStats,
};
pub use progress::{ChannelProgress, NoProgress, ProgressEvent, ProgressSink};
pub use request::{ConnectionHealth, SummaryOverrides, Targets, WorkflowRequest, WorkflowResult};
pub use status::{Stage, WorkflowStatus};
pub use workflow::{activity_breakdown, WorkflowOrchestrator};

pub use integrations::DateRange;
