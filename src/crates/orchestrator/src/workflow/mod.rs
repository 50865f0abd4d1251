//! Workflow execution
//!
//! Runs the fixed stage pipeline for one [`WorkflowRequest`](crate::WorkflowRequest).

pub mod orchestrator;

pub use orchestrator::{activity_breakdown, WorkflowOrchestrator};
