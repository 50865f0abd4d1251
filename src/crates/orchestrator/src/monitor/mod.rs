//! Runtime monitoring: credential health checks and operation timing.

pub mod credentials;
pub mod operations;

pub use credentials::{
    CredentialEvent, CredentialMonitor, CredentialStatus, HealthCheck, HealthSummary,
};
pub use operations::{OperationAlert, OperationMonitor, OperationRecord, OperationStats};
