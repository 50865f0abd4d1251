//! Configuration schema for pulse.
//!
//! The schema is plain serde data; locating and layering files is up to the
//! binary. Every section defaults, so an empty document is a valid starting
//! point (though it fails [`PulseConfig::validate`] until a tracker URL is set).

pub mod schema;

pub use schema::{
    DirectoryConfig, LoggingConfig, MonitoringConfig, PulseConfig, SummarizerConfig,
    TrackerConfig, TransportConfig,
};
