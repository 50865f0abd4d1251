//! Configuration loading for the pulse CLI

pub mod loader;

pub use loader::{deep_merge, ConfigLoader};
