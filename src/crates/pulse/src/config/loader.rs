//! Configuration loader with dual-location support
//!
//! Loads configuration from:
//! 1. Default values
//! 2. User-level config: ~/.pulse/pulse.toml
//! 3. Project-level config: ./.pulse/pulse.toml
//!
//! Later files override earlier ones key by key. An explicit path replaces
//! the search entirely. `${VAR}` and `${VAR:default}` references inside
//! string values are expanded, then `PULSE_*` environment overrides apply.

use crate::error::{PulseError, Result};
use orchestrator::PulseConfig;
use regex::Regex;
use std::path::{Path, PathBuf};
use tokio::fs;
use toml::Value;
use tracing::{debug, info};

const CONFIG_DIR: &str = ".pulse";
const CONFIG_FILE: &str = "pulse.toml";

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Configuration loader that handles both user and project configs
pub struct ConfigLoader {
    user_config_path: Option<PathBuf>,
    project_config_path: PathBuf,
    explicit_path: Option<PathBuf>,
    env: EnvLookup,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            user_config_path: dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE)),
            project_config_path: PathBuf::from(CONFIG_DIR).join(CONFIG_FILE),
            explicit_path: None,
            env: Box::new(|name| std::env::var(name).ok()),
        }
    }

    /// Load only `path`, skipping the user and project search.
    pub fn with_explicit_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    pub fn with_user_path(mut self, path: Option<PathBuf>) -> Self {
        self.user_config_path = path;
        self
    }

    pub fn with_project_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.project_config_path = path.into();
        self
    }

    /// Replace the environment used for `${VAR}` expansion and overrides.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    pub fn user_config_path(&self) -> Option<&Path> {
        self.user_config_path.as_deref()
    }

    pub fn project_config_path(&self) -> &Path {
        &self.project_config_path
    }

    /// Files consulted, in merge order.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        match &self.explicit_path {
            Some(path) => vec![path.clone()],
            None => self
                .user_config_path
                .iter()
                .cloned()
                .chain(std::iter::once(self.project_config_path.clone()))
                .collect(),
        }
    }

    /// Load the effective configuration.
    ///
    /// Missing search-path files are skipped; a missing explicit file, an
    /// unreadable file or invalid TOML is an error.
    pub async fn load(&self) -> Result<PulseConfig> {
        let mut merged = Value::Table(toml::map::Map::new());

        for path in self.search_paths() {
            match self.read_file(&path).await? {
                Some(value) => {
                    debug!(path = %path.display(), "Loaded config file");
                    deep_merge(&mut merged, &value);
                }
                None => debug!(path = %path.display(), "Config file not found"),
            }
        }

        expand_variables(&mut merged, &self.env)?;

        let mut config: PulseConfig = merged
            .try_into()
            .map_err(|e| PulseError::Config(format!("invalid configuration: {}", e)))?;
        self.apply_env_overrides(&mut config);

        info!("Configuration loaded");
        Ok(config)
    }

    async fn read_file(&self, path: &Path) -> Result<Option<Value>> {
        if !path.exists() {
            if self.explicit_path.is_some() {
                return Err(PulseError::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Ok(None);
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            PulseError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let value = content.parse::<Value>().map_err(|e| {
            PulseError::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        Ok(Some(value))
    }

    fn apply_env_overrides(&self, config: &mut PulseConfig) {
        let env = |name: &str| (self.env)(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = env("PULSE_TRACKER_URL") {
            debug!("Tracker URL overridden from environment");
            config.tracker.url = url;
        }
        if let Some(url) = env("PULSE_DIRECTORY_URL") {
            debug!("Directory URL overridden from environment");
            config.directory.url = url;
            config.directory.enabled = true;
        }
        if let Some(url) = env("PULSE_SUMMARIZER_URL") {
            debug!("Summarizer URL overridden from environment");
            config.summarizer.base_url = url;
        }
        if let Some(level) = env("PULSE_LOG_LEVEL") {
            config.logging.level = level.to_lowercase();
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Merge `other` into `base`; tables merge recursively, anything else is replaced.
pub fn deep_merge(base: &mut Value, other: &Value) {
    match (base, other) {
        (Value::Table(base_map), Value::Table(other_map)) => {
            for (key, other_value) in other_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, other_value),
                    None => {
                        base_map.insert(key.clone(), other_value.clone());
                    }
                }
            }
        }
        (base, other) => *base = other.clone(),
    }
}

fn expand_variables(value: &mut Value, env: &EnvLookup) -> Result<()> {
    let re = Regex::new(r"\$\{([^:}]+)(?::([^}]*))?\}")
        .map_err(|e| PulseError::Config(e.to_string()))?;
    expand_value(value, &re, env);
    Ok(())
}

fn expand_value(value: &mut Value, re: &Regex, env: &EnvLookup) {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = expand_env_in_string(s, re, env);
            }
        }
        Value::Table(map) => map.iter_mut().for_each(|(_, v)| expand_value(v, re, env)),
        Value::Array(items) => items.iter_mut().for_each(|v| expand_value(v, re, env)),
        _ => {}
    }
}

fn expand_env_in_string(s: &str, re: &Regex, env: &EnvLookup) -> String {
    re.replace_all(s, |caps: &regex::Captures<'_>| {
        let default = caps.get(2).map(|m| m.as_str()).unwrap_or("");
        env(&caps[1]).unwrap_or_else(|| default.to_string())
    })
    .into_owned()
}
