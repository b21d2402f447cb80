//! Configuration management.
//!
//! Configuration is loaded once at startup and validated before any engine
//! code runs. A malformed or incomplete configuration is
//! [`Error::Configuration`](crate::Error::Configuration) and fatal; no
//! partial run is attempted.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::models::{RemoteGroupId, RemoteProjectId, RemoteWorkflowId};
use crate::{Error, Result};

/// Tolerance for the selection-weight sum check.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Environment variable overriding the config file location.
const CONFIG_PATH_ENV: &str = "STAMPSYNC_CONFIG_PATH";

/// Main configuration for stampsync.
#[derive(Debug, Clone)]
pub struct StampsyncConfig {
    /// Path to the local SQLite database.
    pub database_path: PathBuf,
    /// Remote project containing our items and groups.
    pub project_id: RemoteProjectId,
    /// Workflow the priority groups are linked to.
    pub workflow_id: RemoteWorkflowId,
    /// Ordinary group used for plain uploads when no priority placement is
    /// wanted.
    pub default_group_id: Option<RemoteGroupId>,
    /// Number of priority groups partitioning the confidence interval.
    pub num_priority_groups: u32,
    /// Per-bucket selection weights, ascending priority rank order.
    pub selection_weights: Vec<f64>,
    /// Reducer key to workflow task key mapping.
    pub reducers: BTreeMap<String, String>,
    /// Remote catalog API settings.
    pub api: ApiConfig,
    /// Bounded attempt count for transient remote failures.
    pub retry_attempts: u32,
    /// Base backoff between retry attempts, in milliseconds.
    pub retry_backoff_ms: u64,
}

/// Remote catalog API settings.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL of the catalog API.
    pub base_url: String,
    /// Account username.
    pub username: String,
    /// Account password or API token.
    pub password: String,
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFile {
    /// Local database path.
    pub database_path: Option<String>,
    /// Remote project ID.
    pub project_id: Option<i64>,
    /// Remote workflow ID.
    pub workflow_id: Option<i64>,
    /// Default upload group ID.
    pub default_group_id: Option<i64>,
    /// Active-learning section.
    pub active_learning: Option<ConfigFileActiveLearning>,
    /// Reducer key to task key mapping.
    pub reducers: Option<BTreeMap<String, String>>,
    /// API section.
    pub api: Option<ConfigFileApi>,
    /// Retry section.
    pub retry: Option<ConfigFileRetry>,
}

/// Active-learning section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileActiveLearning {
    /// Number of priority groups.
    pub num_priority_groups: Option<u32>,
    /// Selection weights, ascending rank order.
    pub selection_weights: Option<Vec<f64>>,
}

/// API section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileApi {
    /// Base URL.
    pub base_url: Option<String>,
    /// Username.
    pub username: Option<String>,
    /// Password or token.
    pub password: Option<String>,
}

/// Retry section in the config file.
#[derive(Debug, Deserialize, Default)]
pub struct ConfigFileRetry {
    /// Attempt count.
    pub attempts: Option<u32>,
    /// Base backoff in milliseconds.
    pub backoff_ms: Option<u64>,
}

impl Default for StampsyncConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("stampsync.db"),
            project_id: 0,
            workflow_id: 0,
            default_group_id: None,
            num_priority_groups: 3,
            selection_weights: vec![0.75, 0.125, 0.125],
            reducers: BTreeMap::new(),
            api: ApiConfig {
                base_url: "https://www.zooniverse.org/api".to_string(),
                username: String::new(),
                password: String::new(),
            },
            retry_attempts: 3,
            retry_backoff_ms: 250,
        }
    }
}

impl StampsyncConfig {
    /// Loads configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read or parsed.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;

        let file: ConfigFile = toml::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("cannot parse {}: {e}", path.display())))?;

        Ok(Self::from_config_file(file))
    }

    /// Resolves the config path and loads it.
    ///
    /// Checks, in order: the explicit path argument, the
    /// `STAMPSYNC_CONFIG_PATH` environment variable, the platform config dir
    /// (`~/.config/stampsync/config.toml` on Linux). Falls back to defaults
    /// when nothing is found.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when an explicitly named file cannot
    /// be loaded.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        if let Ok(env_path) = std::env::var(CONFIG_PATH_ENV) {
            if !env_path.trim().is_empty() {
                return Self::load_from_file(Path::new(&env_path));
            }
        }

        if let Some(base_dirs) = directories::BaseDirs::new() {
            let platform_config = base_dirs.config_dir().join("stampsync").join("config.toml");
            if platform_config.exists() {
                return Self::load_from_file(&platform_config);
            }
        }

        Ok(Self::default())
    }

    /// Converts a `ConfigFile` to `StampsyncConfig`.
    fn from_config_file(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(path) = file.database_path {
            config.database_path = PathBuf::from(path);
        }
        if let Some(id) = file.project_id {
            config.project_id = id;
        }
        if let Some(id) = file.workflow_id {
            config.workflow_id = id;
        }
        config.default_group_id = file.default_group_id;
        if let Some(al) = file.active_learning {
            if let Some(n) = al.num_priority_groups {
                config.num_priority_groups = n;
            }
            if let Some(weights) = al.selection_weights {
                config.selection_weights = weights;
            }
        }
        if let Some(reducers) = file.reducers {
            config.reducers = reducers;
        }
        if let Some(api) = file.api {
            if let Some(url) = api.base_url {
                config.api.base_url = url;
            }
            if let Some(username) = api.username {
                config.api.username = username;
            }
            if let Some(password) = api.password {
                config.api.password = password;
            }
        }
        if let Some(retry) = file.retry {
            if let Some(attempts) = retry.attempts {
                config.retry_attempts = attempts;
            }
            if let Some(backoff) = retry.backoff_ms {
                config.retry_backoff_ms = backoff;
            }
        }

        config
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] on the first malformed field. Nothing
    /// runs against an unvalidated configuration.
    pub fn validate(&self) -> Result<()> {
        if self.project_id <= 0 {
            return Err(Error::Configuration("project_id must be set".to_string()));
        }
        if self.workflow_id <= 0 {
            return Err(Error::Configuration("workflow_id must be set".to_string()));
        }
        if self.num_priority_groups == 0 {
            return Err(Error::Configuration(
                "active_learning.num_priority_groups must be >= 1".to_string(),
            ));
        }
        if self.selection_weights.len() != self.num_priority_groups as usize {
            return Err(Error::Configuration(format!(
                "expected {} selection weights, found {}",
                self.num_priority_groups,
                self.selection_weights.len()
            )));
        }
        let sum: f64 = self.selection_weights.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(Error::Configuration(format!(
                "selection weights must sum to 1, found {sum}"
            )));
        }
        if self.selection_weights.iter().any(|w| *w < 0.0) {
            return Err(Error::Configuration(
                "selection weights must be non-negative".to_string(),
            ));
        }
        Ok(())
    }
}
