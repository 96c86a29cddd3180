use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::run::ApprovalRules;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub notifications: NotificationEndpoints,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Webhook endpoints for the channel transports. A missing endpoint only
/// matters when a run actually enables that channel.
#[derive(Clone, Debug, Default)]
pub struct NotificationEndpoints {
    pub email_webhook_url: Option<SecretString>,
    pub slack_webhook_url: Option<SecretString>,
    pub teams_webhook_url: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    /// Rules applied when a trigger does not carry its own.
    pub default_rules: ApprovalRules,
    pub max_step_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_backoff_multiplier: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub auto_approve_threshold: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://leaveflow.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            notifications: NotificationEndpoints::default(),
            workflow: WorkflowConfig {
                default_rules: ApprovalRules::default(),
                max_step_retries: 3,
                retry_base_delay_ms: 500,
                retry_backoff_multiplier: 2,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leaveflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(notifications) = patch.notifications {
            if let Some(url) = notifications.email_webhook_url {
                self.notifications.email_webhook_url = Some(url.into());
            }
            if let Some(url) = notifications.slack_webhook_url {
                self.notifications.slack_webhook_url = Some(url.into());
            }
            if let Some(url) = notifications.teams_webhook_url {
                self.notifications.teams_webhook_url = Some(url.into());
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(threshold) = workflow.auto_approve_threshold {
                self.workflow.default_rules.auto_approve_threshold = threshold;
            }
            if let Some(require_hr) = workflow.require_hr_approval {
                self.workflow.default_rules.require_hr_approval = require_hr;
            }
            if let Some(require_manager) = workflow.require_manager_approval {
                self.workflow.default_rules.require_manager_approval = require_manager;
            }
            if let Some(max_retries) = workflow.max_step_retries {
                self.workflow.max_step_retries = max_retries;
            }
            if let Some(delay) = workflow.retry_base_delay_ms {
                self.workflow.retry_base_delay_ms = delay;
            }
            if let Some(multiplier) = workflow.retry_backoff_multiplier {
                self.workflow.retry_backoff_multiplier = multiplier;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEAVEFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEAVEFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("LEAVEFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEAVEFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEAVEFLOW_EMAIL_WEBHOOK_URL") {
            self.notifications.email_webhook_url = Some(value.into());
        }
        if let Some(value) = read_env("LEAVEFLOW_SLACK_WEBHOOK_URL") {
            self.notifications.slack_webhook_url = Some(value.into());
        }
        if let Some(value) = read_env("LEAVEFLOW_TEAMS_WEBHOOK_URL") {
            self.notifications.teams_webhook_url = Some(value.into());
        }

        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_AUTO_APPROVE_THRESHOLD") {
            self.workflow.default_rules.auto_approve_threshold =
                parse_u32("LEAVEFLOW_WORKFLOW_AUTO_APPROVE_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_REQUIRE_MANAGER_APPROVAL") {
            self.workflow.default_rules.require_manager_approval =
                parse_bool("LEAVEFLOW_WORKFLOW_REQUIRE_MANAGER_APPROVAL", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_MAX_STEP_RETRIES") {
            self.workflow.max_step_retries =
                parse_u32("LEAVEFLOW_WORKFLOW_MAX_STEP_RETRIES", &value)?;
        }
        if let Some(value) = read_env("LEAVEFLOW_WORKFLOW_RETRY_BASE_DELAY_MS") {
            self.workflow.retry_base_delay_ms =
                parse_u64("LEAVEFLOW_WORKFLOW_RETRY_BASE_DELAY_MS", &value)?;
        }

        let log_level =
            read_env("LEAVEFLOW_LOGGING_LEVEL").or_else(|| read_env("LEAVEFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEAVEFLOW_LOGGING_FORMAT").or_else(|| read_env("LEAVEFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(threshold) = overrides.auto_approve_threshold {
            self.workflow.default_rules.auto_approve_threshold = threshold;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_notifications(&self.notifications)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leaveflow.toml"), PathBuf::from("config/leaveflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    toml::from_str::<ConfigPatch>(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_notifications(notifications: &NotificationEndpoints) -> Result<(), ConfigError> {
    for (key, url) in [
        ("notifications.email_webhook_url", &notifications.email_webhook_url),
        ("notifications.slack_webhook_url", &notifications.slack_webhook_url),
        ("notifications.teams_webhook_url", &notifications.teams_webhook_url),
    ] {
        if let Some(url) = url {
            let value = url.expose_secret();
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(ConfigError::Validation(format!(
                    "{key} must start with http:// or https://"
                )));
            }
        }
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.max_step_retries > 10 {
        return Err(ConfigError::Validation(
            "workflow.max_step_retries must be at most 10".to_string(),
        ));
    }

    if workflow.retry_base_delay_ms == 0 {
        return Err(ConfigError::Validation(
            "workflow.retry_base_delay_ms must be greater than zero".to_string(),
        ));
    }

    if workflow.retry_backoff_multiplier == 0 {
        return Err(ConfigError::Validation(
            "workflow.retry_backoff_multiplier must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    notifications: Option<NotificationsPatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationsPatch {
    email_webhook_url: Option<String>,
    slack_webhook_url: Option<String>,
    teams_webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    auto_approve_threshold: Option<u32>,
    require_hr_approval: Option<bool>,
    require_manager_approval: Option<bool>,
    max_step_retries: Option<u32>,
    retry_base_delay_ms: Option<u64>,
    retry_backoff_multiplier: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
