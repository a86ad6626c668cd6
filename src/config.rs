//! Configuration file loading.
//!
//! The bridge is configured by a single JSON document with one section per
//! collaborator. Secrets may be supplied through the environment instead of
//! the file so that the file can be checked in:
//!
//! - `GERRIT_BRIDGE_GITHUB_TOKEN` overrides `github.api-token`
//! - `GERRIT_BRIDGE_GERRIT_PASSWORD` overrides `gerrit.password`
//! - `GERRIT_BRIDGE_AMQP_PASSWORD` overrides `amqp.password`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

const GITHUB_TOKEN_ENV: &str = "GERRIT_BRIDGE_GITHUB_TOKEN";
const GERRIT_PASSWORD_ENV: &str = "GERRIT_BRIDGE_GERRIT_PASSWORD";
const AMQP_PASSWORD_ENV: &str = "GERRIT_BRIDGE_AMQP_PASSWORD";

/// Errors loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// The complete configuration document.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Also read from `gotrap`, the section name older configs use.
    #[serde(default, alias = "gotrap")]
    pub bridge: BridgeConfig,
    pub github: GitHubConfig,
    pub amqp: AmqpConfig,
    pub gerrit: GerritConfig,
}

/// When a delivery is acknowledged to the broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AckPolicy {
    /// Acknowledge as soon as a worker slot is reserved for the delivery.
    /// A crash mid-workflow loses the event.
    #[default]
    OnReceipt,

    /// Acknowledge after the workflow reached a terminal step.
    AfterCompletion,
}

/// Process-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct BridgeConfig {
    /// Maximum number of workflows running at the same time.
    pub concurrent: usize,
    pub ack_policy: AckPolicy,
    pub reconnect: ReconnectConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        BridgeConfig {
            concurrent: 4,
            ack_policy: AckPolicy::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Backoff between broker reconnection attempts.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ReconnectConfig {
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Jitter percentage (0-100) added on top of each delay.
    pub jitter_percent: u8,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfig {
            initial_delay_ms: 500,
            max_delay_ms: 60_000,
            jitter_percent: 20,
        }
    }
}

/// GitHub repository, credentials, templates and polling.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitHubConfig {
    #[serde(default)]
    pub api_token: String,
    pub organisation: String,
    pub repository: String,

    /// Seconds between branch lookups while waiting for replication.
    #[serde(alias = "branch-polling-intervall", default = "default_polling_interval")]
    pub branch_polling_interval: u64,

    /// Seconds between combined status fetches.
    #[serde(alias = "status-polling-intervall", default = "default_polling_interval")]
    pub status_polling_interval: u64,

    /// Give up waiting for the branch after this many seconds. Unbounded if absent.
    #[serde(default)]
    pub branch_max_wait: Option<u64>,

    /// Give up waiting for CI after this many seconds. Unbounded if absent.
    #[serde(default)]
    pub status_max_wait: Option<u64>,

    pub pull_request: PullRequestTemplate,

    /// Lines of the comment posted on the pull request before it is closed.
    #[serde(default = "default_close_comment")]
    pub close_comment: Vec<String>,
}

fn default_polling_interval() -> u64 {
    30
}

fn default_close_comment() -> Vec<String> {
    vec![
        "This PR will be closed, because the test results were reported back to Gerrit. \
         See [{{change.subject}}]({{change.url}}) for details."
            .to_string(),
    ]
}

/// Title and body templates for created pull requests.
#[derive(Debug, Clone, Deserialize)]
pub struct PullRequestTemplate {
    pub title: String,
    #[serde(default)]
    pub body: Vec<String>,
}

/// AMQP broker connection and topology.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AmqpConfig {
    pub host: String,
    #[serde(default = "default_amqp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_vhost")]
    pub vhost: String,
    pub exchange: String,
    pub queue: String,
    #[serde(default)]
    pub routing_key: String,
    /// Consumer tag.
    #[serde(default)]
    pub identifier: String,
    /// Channel prefetch limit. Defaults to the bridge's concurrency.
    #[serde(default)]
    pub prefetch: Option<u16>,
}

fn default_amqp_port() -> u16 {
    5672
}

fn default_vhost() -> String {
    "/".to_string()
}

impl AmqpConfig {
    /// Builds the `amqp://` URI, percent-encoding credentials and vhost.
    pub fn uri(&self) -> String {
        let credentials = if self.username.is_empty() {
            String::new()
        } else {
            format!(
                "{}:{}@",
                urlencoding::encode(&self.username),
                urlencoding::encode(&self.password)
            )
        };
        format!(
            "amqp://{}{}:{}/{}",
            credentials,
            self.host,
            self.port,
            urlencoding::encode(&self.vhost)
        )
    }
}

/// Gerrit server, credentials, filters and review reporting.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GerritConfig {
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(flatten)]
    pub filter: FilterConfig,
    /// Lines of the review message template.
    #[serde(default)]
    pub comment: Vec<String>,
    /// Review label the vote is posted on.
    #[serde(default = "default_label")]
    pub label: String,
    #[serde(default)]
    pub votes: VoteConfig,
}

fn default_label() -> String {
    "Verified".to_string()
}

/// Which changes are tracked.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FilterConfig {
    /// Project name to branch allow-list. An empty branch map allows every branch.
    #[serde(default)]
    pub projects: HashMap<String, HashMap<String, bool>>,
    /// Regular expressions; a change whose subject matches any of them is skipped.
    #[serde(default)]
    pub exclude_pattern: Vec<String>,
}

/// Label values posted for each terminal CI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VoteConfig {
    pub success: i32,
    pub failure: i32,
    pub error: i32,
}

impl Default for VoteConfig {
    fn default() -> Self {
        VoteConfig {
            success: 0,
            failure: -1,
            error: 0,
        }
    }
}

impl Config {
    /// Loads, applies environment overrides, and validates a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_json(&contents)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parses a config document without overrides or validation.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Replaces secrets with values from the environment, where present.
    ///
    /// Empty or whitespace-only values are ignored.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = lookup(GITHUB_TOKEN_ENV) {
            self.github.api_token = token;
        }
        if let Some(password) = lookup(GERRIT_PASSWORD_ENV) {
            self.gerrit.password = password;
        }
        if let Some(password) = lookup(AMQP_PASSWORD_ENV) {
            self.amqp.password = password;
        }
    }

    /// Rejects configurations the bridge cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bridge.concurrent == 0 {
            return Err(ConfigError::Invalid(
                "bridge.concurrent must be at least 1".to_string(),
            ));
        }
        if self.github.api_token.trim().is_empty() {
            return Err(ConfigError::Invalid(format!(
                "github.api-token is required (or set {GITHUB_TOKEN_ENV})"
            )));
        }
        if self.github.branch_polling_interval == 0 || self.github.status_polling_interval == 0 {
            return Err(ConfigError::Invalid(
                "github polling intervals must be at least one second".to_string(),
            ));
        }
        if self.gerrit.filter.projects.is_empty() {
            tracing::warn!("gerrit.projects is empty; every event will be skipped");
        }
        Ok(())
    }
}
