//! Polling GitHub until replicated branches and CI results show up.
//!
//! Nothing pushes these facts to the bridge: Gerrit replicates the patchset
//! ref to GitHub on its own schedule, and CI reports whenever it finishes.
//! Both are therefore awaited by polling.
//!
//! # Polling Strategy
//!
//! - **Branch**: checked immediately, then every `branch_interval`
//! - **Status**: first checked after one `status_interval`, since CI cannot
//!   have reported on a pull request opened a moment ago
//! - **Jitter**: 0-`jitter_percent`% added per key so concurrent workflows
//!   do not poll in lockstep
//! - **Max wait**: optional; absent means poll until cancelled
//!
//! A failed fetch is logged and the poll continues. Every sleep races the
//! cancellation token.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::config::GitHubConfig;
use crate::effects::{GitHubEffect, GitHubInterpreter, GitHubResponse};
use crate::types::CombinedStatus;

/// Default jitter percentage (0-100).
const DEFAULT_JITTER_PERCENT: u8 = 10;

/// Why a poll stopped without producing a value.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PollError {
    /// The shutdown token fired.
    #[error("cancelled")]
    Cancelled,

    /// The configured maximum wait elapsed.
    #[error("gave up waiting for {what} after {waited:?}")]
    TimedOut { what: &'static str, waited: Duration },
}

/// Configuration for branch and status polling.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Interval between branch lookups.
    pub branch_interval: Duration,

    /// Interval between combined status fetches.
    pub status_interval: Duration,

    /// Give up on the branch after this long. `None` polls forever.
    pub branch_max_wait: Option<Duration>,

    /// Give up on CI after this long. `None` polls forever.
    pub status_max_wait: Option<Duration>,

    /// Jitter percentage to add to each interval (0-100).
    pub jitter_percent: u8,
}

impl PollConfig {
    pub fn from_config(github: &GitHubConfig) -> Self {
        PollConfig {
            branch_interval: Duration::from_secs(github.branch_polling_interval),
            status_interval: Duration::from_secs(github.status_polling_interval),
            branch_max_wait: github.branch_max_wait.map(Duration::from_secs),
            status_max_wait: github.status_max_wait.map(Duration::from_secs),
            jitter_percent: DEFAULT_JITTER_PERCENT,
        }
    }

    /// Returns `interval` with jitter added for `key`.
    ///
    /// The jitter is deterministic: the same key always gets the same factor.
    ///
    /// # Formula
    ///
    /// `interval * (1 + (hash(key) % jitter_percent) / 100)`
    pub fn with_jitter(&self, interval: Duration, key: &impl Hash) -> Duration {
        if self.jitter_percent == 0 {
            return interval;
        }
        let mut hasher = std::hash::DefaultHasher::new();
        key.hash(&mut hasher);
        let jitter = (hasher.finish() % self.jitter_percent as u64) as f64 / 100.0;
        Duration::from_secs_f64(interval.as_secs_f64() * (1.0 + jitter))
    }
}

/// Sleeps for `duration` unless cancelled first.
pub async fn sleep_or_cancel(
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<(), PollError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PollError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

fn check_deadline(
    what: &'static str,
    started: Instant,
    max_wait: Option<Duration>,
) -> Result<(), PollError> {
    match max_wait {
        Some(max) if started.elapsed() >= max => Err(PollError::TimedOut {
            what,
            waited: started.elapsed(),
        }),
        _ => Ok(()),
    }
}

/// Polls until `branch` exists on GitHub and returns its tip SHA.
#[tracing::instrument(skip(github, config, cancel))]
pub async fn wait_for_branch<G>(
    github: &G,
    branch: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<String, PollError>
where
    G: GitHubInterpreter,
    G::Error: fmt::Display,
{
    let started = Instant::now();
    let interval = config.with_jitter(config.branch_interval, &branch);
    let mut attempts = 0u32;

    loop {
        if cancel.is_cancelled() {
            return Err(PollError::Cancelled);
        }
        attempts += 1;

        let effect = GitHubEffect::GetBranch {
            name: branch.to_string(),
        };
        match github.interpret(effect).await {
            Ok(GitHubResponse::Branch(Some(sha))) => {
                debug!(attempts, sha = %sha, "Branch replicated");
                return Ok(sha);
            }
            Ok(GitHubResponse::Branch(None)) => trace!(attempts, "Branch not replicated yet"),
            Ok(other) => warn!(response = ?other, "Unexpected response to branch lookup"),
            Err(e) => warn!(attempts, error = %e, "Branch lookup failed, will retry"),
        }

        check_deadline("branch", started, config.branch_max_wait)?;
        sleep_or_cancel(interval, cancel).await?;
    }
}

/// Polls the combined status of `reference` until it leaves `pending`.
///
/// Sleeps before the first fetch.
#[tracing::instrument(skip(github, config, cancel))]
pub async fn wait_for_terminal_status<G>(
    github: &G,
    reference: &str,
    config: &PollConfig,
    cancel: &CancellationToken,
) -> Result<CombinedStatus, PollError>
where
    G: GitHubInterpreter,
    G::Error: fmt::Display,
{
    let started = Instant::now();
    let interval = config.with_jitter(config.status_interval, &reference);
    let mut attempts = 0u32;

    loop {
        sleep_or_cancel(interval, cancel).await?;
        attempts += 1;

        let effect = GitHubEffect::GetCombinedStatus {
            reference: reference.to_string(),
        };
        match github.interpret(effect).await {
            Ok(GitHubResponse::CombinedStatus(status)) if status.state.is_terminal() => {
                debug!(attempts, state = %status.state, "CI finished");
                return Ok(status);
            }
            Ok(GitHubResponse::CombinedStatus(status)) => {
                trace!(attempts, contexts = status.contexts.len(), "CI still pending")
            }
            Ok(other) => warn!(response = ?other, "Unexpected response to status lookup"),
            Err(e) => warn!(attempts, error = %e, "Status lookup failed, will retry"),
        }

        check_deadline("combined status", started, config.status_max_wait)?;
    }
}
