//! GitHub API client and effect interpreter.
//!
//! This module executes [`crate::effects::GitHubEffect`]s via the octocrab
//! library. Idempotent effects are retried on transient failures; see
//! [`crate::retry`].

mod client;
mod error;
mod interpreter;

pub use client::OctocrabClient;
pub use error::{GitHubApiError, GitHubErrorKind};
pub use interpreter::interpret_github_effect;
