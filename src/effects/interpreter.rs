//! Effect interpreter traits.
//!
//! The workflow is generic over these traits so it can run against the real
//! services or against recording mocks in tests.

use std::future::Future;

use super::gerrit::{GerritEffect, GerritResponse};
use super::github::{GitHubEffect, GitHubResponse};

/// Interprets GitHub effects against the GitHub API.
///
/// Implementations are constructed with a `RepoId`, so all effects executed
/// through a single interpreter instance are scoped to that repository.
pub trait GitHubInterpreter {
    /// The error type returned by this interpreter.
    type Error;

    /// Execute a GitHub effect and return its response.
    fn interpret(
        &self,
        effect: GitHubEffect,
    ) -> impl Future<Output = Result<GitHubResponse, Self::Error>> + Send;
}

/// Interprets Gerrit effects against the Gerrit REST API.
pub trait GerritInterpreter {
    /// The error type returned by this interpreter.
    type Error;

    /// Execute a Gerrit effect and return its response.
    fn interpret(
        &self,
        effect: GerritEffect,
    ) -> impl Future<Output = Result<GerritResponse, Self::Error>> + Send;
}
