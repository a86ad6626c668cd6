//! GitHub effect interpreter using octocrab.
//!
//! This module implements the `GitHubInterpreter` trait, executing GitHub effects
//! against the real GitHub API via octocrab.
//!
//! Key implementation details:
//! - Branch and combined-status lookups use raw REST calls with URL-encoded refs,
//!   since mirrored patchset refs contain slashes
//! - A 404 on a branch lookup means "not replicated yet", not failure
//! - Transient failures are retried only for effects that are safe to repeat

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::effects::{GitHubEffect, GitHubInterpreter, GitHubResponse};
use crate::types::{
    CombinedStatus, CommentId, ContextStatus, PrNumber, PullRequestHandle, RepoId, StatusState,
};

use super::client::OctocrabClient;
use super::error::GitHubApiError;
use crate::retry::{RetryConfig, RetryPolicy, retry_with_backoff};

// ─── Interpreter Implementation ───────────────────────────────────────────────

impl GitHubInterpreter for OctocrabClient {
    type Error = GitHubApiError;

    async fn interpret(&self, effect: GitHubEffect) -> Result<GitHubResponse, Self::Error> {
        interpret_github_effect(self, effect, RetryConfig::DEFAULT).await
    }
}

/// Interprets a GitHub effect, executing it against the GitHub API.
///
/// Creating a pull request or a comment is attempted once: after a timeout
/// or a 5xx GitHub may already have done it, and a second attempt would
/// fail with 422 or post a duplicate.
pub async fn interpret_github_effect(
    client: &OctocrabClient,
    effect: GitHubEffect,
    retry_config: RetryConfig,
) -> Result<GitHubResponse, GitHubApiError> {
    let policy = RetryPolicy::for_idempotence(effect.is_idempotent());
    retry_with_backoff(retry_config, policy, effect.name(), || {
        execute_effect(client, effect.clone())
    })
    .await
}

/// Executes a single effect without retry logic.
async fn execute_effect(
    client: &OctocrabClient,
    effect: GitHubEffect,
) -> Result<GitHubResponse, GitHubApiError> {
    match effect {
        GitHubEffect::GetBranch { name } => get_branch(client, name).await,
        GitHubEffect::GetCombinedStatus { reference } => {
            get_combined_status(client, reference).await
        }
        GitHubEffect::CreatePullRequest {
            title,
            body,
            head,
            base,
        } => create_pull_request(client, title, body, head, base).await,
        GitHubEffect::ClosePullRequest { pr } => close_pull_request(client, pr).await,
        GitHubEffect::PostComment { pr, body } => post_comment(client, pr, body).await,
    }
}

// ─── Branches and Statuses ────────────────────────────────────────────────────

fn branch_path(repo: &RepoId, branch: &str) -> String {
    format!(
        "/repos/{}/{}/branches/{}",
        repo.owner,
        repo.repo,
        urlencoding::encode(branch)
    )
}

fn combined_status_path(repo: &RepoId, reference: &str) -> String {
    format!(
        "/repos/{}/{}/commits/{}/status",
        repo.owner,
        repo.repo,
        urlencoding::encode(reference)
    )
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
struct BranchCommit {
    sha: String,
}

async fn get_branch(
    client: &OctocrabClient,
    name: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let url = branch_path(client.repo(), &name);
    let result: Result<BranchResponse, _> = client.inner().get(&url, None::<&()>).await;

    match result {
        Ok(branch) => Ok(GitHubResponse::Branch(Some(branch.commit.sha))),
        Err(e) => {
            let err = GitHubApiError::from_octocrab(e);
            if err.is_not_found() {
                tracing::trace!(branch = %name, "Branch not present yet");
                Ok(GitHubResponse::Branch(None))
            } else {
                Err(err)
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct CombinedStatusResponse {
    state: String,
    #[serde(default)]
    statuses: Vec<StatusResponse>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    context: String,
    state: String,
    description: Option<String>,
    target_url: Option<String>,
}

/// Converts GitHub's combined status payload into the domain type.
///
/// GitHub lists the latest status per context, so each context appears once.
fn combined_status_from_response(response: CombinedStatusResponse) -> CombinedStatus {
    let contexts: BTreeMap<String, ContextStatus> = response
        .statuses
        .into_iter()
        .map(|s| {
            (
                s.context,
                ContextStatus {
                    state: StatusState::from(s.state),
                    description: s.description.filter(|d| !d.is_empty()),
                    target_url: s.target_url.filter(|u| !u.is_empty()),
                },
            )
        })
        .collect();

    CombinedStatus {
        state: StatusState::from(response.state),
        contexts,
    }
}

async fn get_combined_status(
    client: &OctocrabClient,
    reference: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let url = combined_status_path(client.repo(), &reference);
    let result: Result<CombinedStatusResponse, _> = client.inner().get(&url, None::<&()>).await;

    match result {
        Ok(response) => Ok(GitHubResponse::CombinedStatus(
            combined_status_from_response(response),
        )),
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}

// ─── Pull Requests ────────────────────────────────────────────────────────────

async fn create_pull_request(
    client: &OctocrabClient,
    title: String,
    body: String,
    head: String,
    base: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let result = client
        .inner()
        .pulls(client.owner(), client.repo_name())
        .create(title, head, base)
        .body(body)
        .send()
        .await;

    match result {
        Ok(pull) => Ok(GitHubResponse::PullRequestCreated(PullRequestHandle {
            number: PrNumber(pull.number),
            head_ref: pull.head.ref_field,
            base_ref: pull.base.ref_field,
            html_url: pull.html_url.map(|u| u.to_string()).unwrap_or_default(),
        })),
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}

async fn close_pull_request(
    client: &OctocrabClient,
    pr: PrNumber,
) -> Result<GitHubResponse, GitHubApiError> {
    let result = client
        .inner()
        .pulls(client.owner(), client.repo_name())
        .update(pr.0)
        .state(octocrab::params::pulls::State::Closed)
        .send()
        .await;

    match result {
        Ok(_) => Ok(GitHubResponse::PullRequestClosed),
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}

// ─── Comments ─────────────────────────────────────────────────────────────────

async fn post_comment(
    client: &OctocrabClient,
    pr: PrNumber,
    body: String,
) -> Result<GitHubResponse, GitHubApiError> {
    let result = client
        .inner()
        .issues(client.owner(), client.repo_name())
        .create_comment(pr.0, body)
        .await;

    match result {
        Ok(comment) => Ok(GitHubResponse::CommentPosted {
            id: CommentId(comment.id.into_inner()),
        }),
        Err(e) => Err(GitHubApiError::from_octocrab(e)),
    }
}
