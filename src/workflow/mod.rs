//! The per-event workflow: from a broker payload to a review vote.
//!
//! ```text
//! decode ─► patchset-created? ─► filter ─► fetch change ─► fresh?
//!                                                            │
//!   close ◄─ comment ◄─ post review ◄─ vote ◄─ poll CI ◄─ create PR ◄─ wait for branch
//! ```
//!
//! Every step before the pull request exists either continues or stops
//! without side effects. Once the pull request exists, a failure stops the
//! workflow and leaves the pull request open for an operator. The closing
//! comment and the close itself are best-effort and independent of each
//! other.
//!
//! Each remote call is one effect handed to an interpreter, so tests can
//! assert the exact sequence of calls. Interpreters retry single calls where
//! repeating them is safe; the workflow itself never repeats an effect.

mod vote;


use std::fmt;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, VoteConfig};
use crate::effects::{
    GerritEffect, GerritInterpreter, GerritResponse, GitHubEffect, GitHubInterpreter,
    GitHubResponse,
};
use crate::filter::{FilterChain, FilterDecision, RejectReason, check_freshness};
use crate::template::{TemplateVars, Templates};
use crate::types::{
    ChangeEvent, ChangeStatus, CombinedStatus, EventKind, PatchsetCreated, PullRequestHandle,
    StatusState,
};
use crate::worker::{
    Disposition, EventHandler, PollConfig, PollError, wait_for_branch, wait_for_terminal_status,
};

pub use vote::{UnmappedState, vote_for};

/// The step a workflow was on when it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchChange,
    WaitForBranch,
    CreatePullRequest,
    WaitForStatus,
    PostReview,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::FetchChange => "fetch_change",
            Stage::WaitForBranch => "wait_for_branch",
            Stage::CreatePullRequest => "create_pull_request",
            Stage::WaitForStatus => "wait_for_status",
            Stage::PostReview => "post_review",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("Gerrit {effect} failed: {message}")]
    Gerrit {
        effect: &'static str,
        message: String,
    },

    #[error("GitHub {effect} failed: {message}")]
    GitHub {
        effect: &'static str,
        message: String,
    },

    #[error(transparent)]
    Poll(#[from] PollError),

    /// The interpreter answered with the wrong response variant.
    #[error("unexpected response to {effect}")]
    UnexpectedResponse { effect: &'static str },
}

/// What a workflow run ended with. Used for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// The payload could not be decoded.
    Dropped { reason: String },

    /// Not a patchset-created event.
    Ignored { kind: EventKind },

    /// A filter or freshness check said no. Nothing was changed anywhere.
    Rejected(RejectReason),

    /// A step failed. If a pull request was created it stays open.
    Failed {
        stage: Stage,
        pr: Option<PullRequestHandle>,
        error: WorkflowError,
    },

    /// CI ended in a state with no configured vote. The pull request stays
    /// open and nothing is reported to Gerrit.
    Unmapped {
        pr: PullRequestHandle,
        state: StatusState,
    },

    /// The vote was posted. `closed` reports whether closing the pull
    /// request succeeded.
    Completed {
        pr: PullRequestHandle,
        vote: i32,
        closed: bool,
    },
}

impl WorkflowOutcome {
    /// Shutdown cancelling a poll is the only way a run stops short of an
    /// end state. Everything else, failures included, is final.
    pub fn disposition(&self) -> Disposition {
        match self {
            WorkflowOutcome::Failed {
                error: WorkflowError::Poll(PollError::Cancelled),
                ..
            } => Disposition::Interrupted,
            _ => Disposition::Settled,
        }
    }
}

/// Runs the bridge workflow against a pair of interpreters.
pub struct Workflow<G, R> {
    github: G,
    gerrit: R,
    filter: FilterChain,
    templates: Templates,
    poll: PollConfig,
    label: String,
    votes: VoteConfig,
}

impl<G, R> Workflow<G, R>
where
    G: GitHubInterpreter + Sync,
    G::Error: fmt::Display,
    R: GerritInterpreter + Sync,
    R::Error: fmt::Display,
{
    pub fn new(github: G, gerrit: R, config: &Config) -> Self {
        Workflow {
            github,
            gerrit,
            filter: FilterChain::new(&config.gerrit.filter),
            templates: Templates::from_config(&config.github, &config.gerrit),
            poll: PollConfig::from_config(&config.github),
            label: config.gerrit.label.clone(),
            votes: config.gerrit.votes,
        }
    }

    /// Runs the workflow for one raw broker payload.
    pub async fn run(&self, payload: &[u8], cancel: &CancellationToken) -> WorkflowOutcome {
        let event = match ChangeEvent::decode(payload) {
            Ok(event) => event,
            Err(e) => {
                return WorkflowOutcome::Dropped {
                    reason: e.to_string(),
                };
            }
        };

        let kind = event.kind.clone();
        match event.into_patchset_created() {
            Ok(Some(event)) => self.process(&event, cancel).await,
            Ok(None) => WorkflowOutcome::Ignored { kind },
            Err(e) => WorkflowOutcome::Dropped {
                reason: e.to_string(),
            },
        }
    }

    #[instrument(
        skip_all,
        fields(change = %event.change.url, patchset = %event.patch_set.number)
    )]
    async fn process(
        &self,
        event: &PatchsetCreated,
        cancel: &CancellationToken,
    ) -> WorkflowOutcome {
        info!(
            project = %event.change.project,
            branch = %event.change.branch,
            git_ref = %event.patch_set.git_ref,
            "New patchset"
        );

        if let FilterDecision::Reject(reason) = self.filter.should_process(&event.change) {
            return WorkflowOutcome::Rejected(reason);
        }

        let status = match self.fetch_change(event).await {
            Ok(status) => status,
            Err(error) => return failed(Stage::FetchChange, None, error),
        };
        if let Err(reason) = check_freshness(&status, event.patch_set.number) {
            return WorkflowOutcome::Rejected(reason);
        }

        let head = event.head_branch();
        if let Err(e) = wait_for_branch(&self.github, head, &self.poll, cancel).await {
            return failed(Stage::WaitForBranch, None, e.into());
        }

        let pr = match self.create_pull_request(event).await {
            Ok(pr) => pr,
            Err(error) => return failed(Stage::CreatePullRequest, None, error),
        };
        info!(pr = %pr.html_url, "Pull request created");

        let combined =
            match wait_for_terminal_status(&self.github, &pr.head_ref, &self.poll, cancel).await {
                Ok(combined) => combined,
                Err(e) => return failed(Stage::WaitForStatus, Some(pr), e.into()),
            };

        let vote = match vote_for(&combined.state, &self.votes) {
            Ok(vote) => vote,
            Err(UnmappedState(state)) => {
                return WorkflowOutcome::Unmapped { pr, state };
            }
        };

        if let Err(error) = self.post_review(event, &combined, &pr, vote).await {
            return failed(Stage::PostReview, Some(pr), error);
        }
        info!(pr = %pr.html_url, state = %combined.state, vote, "Review posted");

        let closed = self.close_pull_request(event, &pr).await;
        WorkflowOutcome::Completed { pr, vote, closed }
    }

    async fn fetch_change(&self, event: &PatchsetCreated) -> Result<ChangeStatus, WorkflowError> {
        let effect = GerritEffect::GetChange {
            change_id: event.change.id.clone(),
        };
        match self.interpret_gerrit(effect).await? {
            GerritResponse::Change(status) => Ok(status),
            _ => Err(WorkflowError::UnexpectedResponse {
                effect: "get_change",
            }),
        }
    }

    async fn create_pull_request(
        &self,
        event: &PatchsetCreated,
    ) -> Result<PullRequestHandle, WorkflowError> {
        let vars = TemplateVars::for_event(event);
        let effect = GitHubEffect::CreatePullRequest {
            title: self.templates.pr_title.render(&vars),
            body: self.templates.pr_body.render(&vars),
            head: event.head_branch().to_string(),
            base: event.change.branch.clone(),
        };
        match self.interpret_github(effect).await? {
            GitHubResponse::PullRequestCreated(pr) => Ok(pr),
            _ => Err(WorkflowError::UnexpectedResponse {
                effect: "create_pull_request",
            }),
        }
    }

    async fn post_review(
        &self,
        event: &PatchsetCreated,
        combined: &CombinedStatus,
        pr: &PullRequestHandle,
        vote: i32,
    ) -> Result<(), WorkflowError> {
        let vars = Templates::review_vars(event, combined, pr);
        let effect = GerritEffect::PostReview {
            change_id: event.change.id.clone(),
            revision: event.patch_set.revision.clone(),
            message: self.templates.review_comment.render(&vars),
            label: self.label.clone(),
            vote,
        };
        match self.interpret_gerrit(effect).await? {
            GerritResponse::ReviewPosted => Ok(()),
            _ => Err(WorkflowError::UnexpectedResponse {
                effect: "post_review",
            }),
        }
    }

    /// Comments on and closes the pull request. Either may fail without
    /// affecting the other. Returns whether the close succeeded.
    async fn close_pull_request(&self, event: &PatchsetCreated, pr: &PullRequestHandle) -> bool {
        let vars = Templates::close_vars(event, pr);
        let comment = GitHubEffect::PostComment {
            pr: pr.number,
            body: self.templates.close_comment.render(&vars),
        };
        match self.interpret_github(comment).await {
            Ok(_) => debug!(pr = %pr.html_url, "Closing comment posted"),
            Err(e) => warn!(pr = %pr.html_url, error = %e, "Failed to post closing comment"),
        }

        let close = GitHubEffect::ClosePullRequest { pr: pr.number };
        match self.interpret_github(close).await {
            Ok(_) => {
                info!(pr = %pr.html_url, "Pull request closed");
                true
            }
            Err(e) => {
                warn!(pr = %pr.html_url, error = %e, "Failed to close pull request");
                false
            }
        }
    }

    async fn interpret_github(&self, effect: GitHubEffect) -> Result<GitHubResponse, WorkflowError> {
        let name = effect.name();
        self.github
            .interpret(effect)
            .await
            .map_err(|e| WorkflowError::GitHub {
                effect: name,
                message: e.to_string(),
            })
    }

    async fn interpret_gerrit(&self, effect: GerritEffect) -> Result<GerritResponse, WorkflowError> {
        let name = effect.name();
        self.gerrit
            .interpret(effect)
            .await
            .map_err(|e| WorkflowError::Gerrit {
                effect: name,
                message: e.to_string(),
            })
    }
}

fn failed(stage: Stage, pr: Option<PullRequestHandle>, error: WorkflowError) -> WorkflowOutcome {
    WorkflowOutcome::Failed { stage, pr, error }
}

/// Logs an outcome at a level matching its severity.
pub fn log_outcome(outcome: &WorkflowOutcome) {
    match outcome {
        WorkflowOutcome::Dropped { reason } => warn!(reason = %reason, "Dropped undecodable event"),
        WorkflowOutcome::Ignored { kind } => debug!(kind = %kind, "Skipped event"),
        WorkflowOutcome::Rejected(reason) => info!(reason = %reason, "Patchset skipped"),
        WorkflowOutcome::Failed {
            stage,
            pr,
            error: WorkflowError::Poll(PollError::Cancelled),
        } => info!(
            stage = %stage,
            pr = pr.as_ref().map(|pr| pr.html_url.as_str()),
            "Workflow cancelled"
        ),
        WorkflowOutcome::Failed { stage, pr, error } => warn!(
            stage = %stage,
            pr = pr.as_ref().map(|pr| pr.html_url.as_str()),
            error = %error,
            "Workflow failed"
        ),
        WorkflowOutcome::Unmapped { pr, state } => warn!(
            pr = %pr.html_url,
            state = %state,
            "No vote configured for CI state, leaving pull request open"
        ),
        WorkflowOutcome::Completed { pr, vote, closed } => {
            info!(pr = %pr.html_url, vote, closed, "Workflow completed")
        }
    }
}

impl<G, R> EventHandler for Workflow<G, R>
where
    G: GitHubInterpreter + Send + Sync + 'static,
    G::Error: fmt::Display + Send,
    R: GerritInterpreter + Send + Sync + 'static,
    R::Error: fmt::Display + Send,
{
    async fn handle(&self, payload: &[u8], cancel: &CancellationToken) -> Disposition {
        let outcome = self.run(payload, cancel).await;
        log_outcome(&outcome);
        outcome.disposition()
    }
}
