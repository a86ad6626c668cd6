//! GitHub API effect types.
//!
//! These types describe the GitHub operations a workflow performs, without
//! executing them. [`crate::github::OctocrabClient`] executes them
//! against the real API; tests substitute a recording interpreter.

use serde::{Deserialize, Serialize};

use crate::types::{CombinedStatus, CommentId, PrNumber, PullRequestHandle};

/// A GitHub API effect.
///
/// Effects are repo-scoped: the interpreter is constructed with a `RepoId`,
/// so effects don't include it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GitHubEffect {
    // ─── Queries ──────────────────────────────────────────────────────────────
    /// Look up a branch by name.
    GetBranch { name: String },

    /// Fetch the combined commit status of a ref.
    GetCombinedStatus { reference: String },

    // ─── Pull Requests ────────────────────────────────────────────────────────
    /// Open a pull request from `head` into `base`.
    CreatePullRequest {
        title: String,
        body: String,
        head: String,
        base: String,
    },

    /// Close a pull request without merging it.
    ClosePullRequest { pr: PrNumber },

    // ─── Comments ─────────────────────────────────────────────────────────────
    /// Post a new comment on a pull request.
    PostComment { pr: PrNumber, body: String },
}

impl GitHubEffect {
    /// Short name used in logs and failure reports.
    pub fn name(&self) -> &'static str {
        match self {
            GitHubEffect::GetBranch { .. } => "get_branch",
            GitHubEffect::GetCombinedStatus { .. } => "get_combined_status",
            GitHubEffect::CreatePullRequest { .. } => "create_pull_request",
            GitHubEffect::ClosePullRequest { .. } => "close_pull_request",
            GitHubEffect::PostComment { .. } => "post_comment",
        }
    }

    /// Whether performing the effect twice leaves GitHub as performing it
    /// once would. Only idempotent effects are retried.
    pub fn is_idempotent(&self) -> bool {
        match self {
            GitHubEffect::GetBranch { .. }
            | GitHubEffect::GetCombinedStatus { .. }
            | GitHubEffect::ClosePullRequest { .. } => true,
            GitHubEffect::CreatePullRequest { .. } | GitHubEffect::PostComment { .. } => false,
        }
    }
}

/// Response from a GitHub effect.
///
/// Each variant corresponds to the response from a particular effect type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GitHubResponse {
    /// Response to `GetBranch`. `None` when the branch does not exist yet;
    /// otherwise the SHA at its tip.
    Branch(Option<String>),

    /// Response to `GetCombinedStatus`.
    CombinedStatus(CombinedStatus),

    /// Response to `CreatePullRequest`.
    PullRequestCreated(PullRequestHandle),

    /// Response to `ClosePullRequest`.
    PullRequestClosed,

    /// Response to `PostComment`.
    CommentPosted {
        /// The ID of the newly created comment.
        id: CommentId,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusState;

    #[test]
    fn effect_serializes_with_type_tag() {
        let effect = GitHubEffect::PostComment {
            pr: PrNumber(7),
            body: "closing".to_string(),
        };
        let json = serde_json::to_value(&effect).unwrap();
        assert_eq!(json["type"], "post_comment");
        assert_eq!(json["pr"], 7);
    }

    #[test]
    fn response_roundtrips_through_json() {
        let response = GitHubResponse::CombinedStatus(CombinedStatus {
            state: StatusState::Success,
            contexts: Default::default(),
        });
        let json = serde_json::to_string(&response).unwrap();
        let parsed: GitHubResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn names_are_distinct() {
        let effects = [
            GitHubEffect::GetBranch { name: "b".into() },
            GitHubEffect::GetCombinedStatus {
                reference: "b".into(),
            },
            GitHubEffect::CreatePullRequest {
                title: String::new(),
                body: String::new(),
                head: "h".into(),
                base: "b".into(),
            },
            GitHubEffect::ClosePullRequest { pr: PrNumber(1) },
            GitHubEffect::PostComment {
                pr: PrNumber(1),
                body: String::new(),
            },
        ];
        let names: std::collections::HashSet<_> = effects.iter().map(|e| e.name()).collect();
        assert_eq!(names.len(), effects.len());
    }

    #[test]
    fn creating_effects_are_not_idempotent() {
        let create = GitHubEffect::CreatePullRequest {
            title: String::new(),
            body: String::new(),
            head: "h".into(),
            base: "b".into(),
        };
        let comment = GitHubEffect::PostComment {
            pr: PrNumber(1),
            body: String::new(),
        };
        assert!(!create.is_idempotent());
        assert!(!comment.is_idempotent());
        assert!(GitHubEffect::GetBranch { name: "b".into() }.is_idempotent());
        assert!(GitHubEffect::ClosePullRequest { pr: PrNumber(1) }.is_idempotent());
    }
}
