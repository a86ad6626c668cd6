//! Gerrit REST effect types.

use serde::{Deserialize, Serialize};

use crate::types::{ChangeId, ChangeStatus, Sha};

/// A Gerrit REST API effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GerritEffect {
    /// Fetch a change with its current revision.
    GetChange { change_id: ChangeId },

    /// Post a review message and a label vote on one revision.
    PostReview {
        change_id: ChangeId,
        revision: Sha,
        message: String,
        label: String,
        vote: i32,
    },
}

impl GerritEffect {
    pub fn name(&self) -> &'static str {
        match self {
            GerritEffect::GetChange { .. } => "get_change",
            GerritEffect::PostReview { .. } => "post_review",
        }
    }

    /// Gerrit keeps one vote per reviewer and label, so repeating a review
    /// can at worst repeat its message. Both effects are retried.
    pub fn is_idempotent(&self) -> bool {
        match self {
            GerritEffect::GetChange { .. } | GerritEffect::PostReview { .. } => true,
        }
    }
}

/// Response from a Gerrit effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum GerritResponse {
    /// Response to `GetChange`.
    Change(ChangeStatus),

    /// Response to `PostReview`.
    ReviewPosted,
}
