//! Mapping a terminal CI state to a review vote.

use thiserror::Error;

use crate::config::VoteConfig;
use crate::types::StatusState;

/// A CI state with no configured vote.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no vote is configured for CI state {0:?}")]
pub struct UnmappedState(pub StatusState);

/// Returns the label value to post for `state`.
///
/// Only `success`, `failure` and `error` have votes. `pending` and
/// unrecognised states are unmapped.
pub fn vote_for(state: &StatusState, votes: &VoteConfig) -> Result<i32, UnmappedState> {
    match state {
        StatusState::Success => Ok(votes.success),
        StatusState::Failure => Ok(votes.failure),
        StatusState::Error => Ok(votes.error),
        StatusState::Pending | StatusState::Other(_) => Err(UnmappedState(state.clone())),
    }
}
