//! Pull requests opened by the bridge.

use serde::{Deserialize, Serialize};

use super::ids::PrNumber;

/// A pull request created for one patchset.
///
/// Created once per accepted event and never reused: the workflow that
/// created it either closes it or leaves it for an operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestHandle {
    pub number: PrNumber,
    pub head_ref: String,
    pub base_ref: String,
    pub html_url: String,
}
