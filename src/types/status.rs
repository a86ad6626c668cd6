//! Combined commit status reported by CI services on GitHub.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// State of a combined status or of a single status context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusState {
    /// The latest status for every context is success.
    Success,
    /// Some context reported failure.
    Failure,
    /// Some context reported an error.
    Error,
    /// No statuses yet, or a context is still running.
    Pending,
    /// A state GitHub has not documented; kept verbatim.
    Other(String),
}

impl StatusState {
    /// Returns true unless the state is `pending`.
    ///
    /// Unrecognised states are terminal: polling on them would never end.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusState::Pending)
    }

    pub fn as_api_str(&self) -> &str {
        match self {
            StatusState::Success => "success",
            StatusState::Failure => "failure",
            StatusState::Error => "error",
            StatusState::Pending => "pending",
            StatusState::Other(s) => s,
        }
    }
}

impl From<String> for StatusState {
    fn from(s: String) -> Self {
        match s.as_str() {
            "success" => StatusState::Success,
            "failure" => StatusState::Failure,
            "error" => StatusState::Error,
            "pending" => StatusState::Pending,
            _ => StatusState::Other(s),
        }
    }
}

impl From<StatusState> for String {
    fn from(state: StatusState) -> Self {
        state.as_api_str().to_string()
    }
}

impl fmt::Display for StatusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_api_str())
    }
}

/// One CI context's contribution to the combined status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextStatus {
    pub state: StatusState,
    pub description: Option<String>,
    pub target_url: Option<String>,
}

/// The combined status for a ref, keyed by context name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinedStatus {
    pub state: StatusState,
    pub contexts: BTreeMap<String, ContextStatus>,
}

impl CombinedStatus {
    /// A status with no contexts reported yet.
    pub fn pending() -> Self {
        CombinedStatus {
            state: StatusState::Pending,
            contexts: BTreeMap::new(),
        }
    }

    /// Renders the per-context details for the review comment.
    ///
    /// One block per context, in context-name order:
    ///
    /// ```text
    /// Service: continuous-integration/travis-ci/pr
    /// State: success
    /// Description: The Travis CI build passed
    /// URL: https://travis-ci.org/...
    /// ```
    pub fn details(&self) -> String {
        self.contexts
            .iter()
            .map(|(context, status)| {
                let mut block = format!("Service: {}\nState: {}", context, status.state);
                if let Some(description) = &status.description {
                    block.push_str(&format!("\nDescription: {}", description));
                }
                if let Some(url) = &status.target_url {
                    block.push_str(&format!("\nURL: {}", url));
                }
                block
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}
