//! Change metadata fetched from the Gerrit REST API.
//!
//! Unlike [`ChangeEvent`](super::ChangeEvent), this is fetched fresh for each
//! workflow run and never cached: a stale copy would let the bridge act on a
//! superseded patchset.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::{PatchsetNumber, Sha};

/// Lifecycle status of a change (`ChangeInfo.status`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChangeLifecycle {
    /// `NEW`: the change is open for review.
    Open,
    Submitted,
    Merged,
    Abandoned,
    Draft,
    Other(String),
}

impl ChangeLifecycle {
    pub fn is_open(&self) -> bool {
        matches!(self, ChangeLifecycle::Open)
    }

    pub fn as_api_str(&self) -> &str {
        match self {
            ChangeLifecycle::Open => "NEW",
            ChangeLifecycle::Submitted => "SUBMITTED",
            ChangeLifecycle::Merged => "MERGED",
            ChangeLifecycle::Abandoned => "ABANDONED",
            ChangeLifecycle::Draft => "DRAFT",
            ChangeLifecycle::Other(s) => s,
        }
    }
}

impl From<String> for ChangeLifecycle {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "NEW" => ChangeLifecycle::Open,
            "SUBMITTED" => ChangeLifecycle::Submitted,
            "MERGED" => ChangeLifecycle::Merged,
            "ABANDONED" => ChangeLifecycle::Abandoned,
            "DRAFT" => ChangeLifecycle::Draft,
            _ => ChangeLifecycle::Other(s),
        }
    }
}

impl From<ChangeLifecycle> for String {
    fn from(status: ChangeLifecycle) -> Self {
        status.as_api_str().to_string()
    }
}

/// Per-revision info; only the ordinal is needed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionInfo {
    #[serde(rename = "_number")]
    pub number: PatchsetNumber,
}

/// The subset of Gerrit's `ChangeInfo` returned by
/// `GET /changes/{id}/?o=CURRENT_REVISION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub status: ChangeLifecycle,
    #[serde(default)]
    pub current_revision: Option<Sha>,
    #[serde(default)]
    pub revisions: HashMap<Sha, RevisionInfo>,
}

impl ChangeStatus {
    /// The ordinal of the current revision, if Gerrit reported one.
    pub fn current_patchset(&self) -> Option<PatchsetNumber> {
        let current = self.current_revision.as_ref()?;
        self.revisions.get(current).map(|info| info.number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_change_info() {
        let json = r#"{
            "id": "Packages%2FTYPO3.CMS~master~I640486e9",
            "project": "Packages/TYPO3.CMS",
            "status": "NEW",
            "current_revision": "184ebe53805e102605d11f6b143486d15c23a09c",
            "revisions": {
                "184ebe53805e102605d11f6b143486d15c23a09c": {
                    "kind": "REWORK",
                    "_number": 4,
                    "ref": "refs/changes/10/40410/4"
                }
            }
        }"#;
        let status: ChangeStatus = serde_json::from_str(json).unwrap();
        assert!(status.status.is_open());
        assert_eq!(status.current_patchset(), Some(PatchsetNumber(4)));
    }

    #[test]
    fn current_patchset_missing_when_revision_not_listed() {
        let status = ChangeStatus {
            status: ChangeLifecycle::Open,
            current_revision: Some(Sha::new("abc")),
            revisions: HashMap::new(),
        };
        assert_eq!(status.current_patchset(), None);
    }

    #[test]
    fn lifecycle_parsing() {
        assert_eq!(ChangeLifecycle::from("NEW".to_string()), ChangeLifecycle::Open);
        assert_eq!(
            ChangeLifecycle::from("merged".to_string()),
            ChangeLifecycle::Merged
        );
        assert_eq!(
            ChangeLifecycle::from("ABANDONED".to_string()),
            ChangeLifecycle::Abandoned
        );
        assert_eq!(
            ChangeLifecycle::from("WEIRD".to_string()),
            ChangeLifecycle::Other("WEIRD".to_string())
        );
        assert!(!ChangeLifecycle::Draft.is_open());
    }
}
