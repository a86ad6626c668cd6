//! Gerrit stream events as delivered through the broker.
//!
//! The broker payload is the JSON emitted by `gerrit stream-events`. Only the
//! fields the bridge acts on are modelled; everything else is ignored.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::ids::{ChangeId, PatchsetNumber, Sha};

/// The `type` tag of a stream event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// A new patchset was uploaded. This is the only kind that drives a workflow.
    PatchsetCreated,

    /// The change was abandoned.
    ChangeAbandoned,

    /// Any other event kind (`comment-added`, `ref-updated`, ...).
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::PatchsetCreated => "patchset-created",
            EventKind::ChangeAbandoned => "change-abandoned",
            EventKind::Other(s) => s,
        }
    }
}

impl From<String> for EventKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "patchset-created" => EventKind::PatchsetCreated,
            "change-abandoned" => EventKind::ChangeAbandoned,
            _ => EventKind::Other(s),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change attributes carried by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Change {
    pub id: ChangeId,
    pub project: String,
    pub branch: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub commit_message: String,
    #[serde(default)]
    pub url: String,
}

/// Patchset attributes carried by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchSet {
    /// Ref path, e.g. `refs/changes/45/12345/3`.
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub revision: Sha,
    pub number: PatchsetNumber,
}

/// A decoded stream event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    #[serde(default)]
    pub change: Option<Change>,
    #[serde(rename = "patchSet", default)]
    pub patch_set: Option<PatchSet>,
}

/// A patchset-created event with both blocks present.
///
/// This is what the workflow operates on once type dispatch has succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchsetCreated {
    pub change: Change,
    pub patch_set: PatchSet,
}

/// Errors decoding a broker payload.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not a valid event document.
    #[error("malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    /// A patchset-created event arrived without one of its required blocks.
    #[error("{kind} event is missing its `{field}` block")]
    MissingField { kind: EventKind, field: &'static str },
}

impl ChangeEvent {
    /// Decodes a raw broker payload.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Narrows this event to a patchset-created event.
    ///
    /// Returns `Ok(None)` for every other kind, and an error when the kind
    /// matches but a required block is absent.
    pub fn into_patchset_created(self) -> Result<Option<PatchsetCreated>, DecodeError> {
        if self.kind != EventKind::PatchsetCreated {
            return Ok(None);
        }
        let change = self.change.ok_or(DecodeError::MissingField {
            kind: EventKind::PatchsetCreated,
            field: "change",
        })?;
        let patch_set = self.patch_set.ok_or(DecodeError::MissingField {
            kind: EventKind::PatchsetCreated,
            field: "patchSet",
        })?;
        Ok(Some(PatchsetCreated { change, patch_set }))
    }
}

impl PatchsetCreated {
    /// The head branch name the patchset is mirrored to on GitHub.
    ///
    /// Gerrit replicates `refs/changes/..` without the `refs/` prefix, so
    /// `refs/changes/45/12345/3` becomes `changes/45/12345/3`.
    pub fn head_branch(&self) -> &str {
        self.patch_set
            .git_ref
            .strip_prefix("refs/")
            .unwrap_or(&self.patch_set.git_ref)
    }
}
