//! Core domain types for the bridge.
//!
//! Events arrive from Gerrit, change metadata is fetched from Gerrit, and
//! pull requests and statuses live on GitHub. Each has its own module.

pub mod change;
pub mod event;
pub mod ids;
pub mod pr;
pub mod status;

// Re-export commonly used types at the module level
pub use change::{ChangeLifecycle, ChangeStatus, RevisionInfo};
pub use event::{Change, ChangeEvent, DecodeError, EventKind, PatchSet, PatchsetCreated};
pub use ids::{ChangeId, CommentId, PatchsetNumber, PrNumber, RepoId, Sha};
pub use pr::PullRequestHandle;
pub use status::{CombinedStatus, ContextStatus, StatusState};
