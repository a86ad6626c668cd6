//! Decides whether a patchset warrants a pull request.
//!
//! All checks are pure: the chain is built once from [`FilterConfig`] and
//! then answers the same question the same way for the same event. Checks run
//! in a fixed order (project, branch, subject) and stop at the first
//! rejection, reporting why.
//!
//! Revision freshness is checked separately by [`check_freshness`] because it
//! needs the [`ChangeStatus`] fetched from Gerrit.

use std::collections::HashMap;
use std::fmt;

use regex::Regex;

use crate::config::FilterConfig;
use crate::types::{Change, ChangeLifecycle, ChangeStatus, PatchsetNumber};

/// Why an event was not acted on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The project has no entry in the configuration.
    ProjectNotConfigured { project: String },

    /// The project restricts branches and this one is absent or disabled.
    BranchNotConfigured { project: String, branch: String },

    /// The subject matched an exclusion pattern.
    SubjectExcluded { subject: String, pattern: String },

    /// The change is no longer open.
    ChangeNotOpen { status: ChangeLifecycle },

    /// A newer patchset exists; it arrives as its own event.
    Superseded {
        delivered: PatchsetNumber,
        current: PatchsetNumber,
    },

    /// Gerrit did not report which revision is current.
    CurrentRevisionUnknown,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::ProjectNotConfigured { project } => {
                write!(f, "project {:?} is not configured", project)
            }
            RejectReason::BranchNotConfigured { project, branch } => {
                write!(
                    f,
                    "branch {:?} is not configured for project {:?}",
                    branch, project
                )
            }
            RejectReason::SubjectExcluded { subject, pattern } => {
                write!(f, "subject {:?} excluded by pattern {:?}", subject, pattern)
            }
            RejectReason::ChangeNotOpen { status } => {
                write!(f, "change is {}", status.as_api_str())
            }
            RejectReason::Superseded { delivered, current } => {
                write!(
                    f,
                    "patchset {} is not the current patchset ({})",
                    delivered, current
                )
            }
            RejectReason::CurrentRevisionUnknown => f.write_str("current revision is unknown"),
        }
    }
}

/// Outcome of running the filter chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Accept,
    Reject(RejectReason),
}

impl FilterDecision {
    pub fn is_accept(&self) -> bool {
        matches!(self, FilterDecision::Accept)
    }
}

/// A subject exclusion pattern. Malformed patterns are kept so they can be
/// reported, but never match.
#[derive(Debug, Clone)]
struct ExcludePattern {
    source: String,
    regex: Option<Regex>,
}

/// The project/branch/subject filter chain.
#[derive(Debug, Clone)]
pub struct FilterChain {
    projects: HashMap<String, HashMap<String, bool>>,
    exclude: Vec<ExcludePattern>,
}

impl FilterChain {
    /// Builds the chain, compiling exclusion patterns once.
    pub fn new(config: &FilterConfig) -> Self {
        let exclude = config
            .exclude_pattern
            .iter()
            .map(|source| {
                let regex = match Regex::new(source) {
                    Ok(regex) => Some(regex),
                    Err(e) => {
                        tracing::warn!(pattern = %source, error = %e, "Ignoring malformed exclude pattern");
                        None
                    }
                };
                ExcludePattern {
                    source: source.clone(),
                    regex,
                }
            })
            .collect();

        FilterChain {
            projects: config.projects.clone(),
            exclude,
        }
    }

    /// Runs the chain against a change.
    pub fn should_process(&self, change: &Change) -> FilterDecision {
        let Some(branches) = self.projects.get(&change.project) else {
            return FilterDecision::Reject(RejectReason::ProjectNotConfigured {
                project: change.project.clone(),
            });
        };

        // An empty branch map covers every branch.
        if !branches.is_empty() && branches.get(&change.branch) != Some(&true) {
            return FilterDecision::Reject(RejectReason::BranchNotConfigured {
                project: change.project.clone(),
                branch: change.branch.clone(),
            });
        }

        if let Some(pattern) = self.excluding_pattern(&change.subject) {
            return FilterDecision::Reject(RejectReason::SubjectExcluded {
                subject: change.subject.clone(),
                pattern: pattern.to_string(),
            });
        }

        FilterDecision::Accept
    }

    /// Returns the first exclusion pattern matching the subject.
    fn excluding_pattern(&self, subject: &str) -> Option<&str> {
        self.exclude
            .iter()
            .find(|p| p.regex.as_ref().is_some_and(|r| r.is_match(subject)))
            .map(|p| p.source.as_str())
    }
}

/// Checks that the change is open and the delivered patchset is current.
pub fn check_freshness(
    status: &ChangeStatus,
    delivered: PatchsetNumber,
) -> Result<(), RejectReason> {
    if !status.status.is_open() {
        return Err(RejectReason::ChangeNotOpen {
            status: status.status.clone(),
        });
    }

    match status.current_patchset() {
        Some(current) if current == delivered => Ok(()),
        Some(current) => Err(RejectReason::Superseded { delivered, current }),
        None => Err(RejectReason::CurrentRevisionUnknown),
    }
}
