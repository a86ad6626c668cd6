//! Effects-as-data for GitHub and Gerrit operations.
//!
//! The workflow describes each remote call as an effect value and hands it
//! to an interpreter. Production interpreters live in [`crate::github`] and
//! [`crate::gerrit`]; tests record the effects and script the responses.

pub mod gerrit;
pub mod github;
pub mod interpreter;

pub use gerrit::{GerritEffect, GerritResponse};
pub use github::{GitHubEffect, GitHubResponse};
pub use interpreter::{GerritInterpreter, GitHubInterpreter};
