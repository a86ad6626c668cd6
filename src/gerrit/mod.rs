//! Gerrit REST client and effect interpreter.
//!
//! Executes [`crate::effects::GerritEffect`]s over HTTP basic auth against the
//! authenticated (`/a/`) endpoints, retrying transient failures through
//! [`crate::retry`].

mod client;
mod error;

pub use client::{GerritClient, strip_xssi_prefix};
pub use error::GerritError;
