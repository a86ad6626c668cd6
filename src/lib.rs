//! Gerrit Bridge - mirrors Gerrit patchsets to GitHub pull requests so CI
//! runs on them, then reports the CI result back to Gerrit as a vote.
//!
//! Events arrive from Gerrit's stream through an AMQP queue. The
//! [`broker::Connector`] keeps the subscription alive, the
//! [`worker::Dispatcher`] runs a bounded number of [`workflow::Workflow`]s at
//! once, and each workflow drives one patchset from pull request to vote.

pub mod broker;
pub mod config;
pub mod effects;
pub mod filter;
pub mod gerrit;
pub mod github;
pub mod retry;
pub mod server;
pub mod template;
pub mod types;
pub mod worker;
pub mod workflow;

#[cfg(test)]
mod test_utils;
