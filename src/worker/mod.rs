//! Bounded workflow execution and the polling primitives workflows use.
//!
//! - [`dispatch`]: admits broker deliveries under a concurrency budget and
//!   runs a handler for each on its own task
//! - [`poll`]: waits for a replicated branch or a terminal CI status

mod dispatch;
pub mod poll;

pub use dispatch::{DispatchError, Dispatcher, Disposition, EventHandler, InFlightGauge};
pub use poll::{PollConfig, PollError, wait_for_branch, wait_for_terminal_status};
