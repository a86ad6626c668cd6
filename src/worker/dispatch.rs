//! Bounded dispatch of broker deliveries to workflow tasks.
//!
//! The connector hands each delivery to [`Dispatcher::dispatch`], which waits
//! for one of N slots before spawning a task for it. While all slots are
//! busy, `dispatch` does not return, so the connector stops pulling from the
//! queue and the broker's prefetch limit holds the rest.
//!
//! ```text
//! ┌───────────┐     ┌──────────────────┐     ┌──────────┐
//! │ connector │ ──► │ dispatch         │ ──► │ worker 1 │ ─┐
//! │ (stream)  │     │ (semaphore, N)   │ ──► │ worker 2 │  │ permit dropped
//! └───────────┘     └──────────────────┘ ──► │   ...    │  │ on every exit
//!       ▲                  │ blocks when full └──────────┘ ─┘
//!       └──────────────────┘
//! ```
//!
//! Deliveries are admitted in arrival order and may complete in any order.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::broker::InboundDelivery;
use crate::config::AckPolicy;

/// Errors that can occur during dispatch.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    /// Shutdown started before a slot became free. The delivery was not
    /// acknowledged and will be redelivered by the broker.
    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

/// How handling a delivery ended, as far as acknowledgement is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Handling reached an end state, successful or not.
    Settled,

    /// Shutdown stopped handling part way. Under
    /// [`AckPolicy::AfterCompletion`] the delivery stays unacknowledged so the
    /// broker hands it out again after restart.
    Interrupted,
}

/// Processes one raw delivery body.
///
/// Handlers never fail from the dispatcher's point of view: every outcome is
/// logged by the handler itself. The returned [`Disposition`] only decides
/// whether a completed delivery may be acknowledged.
pub trait EventHandler: Send + Sync + 'static {
    fn handle(
        &self,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> impl Future<Output = Disposition> + Send;
}

/// Read-only view of a dispatcher's slot usage.
#[derive(Debug, Clone)]
pub struct InFlightGauge {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl InFlightGauge {
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Runs at most `capacity` handlers at once.
pub struct Dispatcher<H> {
    handler: Arc<H>,
    permits: Arc<Semaphore>,
    capacity: usize,
    ack_policy: AckPolicy,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl<H: EventHandler> Dispatcher<H> {
    /// Creates a dispatcher with `capacity` slots.
    ///
    /// `shutdown` is passed to every handler so that long waits end promptly
    /// when the process stops.
    pub fn new(
        handler: H,
        capacity: usize,
        ack_policy: AckPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        let capacity = capacity.max(1);
        info!(capacity, ack_policy = ?ack_policy, "Creating dispatcher");
        Dispatcher {
            handler: Arc::new(handler),
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            ack_policy,
            tracker: TaskTracker::new(),
            shutdown,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of workers currently holding a slot.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    /// A handle for reading `in_flight` without naming the handler type.
    pub fn gauge(&self) -> InFlightGauge {
        InFlightGauge {
            permits: self.permits.clone(),
            capacity: self.capacity,
        }
    }

    /// Waits for a free slot, then spawns a worker for `delivery`.
    pub async fn dispatch<D: InboundDelivery>(&self, delivery: D) -> Result<(), DispatchError> {
        if self.tracker.is_closed() {
            return Err(DispatchError::ShuttingDown);
        }

        let permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(DispatchError::ShuttingDown),
            permit = self.permits.clone().acquire_owned() => {
                permit.map_err(|_| DispatchError::ShuttingDown)?
            }
        };

        let handler = self.handler.clone();
        let cancel = self.shutdown.clone();
        let ack_policy = self.ack_policy;
        debug!(in_flight = self.in_flight(), "Admitted delivery");

        self.tracker.spawn(async move {
            // Held until the task ends, including by panic.
            let _permit = permit;

            if ack_policy == AckPolicy::OnReceipt {
                if let Err(e) = delivery.ack().await {
                    warn!(error = %e, "Failed to acknowledge delivery");
                }
            }

            let disposition = handler.handle(delivery.body(), &cancel).await;

            if ack_policy == AckPolicy::AfterCompletion {
                match disposition {
                    Disposition::Settled => {
                        if let Err(e) = delivery.ack().await {
                            warn!(error = %e, "Failed to acknowledge delivery");
                        }
                    }
                    Disposition::Interrupted => {
                        debug!("Leaving interrupted delivery unacknowledged");
                    }
                }
            }
        });

        Ok(())
    }

    /// Stops admitting deliveries and waits for every spawned worker.
    pub async fn drain(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        debug!("Dispatcher drained");
    }
}
