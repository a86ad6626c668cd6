//! The broker connector: connect, declare, consume, reconnect.

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::worker::{DispatchError, Dispatcher, EventHandler};

use super::{Broker, BrokerError, BrokerSession, ConnectorState, ReconnectBackoff, Topology};

/// Owns the broker session and feeds deliveries to the dispatcher.
///
/// Every session is built from scratch: a fresh connection, a fresh channel,
/// topology declared again. Nothing from a dead session is reused.
pub struct Connector<B, H> {
    broker: B,
    topology: Topology,
    dispatcher: Arc<Dispatcher<H>>,
    backoff: ReconnectBackoff,
    state: watch::Sender<ConnectorState>,
}

impl<B, H> Connector<B, H>
where
    B: Broker,
    H: EventHandler,
{
    pub fn new(
        broker: B,
        topology: Topology,
        dispatcher: Arc<Dispatcher<H>>,
        backoff: ReconnectBackoff,
    ) -> Self {
        let (state, _) = watch::channel(ConnectorState::Disconnected);
        Connector {
            broker,
            topology,
            dispatcher,
            backoff,
            state,
        }
    }

    /// Subscribes to state changes.
    pub fn state(&self) -> watch::Receiver<ConnectorState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectorState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectorState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = %current, to = %state, "Connector state change");
            *current = state;
            true
        });
    }

    /// Runs until `shutdown` fires, then drains in-flight workflows.
    #[instrument(skip_all, fields(queue = %self.topology.queue))]
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut attempt = 0u32;

        loop {
            let result = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                result = self.run_session(&mut attempt) => result,
            };
            self.set_state(ConnectorState::Disconnected);

            match result {
                Ok(()) if shutdown.is_cancelled() => break,
                Ok(()) => debug!("Session ended"),
                Err(e) => warn!(error = %e, "Broker session lost"),
            }

            let delay = self.backoff.delay_for_attempt(attempt);
            attempt = attempt.saturating_add(1);
            info!(attempt, delay_ms = delay.as_millis() as u64, "Reconnecting to broker");

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectorState::Disconnected);
        info!(
            in_flight = self.dispatcher.in_flight(),
            "Stopped consuming, draining workflows"
        );
        self.dispatcher.drain().await;
        info!("Connector stopped");
    }

    /// One session: connect, declare, subscribe, then pump deliveries until
    /// the stream fails or ends.
    async fn run_session(&self, attempt: &mut u32) -> Result<(), BrokerError> {
        let mut session = self.broker.connect().await?;
        self.set_state(ConnectorState::Connected);

        session.declare(&self.topology).await?;
        session.subscribe(&self.topology).await?;
        self.set_state(ConnectorState::Subscribed);
        *attempt = 0;

        loop {
            match session.next_delivery().await {
                Some(Ok(delivery)) => match self.dispatcher.dispatch(delivery).await {
                    Ok(()) => {}
                    Err(DispatchError::ShuttingDown) => return Ok(()),
                },
                Some(Err(e)) => return Err(e),
                None => return Err(BrokerError::ConsumerClosed),
            }
        }
    }
}
