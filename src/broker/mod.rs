//! Message broker connection, topology and reconnect loop.
//!
//! The reconnect logic in [`connector`] is written against the small
//! [`Broker`] / [`BrokerSession`] / [`InboundDelivery`] traits so it can be
//! tested with a scripted broker. [`amqp`] is the one production
//! implementation, backed by lapin.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected ──connect──► Connected ──declare+subscribe──► Subscribed
//!      ▲                        │                                │
//!      └────────── any error / end of stream / backoff ◄─────────┘
//! ```

pub mod amqp;
mod backoff;
mod connector;

use std::fmt;
use std::future::Future;

use serde::Serialize;
use thiserror::Error;

use crate::config::AmqpConfig;

pub use amqp::AmqpBroker;
pub use backoff::ReconnectBackoff;
pub use connector::Connector;

/// Transport-level broker errors. Any of these ends the current session.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    /// The consumer stream ended without an error.
    #[error("consumer stream closed")]
    ConsumerClosed,

    /// The session was used before `subscribe`.
    #[error("session is not subscribed")]
    NotSubscribed,

    /// Connection lost, reported by implementations without a richer error.
    #[error("disconnected: {0}")]
    Disconnected(String),
}

/// Exchange, queue and consumer settings declared on every (re)connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    /// Fanout exchange, declared non-durable.
    pub exchange: String,
    /// Queue, declared durable.
    pub queue: String,
    pub routing_key: String,
    pub consumer_tag: String,
    /// Unacknowledged deliveries the broker may push ahead.
    pub prefetch: u16,
}

impl Topology {
    /// Builds the topology, defaulting prefetch to the worker count.
    pub fn from_config(amqp: &AmqpConfig, concurrency: usize) -> Self {
        let default_prefetch = u16::try_from(concurrency).unwrap_or(u16::MAX);
        Topology {
            exchange: amqp.exchange.clone(),
            queue: amqp.queue.clone(),
            routing_key: amqp.routing_key.clone(),
            consumer_tag: amqp.identifier.clone(),
            prefetch: amqp.prefetch.unwrap_or(default_prefetch),
        }
    }
}

/// Observable connector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectorState {
    Disconnected,
    Connected,
    Subscribed,
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectorState::Disconnected => "disconnected",
            ConnectorState::Connected => "connected",
            ConnectorState::Subscribed => "subscribed",
        })
    }
}

/// One message taken off the queue.
pub trait InboundDelivery: Send + Sync + 'static {
    /// The raw message body.
    fn body(&self) -> &[u8];

    /// Acknowledges the delivery so the broker will not redeliver it.
    fn ack(&self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// A live connection with one channel.
pub trait BrokerSession: Send {
    type Delivery: InboundDelivery;

    /// Declares exchange, queue and binding.
    fn declare(
        &mut self,
        topology: &Topology,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Sets prefetch and starts consuming the queue.
    fn subscribe(
        &mut self,
        topology: &Topology,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Waits for the next delivery. `None` means the stream ended.
    fn next_delivery(
        &mut self,
    ) -> impl Future<Output = Option<Result<Self::Delivery, BrokerError>>> + Send;
}

/// Opens broker sessions.
pub trait Broker: Send + Sync {
    type Session: BrokerSession;

    fn connect(&self) -> impl Future<Output = Result<Self::Session, BrokerError>> + Send;
}
