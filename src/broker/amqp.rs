//! lapin-backed AMQP 0-9-1 broker.

use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicQosOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tracing::{debug, info};

use super::{Broker, BrokerError, BrokerSession, InboundDelivery, Topology};

/// Connects to one AMQP URI.
#[derive(Clone)]
pub struct AmqpBroker {
    uri: String,
}

impl AmqpBroker {
    pub fn new(uri: impl Into<String>) -> Self {
        AmqpBroker { uri: uri.into() }
    }
}

impl std::fmt::Debug for AmqpBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The URI carries credentials.
        f.debug_struct("AmqpBroker").finish_non_exhaustive()
    }
}

impl Broker for AmqpBroker {
    type Session = AmqpSession;

    async fn connect(&self) -> Result<AmqpSession, BrokerError> {
        let connection = Connection::connect(&self.uri, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;
        info!(channel = channel.id(), "Connected to AMQP broker");
        Ok(AmqpSession {
            _connection: connection,
            channel,
            consumer: None,
        })
    }
}

/// A connection with one channel and, once subscribed, one consumer.
pub struct AmqpSession {
    // Dropping the connection closes the channel.
    _connection: Connection,
    channel: Channel,
    consumer: Option<Consumer>,
}

impl BrokerSession for AmqpSession {
    type Delivery = AmqpDelivery;

    async fn declare(&mut self, topology: &Topology) -> Result<(), BrokerError> {
        self.channel
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Fanout,
                ExchangeDeclareOptions {
                    durable: false,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        self.channel
            .queue_declare(
                &topology.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        self.channel
            .queue_bind(
                &topology.queue,
                &topology.exchange,
                &topology.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        debug!(
            exchange = %topology.exchange,
            queue = %topology.queue,
            routing_key = %topology.routing_key,
            "Declared topology"
        );
        Ok(())
    }

    async fn subscribe(&mut self, topology: &Topology) -> Result<(), BrokerError> {
        self.channel
            .basic_qos(topology.prefetch, BasicQosOptions::default())
            .await?;

        let consumer = self
            .channel
            .basic_consume(
                &topology.queue,
                &topology.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        debug!(
            queue = %topology.queue,
            consumer_tag = %topology.consumer_tag,
            prefetch = topology.prefetch,
            "Consuming"
        );
        self.consumer = Some(consumer);
        Ok(())
    }

    async fn next_delivery(&mut self) -> Option<Result<AmqpDelivery, BrokerError>> {
        let Some(consumer) = self.consumer.as_mut() else {
            return Some(Err(BrokerError::NotSubscribed));
        };
        consumer
            .next()
            .await
            .map(|result| result.map(AmqpDelivery).map_err(BrokerError::from))
    }
}

/// A lapin delivery.
pub struct AmqpDelivery(Delivery);

impl InboundDelivery for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.0.data
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.0
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(BrokerError::from)
    }
}
