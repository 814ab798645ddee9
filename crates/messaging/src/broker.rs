use crate::error::ErrorKind;
use crate::message::Properties;

use std::error::Error;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for broker errors.
pub trait BrokerError: Error + Send + Sync + 'static {
    /// Classifies the error for the supervisor.
    fn kind(&self) -> ErrorKind;
}

/// One received message, held until it is acknowledged or rejected.
pub trait Delivery: Debug + Send + Sync + 'static {
    /// The raw payload.
    fn payload(&self) -> &Bytes;

    /// The properties attached by the sender.
    fn properties(&self) -> &Properties;

    /// How many times this message was handed out before this delivery.
    fn redeliveries(&self) -> u32;
}

/// Sends raw payloads to one topic.
#[async_trait]
pub trait Publisher: Debug + Send + Sync + 'static {
    /// The error type for the publisher.
    type Error: BrokerError;

    /// The topic this publisher is bound to.
    fn topic(&self) -> &str;

    /// Sends one payload. Returns once the broker has accepted it.
    async fn send(&self, payload: Bytes, properties: Properties) -> Result<(), Self::Error>;
}

/// A durable consumption position on a topic, identified by a subscriber name.
///
/// Subscriptions sharing a subscriber name compete for messages. Distinct
/// names each see every message. `receive` must be cancel-safe: dropping the
/// future before it resolves must not lose a message.
#[async_trait]
pub trait Subscription: Debug + Send + 'static {
    /// The error type for the subscription.
    type Error: BrokerError;

    /// The delivery type handed out by `receive`.
    type Delivery: Delivery;

    /// The topic this subscription consumes.
    fn topic(&self) -> &str;

    /// The subscriber name this subscription was created under.
    fn subscriber(&self) -> &str;

    /// Waits until a message is available.
    async fn receive(&mut self) -> Result<Self::Delivery, Self::Error>;

    /// Waits until a message is available or the timeout elapses.
    async fn receive_timeout(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<Self::Delivery>, Self::Error> {
        match tokio::time::timeout(timeout, self.receive()).await {
            Ok(delivery) => delivery.map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Commits successful consumption. The message will not be redelivered.
    async fn acknowledge(&mut self, delivery: &Self::Delivery) -> Result<(), Self::Error>;

    /// Marks the message for redelivery after a broker-defined delay.
    async fn negative_acknowledge(&mut self, delivery: &Self::Delivery)
    -> Result<(), Self::Error>;
}

/// A connection to a broker, shared by every binding derived from it.
#[async_trait]
pub trait Broker: Clone + Debug + Send + Sync + 'static {
    /// The error type for the broker.
    type Error: BrokerError;

    /// The publisher type for the broker.
    type Publisher: Publisher<Error = Self::Error>;

    /// The subscription type for the broker.
    type Subscription: Subscription<Error = Self::Error>;

    /// Creates a publisher bound to a topic.
    async fn publisher(&self, topic: &str) -> Result<Self::Publisher, Self::Error>;

    /// Subscribes to a topic under a subscriber name.
    async fn subscribe(
        &self,
        topic: &str,
        subscriber: &str,
    ) -> Result<Self::Subscription, Self::Error>;

    /// Subscribes to a topic under a generated name no other subscriber shares.
    ///
    /// The consumption position only lives as long as the subscription. It is
    /// released when the subscription is dropped or, where the broker cannot
    /// observe the drop, after a broker-defined period of inactivity.
    async fn subscribe_private(&self, topic: &str) -> Result<Self::Subscription, Self::Error>;

    /// Closes the connection. Bindings derived from it stop working.
    async fn close(&self) -> Result<(), Self::Error>;
}

/// The delivery type produced by a broker's subscriptions.
pub type BrokerDelivery<B> = <<B as Broker>::Subscription as Subscription>::Delivery;

/// Opens broker connections. Stages connect once per construction attempt.
#[async_trait]
pub trait Connector: Debug + Send + Sync + 'static {
    /// The broker this connector opens.
    type Broker: Broker;

    /// Opens a new connection.
    async fn connect(&self) -> Result<Self::Broker, <Self::Broker as Broker>::Error>;
}
