use crate::error::Error;
use crate::headers::to_properties;

use std::time::Duration;

use async_nats::jetstream::AckKind;
use async_nats::jetstream::Message as JetStreamMessage;
use async_nats::jetstream::consumer::pull::Stream as PullStream;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use trellis_messaging::Properties;
use trellis_messaging::broker::{Delivery, Subscription};

/// A message received from a durable pull consumer.
#[derive(Debug)]
pub struct NatsDelivery {
    message: JetStreamMessage,
    properties: Properties,
}

impl Delivery for NatsDelivery {
    fn payload(&self) -> &Bytes {
        &self.message.payload
    }

    fn properties(&self) -> &Properties {
        &self.properties
    }

    fn redeliveries(&self) -> u32 {
        // The server counts the first delivery as 1
        self.message.info().map_or(0, |info| {
            u32::try_from(info.delivered.saturating_sub(1).max(0)).unwrap_or(u32::MAX)
        })
    }
}

/// Receives through the durable consumer named after the subscriber.
pub struct NatsSubscription {
    closed: CancellationToken,
    header_prefix: String,
    messages: PullStream,
    redelivery_delay: Duration,
    subscriber: String,
    topic: String,
}

impl std::fmt::Debug for NatsSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NatsSubscription")
            .field("topic", &self.topic)
            .field("subscriber", &self.subscriber)
            .field("redelivery_delay", &self.redelivery_delay)
            .finish_non_exhaustive()
    }
}

impl NatsSubscription {
    pub(crate) const fn new(
        messages: PullStream,
        topic: String,
        subscriber: String,
        header_prefix: String,
        redelivery_delay: Duration,
        closed: CancellationToken,
    ) -> Self {
        Self {
            closed,
            header_prefix,
            messages,
            redelivery_delay,
            subscriber,
            topic,
        }
    }

    fn check_open(&self) -> Result<(), Error> {
        if self.closed.is_cancelled() {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Subscription for NatsSubscription {
    type Error = Error;

    type Delivery = NatsDelivery;

    fn topic(&self) -> &str {
        &self.topic
    }

    fn subscriber(&self) -> &str {
        &self.subscriber
    }

    async fn receive(&mut self) -> Result<Self::Delivery, Self::Error> {
        self.check_open()?;

        let next = tokio::select! {
            () = self.closed.cancelled() => return Err(Error::Closed),
            next = self.messages.next() => next,
        };

        let message = next
            .ok_or(Error::Interrupted)?
            .map_err(|e| Error::Messages(e.kind()))?;

        let properties = to_properties(&self.header_prefix, message.headers.as_ref());

        Ok(NatsDelivery {
            message,
            properties,
        })
    }

    async fn acknowledge(&mut self, delivery: &Self::Delivery) -> Result<(), Self::Error> {
        self.check_open()?;

        delivery
            .message
            .ack()
            .await
            .map_err(|e| Error::Ack(e.to_string()))
    }

    async fn negative_acknowledge(
        &mut self,
        delivery: &Self::Delivery,
    ) -> Result<(), Self::Error> {
        self.check_open()?;

        delivery
            .message
            .ack_with(AckKind::Nak(Some(self.redelivery_delay)))
            .await
            .map_err(|e| Error::Ack(e.to_string()))
    }
}
