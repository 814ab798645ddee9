//! NATS JetStream broker for the messaging crate.
//!
//! Each topic is a stream of the same name with interest retention, so a
//! message is kept only while some subscriber has yet to acknowledge it. Each
//! subscriber name is a durable pull consumer on that stream with explicit
//! acknowledgement: subscriptions sharing a name share the consumer and
//! compete, distinct names each see every message. Private subscriptions are
//! ephemeral consumers the server deletes once nobody pulls from them.
//!
//! Consumers pull one message at a time and hold it for up to `ack_wait`, so
//! a slow handler does not see its message handed to a competitor.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod headers;
mod publisher;
mod subscription;

pub use error::Error;
pub use publisher::NatsPublisher;
pub use subscription::{NatsDelivery, NatsSubscription};

use std::time::Duration;

use async_nats::jetstream::Context as JetStreamContext;
use async_nats::jetstream::consumer::{AckPolicy, DeliverPolicy, pull::Config as PullConfig};
use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::consumer::pull::Stream as PullStream;
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, Stream};
use async_nats::{Client as AsyncNatsClient, ConnectOptions};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_messaging::broker::{Broker, Connector};
use uuid::Uuid;

/// Default delay before a rejected message is delivered again.
pub const DEFAULT_REDELIVERY_DELAY: Duration = Duration::from_secs(5);

/// Default time a delivered message may stay unacknowledged before the server
/// hands it out again. Longer than the slowest completion a handler waits on.
pub const DEFAULT_ACK_WAIT: Duration = Duration::from_secs(15 * 60);

/// Default idle time after which the server deletes a private consumer.
pub const DEFAULT_PRIVATE_INACTIVE_THRESHOLD: Duration = Duration::from_secs(120);

/// Options for the NATS broker.
#[derive(Clone, Debug)]
pub struct NatsBrokerOptions {
    /// Server address, e.g. `nats://localhost:4222`.
    pub url: String,

    /// How long to wait for the initial connection.
    pub connection_timeout: Duration,

    /// Prefix of the headers that carry message properties.
    pub header_prefix: String,

    /// Delay the server waits before redelivering a rejected message.
    pub redelivery_delay: Duration,

    /// Time a delivered message may stay unacknowledged before redelivery.
    pub ack_wait: Duration,

    /// Idle time after which a private consumer is deleted by the server.
    pub private_inactive_threshold: Duration,
}

impl NatsBrokerOptions {
    /// Options for `url` with default timeouts.
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            connection_timeout: Duration::from_secs(10),
            header_prefix: "Trellis-".to_string(),
            redelivery_delay: DEFAULT_REDELIVERY_DELAY,
            ack_wait: DEFAULT_ACK_WAIT,
            private_inactive_threshold: DEFAULT_PRIVATE_INACTIVE_THRESHOLD,
        }
    }
}

/// A connection to a NATS server with JetStream enabled.
#[derive(Clone, Debug)]
pub struct NatsBroker {
    client: AsyncNatsClient,
    closed: CancellationToken,
    jetstream: JetStreamContext,
    options: NatsBrokerOptions,
}

impl NatsBroker {
    /// Connects to the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the server cannot be reached in time.
    pub async fn connect(options: NatsBrokerOptions) -> Result<Self, Error> {
        let client = ConnectOptions::new()
            .connection_timeout(options.connection_timeout)
            .connect(options.url.as_str())
            .await
            .map_err(|e| Error::Connect(e.kind()))?;

        info!("connected to NATS at {}", options.url);

        Ok(Self::from_client(client, options))
    }

    /// Wraps an existing client.
    #[must_use]
    pub fn from_client(client: AsyncNatsClient, options: NatsBrokerOptions) -> Self {
        let jetstream = async_nats::jetstream::new(client.clone());

        Self {
            client,
            closed: CancellationToken::new(),
            jetstream,
            options,
        }
    }

    async fn ensure_stream(&self, topic: &str) -> Result<Stream, Error> {
        validate_name(topic)?;

        self.jetstream
            .get_or_create_stream(StreamConfig {
                name: topic.to_string(),
                subjects: vec![topic.to_string()],
                retention: RetentionPolicy::Interest,
                ..Default::default()
            })
            .await
            .map_err(|e| Error::CreateStream(e.kind()))
    }

    fn subscription(
        &self,
        messages: PullStream,
        topic: &str,
        subscriber: String,
    ) -> NatsSubscription {
        debug!("subscribed to '{}' as '{}'", topic, subscriber);

        NatsSubscription::new(
            messages,
            topic.to_string(),
            subscriber,
            self.options.header_prefix.clone(),
            self.options.redelivery_delay,
            self.closed.clone(),
        )
    }
}

fn durable_config(subscriber: &str, options: &NatsBrokerOptions) -> PullConfig {
    PullConfig {
        durable_name: Some(subscriber.to_string()),
        ack_policy: AckPolicy::Explicit,
        ack_wait: options.ack_wait,
        ..Default::default()
    }
}

fn private_config(name: &str, options: &NatsBrokerOptions) -> PullConfig {
    PullConfig {
        name: Some(name.to_string()),
        deliver_policy: DeliverPolicy::New,
        ack_policy: AckPolicy::Explicit,
        ack_wait: options.ack_wait,
        inactive_threshold: options.private_inactive_threshold,
        ..Default::default()
    }
}

async fn pull_one_at_a_time(consumer: &PullConsumer) -> Result<PullStream, Error> {
    consumer
        .stream()
        .max_messages_per_batch(1)
        .messages()
        .await
        .map_err(|e| Error::Stream(e.kind()))
}

fn validate_name(name: &str) -> Result<(), Error> {
    let invalid = name.is_empty()
        || name
            .chars()
            .any(|c| c == '.' || c == '*' || c == '>' || c.is_whitespace());

    if invalid {
        Err(Error::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

#[async_trait]
impl Broker for NatsBroker {
    type Error = Error;

    type Publisher = NatsPublisher;

    type Subscription = NatsSubscription;

    async fn publisher(&self, topic: &str) -> Result<Self::Publisher, Self::Error> {
        if self.closed.is_cancelled() {
            return Err(Error::Closed);
        }

        // Publishing to a subject no stream listens on is rejected by the server
        self.ensure_stream(topic).await?;

        Ok(NatsPublisher::new(
            self.jetstream.clone(),
            topic.to_string(),
            self.options.header_prefix.clone(),
            self.closed.clone(),
        ))
    }

    async fn subscribe(
        &self,
        topic: &str,
        subscriber: &str,
    ) -> Result<Self::Subscription, Self::Error> {
        if self.closed.is_cancelled() {
            return Err(Error::Closed);
        }

        validate_name(subscriber)?;
        let stream = self.ensure_stream(topic).await?;

        let consumer: PullConsumer = stream
            .get_or_create_consumer(subscriber, durable_config(subscriber, &self.options))
            .await
            .map_err(|e| Error::Consumer(e.kind()))?;

        let messages = pull_one_at_a_time(&consumer).await?;

        Ok(self.subscription(messages, topic, subscriber.to_string()))
    }

    async fn subscribe_private(&self, topic: &str) -> Result<Self::Subscription, Self::Error> {
        if self.closed.is_cancelled() {
            return Err(Error::Closed);
        }

        let stream = self.ensure_stream(topic).await?;
        let name = Uuid::new_v4().to_string();

        let consumer: PullConsumer = stream
            .create_consumer(private_config(&name, &self.options))
            .await
            .map_err(|e| Error::Consumer(e.kind()))?;

        let messages = pull_one_at_a_time(&consumer).await?;

        Ok(self.subscription(messages, topic, name))
    }

    async fn close(&self) -> Result<(), Self::Error> {
        self.closed.cancel();

        // Pending acknowledgements are best effort once closing
        if let Err(e) = self.client.flush().await {
            debug!("flush on close failed: {}", e);
        }

        Ok(())
    }
}

#[async_trait]
impl Connector for NatsBrokerOptions {
    type Broker = NatsBroker;

    async fn connect(&self) -> Result<NatsBroker, Error> {
        NatsBroker::connect(self.clone()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name("llm-complete-text").is_ok());
        assert!(validate_name("5f0e1c9e-7c1b-4b8e-9a55-0b7f4f1b2c3d").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name("graph.load").is_err());
        assert!(validate_name("graph load").is_err());
        assert!(validate_name("graph>").is_err());
    }

    #[test]
    fn test_default_options() {
        let options = NatsBrokerOptions::new("nats://localhost:4222");

        assert_eq!(options.url, "nats://localhost:4222");
        assert_eq!(options.redelivery_delay, DEFAULT_REDELIVERY_DELAY);
        assert_eq!(options.header_prefix, "Trellis-");
        assert_eq!(options.ack_wait, DEFAULT_ACK_WAIT);
        assert_eq!(
            options.private_inactive_threshold,
            DEFAULT_PRIVATE_INACTIVE_THRESHOLD
        );
    }

    #[test]
    fn test_durable_consumer_holds_messages_for_ack_wait() {
        let mut options = NatsBrokerOptions::new("nats://localhost:4222");
        options.ack_wait = Duration::from_secs(900);

        let config = durable_config("kg-extract", &options);

        assert_eq!(config.durable_name.as_deref(), Some("kg-extract"));
        assert_eq!(config.ack_policy, AckPolicy::Explicit);
        assert_eq!(config.ack_wait, Duration::from_secs(900));
        assert!(config.inactive_threshold.is_zero());
    }

    #[test]
    fn test_private_consumer_is_ephemeral_and_expires() {
        let options = NatsBrokerOptions::new("nats://localhost:4222");

        let config = private_config("5f0e1c9e-7c1b-4b8e-9a55-0b7f4f1b2c3d", &options);

        assert_eq!(config.durable_name, None);
        assert_eq!(
            config.name.as_deref(),
            Some("5f0e1c9e-7c1b-4b8e-9a55-0b7f4f1b2c3d")
        );
        assert_eq!(config.deliver_policy, DeliverPolicy::New);
        assert_eq!(config.ack_wait, DEFAULT_ACK_WAIT);
        assert_eq!(config.inactive_threshold, DEFAULT_PRIVATE_INACTIVE_THRESHOLD);
    }

    #[test]
    fn test_ack_wait_outlasts_slowest_completion() {
        // The extractor waits up to 500 s on a completion, the completion stage up to 600 s
        assert!(DEFAULT_ACK_WAIT > Duration::from_secs(600));
    }
}
