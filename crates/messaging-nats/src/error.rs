use async_nats::ConnectErrorKind;
use async_nats::jetstream::consumer::StreamErrorKind;
use async_nats::jetstream::consumer::pull::MessagesErrorKind;
use async_nats::jetstream::context::{CreateStreamErrorKind, PublishErrorKind};
use async_nats::jetstream::stream::ConsumerErrorKind;
use thiserror::Error;
use trellis_messaging::ErrorKind;
use trellis_messaging::broker::BrokerError;

/// Error type for the NATS broker.
#[derive(Debug, Error)]
pub enum Error {
    /// Acknowledging or rejecting a message failed.
    #[error("failed to acknowledge: {0}")]
    Ack(String),

    /// The broker handle was closed.
    #[error("broker closed")]
    Closed,

    /// Connecting to the server failed.
    #[error("failed to connect: {0}")]
    Connect(ConnectErrorKind),

    /// Creating the durable consumer for a subscriber failed.
    #[error("failed to create consumer: {0}")]
    Consumer(ConsumerErrorKind),

    /// Creating or looking up the stream for a topic failed.
    #[error("failed to create stream: {0}")]
    CreateStream(CreateStreamErrorKind),

    /// The server stopped delivering to a subscription.
    #[error("subscription interrupted")]
    Interrupted,

    /// Topic and subscriber names end up as stream and consumer names.
    #[error("invalid name '{0}': must be non-empty without '.', '*', '>' or whitespace")]
    InvalidName(String),

    /// Receiving the next message failed.
    #[error("failed to receive: {0}")]
    Messages(MessagesErrorKind),

    /// Publishing failed or was not acknowledged by the stream.
    #[error("failed to publish: {0}")]
    Publish(PublishErrorKind),

    /// Opening the message stream of a consumer failed.
    #[error("failed to open consumer stream: {0}")]
    Stream(StreamErrorKind),
}

impl BrokerError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Interrupted => ErrorKind::Fatal,
            _ => ErrorKind::Retryable,
        }
    }
}
