use std::error::Error as StdError;

use thiserror::Error;
use trellis_messaging::ErrorKind;
use trellis_messaging::broker::BrokerError;
use trellis_messaging::consumer_handler::ConsumerHandlerError;
use trellis_messaging::stage::StageError;

/// Producer error for completion responses.
pub type ProducerError<BE> = trellis_messaging::producer::Error<BE, serde_json::Error>;

/// Errors raised while answering one request.
#[derive(Debug, Error)]
pub enum HandlerError<BE, CE>
where
    BE: BrokerError,
    CE: StdError + Send + Sync + 'static,
{
    /// The request carried no correlation id, so no one could receive the reply.
    #[error("request has no correlation id")]
    MissingId,

    /// The model failed to complete the prompt.
    #[error("completion failed: {0}")]
    Complete(#[source] CE),

    /// Sending the response failed.
    #[error("failed to send response: {0}")]
    Produce(#[source] ProducerError<BE>),
}

impl<BE, CE> ConsumerHandlerError for HandlerError<BE, CE>
where
    BE: BrokerError,
    CE: StdError + Send + Sync + 'static,
{
    fn escalation(&self) -> Option<ErrorKind> {
        match self {
            Self::MissingId | Self::Complete(_) => None,
            Self::Produce(e) => Some(e.kind()),
        }
    }
}

/// Errors that end a stage run.
#[derive(Debug, Error)]
pub enum Error<BE, CE>
where
    BE: BrokerError,
    CE: StdError + Send + Sync + 'static,
{
    /// Connecting to the broker failed.
    #[error("failed to connect: {0}")]
    Connect(#[source] BE),

    /// The request consumer failed.
    #[error(transparent)]
    Consumer(#[from] trellis_messaging::consumer::Error<BE, HandlerError<BE, CE>>),

    /// The response producer could not be created.
    #[error(transparent)]
    Producer(#[from] ProducerError<BE>),
}

impl<BE, CE> StageError for Error<BE, CE>
where
    BE: BrokerError,
    CE: StdError + Send + Sync + 'static,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(e) => e.kind(),
            Self::Consumer(e) => e.kind(),
            Self::Producer(e) => e.kind(),
        }
    }
}
