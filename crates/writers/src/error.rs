use std::error::Error as StdError;

use thiserror::Error;
use trellis_messaging::ErrorKind;
use trellis_messaging::broker::BrokerError;
use trellis_messaging::consumer_handler::ConsumerHandlerError;
use trellis_messaging::stage::StageError;

/// Errors raised while writing one message.
#[derive(Debug, Error)]
pub enum HandlerError<SE>
where
    SE: StdError + Send + Sync + 'static,
{
    /// The store refused or failed the write.
    #[error("store write failed: {0}")]
    Store(#[source] SE),
}

// Store failures belong to the message, never to the stage's channels
impl<SE> ConsumerHandlerError for HandlerError<SE> where SE: StdError + Send + Sync + 'static {}

/// Errors that end a writer run.
#[derive(Debug, Error)]
pub enum Error<BE, SE>
where
    BE: BrokerError,
    SE: StdError + Send + Sync + 'static,
{
    /// Connecting to the broker failed.
    #[error("failed to connect: {0}")]
    Connect(#[source] BE),

    /// The input consumer failed.
    #[error(transparent)]
    Consumer(#[from] trellis_messaging::consumer::Error<BE, HandlerError<SE>>),
}

impl<BE, SE> StageError for Error<BE, SE>
where
    BE: BrokerError,
    SE: StdError + Send + Sync + 'static,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(e) => e.kind(),
            Self::Consumer(e) => e.kind(),
        }
    }
}
