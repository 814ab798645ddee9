use thiserror::Error;
use trellis_messaging::ErrorKind;
use trellis_messaging::broker::BrokerError;
use trellis_messaging::consumer_handler::ConsumerHandlerError;
use trellis_messaging::stage::StageError;

/// Producer error for the stage's JSON payloads.
pub type ProducerError<BE> = trellis_messaging::producer::Error<BE, serde_json::Error>;

/// Errors raised while handling one chunk.
#[derive(Debug, Error)]
pub enum HandlerError<BE>
where
    BE: BrokerError,
{
    /// The LLM request failed.
    #[error("llm request failed: {0}")]
    Llm(#[source] trellis_clients::Error<BE>),

    /// The LLM reply was not a list of relationships.
    #[error("unparseable llm reply: {0}")]
    Parse(#[source] serde_json::Error),

    /// Emitting a triple or vector association failed.
    #[error("failed to emit: {0}")]
    Produce(#[source] ProducerError<BE>),
}

impl<BE> ConsumerHandlerError for HandlerError<BE>
where
    BE: BrokerError,
{
    fn escalation(&self) -> Option<ErrorKind> {
        match self {
            Self::Llm(e) if e.is_channel_failure() => Some(e.kind()),
            Self::Llm(_) | Self::Parse(_) => None,
            Self::Produce(e) => Some(e.kind()),
        }
    }
}

/// Errors that end a stage run.
#[derive(Debug, Error)]
pub enum Error<BE>
where
    BE: BrokerError,
{
    /// Connecting to the broker failed.
    #[error("failed to connect: {0}")]
    Connect(#[source] BE),

    /// The input consumer failed.
    #[error(transparent)]
    Consumer(#[from] trellis_messaging::consumer::Error<BE, HandlerError<BE>>),

    /// The LLM client could not be created.
    #[error(transparent)]
    Llm(#[from] trellis_clients::Error<BE>),

    /// An output producer could not be created.
    #[error(transparent)]
    Producer(#[from] ProducerError<BE>),
}

impl<BE> StageError for Error<BE>
where
    BE: BrokerError,
{
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Connect(e) => e.kind(),
            Self::Consumer(e) => e.kind(),
            Self::Llm(e) => e.kind(),
            Self::Producer(e) => e.kind(),
        }
    }
}
