use thiserror::Error;
use trellis_messaging::ErrorKind;
use trellis_messaging::broker::BrokerError;

/// Error type for the in-memory broker.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// The broker was closed; every binding derived from it is invalid.
    #[error("broker closed")]
    Closed,

    /// The broker is disconnected. Operations fail until it reconnects.
    #[error("broker disconnected")]
    Disconnected,

    /// The broker stopped serving.
    #[error("broker interrupted")]
    Interrupted,
}

impl BrokerError for Error {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Closed | Self::Disconnected => ErrorKind::Retryable,
            Self::Interrupted => ErrorKind::Fatal,
        }
    }
}
