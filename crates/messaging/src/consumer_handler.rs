use crate::error::ErrorKind;
use crate::message::Message;

use std::error::Error;
use std::fmt::Debug;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for consumer handler errors.
pub trait ConsumerHandlerError: Error + Send + Sync + 'static {
    /// Returns a kind when the failure belongs to the stage's channels
    /// rather than to the message being handled.
    ///
    /// `None` rejects the message and keeps the consumer running. `Some`
    /// rejects the message and ends the consumer so the supervisor can
    /// rebuild the stage.
    fn escalation(&self) -> Option<ErrorKind> {
        None
    }
}

/// Per-stage processing logic run by a consumer for every message.
#[async_trait]
pub trait ConsumerHandler<T, D, S>
where
    Self: Clone + Debug + Send + Sync + 'static,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Error + Send + Sync + 'static,
    S: Debug + Error + Send + Sync + 'static,
{
    /// The error type for the handler.
    type Error: ConsumerHandlerError;

    /// Handles one message. The message is acknowledged only after this returns `Ok`.
    async fn handle(&self, message: Message<T>) -> Result<(), Self::Error>;
}
