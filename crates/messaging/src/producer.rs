use crate::broker::{Broker, BrokerError, Publisher};
use crate::error::ErrorKind;
use crate::message::{Message, Properties};

use std::error::Error as StdError;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tracing::trace;

/// Errors that can occur when producing.
#[derive(Debug, Error)]
pub enum Error<BE, SE>
where
    BE: BrokerError,
    SE: Debug + StdError + Send + Sync + 'static,
{
    /// The broker rejected or failed to transmit the message.
    #[error("failed to send: {0}")]
    Broker(#[source] BE),

    /// The payload could not be serialized.
    #[error("failed to serialize payload: {0}")]
    Serialize(#[source] SE),
}

impl<BE, SE> Error<BE, SE>
where
    BE: BrokerError,
    SE: Debug + StdError + Send + Sync + 'static,
{
    /// Classifies the error for the supervisor.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Broker(e) => e.kind(),
            Self::Serialize(_) => ErrorKind::Retryable,
        }
    }
}

/// Sends typed messages to one topic.
#[derive(Debug)]
pub struct Producer<B, T, D, S>
where
    B: Broker,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    publisher: Arc<B::Publisher>,
    _marker: PhantomData<(T, D, S)>,
}

impl<B, T, D, S> Clone for Producer<B, T, D, S>
where
    B: Broker,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            publisher: self.publisher.clone(),
            _marker: PhantomData,
        }
    }
}

impl<B, T, D, S> Producer<B, T, D, S>
where
    B: Broker,
    T: Clone
        + Debug
        + Send
        + Sync
        + TryFrom<Bytes, Error = D>
        + TryInto<Bytes, Error = S>
        + 'static,
    D: Debug + Send + StdError + Sync + 'static,
    S: Debug + Send + StdError + Sync + 'static,
{
    /// Creates a producer bound to a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker cannot create a publisher.
    pub async fn new(broker: &B, topic: &str) -> Result<Self, Error<B::Error, S>> {
        let publisher = broker.publisher(topic).await.map_err(Error::Broker)?;

        Ok(Self {
            publisher: Arc::new(publisher),
            _marker: PhantomData,
        })
    }

    /// The topic this producer sends to.
    pub fn topic(&self) -> &str {
        self.publisher.topic()
    }

    /// Sends a payload with no properties.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or transmission fails.
    pub async fn send(&self, payload: T) -> Result<(), Error<B::Error, S>> {
        self.send_with_properties(payload, Properties::new()).await
    }

    /// Sends a message, keeping its properties.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or transmission fails.
    pub async fn send_message(&self, message: Message<T>) -> Result<(), Error<B::Error, S>> {
        self.send_with_properties(message.payload, message.properties)
            .await
    }

    /// Sends a payload with the given properties.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or transmission fails.
    pub async fn send_with_properties(
        &self,
        payload: T,
        properties: Properties,
    ) -> Result<(), Error<B::Error, S>> {
        let bytes: Bytes = payload.try_into().map_err(Error::Serialize)?;

        trace!("sending {} bytes to {}", bytes.len(), self.topic());

        self.publisher
            .send(bytes, properties)
            .await
            .map_err(Error::Broker)
    }
}
