use crate::completer::Completer;
use crate::error::HandlerError;

use async_trait::async_trait;
use tracing::{debug, warn};
use trellis_messaging::broker::Broker;
use trellis_messaging::consumer_handler::ConsumerHandler;
use trellis_messaging::producer::Producer;
use trellis_messaging::{CORRELATION_ID, Message, Properties};
use trellis_schema::{TextCompletionRequest, TextCompletionResponse};

/// Producer of completion responses.
pub type ResponseProducer<B> =
    Producer<B, TextCompletionResponse, serde_json::Error, serde_json::Error>;

/// Completes each prompt and replies under the request's correlation id.
#[derive(Clone, Debug)]
pub struct CompletionHandler<B, C>
where
    B: Broker,
    C: Completer,
{
    completer: C,
    responses: ResponseProducer<B>,
}

impl<B, C> CompletionHandler<B, C>
where
    B: Broker,
    C: Completer,
{
    /// Creates a handler from its collaborators.
    pub const fn new(completer: C, responses: ResponseProducer<B>) -> Self {
        Self {
            completer,
            responses,
        }
    }
}

#[async_trait]
impl<B, C> ConsumerHandler<TextCompletionRequest, serde_json::Error, serde_json::Error>
    for CompletionHandler<B, C>
where
    B: Broker,
    C: Completer,
{
    type Error = HandlerError<B::Error, C::Error>;

    async fn handle(&self, message: Message<TextCompletionRequest>) -> Result<(), Self::Error> {
        let Some(id) = message.correlation_id().map(str::to_string) else {
            warn!("dropping completion request without an id");
            return Err(HandlerError::MissingId);
        };

        debug!("handling prompt {}", id);

        let response = self
            .completer
            .complete(&message.payload.prompt)
            .await
            .map_err(HandlerError::Complete)?;

        self.responses
            .send_with_properties(
                TextCompletionResponse { response },
                Properties::from([(CORRELATION_ID.to_string(), id)]),
            )
            .await
            .map_err(HandlerError::Produce)
    }
}
