use crate::{DEFAULT_TIMEOUT, Error};

use std::sync::Arc;

use tracing::debug;
use trellis_messaging::broker::Broker;
use trellis_messaging::client::{RequestClient, RequestClientOptions};
use trellis_messaging::metrics::MetricsSink;
use trellis_schema::topics::{LLM_COMPLETE_TEXT, LLM_COMPLETE_TEXT_RESPONSE};
use trellis_schema::{TextCompletionRequest, TextCompletionResponse};

type Inner<B> = RequestClient<
    B,
    TextCompletionRequest,
    serde_json::Error,
    serde_json::Error,
    TextCompletionResponse,
    serde_json::Error,
>;

/// Asks the text-completion service to complete prompts.
#[derive(Clone, Debug)]
pub struct LlmClient<B>
where
    B: Broker,
{
    inner: Inner<B>,
}

impl<B> LlmClient<B>
where
    B: Broker,
{
    /// Options for the default text-completion topics.
    pub fn default_options() -> RequestClientOptions {
        RequestClientOptions::new(LLM_COMPLETE_TEXT, LLM_COMPLETE_TEXT_RESPONSE)
            .with_timeout(DEFAULT_TIMEOUT)
    }

    /// Connects a client to the service.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker bindings cannot be created.
    pub async fn new(
        broker: &B,
        options: RequestClientOptions,
        metrics: Arc<dyn MetricsSink>,
    ) -> Result<Self, Error<B::Error>> {
        let inner = RequestClient::new(broker, options, metrics).await?;

        Ok(Self { inner })
    }

    /// Completes a prompt.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no reply arrives in time.
    pub async fn request<P: Into<String>>(&self, prompt: P) -> Result<String, Error<B::Error>> {
        let prompt = prompt.into();
        debug!("requesting completion for {} byte prompt", prompt.len());

        let reply = self.inner.request(TextCompletionRequest { prompt }).await?;

        Ok(reply.response)
    }
}
