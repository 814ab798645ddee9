use crate::completer::Completer;
use crate::error::Error;
use crate::handler::{CompletionHandler, ResponseProducer};

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;
use trellis_messaging::broker::{Broker, Connector};
use trellis_messaging::consumer::{Consumer, DEFAULT_MAX_REDELIVERIES};
use trellis_messaging::metrics::{MetricsSink, NoopMetrics};
use trellis_messaging::stage::Stage;
use trellis_schema::TextCompletionRequest;
use trellis_schema::topics::{LLM_COMPLETE_TEXT, LLM_COMPLETE_TEXT_RESPONSE};

/// Default subscriber name on the request topic.
pub const DEFAULT_SUBSCRIBER: &str = "llm-ollama-text";

/// Everything needed to build the stage.
#[derive(Clone, Debug)]
pub struct CompletionConfig<C, M>
where
    C: Connector,
    M: Completer,
{
    /// Opens the broker connection for each attempt.
    pub connector: C,

    /// Completes the prompts.
    pub completer: M,

    /// Topic requests arrive on.
    pub input_topic: String,

    /// Subscriber name on the request topic.
    pub subscriber: String,

    /// Topic responses are sent to.
    pub output_topic: String,

    /// A request still failing after this many redeliveries is dropped.
    pub max_redeliveries: Option<u32>,

    /// Receives consumer events.
    pub metrics: Arc<dyn MetricsSink>,
}

impl<C, M> CompletionConfig<C, M>
where
    C: Connector,
    M: Completer,
{
    /// Config with the default topics.
    pub fn new(connector: C, completer: M) -> Self {
        Self {
            connector,
            completer,
            input_topic: LLM_COMPLETE_TEXT.to_string(),
            subscriber: DEFAULT_SUBSCRIBER.to_string(),
            output_topic: LLM_COMPLETE_TEXT_RESPONSE.to_string(),
            max_redeliveries: Some(DEFAULT_MAX_REDELIVERIES),
            metrics: Arc::new(NoopMetrics),
        }
    }
}

type CompletionConsumer<B, M> = Consumer<
    B,
    CompletionHandler<B, M>,
    TextCompletionRequest,
    serde_json::Error,
    serde_json::Error,
>;

/// The responder side of the text-completion service.
#[derive(Debug)]
pub struct CompletionStage<C, M>
where
    C: Connector,
    M: Completer,
{
    consumer: CompletionConsumer<C::Broker, M>,
}

#[async_trait]
impl<C, M> Stage for CompletionStage<C, M>
where
    C: Connector,
    M: Completer,
{
    const NAME: &'static str = "llm-ollama-text";

    type Config = CompletionConfig<C, M>;

    type Error = Error<<C::Broker as Broker>::Error, M::Error>;

    async fn construct(config: &Self::Config) -> Result<Self, Self::Error> {
        let broker = config.connector.connect().await.map_err(Error::Connect)?;

        let responses = ResponseProducer::new(&broker, &config.output_topic).await?;

        let mut consumer = Consumer::new(
            &broker,
            &config.input_topic,
            &config.subscriber,
            CompletionHandler::new(config.completer.clone(), responses),
            config.metrics.clone(),
        )
        .await?;

        if let Some(limit) = config.max_redeliveries {
            consumer = consumer.with_max_redeliveries(limit);
        }

        info!(
            "answering '{}' on '{}'",
            config.input_topic, config.output_topic
        );

        Ok(Self { consumer })
    }

    async fn run(&self, shutdown: &CancellationToken) -> Result<(), Self::Error> {
        self.consumer.run(shutdown).await?;
        Ok(())
    }
}
