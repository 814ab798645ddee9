use crate::error::Error;
use crate::handler::{ExtractHandler, TripleProducer, VectorsProducer};

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;
use trellis_clients::LlmClient;
use trellis_messaging::broker::{Broker, Connector};
use trellis_messaging::client::RequestClientOptions;
use trellis_messaging::consumer::{Consumer, DEFAULT_MAX_REDELIVERIES};
use trellis_messaging::metrics::{MetricsSink, NoopMetrics};
use trellis_messaging::stage::Stage;
use trellis_schema::VectorsChunk;
use trellis_schema::topics::{GRAPH_LOAD, VECTORS_CHUNK_LOAD, VECTORS_LOAD};

/// Default subscriber name on the input topic.
pub const DEFAULT_SUBSCRIBER: &str = "kg-extract-relationships";

/// Everything needed to build the stage.
#[derive(Clone, Debug)]
pub struct ExtractConfig<C>
where
    C: Connector,
{
    /// Opens the broker connection for each attempt.
    pub connector: C,

    /// Topic chunks arrive on.
    pub input_topic: String,

    /// Subscriber name on the input topic.
    pub subscriber: String,

    /// Topic graph edges are sent to.
    pub triples_topic: String,

    /// Topic entity embeddings are sent to.
    pub vectors_topic: String,

    /// Topics and timeout of the LLM service.
    pub llm: RequestClientOptions,

    /// A chunk still failing after this many redeliveries is dropped.
    /// `None` redelivers it for as long as it fails.
    pub max_redeliveries: Option<u32>,

    /// Receives consumer and request events.
    pub metrics: Arc<dyn MetricsSink>,
}

impl<C> ExtractConfig<C>
where
    C: Connector,
{
    /// Config with the default topics.
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            input_topic: VECTORS_CHUNK_LOAD.to_string(),
            subscriber: DEFAULT_SUBSCRIBER.to_string(),
            triples_topic: GRAPH_LOAD.to_string(),
            vectors_topic: VECTORS_LOAD.to_string(),
            llm: LlmClient::<C::Broker>::default_options(),
            max_redeliveries: Some(DEFAULT_MAX_REDELIVERIES),
            metrics: Arc::new(NoopMetrics),
        }
    }
}

type ExtractConsumer<B> = Consumer<
    B,
    ExtractHandler<B>,
    VectorsChunk,
    serde_json::Error,
    serde_json::Error,
>;

/// Relationship extraction: chunks in, graph edges and entity embeddings out.
#[derive(Debug)]
pub struct ExtractStage<C>
where
    C: Connector,
{
    consumer: ExtractConsumer<C::Broker>,
}

#[async_trait]
impl<C> Stage for ExtractStage<C>
where
    C: Connector,
{
    const NAME: &'static str = "kg-extract-relationships";

    type Config = ExtractConfig<C>;

    type Error = Error<<C::Broker as Broker>::Error>;

    async fn construct(config: &Self::Config) -> Result<Self, Self::Error> {
        let broker = config.connector.connect().await.map_err(Error::Connect)?;

        let llm = LlmClient::new(&broker, config.llm.clone(), config.metrics.clone()).await?;
        let triples = TripleProducer::new(&broker, &config.triples_topic).await?;
        let vectors = VectorsProducer::new(&broker, &config.vectors_topic).await?;

        let mut consumer = Consumer::new(
            &broker,
            &config.input_topic,
            &config.subscriber,
            ExtractHandler::new(llm, triples, vectors),
            config.metrics.clone(),
        )
        .await?;

        if let Some(limit) = config.max_redeliveries {
            consumer = consumer.with_max_redeliveries(limit);
        }

        info!(
            "extracting from '{}' into '{}' and '{}'",
            config.input_topic, config.triples_topic, config.vectors_topic
        );

        Ok(Self { consumer })
    }

    async fn run(&self, shutdown: &CancellationToken) -> Result<(), Self::Error> {
        self.consumer.run(shutdown).await?;
        Ok(())
    }
}
