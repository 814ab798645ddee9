use crate::error::{Error, HandlerError};

use std::error::Error as StdError;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_messaging::Message;
use trellis_messaging::broker::{Broker, Connector};
use trellis_messaging::consumer::{Consumer, DEFAULT_MAX_REDELIVERIES};
use trellis_messaging::consumer_handler::ConsumerHandler;
use trellis_messaging::metrics::{MetricsSink, NoopMetrics};
use trellis_messaging::stage::Stage;
use trellis_schema::VectorsAssociation;
use trellis_schema::topics::VECTORS_LOAD;

/// Default subscriber name on the embeddings topic.
pub const DEFAULT_SUBSCRIBER: &str = "vector-write";

/// A vector index keyed by entity.
#[async_trait]
pub trait VectorStore: Clone + Debug + Send + Sync + 'static {
    /// The error type for the store.
    type Error: StdError + Send + Sync + 'static;

    /// Stores one embedding for `entity`.
    async fn insert(&self, vector: &[f64], entity: &str) -> Result<(), Self::Error>;
}

/// Writes every embedding of an association to the store, one at a time.
///
/// Associations with an empty entity are acknowledged without a write. When
/// a write fails part way through, the redelivered association writes every
/// embedding again.
#[derive(Clone, Debug)]
pub struct VectorWriteHandler<V>
where
    V: VectorStore,
{
    store: V,
}

impl<V> VectorWriteHandler<V>
where
    V: VectorStore,
{
    /// Creates a handler writing to `store`.
    pub const fn new(store: V) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<V> ConsumerHandler<VectorsAssociation, serde_json::Error, serde_json::Error>
    for VectorWriteHandler<V>
where
    V: VectorStore,
{
    type Error = HandlerError<V::Error>;

    async fn handle(&self, message: Message<VectorsAssociation>) -> Result<(), Self::Error> {
        let association = &message.payload;
        let entity = association.entity.value.as_str();

        if entity.is_empty() {
            debug!("skipping embeddings without an entity");
            return Ok(());
        }

        for vector in &association.vectors {
            self.store
                .insert(vector, entity)
                .await
                .map_err(HandlerError::Store)?;
        }

        debug!("wrote {} embeddings for {}", association.vectors.len(), entity);

        Ok(())
    }
}

/// Everything needed to build the vector writer.
#[derive(Clone, Debug)]
pub struct VectorWriteConfig<C, V>
where
    C: Connector,
    V: VectorStore,
{
    /// Opens the broker connection for each attempt.
    pub connector: C,

    /// Receives the embeddings.
    pub store: V,

    /// Topic associations arrive on.
    pub input_topic: String,

    /// Subscriber name on the input topic.
    pub subscriber: String,

    /// An association still failing after this many redeliveries is dropped.
    pub max_redeliveries: Option<u32>,

    /// Receives consumer events.
    pub metrics: Arc<dyn MetricsSink>,
}

impl<C, V> VectorWriteConfig<C, V>
where
    C: Connector,
    V: VectorStore,
{
    /// Config with the default topic.
    pub fn new(connector: C, store: V) -> Self {
        Self {
            connector,
            store,
            input_topic: VECTORS_LOAD.to_string(),
            subscriber: DEFAULT_SUBSCRIBER.to_string(),
            max_redeliveries: Some(DEFAULT_MAX_REDELIVERIES),
            metrics: Arc::new(NoopMetrics),
        }
    }
}

type VectorWriteConsumer<B, V> = Consumer<
    B,
    VectorWriteHandler<V>,
    VectorsAssociation,
    serde_json::Error,
    serde_json::Error,
>;

/// Consumes entity embeddings into a [`VectorStore`].
#[derive(Debug)]
pub struct VectorWriteStage<C, V>
where
    C: Connector,
    V: VectorStore,
{
    consumer: VectorWriteConsumer<C::Broker, V>,
}

#[async_trait]
impl<C, V> Stage for VectorWriteStage<C, V>
where
    C: Connector,
    V: VectorStore,
{
    const NAME: &'static str = "vector-write";

    type Config = VectorWriteConfig<C, V>;

    type Error = Error<<C::Broker as Broker>::Error, V::Error>;

    async fn construct(config: &Self::Config) -> Result<Self, Self::Error> {
        let broker = config.connector.connect().await.map_err(Error::Connect)?;

        let mut consumer = Consumer::new(
            &broker,
            &config.input_topic,
            &config.subscriber,
            VectorWriteHandler::new(config.store.clone()),
            config.metrics.clone(),
        )
        .await?;

        if let Some(limit) = config.max_redeliveries {
            consumer = consumer.with_max_redeliveries(limit);
        }

        info!("writing embeddings from '{}'", config.input_topic);

        Ok(Self { consumer })
    }

    async fn run(&self, shutdown: &CancellationToken) -> Result<(), Self::Error> {
        self.consumer.run(shutdown).await?;
        Ok(())
    }
}
