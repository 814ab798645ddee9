use crate::error::{Error, HandlerError};

use std::error::Error as StdError;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use trellis_messaging::Message;
use trellis_messaging::broker::{Broker, Connector};
use trellis_messaging::consumer::{Consumer, DEFAULT_MAX_REDELIVERIES};
use trellis_messaging::consumer_handler::ConsumerHandler;
use trellis_messaging::metrics::{MetricsSink, NoopMetrics};
use trellis_messaging::stage::Stage;
use trellis_schema::Triple;
use trellis_schema::topics::GRAPH_LOAD;

/// Default subscriber name on the edge topic.
pub const DEFAULT_SUBSCRIBER: &str = "graph-write";

const PROGRESS_EVERY: u64 = 1000;

/// A graph database that stores edges as plain `(s, p, o)` strings.
#[async_trait]
pub trait GraphStore: Clone + Debug + Send + Sync + 'static {
    /// The error type for the store.
    type Error: StdError + Send + Sync + 'static;

    /// Stores one edge. Storing an edge twice must be harmless.
    async fn insert(&self, s: &str, p: &str, o: &str) -> Result<(), Self::Error>;
}

/// Writes each edge to the store.
#[derive(Clone, Debug)]
pub struct GraphWriteHandler<G>
where
    G: GraphStore,
{
    store: G,
    written: Arc<AtomicU64>,
}

impl<G> GraphWriteHandler<G>
where
    G: GraphStore,
{
    /// Creates a handler writing to `store`.
    pub fn new(store: G) -> Self {
        Self {
            store,
            written: Arc::new(AtomicU64::new(0)),
        }
    }
}

#[async_trait]
impl<G> ConsumerHandler<Triple, serde_json::Error, serde_json::Error> for GraphWriteHandler<G>
where
    G: GraphStore,
{
    type Error = HandlerError<G::Error>;

    async fn handle(&self, message: Message<Triple>) -> Result<(), Self::Error> {
        let Triple { s, p, o, .. } = &message.payload;

        self.store
            .insert(&s.value, &p.value, &o.value)
            .await
            .map_err(HandlerError::Store)?;

        let written = self.written.fetch_add(1, Ordering::Relaxed) + 1;
        if written % PROGRESS_EVERY == 0 {
            info!("{} edges written", written);
        } else {
            debug!("wrote edge {} {}", s.value, p.value);
        }

        Ok(())
    }
}

/// Everything needed to build the graph writer.
#[derive(Clone, Debug)]
pub struct GraphWriteConfig<C, G>
where
    C: Connector,
    G: GraphStore,
{
    /// Opens the broker connection for each attempt.
    pub connector: C,

    /// Receives the edges.
    pub store: G,

    /// Topic edges arrive on.
    pub input_topic: String,

    /// Subscriber name on the input topic.
    pub subscriber: String,

    /// An edge still failing after this many redeliveries is dropped.
    pub max_redeliveries: Option<u32>,

    /// Receives consumer events.
    pub metrics: Arc<dyn MetricsSink>,
}

impl<C, G> GraphWriteConfig<C, G>
where
    C: Connector,
    G: GraphStore,
{
    /// Config with the default topic.
    pub fn new(connector: C, store: G) -> Self {
        Self {
            connector,
            store,
            input_topic: GRAPH_LOAD.to_string(),
            subscriber: DEFAULT_SUBSCRIBER.to_string(),
            max_redeliveries: Some(DEFAULT_MAX_REDELIVERIES),
            metrics: Arc::new(NoopMetrics),
        }
    }
}

type GraphWriteConsumer<B, G> =
    Consumer<B, GraphWriteHandler<G>, Triple, serde_json::Error, serde_json::Error>;

/// Consumes graph edges into a [`GraphStore`].
#[derive(Debug)]
pub struct GraphWriteStage<C, G>
where
    C: Connector,
    G: GraphStore,
{
    consumer: GraphWriteConsumer<C::Broker, G>,
}

#[async_trait]
impl<C, G> Stage for GraphWriteStage<C, G>
where
    C: Connector,
    G: GraphStore,
{
    const NAME: &'static str = "graph-write";

    type Config = GraphWriteConfig<C, G>;

    type Error = Error<<C::Broker as Broker>::Error, G::Error>;

    async fn construct(config: &Self::Config) -> Result<Self, Self::Error> {
        let broker = config.connector.connect().await.map_err(Error::Connect)?;

        let mut consumer = Consumer::new(
            &broker,
            &config.input_topic,
            &config.subscriber,
            GraphWriteHandler::new(config.store.clone()),
            config.metrics.clone(),
        )
        .await?;

        if let Some(limit) = config.max_redeliveries {
            consumer = consumer.with_max_redeliveries(limit);
        }

        info!("writing edges from '{}'", config.input_topic);

        Ok(Self { consumer })
    }

    async fn run(&self, shutdown: &CancellationToken) -> Result<(), Self::Error> {
        self.consumer.run(shutdown).await?;
        Ok(())
    }
}
