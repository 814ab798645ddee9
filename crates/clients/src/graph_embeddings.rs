use crate::{DEFAULT_TIMEOUT, Error};

use std::sync::Arc;

use trellis_messaging::broker::Broker;
use trellis_messaging::client::{RequestClient, RequestClientOptions};
use trellis_messaging::metrics::MetricsSink;
use trellis_schema::topics::{GRAPH_EMBEDDINGS, GRAPH_EMBEDDINGS_RESPONSE};
use trellis_schema::{GraphEmbeddingsRequest, GraphEmbeddingsResponse, Value};

/// Default number of entities asked for.
pub const DEFAULT_ENTITY_LIMIT: u32 = 10;

type Inner<B> = RequestClient<
    B,
    GraphEmbeddingsRequest,
    serde_json::Error,
    serde_json::Error,
    GraphEmbeddingsResponse,
    serde_json::Error,
>;

/// Finds graph entities whose embeddings are closest to a query.
#[derive(Clone, Debug)]
pub struct GraphEmbeddingsClient<B>
where
    B: Broker,
{
    inner: Inner<B>,
}

impl<B> GraphEmbeddingsClient<B>
where
    B: Broker,
{
    /// Options for the default graph-embeddings topics.
    pub fn default_options() -> RequestClientOptions {
        RequestClientOptions::new(GRAPH_EMBEDDINGS, GRAPH_EMBEDDINGS_RESPONSE)
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

    /// Returns up to `limit` entities nearest to `vectors`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or no reply arrives in time.
    pub async fn request(
        &self,
        vectors: Vec<Vec<f64>>,
        limit: u32,
    ) -> Result<Vec<Value>, Error<B::Error>> {
        let reply = self
            .inner
            .request(GraphEmbeddingsRequest { vectors, limit })
            .await?;

        Ok(reply.entities)
    }
}
