use crate::error::{HandlerError, ProducerError};
use crate::prompt;
use crate::relationships::{self, Relationship};

use async_trait::async_trait;
use tracing::{debug, info};
use trellis_clients::LlmClient;
use trellis_messaging::Message;
use trellis_messaging::broker::Broker;
use trellis_messaging::consumer_handler::ConsumerHandler;
use trellis_messaging::producer::Producer;
use trellis_schema::{Triple, Value, VectorsAssociation, VectorsChunk};

/// Producer of graph edges.
pub type TripleProducer<B> = Producer<B, Triple, serde_json::Error, serde_json::Error>;

/// Producer of entity embeddings.
pub type VectorsProducer<B> = Producer<B, VectorsAssociation, serde_json::Error, serde_json::Error>;

/// Turns each chunk into graph edges and entity embeddings.
#[derive(Clone, Debug)]
pub struct ExtractHandler<B>
where
    B: Broker,
{
    llm: LlmClient<B>,
    triples: TripleProducer<B>,
    vectors: VectorsProducer<B>,
}

impl<B> ExtractHandler<B>
where
    B: Broker,
{
    /// Creates a handler from its collaborators.
    pub const fn new(
        llm: LlmClient<B>,
        triples: TripleProducer<B>,
        vectors: VectorsProducer<B>,
    ) -> Self {
        Self {
            llm,
            triples,
            vectors,
        }
    }

    async fn edge(&self, s: &Value, p: &Value, o: Value) -> Result<(), ProducerError<B::Error>> {
        self.triples
            .send(Triple::new(s.clone(), p.clone(), o))
            .await
    }

    async fn embedding(
        &self,
        entity: &Value,
        vectors: &[Vec<f64>],
    ) -> Result<(), ProducerError<B::Error>> {
        self.vectors
            .send(VectorsAssociation {
                source: None,
                entity: entity.clone(),
                vectors: vectors.to_vec(),
            })
            .await
    }

    async fn emit(
        &self,
        relationship: Relationship,
        vectors: &[Vec<f64>],
    ) -> Result<(), ProducerError<B::Error>> {
        let label = Value::rdf_label();

        let s = Value::uri(relationships::to_uri(&relationship.subject));
        let p = Value::uri(relationships::to_uri(&relationship.predicate));
        let o = if relationship.object_entity {
            Value::uri(relationships::to_uri(&relationship.object))
        } else {
            Value::literal(relationship.object.clone())
        };

        self.edge(&s, &p, o.clone()).await?;
        self.edge(&s, &label, Value::literal(relationship.subject))
            .await?;
        self.edge(&p, &label, Value::literal(relationship.predicate))
            .await?;
        if relationship.object_entity {
            self.edge(&o, &label, Value::literal(relationship.object))
                .await?;
        }

        self.embedding(&s, vectors).await?;
        self.embedding(&p, vectors).await?;
        if o.is_uri {
            self.embedding(&o, vectors).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl<B> ConsumerHandler<VectorsChunk, serde_json::Error, serde_json::Error> for ExtractHandler<B>
where
    B: Broker,
{
    type Error = HandlerError<B::Error>;

    async fn handle(&self, message: Message<VectorsChunk>) -> Result<(), Self::Error> {
        let chunk = message.payload;
        info!("indexing {}", chunk.source.id);

        let reply = self
            .llm
            .request(prompt::to_relationships(&chunk.chunk))
            .await
            .map_err(HandlerError::Llm)?;

        let relationships = relationships::parse(&reply).map_err(HandlerError::Parse)?;
        debug!(
            "{} relationships found in {}",
            relationships.len(),
            chunk.source.id
        );

        for relationship in relationships {
            self.emit(relationship, &chunk.vectors)
                .await
                .map_err(HandlerError::Produce)?;
        }

        Ok(())
    }
}
