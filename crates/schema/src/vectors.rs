use crate::graph::{Source, Value};

use serde::{Deserialize, Serialize};

/// A chunk of document text and its embeddings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorsChunk {
    /// The document the chunk belongs to.
    pub source: Source,

    /// Embeddings of the chunk.
    pub vectors: Vec<Vec<f64>>,

    /// The chunk text.
    pub chunk: String,
}

/// Embeddings attached to a graph entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorsAssociation {
    /// Provenance, when known.
    #[serde(default)]
    pub source: Option<Source>,

    /// The entity the embeddings describe.
    pub entity: Value,

    /// Embeddings.
    pub vectors: Vec<Vec<f64>>,
}

json_payload!(VectorsChunk, VectorsAssociation);
