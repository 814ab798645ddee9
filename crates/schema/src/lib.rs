//! Payload types exchanged by pipeline stages, and the topics they travel on.
//!
//! Every payload is JSON on the wire and converts to and from `Bytes`, so it
//! can be used directly with the messaging crate's producers, consumers, and
//! request clients.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Implements the `Bytes` conversions for a JSON payload.
macro_rules! json_payload {
    ($($name:ident),+ $(,)?) => {
        $(
            impl TryFrom<bytes::Bytes> for $name {
                type Error = serde_json::Error;

                fn try_from(bytes: bytes::Bytes) -> Result<Self, Self::Error> {
                    serde_json::from_slice(&bytes)
                }
            }

            impl TryInto<bytes::Bytes> for $name {
                type Error = serde_json::Error;

                fn try_into(self) -> Result<bytes::Bytes, Self::Error> {
                    serde_json::to_vec(&self).map(bytes::Bytes::from)
                }
            }
        )+
    };
}

mod graph;
mod llm;
mod vectors;

/// RDF vocabulary used when minting graph edges.
pub mod rdf;

/// Default topic names.
pub mod topics;

pub use graph::{GraphEmbeddingsRequest, GraphEmbeddingsResponse, Source, Triple, Value};
pub use llm::{TextCompletionRequest, TextCompletionResponse};
pub use vectors::{VectorsAssociation, VectorsChunk};

/// Error raised when a payload cannot be converted to or from JSON.
pub type Error = serde_json::Error;
