//! Typed request clients for the pipeline's request/response services.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod graph_embeddings;
mod llm;

pub use graph_embeddings::{DEFAULT_ENTITY_LIMIT, GraphEmbeddingsClient};
pub use llm::LlmClient;

use std::time::Duration;

/// Default time to wait for a service reply.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(500);

/// Error type for the typed clients.
pub type Error<BE> = trellis_messaging::client::Error<BE, serde_json::Error, serde_json::Error>;
