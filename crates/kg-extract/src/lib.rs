//! Relationship extraction stage.
//!
//! Reads text chunks with their embeddings, asks the LLM service for the
//! relationships in each chunk, and emits one graph edge per relationship,
//! `rdfs:label` edges for every entity it names, and the chunk's embeddings
//! for each of those entities.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;
mod handler;
mod stage;

/// The prompt sent to the LLM service.
pub mod prompt;

/// Parsing LLM replies and minting entity URIs.
pub mod relationships;

pub use error::{Error, HandlerError};
pub use handler::{ExtractHandler, TripleProducer, VectorsProducer};
pub use stage::{DEFAULT_SUBSCRIBER, ExtractConfig, ExtractStage};
