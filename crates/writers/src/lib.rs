//! Storage writer stages.
//!
//! Each stage consumes one topic and hands every message to a store: graph
//! edges go to a [`GraphStore`], entity embeddings to a [`VectorStore`]. A
//! failed store write rejects the message so it is delivered again; a broker
//! failure ends the stage for the supervisor to rebuild.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

/// Writes graph edges to a graph store.
pub mod graph;

/// Writes entity embeddings to a vector store.
pub mod vectors;

pub use error::{Error, HandlerError};
pub use graph::{GraphStore, GraphWriteConfig, GraphWriteStage};
pub use vectors::{VectorStore, VectorWriteConfig, VectorWriteStage};
