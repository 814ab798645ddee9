/// Chunks of source text together with their embeddings.
pub const VECTORS_CHUNK_LOAD: &str = "vectors-chunk-load";

/// Triples to be written to the graph store.
pub const GRAPH_LOAD: &str = "graph-load";

/// Entity embeddings to be written to the vector store.
pub const VECTORS_LOAD: &str = "vectors-load";

/// Text-completion requests.
pub const LLM_COMPLETE_TEXT: &str = "llm-complete-text";

/// Text-completion replies.
pub const LLM_COMPLETE_TEXT_RESPONSE: &str = "llm-complete-text-response";

/// Graph-embeddings lookups.
pub const GRAPH_EMBEDDINGS: &str = "graph-embeddings";

/// Graph-embeddings lookup replies.
pub const GRAPH_EMBEDDINGS_RESPONSE: &str = "graph-embeddings-response";
