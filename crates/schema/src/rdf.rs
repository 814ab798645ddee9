/// Predicate linking a node to its human-readable label.
pub const RDF_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

/// Namespace for entity URIs minted from extracted text.
pub const TRUSTGRAPH_ENTITIES: &str = "http://trustgraph.ai/e/";
