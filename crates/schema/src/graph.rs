use crate::rdf::RDF_LABEL;

use serde::{Deserialize, Serialize};

/// A graph node or literal.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Value {
    /// The URI, or the literal text.
    pub value: String,

    /// Whether `value` is a URI.
    pub is_uri: bool,
}

impl Value {
    /// A URI node.
    pub fn uri<V: Into<String>>(value: V) -> Self {
        Self {
            value: value.into(),
            is_uri: true,
        }
    }

    /// A literal.
    pub fn literal<V: Into<String>>(value: V) -> Self {
        Self {
            value: value.into(),
            is_uri: false,
        }
    }

    /// The `rdfs:label` predicate.
    pub fn rdf_label() -> Self {
        Self::uri(RDF_LABEL)
    }
}

/// Where a piece of text came from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// The originating system or collection.
    pub source: String,

    /// Document identifier.
    pub id: String,

    /// Document title.
    pub title: String,
}

/// One graph edge.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Triple {
    /// Provenance, when known.
    #[serde(default)]
    pub source: Option<Source>,

    /// Subject.
    pub s: Value,

    /// Predicate.
    pub p: Value,

    /// Object.
    pub o: Value,
}

impl Triple {
    /// An edge with no provenance.
    pub const fn new(s: Value, p: Value, o: Value) -> Self {
        Self {
            source: None,
            s,
            p,
            o,
        }
    }
}

/// Looks up the entities nearest to some embeddings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphEmbeddingsRequest {
    /// Query embeddings.
    pub vectors: Vec<Vec<f64>>,

    /// Maximum number of entities to return.
    pub limit: u32,
}

/// Entities found for a [`GraphEmbeddingsRequest`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEmbeddingsResponse {
    /// Matching entities, nearest first.
    pub entities: Vec<Value>,
}

json_payload!(Triple, GraphEmbeddingsRequest, GraphEmbeddingsResponse);

#[cfg(test)]
mod tests {
    use super::*;

    use bytes::Bytes;

    #[test]
    fn test_triple_without_source_decodes() {
        let json = r#"{
            "s": {"value": "http://trustgraph.ai/e/alice", "is_uri": true},
            "p": {"value": "http://trustgraph.ai/e/knows", "is_uri": true},
            "o": {"value": "Bob", "is_uri": false}
        }"#;

        let triple = Triple::try_from(Bytes::from(json)).unwrap();

        assert_eq!(triple.source, None);
        assert_eq!(triple.s, Value::uri("http://trustgraph.ai/e/alice"));
        assert_eq!(triple.o, Value::literal("Bob"));
    }

    #[test]
    fn test_response_rejects_malformed_json() {
        let result = GraphEmbeddingsResponse::try_from(Bytes::from_static(b"{\"entities\": 3}"));

        assert!(result.is_err());
    }
}
