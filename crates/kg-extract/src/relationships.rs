use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Deserialize;
use trellis_schema::rdf::TRUSTGRAPH_ENTITIES;

/// Characters left as-is when minting entity URIs.
const URI_SAFE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// One relationship as returned by the LLM.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Relationship {
    /// The entity the relationship starts from.
    pub subject: String,

    /// The relationship itself.
    pub predicate: String,

    /// The entity or literal the relationship points to.
    pub object: String,

    /// Whether `object` names an entity rather than a literal value.
    #[serde(rename = "object-entity")]
    pub object_entity: bool,
}

/// Parses an LLM reply into relationships.
///
/// Replies wrapped in a Markdown code fence are accepted.
///
/// # Errors
///
/// Returns an error if the reply is not a JSON array of relationships.
pub fn parse(reply: &str) -> Result<Vec<Relationship>, serde_json::Error> {
    serde_json::from_str(strip_code_fence(reply))
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();

    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };

    // Drop the info string (e.g. `json`) up to the first newline
    let inner = inner.split_once('\n').map_or(inner, |(_, body)| body);

    inner.strip_suffix("```").unwrap_or(inner).trim()
}

/// Mints the entity URI for a piece of text.
pub fn to_uri(text: &str) -> String {
    let part = text.replace(' ', "-").to_lowercase();

    format!("{TRUSTGRAPH_ENTITIES}{}", utf8_percent_encode(&part, URI_SAFE))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_uri() {
        assert_eq!(to_uri("Alice Smith"), "http://trustgraph.ai/e/alice-smith");
        assert_eq!(to_uri("Café"), "http://trustgraph.ai/e/caf%C3%A9");
        assert_eq!(to_uri("AT&T"), "http://trustgraph.ai/e/at%26t");
        assert_eq!(to_uri("a/b.c"), "http://trustgraph.ai/e/a/b.c");
    }

    #[test]
    fn test_parse_plain_array() {
        let reply = r#"[
            {"subject": "Alice", "predicate": "knows", "object": "Bob", "object-entity": true},
            {"subject": "Alice", "predicate": "age", "object": "42", "object-entity": false}
        ]"#;

        let relationships = parse(reply).unwrap();

        assert_eq!(relationships.len(), 2);
        assert_eq!(relationships[0].object, "Bob");
        assert!(relationships[0].object_entity);
        assert!(!relationships[1].object_entity);
    }

    #[test]
    fn test_parse_fenced_reply() {
        let reply = "```json\n[{\"subject\": \"a\", \"predicate\": \"b\", \"object\": \"c\", \"object-entity\": false}]\n```";

        let relationships = parse(reply).unwrap();

        assert_eq!(relationships[0].subject, "a");
    }

    #[test]
    fn test_parse_rejects_prose() {
        assert!(parse("I could not find any relationships.").is_err());
        assert!(parse(r#"{"subject": "a"}"#).is_err());
    }
}
