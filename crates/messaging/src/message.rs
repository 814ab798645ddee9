use std::collections::HashMap;

/// Broker-native key/value metadata carried alongside a payload.
pub type Properties = HashMap<String, String>;

/// Property key reserved for request/response correlation identifiers.
pub const CORRELATION_ID: &str = "id";

/// A payload together with its properties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message<T> {
    /// The schema-typed payload.
    pub payload: T,

    /// Properties attached by the sender.
    pub properties: Properties,
}

impl<T> Message<T> {
    /// Creates a message with no properties.
    pub fn new(payload: T) -> Self {
        Self {
            payload,
            properties: Properties::new(),
        }
    }

    /// Creates a message with the given properties.
    pub const fn with_properties(payload: T, properties: Properties) -> Self {
        Self {
            payload,
            properties,
        }
    }

    /// Adds a property, replacing any previous value under the same key.
    #[must_use]
    pub fn with_property<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns the value of a property.
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    /// Returns the correlation identifier, if the sender attached one.
    pub fn correlation_id(&self) -> Option<&str> {
        self.property(CORRELATION_ID)
    }
}
