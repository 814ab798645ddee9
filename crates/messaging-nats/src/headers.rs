use async_nats::HeaderMap;
use trellis_messaging::Properties;

/// Writes each property as a header named `prefix` + key.
pub fn to_headers(prefix: &str, properties: &Properties) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (key, value) in properties {
        headers.insert(format!("{prefix}{key}").as_str(), value.as_str());
    }

    headers
}

/// Reads back every header carrying `prefix`. Other headers are ignored.
pub fn to_properties(prefix: &str, headers: Option<&HeaderMap>) -> Properties {
    let mut properties = Properties::new();

    let Some(headers) = headers else {
        return properties;
    };

    for (name, values) in headers.iter() {
        let name = name.to_string();

        if let (Some(key), Some(value)) = (name.strip_prefix(prefix), values.first()) {
            properties.insert(key.to_string(), value.to_string());
        }
    }

    properties
}
