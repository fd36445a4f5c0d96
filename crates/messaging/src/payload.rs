use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::PayloadError;

/// Attribute carrying the payload's content type.
pub const CONTENT_TYPE_ATTRIBUTE: &str = "contentType";

/// Content type of structured payloads.
pub const APPLICATION_JSON: &str = "application/json";

/// Content type of text payloads.
pub const TEXT_PLAIN: &str = "text/plain";

/// A message body.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Structured payload.
    Json(Value),

    /// Text payload.
    Text(String),
}

/// Wire form of a message: base64 data plus string attributes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64-encoded payload bytes.
    #[serde(default)]
    pub data: String,

    /// Message attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl Payload {
    /// Serializes `value` into a structured payload.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be serialized.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::from)
    }

    /// Content type recorded in the envelope.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        match self {
            Self::Json(_) => APPLICATION_JSON,
            Self::Text(_) => TEXT_PLAIN,
        }
    }

    /// Encodes the payload for publishing.
    #[must_use]
    pub fn encode(&self) -> Envelope {
        let body = match self {
            Self::Json(value) => value.to_string(),
            Self::Text(text) => text.clone(),
        };

        Envelope {
            data: STANDARD.encode(body),
            attributes: BTreeMap::from([(
                CONTENT_TYPE_ATTRIBUTE.to_string(),
                self.content_type().to_string(),
            )]),
        }
    }

    /// Decodes a received envelope. Missing content type means text.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is not base64, or does not match its
    /// declared content type.
    pub fn decode(envelope: &Envelope) -> Result<Self, PayloadError> {
        let bytes = STANDARD.decode(&envelope.data)?;

        match envelope
            .attributes
            .get(CONTENT_TYPE_ATTRIBUTE)
            .map(String::as_str)
        {
            Some(APPLICATION_JSON) => Ok(Self::Json(serde_json::from_slice(&bytes)?)),
            _ => Ok(Self::Text(String::from_utf8(bytes)?)),
        }
    }

    /// Deserializes a structured payload, or a text payload holding JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload does not deserialize into `T`.
    pub fn to_json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        match self {
            Self::Json(value) => T::deserialize(value),
            Self::Text(text) => serde_json::from_str(text),
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Json(other),
        }
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_json_envelope() {
        let envelope = Payload::Json(json!({"a": 1})).encode();

        assert_eq!(envelope.data, STANDARD.encode(r#"{"a":1}"#));
        assert_eq!(envelope.attributes[CONTENT_TYPE_ATTRIBUTE], APPLICATION_JSON);
        assert_eq!(
            Payload::decode(&envelope).unwrap(),
            Payload::Json(json!({"a": 1}))
        );
    }

    #[test]
    fn test_bare_string_is_text() {
        assert_eq!(
            Payload::from(json!("hello")),
            Payload::Text("hello".to_string())
        );
    }

    #[test]
    fn test_missing_content_type_decodes_as_text() {
        let envelope = Envelope {
            data: STANDARD.encode("{\"a\":1}"),
            attributes: BTreeMap::new(),
        };

        let payload = Payload::decode(&envelope).unwrap();
        assert_eq!(payload, Payload::Text("{\"a\":1}".to_string()));
        assert_eq!(payload.to_json::<Value>().unwrap(), json!({"a": 1}));
    }

    #[test]
    fn test_bad_json_is_an_error() {
        let envelope = Envelope {
            data: STANDARD.encode("not json"),
            attributes: BTreeMap::from([(
                CONTENT_TYPE_ATTRIBUTE.to_string(),
                APPLICATION_JSON.to_string(),
            )]),
        };

        assert_matches!(Payload::decode(&envelope), Err(PayloadError::Json(_)));
    }

    #[test]
    fn test_bad_base64_is_an_error() {
        let envelope = Envelope {
            data: "***".to_string(),
            attributes: BTreeMap::new(),
        };

        assert_matches!(Payload::decode(&envelope), Err(PayloadError::Base64(_)));
    }
}
