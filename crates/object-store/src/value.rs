use std::fmt;

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Content type used for raw binary objects.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Content type used for JSON documents.
pub const APPLICATION_JSON: &str = "application/json";

/// Content type used for everything else.
pub const TEXT_PLAIN: &str = "text/plain";

/// The stored representation of an object.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    /// `application/octet-stream`
    OctetStream,

    /// `application/json`
    Json,

    /// Any other content type, treated as text.
    Text,
}

impl ContentType {
    /// Maps a MIME string to the representation used for decoding.
    ///
    /// Parameters such as `; charset=utf-8` are ignored.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime.split(';').next().unwrap_or_default().trim();

        if essence.eq_ignore_ascii_case(OCTET_STREAM) {
            Self::OctetStream
        } else if essence.eq_ignore_ascii_case(APPLICATION_JSON) {
            Self::Json
        } else {
            Self::Text
        }
    }

    /// The MIME string written alongside objects of this type.
    #[must_use]
    pub const fn as_mime(self) -> &'static str {
        match self {
            Self::OctetStream => OCTET_STREAM,
            Self::Json => APPLICATION_JSON,
            Self::Text => TEXT_PLAIN,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// Failure to decode stored bytes for their content type.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The object claims to be JSON but does not parse.
    #[error("invalid JSON object: {0}")]
    Json(#[from] serde_json::Error),

    /// The object claims to be text but is not UTF-8.
    #[error("invalid UTF-8 text object: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// A value read from or written to the object store.
#[derive(Clone, Debug, PartialEq)]
pub enum ObjectValue {
    /// Opaque binary content.
    Bytes(Bytes),

    /// A structured JSON document.
    Json(serde_json::Value),

    /// Plain text.
    Text(String),
}

impl ObjectValue {
    /// Serializes `value` into a JSON object value.
    ///
    /// # Errors
    ///
    /// Returns an error if `value` cannot be represented as JSON.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        serde_json::to_value(value).map(Self::Json)
    }

    /// The content type inferred from the shape of the value.
    #[must_use]
    pub const fn content_type(&self) -> ContentType {
        match self {
            Self::Bytes(_) => ContentType::OctetStream,
            Self::Json(_) => ContentType::Json,
            Self::Text(_) => ContentType::Text,
        }
    }

    /// Decodes raw stored bytes according to their stored content type.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes do not match the declared content type.
    pub fn decode(bytes: Bytes, content_type: ContentType) -> Result<Self, DecodeError> {
        match content_type {
            ContentType::OctetStream => Ok(Self::Bytes(bytes)),
            ContentType::Json => Ok(Self::Json(serde_json::from_slice(&bytes)?)),
            ContentType::Text => Ok(Self::Text(String::from_utf8(bytes.to_vec())?)),
        }
    }

    /// Encodes the value into the bytes written to storage.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Bytes(bytes) => bytes.clone(),
            // Serializing a `serde_json::Value` cannot fail.
            Self::Json(value) => Bytes::from(value.to_string()),
            Self::Text(text) => Bytes::from(text.clone()),
        }
    }

    /// Deserializes a JSON value into `T`.
    ///
    /// Text values are parsed as JSON as well, so documents written by tools
    /// that did not set a content type still load.
    ///
    /// # Errors
    ///
    /// Returns an error if the value is binary or does not match `T`.
    pub fn to_json<T: DeserializeOwned>(&self) -> Result<T, DecodeError> {
        match self {
            Self::Json(value) => Ok(serde_json::from_value(value.clone())?),
            Self::Text(text) => Ok(serde_json::from_str(text)?),
            Self::Bytes(bytes) => Ok(serde_json::from_slice(bytes)?),
        }
    }

    /// Returns the value as raw bytes regardless of its content type.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        match self {
            Self::Bytes(bytes) => bytes,
            other => other.encode(),
        }
    }
}

impl From<Bytes> for ObjectValue {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<String> for ObjectValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for ObjectValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<serde_json::Value> for ObjectValue {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn test_content_type_follows_value_shape() {
        assert_eq!(
            ObjectValue::from(Bytes::from_static(b"\x00\x01")).content_type(),
            ContentType::OctetStream
        );
        assert_eq!(
            ObjectValue::from(json!({"a": 1})).content_type(),
            ContentType::Json
        );
        assert_eq!(ObjectValue::from("hello").content_type(), ContentType::Text);
    }

    #[test]
    fn test_unknown_mime_decodes_as_text() {
        assert_eq!(ContentType::from_mime("text/x-pem-file"), ContentType::Text);
        assert_eq!(
            ContentType::from_mime("application/json; charset=utf-8"),
            ContentType::Json
        );

        let value = ObjectValue::decode(
            Bytes::from_static(b"-----BEGIN KEY-----"),
            ContentType::from_mime("application/x-pem-file"),
        )
        .unwrap();
        assert_eq!(value, ObjectValue::Text("-----BEGIN KEY-----".to_string()));
    }

    #[test]
    fn test_invalid_json_is_decode_error() {
        let result = ObjectValue::decode(Bytes::from_static(b"{nope"), ContentType::Json);
        assert_matches!(result, Err(DecodeError::Json(_)));
    }

    #[test]
    fn test_json_value_to_struct() {
        #[derive(serde::Deserialize)]
        struct Creds {
            username: String,
        }

        let value = ObjectValue::from(json!({"username": "admin"}));
        let creds: Creds = value.to_json().unwrap();
        assert_eq!(creds.username, "admin");
    }
}
