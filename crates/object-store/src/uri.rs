use thiserror::Error;

const GS_SCHEME: &str = "gs://";

/// A parsed `gs://bucket/key` location.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GsUri {
    /// Bucket name.
    pub bucket: String,

    /// Object name within the bucket. Internal slashes are kept.
    pub key: String,
}

/// Errors produced while parsing storage URIs.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum UriError {
    /// The URI is not of the form `gs://bucket/key`.
    #[error("Invalid URI: {0}")]
    Invalid(String),
}

/// Splits a `gs://bucket/key` URI into its bucket and key.
///
/// ```
/// use halyard_object_store::parse_gs_uri;
///
/// let uri = parse_gs_uri("gs://my-bucket/folder/file").unwrap();
/// assert_eq!(uri.bucket, "my-bucket");
/// assert_eq!(uri.key, "folder/file");
/// ```
///
/// # Errors
///
/// Returns `UriError::Invalid` when the scheme is not `gs://`, or the bucket
/// or key segment is empty.
pub fn parse_gs_uri(uri: &str) -> Result<GsUri, UriError> {
    let invalid = || UriError::Invalid(uri.to_string());

    let rest = uri.strip_prefix(GS_SCHEME).ok_or_else(invalid)?;
    let (bucket, key) = rest.split_once('/').ok_or_else(invalid)?;

    if bucket.is_empty() || key.is_empty() {
        return Err(invalid());
    }

    Ok(GsUri {
        bucket: bucket.to_string(),
        key: key.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucket_and_file() {
        assert_eq!(
            parse_gs_uri("gs://bucket/file"),
            Ok(GsUri {
                bucket: "bucket".to_string(),
                key: "file".to_string(),
            })
        );
    }

    #[test]
    fn test_nested_key_keeps_slashes() {
        let uri = parse_gs_uri("gs://bucket/folder/sub/file").unwrap();
        assert_eq!(uri.bucket, "bucket");
        assert_eq!(uri.key, "folder/sub/file");
    }

    #[test]
    fn test_wrong_scheme() {
        for bad in ["s3://bucket/file", "https://bucket/file", "bucket/file", ""] {
            let err = parse_gs_uri(bad).unwrap_err();
            assert!(err.to_string().starts_with("Invalid URI"), "{bad}");
        }
    }

    #[test]
    fn test_empty_segments() {
        assert!(parse_gs_uri("gs://bucket").is_err());
        assert!(parse_gs_uri("gs://bucket/").is_err());
        assert!(parse_gs_uri("gs:///file").is_err());
    }
}
