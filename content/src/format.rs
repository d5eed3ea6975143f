//! Document text encodings.
//!
//! JSON is the canonical format. RON is available behind the `serialize-ron`
//! feature for hand-edited content.

use crate::config::ContentConfig;
use crate::error::FormatError;
use crate::identity::ContentPath;

/// Supported document encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    /// JSON with two-space indentation.
    JsonPretty,
    #[cfg(feature = "serialize-ron")]
    Ron,
}

impl Format {
    pub fn from_config(config: &ContentConfig) -> Self {
        if config.pretty {
            Format::JsonPretty
        } else {
            Format::Json
        }
    }

    /// Pick a decoder from the path extension, defaulting to JSON.
    pub fn for_path(path: &ContentPath) -> Self {
        match path.extension() {
            #[cfg(feature = "serialize-ron")]
            Some("ron") => Format::Ron,
            _ => Format::Json,
        }
    }
}

/// Encode a serde-serializable value to bytes in the given format.
pub fn encode<T: serde::Serialize>(value: &T, format: Format) -> Result<Vec<u8>, FormatError> {
    match format {
        Format::Json => serde_json::to_vec(value).map_err(|e| FormatError::Encode(e.to_string())),
        Format::JsonPretty => {
            serde_json::to_vec_pretty(value).map_err(|e| FormatError::Encode(e.to_string()))
        }
        #[cfg(feature = "serialize-ron")]
        Format::Ron => ron::ser::to_string_pretty(value, ron::ser::PrettyConfig::default())
            .map(|s| s.into_bytes())
            .map_err(|e| FormatError::Encode(e.to_string())),
    }
}

/// Decode bytes in the given format to a serde-deserializable type.
pub fn decode<T: serde::de::DeserializeOwned>(
    bytes: &[u8],
    format: Format,
) -> Result<T, FormatError> {
    match format {
        Format::Json | Format::JsonPretty => {
            serde_json::from_slice(bytes).map_err(|e| FormatError::Decode(e.to_string()))
        }
        #[cfg(feature = "serialize-ron")]
        Format::Ron => {
            let s = std::str::from_utf8(bytes).map_err(|e| FormatError::Decode(e.to_string()))?;
            ron::from_str(s).map_err(|e| FormatError::Decode(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn pretty_follows_config() {
        let mut config = ContentConfig::default();
        assert_eq!(Format::from_config(&config), Format::JsonPretty);
        config.pretty = false;
        assert_eq!(Format::from_config(&config), Format::Json);
    }

    #[test]
    fn json_roundtrip() {
        let value = Value::Map(vec![
            ("a".into(), Value::F32(0.3)),
            ("b".into(), Value::List(vec![Value::Bool(true), Value::Null])),
        ]);
        for format in [Format::Json, Format::JsonPretty] {
            let bytes = encode(&value, format).unwrap();
            let back: Value = decode(&bytes, format).unwrap();
            assert_eq!(encode(&back, format).unwrap(), bytes);
        }
    }

    #[test]
    fn decode_error_is_reported() {
        let result: Result<Value, _> = decode(b"{not json", Format::Json);
        assert!(matches!(result, Err(FormatError::Decode(_))));
    }
}
