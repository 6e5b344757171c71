//! Value codec trait definitions.

use serde_json::Value as JsonValue;
use sessiondb_core::Value;

/// Value codec trait.
///
/// Every value that crosses into durable storage, and every value the
/// in-memory dictionary keeps, goes through the codec. The codec owns three
/// things: the JSON-value form written to the backing store, the canonical
/// text form used as a dictionary/bucket key, and value equality.
///
/// # Thread Safety
///
/// Codecs must be `Send + Sync` so a single instance can be shared by every
/// session in the process.
pub trait ValueCodec: Send + Sync {
    /// Convert a value to its JSON-value form (extended types become tagged objects).
    fn to_json_value(&self, value: &Value) -> JsonValue;

    /// Reverse `to_json_value`.
    ///
    /// Plain JSON is always accepted. Malformed tagged objects fail.
    fn from_json_value(&self, json: &JsonValue) -> Result<Value, CodecError>;

    /// Canonical text form of a value.
    ///
    /// Two equal scalar values always produce the same text.
    fn stringify(&self, value: &Value) -> String {
        self.to_json_value(value).to_string()
    }

    /// Parse canonical text.
    fn parse(&self, text: &str) -> Result<Value, CodecError> {
        let json: JsonValue =
            serde_json::from_str(text).map_err(|e| CodecError::DecodeError(e.to_string()))?;
        self.from_json_value(&json)
    }

    /// Value equality as the codec defines it.
    fn equals(&self, a: &Value, b: &Value) -> bool;

    /// Text under which observers of equality with `value` are filed.
    ///
    /// Values that [`equals`](Self::equals) reports as equal must produce the
    /// same key.
    fn equality_key(&self, value: &Value) -> String {
        self.stringify(value)
    }

    /// Unique codec identifier.
    fn codec_id(&self) -> &str;
}

/// Codec errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// Decoding failed (invalid JSON text, malformed tagged value).
    #[error("Decode error: {0}")]
    DecodeError(String),

    /// A `$type` tag names a type this codec does not know.
    #[error("Unknown extended type: {0}")]
    UnknownType(String),

    /// Unknown codec identifier.
    #[error("Unknown codec: {0}")]
    UnknownCodec(String),
}

impl From<CodecError> for sessiondb_core::Error {
    fn from(e: CodecError) -> Self {
        sessiondb_core::Error::Decode(e.to_string())
    }
}
