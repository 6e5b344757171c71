//! Value codec abstraction.
//!
//! The codec seam decides how session values look at rest and how they are
//! compared. The session engine never serializes values itself; everything
//! goes through a [`ValueCodec`].
//!
//! # Usage
//!
//! ```
//! use sessiondb_codec::{EjsonCodec, ValueCodec};
//! use sessiondb_core::Value;
//!
//! let codec = EjsonCodec;
//! let text = codec.stringify(&Value::from("hello"));
//! let decoded = codec.parse(&text).unwrap();
//!
//! assert!(codec.equals(&decoded, &Value::from("hello")));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

mod ejson;
mod traits;

pub use ejson::EjsonCodec;
pub use traits::{CodecError, ValueCodec};

/// Get a codec by its identifier.
///
/// # Known Codecs
///
/// - `"ejson"`: extended JSON with dates, binary, object ids and non-finite floats
pub fn get_codec(codec_id: &str) -> Result<Box<dyn ValueCodec>, CodecError> {
    match codec_id {
        "ejson" => Ok(Box::new(EjsonCodec)),
        _ => Err(CodecError::UnknownCodec(codec_id.to_string())),
    }
}
