//! CBOR persistence for values and descriptors.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes any serde type to CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::EncodingFailed`] if serialization fails.
pub fn to_cbor<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|err| CodecError::encoding_failed(err.to_string()))?;
    Ok(bytes)
}

/// Deserializes a serde type from CBOR bytes.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the bytes are not valid CBOR
/// for `T`.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|err| CodecError::decoding_failed(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_path::KeyPath;
    use crate::value::Value;

    #[test]
    fn value_survives_cbor() {
        let value = Value::map([
            ("title", Value::from("1984")),
            ("published", Value::Date(-649_036_800_000.0)),
            ("tags", Value::array(["classic"])),
            ("cover", Value::Bytes(vec![0, 1, 2])),
            ("rating", Value::Number(4.5)),
            ("missing", Value::Null),
        ]);
        let bytes = to_cbor(&value).unwrap();
        let decoded: Value = from_cbor(&bytes).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn key_path_survives_cbor() {
        let path = KeyPath::sequence(["a", "b.c"]).unwrap();
        let decoded: KeyPath = from_cbor(&to_cbor(&path).unwrap()).unwrap();
        assert_eq!(decoded, path);
    }

    #[test]
    fn garbage_is_rejected() {
        let result: CodecResult<Value> = from_cbor(&[0xff, 0x00, 0x13]);
        assert!(result.is_err());
    }
}
