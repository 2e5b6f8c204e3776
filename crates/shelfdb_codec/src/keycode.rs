//! Order-preserving key encoding.
//!
//! Every key encodes to a self-delimiting byte string whose bytewise order
//! equals the [`Key`] total order. Because each encoding is
//! self-delimiting, concatenations compare component by component, which
//! lets an index entry be stored as `encode(index_key) ++ encode(primary_key)`.
//!
//! | kind   | tag    | body                                              |
//! |--------|--------|---------------------------------------------------|
//! | number | `0x10` | 8 bytes, order-flipped IEEE 754 big-endian        |
//! | date   | `0x20` | same as number                                    |
//! | string | `0x30` | UTF-16BE units, `0x00` escaped, `0x00 0x00` end   |
//! | binary | `0x40` | raw bytes, `0x00` escaped, `0x00 0x00` end        |
//! | array  | `0x50` | encoded elements, then `0x00`                     |
//!
//! Host keys are strings, so encodings are rendered as lowercase hex,
//! which preserves the order.

use crate::error::{CodecError, CodecResult};
use crate::key::Key;

const TAG_NUMBER: u8 = 0x10;
const TAG_DATE: u8 = 0x20;
const TAG_STRING: u8 = 0x30;
const TAG_BINARY: u8 = 0x40;
const TAG_ARRAY: u8 = 0x50;
const END: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;

/// Encodes a key into its order-preserving byte form.
#[must_use]
pub fn encode(key: &Key) -> Vec<u8> {
    let mut out = Vec::new();
    encode_into(key, &mut out);
    out
}

/// Appends the encoding of `key` to `out`.
pub fn encode_into(key: &Key, out: &mut Vec<u8>) {
    match key {
        Key::Number(n) => {
            out.push(TAG_NUMBER);
            out.extend_from_slice(&ordered_f64(*n));
        }
        Key::Date(ms) => {
            out.push(TAG_DATE);
            out.extend_from_slice(&ordered_f64(*ms));
        }
        Key::String(s) => {
            out.push(TAG_STRING);
            let bytes: Vec<u8> = s.encode_utf16().flat_map(u16::to_be_bytes).collect();
            escape_into(&bytes, out);
        }
        Key::Binary(b) => {
            out.push(TAG_BINARY);
            escape_into(b, out);
        }
        Key::Array(items) => {
            out.push(TAG_ARRAY);
            for item in items {
                encode_into(item, out);
            }
            out.push(END);
        }
    }
}

/// Decodes one key from the front of `bytes`.
///
/// Returns the key and the number of bytes it occupied.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] on truncated or malformed input.
pub fn decode(bytes: &[u8]) -> CodecResult<(Key, usize)> {
    let (&tag, body) = bytes
        .split_first()
        .ok_or_else(|| CodecError::decoding_failed("empty key encoding"))?;

    match tag {
        TAG_NUMBER | TAG_DATE => {
            let raw: [u8; 8] = body
                .get(..8)
                .and_then(|slice| slice.try_into().ok())
                .ok_or_else(|| CodecError::decoding_failed("truncated number key"))?;
            let n = unordered_f64(raw);
            let key = if tag == TAG_NUMBER {
                Key::Number(n)
            } else {
                Key::Date(n)
            };
            Ok((key, 9))
        }
        TAG_STRING => {
            let (raw, used) = unescape(body)?;
            if raw.len() % 2 != 0 {
                return Err(CodecError::decoding_failed("odd-length string key"));
            }
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            let s = String::from_utf16(&units)
                .map_err(|_| CodecError::decoding_failed("string key is not valid UTF-16"))?;
            Ok((Key::String(s), used + 1))
        }
        TAG_BINARY => {
            let (raw, used) = unescape(body)?;
            Ok((Key::Binary(raw), used + 1))
        }
        TAG_ARRAY => {
            let mut items = Vec::new();
            let mut offset = 0;
            loop {
                match body.get(offset) {
                    Some(&END) => return Ok((Key::Array(items), offset + 2)),
                    Some(_) => {
                        let (item, used) = decode(&body[offset..])?;
                        items.push(item);
                        offset += used;
                    }
                    None => return Err(CodecError::decoding_failed("unterminated array key")),
                }
            }
        }
        other => Err(CodecError::decoding_failed(format!(
            "unknown key tag 0x{other:02x}"
        ))),
    }
}

/// Decodes a concatenation of key encodings.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] on malformed input.
pub fn decode_all(mut bytes: &[u8]) -> CodecResult<Vec<Key>> {
    let mut keys = Vec::new();
    while !bytes.is_empty() {
        let (key, used) = decode(bytes)?;
        keys.push(key);
        bytes = &bytes[used..];
    }
    Ok(keys)
}

/// Encodes a key as lowercase hex.
#[must_use]
pub fn encode_hex(key: &Key) -> String {
    to_hex(&encode(key))
}

/// Encodes an index entry `(index_key, primary_key)` as lowercase hex.
#[must_use]
pub fn encode_pair_hex(index_key: &Key, primary_key: &Key) -> String {
    let mut bytes = encode(index_key);
    encode_into(primary_key, &mut bytes);
    to_hex(&bytes)
}

/// Decodes a hex string holding one or more concatenated keys.
///
/// # Errors
///
/// Returns [`CodecError::DecodingFailed`] if the text is not hex or the
/// bytes do not decode.
pub fn decode_hex(text: &str) -> CodecResult<Vec<Key>> {
    decode_all(&from_hex(text)?)
}

fn ordered_f64(n: f64) -> [u8; 8] {
    // -0 and 0 must share one encoding.
    let n = if n == 0.0 { 0.0 } else { n };
    let bits = n.to_bits();
    let ordered = if bits & (1u64 << 63) != 0 {
        !bits
    } else {
        bits | (1u64 << 63)
    };
    ordered.to_be_bytes()
}

fn unordered_f64(raw: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(raw);
    let bits = if ordered & (1u64 << 63) != 0 {
        ordered & !(1u64 << 63)
    } else {
        !ordered
    };
    f64::from_bits(bits)
}

fn escape_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &byte in bytes {
        if byte == 0x00 {
            out.extend_from_slice(&[0x00, ESCAPED_ZERO]);
        } else {
            out.push(byte);
        }
    }
    out.extend_from_slice(&[END, END]);
}

/// Returns the unescaped bytes and the count of input bytes consumed.
fn unescape(bytes: &[u8]) -> CodecResult<(Vec<u8>, usize)> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == 0x00 {
            match bytes.get(i + 1) {
                Some(&END) => return Ok((out, i + 2)),
                Some(&ESCAPED_ZERO) => {
                    out.push(0x00);
                    i += 2;
                }
                _ => return Err(CodecError::decoding_failed("bad escape in key")),
            }
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    Err(CodecError::decoding_failed("unterminated key"))
}

fn to_hex(bytes: &[u8]) -> String {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &byte in bytes {
        out.push(char::from(DIGITS[usize::from(byte >> 4)]));
        out.push(char::from(DIGITS[usize::from(byte & 0x0F)]));
    }
    out
}

fn from_hex(text: &str) -> CodecResult<Vec<u8>> {
    fn nibble(c: u8) -> CodecResult<u8> {
        match c {
            b'0'..=b'9' => Ok(c - b'0'),
            b'a'..=b'f' => Ok(c - b'a' + 10),
            _ => Err(CodecError::decoding_failed("invalid hex digit in key")),
        }
    }

    let bytes = text.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(CodecError::decoding_failed("odd-length hex key"));
    }
    bytes
        .chunks_exact(2)
        .map(|pair| Ok((nibble(pair[0])? << 4) | nibble(pair[1])?))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key_strategy() -> impl Strategy<Value = Key> {
        let leaf = prop_oneof![
            (-1e9f64..1e9f64).prop_map(Key::Number),
            Just(Key::Number(f64::NEG_INFINITY)),
            Just(Key::Number(f64::INFINITY)),
            (0f64..1e12f64).prop_map(Key::Date),
            "\\PC{0,6}".prop_map(Key::String),
            "[\\x00-\\x7f\u{ff61}\u{1f600}]{0,4}".prop_map(Key::String),
            proptest::collection::vec(any::<u8>(), 0..6).prop_map(Key::Binary),
        ];
        leaf.prop_recursive(2, 12, 4, |inner| {
            proptest::collection::vec(inner, 0..4).prop_map(Key::Array)
        })
    }

    #[test]
    fn negative_zero_shares_encoding() {
        assert_eq!(encode(&Key::Number(-0.0)), encode(&Key::Number(0.0)));
    }

    #[test]
    fn embedded_zero_bytes_roundtrip() {
        let key = Key::Binary(vec![0, 0, 1, 0]);
        let (decoded, used) = decode(&encode(&key)).unwrap();
        assert_eq!(decoded, key);
        assert_eq!(used, encode(&key).len());
    }

    #[test]
    fn pair_encoding_decodes_both_keys() {
        let hex = encode_pair_hex(&Key::from("Orwell"), &Key::from(1));
        let keys = decode_hex(&hex).unwrap();
        assert_eq!(keys, vec![Key::from("Orwell"), Key::from(1)]);
    }

    #[test]
    fn hex_is_lowercase() {
        let hex = encode_hex(&Key::Binary(vec![0xAB]));
        assert_eq!(hex, "40ab0000");
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(decode(&[]).is_err());
        assert!(decode(&[TAG_NUMBER, 1, 2]).is_err());
        assert!(decode(&[TAG_BINARY, 1, 2]).is_err());
        assert!(decode(&[TAG_ARRAY, TAG_NUMBER]).is_err());
        assert!(decode(&[0x99]).is_err());
        assert!(decode_hex("zz").is_err());
        assert!(decode_hex("abc").is_err());
    }

    proptest! {
        #[test]
        fn encoding_preserves_order(a in key_strategy(), b in key_strategy()) {
            prop_assert_eq!(a.cmp(&b), encode(&a).cmp(&encode(&b)));
            prop_assert_eq!(a.cmp(&b), encode_hex(&a).cmp(&encode_hex(&b)));
        }

        #[test]
        fn decode_inverts_encode(key in key_strategy()) {
            let bytes = encode(&key);
            let (decoded, used) = decode(&bytes).unwrap();
            prop_assert_eq!(used, bytes.len());
            prop_assert_eq!(decoded, key);
        }

        #[test]
        fn pair_order_is_lexicographic(
            a in key_strategy(), pa in key_strategy(),
            b in key_strategy(), pb in key_strategy(),
        ) {
            let expected = a.cmp(&b).then_with(|| pa.cmp(&pb));
            prop_assert_eq!(expected, encode_pair_hex(&a, &pa).cmp(&encode_pair_hex(&b, &pb)));
        }
    }
}
