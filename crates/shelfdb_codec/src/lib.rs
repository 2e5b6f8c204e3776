//! # shelfdb Codec
//!
//! Values, keys and the encodings shelfdb persists them with.
//!
//! This crate provides:
//! - [`Value`], the structured record value type
//! - [`Key`], the subset of values with a total order
//! - [`keycode`], an order-preserving key encoding used for host keys
//! - [`KeyPath`], a small interpreter locating keys inside values
//! - [`KeyRange`] and [`KeyQuery`] for range lookups
//! - CBOR persistence through serde and ciborium
//!
//! ## Key Order
//!
//! Kinds order as `number < date < string < binary < array`. Strings
//! compare by UTF-16 code unit and arrays element-wise.
//!
//! ## Usage
//!
//! ```
//! use shelfdb_codec::{keycode, Key, KeyPath, Value};
//!
//! let book = Value::map([("author", "Orwell"), ("title", "1984")]);
//! let path = KeyPath::single("author").unwrap();
//! let key = path.extract_key(&book).unwrap().unwrap();
//! assert_eq!(key, Key::from("Orwell"));
//!
//! // Host key order follows key order.
//! assert!(keycode::encode_hex(&Key::from(2)) < keycode::encode_hex(&Key::from("a")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cbor;
mod error;
mod key;
mod key_path;
pub mod keycode;
mod range;
mod value;

pub use cbor::{from_cbor, to_cbor};
pub use error::{CodecError, CodecResult};
pub use key::Key;
pub use key_path::KeyPath;
pub use range::{KeyQuery, KeyRange};
pub use value::Value;
