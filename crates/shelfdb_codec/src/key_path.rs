//! Key path interpreter.
//!
//! A key path names where a record's key lives inside its value. The
//! grammar is small:
//!
//! ```text
//! path     := "" | ident ("." ident)*
//! ident    := (letter | "_" | "$") (letter | digit | "_" | "$")*
//! sequence := "[" path ("," path)* "]"
//! ```
//!
//! The empty path names the value itself. `length` applied to a string
//! or array yields its length (strings count UTF-16 units).

use crate::error::{CodecError, CodecResult};
use crate::key::Key;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a record's key lives inside its value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyPath {
    /// A single dotted path.
    Single(String),
    /// Several paths whose keys combine into an array key.
    Sequence(Vec<String>),
}

impl KeyPath {
    /// Creates a single dotted key path, validating its syntax.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKeyPath`] if `path` is malformed.
    pub fn single(path: impl Into<String>) -> CodecResult<Self> {
        let path = path.into();
        if !is_valid_path(&path) {
            return Err(CodecError::invalid_key_path(path));
        }
        Ok(KeyPath::Single(path))
    }

    /// Creates a sequence key path, validating every component.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKeyPath`] if the sequence is empty or
    /// any component is malformed.
    pub fn sequence<S: Into<String>, I: IntoIterator<Item = S>>(paths: I) -> CodecResult<Self> {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        if paths.is_empty() {
            return Err(CodecError::invalid_key_path("[]"));
        }
        if let Some(bad) = paths.iter().find(|path| !is_valid_path(path)) {
            return Err(CodecError::invalid_key_path(bad.clone()));
        }
        Ok(KeyPath::Sequence(paths))
    }

    /// Re-checks the syntax of an already constructed path.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKeyPath`] if the path is malformed.
    pub fn validate(&self) -> CodecResult<()> {
        match self {
            KeyPath::Single(path) => Self::single(path.clone()).map(|_| ()),
            KeyPath::Sequence(paths) => Self::sequence(paths.iter().cloned()).map(|_| ()),
        }
    }

    /// Returns true for sequence key paths.
    #[must_use]
    pub fn is_sequence(&self) -> bool {
        matches!(self, KeyPath::Sequence(_))
    }

    /// Evaluates the path against `value`.
    ///
    /// Returns `None` when some step does not exist. Sequence paths yield
    /// an array value holding each component.
    #[must_use]
    pub fn evaluate(&self, value: &Value) -> Option<Value> {
        match self {
            KeyPath::Single(path) => evaluate_path(path, value),
            KeyPath::Sequence(paths) => paths
                .iter()
                .map(|path| evaluate_path(path, value))
                .collect::<Option<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Extracts a key from `value`.
    ///
    /// Returns `Ok(None)` when the path does not resolve.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidKey`] when the path resolves to a
    /// value that is not a valid key.
    pub fn extract_key(&self, value: &Value) -> CodecResult<Option<Key>> {
        self.evaluate(value)
            .map(|resolved| Key::from_value(&resolved))
            .transpose()
    }

    /// Returns true if [`KeyPath::inject`] would succeed on `value`.
    #[must_use]
    pub fn can_inject(&self, value: &Value) -> bool {
        let KeyPath::Single(path) = self else {
            return false;
        };
        if path.is_empty() {
            return false;
        }
        let idents: Vec<&str> = path.split('.').collect();
        let parents = &idents[..idents.len() - 1];

        let mut current = value;
        for ident in parents {
            let Value::Map(entries) = current else {
                return false;
            };
            match entries.get(*ident) {
                Some(next) => current = next,
                // Missing levels are created on injection.
                None => return true,
            }
        }
        matches!(current, Value::Map(_))
    }

    /// Stores `key` at this path inside `value`, creating intermediate
    /// maps as needed.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::KeyPathTarget`] for sequence or empty paths,
    /// or when a step passes through a value that is not a map.
    pub fn inject(&self, value: &mut Value, key: &Key) -> CodecResult<()> {
        let KeyPath::Single(path) = self else {
            return Err(CodecError::key_path_target(
                self.to_string(),
                "cannot inject into a sequence key path",
            ));
        };
        if path.is_empty() {
            return Err(CodecError::key_path_target("", "cannot inject at the empty path"));
        }

        let idents: Vec<&str> = path.split('.').collect();
        let (leaf, parents) = idents
            .split_last()
            .ok_or_else(|| CodecError::key_path_target(path.clone(), "empty key path"))?;

        let mut current = value;
        for ident in parents {
            let Value::Map(entries) = current else {
                return Err(CodecError::key_path_target(
                    path.clone(),
                    format!("'{ident}' is not inside a map"),
                ));
            };
            current = entries
                .entry((*ident).to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
        }

        match current {
            Value::Map(entries) => {
                entries.insert((*leaf).to_string(), key.to_value());
                Ok(())
            }
            other => Err(CodecError::key_path_target(
                path.clone(),
                format!("cannot set '{leaf}' on a {}", other.kind()),
            )),
        }
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Single(path) => write!(f, "{path}"),
            KeyPath::Sequence(paths) => write!(f, "[{}]", paths.join(", ")),
        }
    }
}

fn evaluate_path(path: &str, value: &Value) -> Option<Value> {
    if path.is_empty() {
        return Some(value.clone());
    }
    let mut current = value.clone();
    for ident in path.split('.') {
        current = match (&current, ident) {
            (Value::Text(s), "length") => Value::Number(s.encode_utf16().count() as f64),
            (Value::Array(items), "length") => Value::Number(items.len() as f64),
            (Value::Map(entries), _) => entries.get(ident)?.clone(),
            _ => return None,
        };
    }
    Some(current)
}

fn is_valid_path(path: &str) -> bool {
    path.is_empty() || path.split('.').all(is_identifier)
}

fn is_identifier(ident: &str) -> bool {
    let mut chars = ident.chars();
    match chars.next() {
        Some(first) if first.is_alphabetic() || first == '_' || first == '$' => {
            chars.all(|c| c.is_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> Value {
        Value::map([
            ("author", Value::from("Orwell")),
            ("title", Value::from("1984")),
            (
                "meta",
                Value::map([("isbn", Value::from("0451524934")), ("pages", Value::from(328))]),
            ),
            ("tags", Value::array(["classic", "dystopia"])),
        ])
    }

    #[test]
    fn syntax_validation() {
        assert!(KeyPath::single("").is_ok());
        assert!(KeyPath::single("a").is_ok());
        assert!(KeyPath::single("a.b_c.$d").is_ok());
        assert!(KeyPath::single("ünïcode").is_ok());
        assert!(KeyPath::single("a..b").is_err());
        assert!(KeyPath::single(".a").is_err());
        assert!(KeyPath::single("1a").is_err());
        assert!(KeyPath::single("a b").is_err());
        assert!(KeyPath::sequence(Vec::<String>::new()).is_err());
        assert!(KeyPath::sequence(["a", "b.c"]).is_ok());
        assert!(KeyPath::sequence(["a", "b-c"]).is_err());
    }

    #[test]
    fn evaluate_nested_and_missing() {
        let path = KeyPath::single("meta.isbn").unwrap();
        assert_eq!(path.evaluate(&book()), Some(Value::from("0451524934")));

        let missing = KeyPath::single("meta.publisher").unwrap();
        assert_eq!(missing.evaluate(&book()), None);

        let through_scalar = KeyPath::single("author.first").unwrap();
        assert_eq!(through_scalar.evaluate(&book()), None);
    }

    #[test]
    fn empty_path_is_whole_value() {
        let path = KeyPath::single("").unwrap();
        assert_eq!(path.extract_key(&Value::from(7)).unwrap(), Some(Key::from(7)));
    }

    #[test]
    fn length_of_strings_and_arrays() {
        let title_len = KeyPath::single("title.length").unwrap();
        assert_eq!(title_len.extract_key(&book()).unwrap(), Some(Key::from(4)));

        let tag_count = KeyPath::single("tags.length").unwrap();
        assert_eq!(tag_count.extract_key(&book()).unwrap(), Some(Key::from(2)));

        let astral = Value::map([("s", "\u{1F600}")]);
        let s_len = KeyPath::single("s.length").unwrap();
        assert_eq!(s_len.extract_key(&astral).unwrap(), Some(Key::from(2)));
    }

    #[test]
    fn extract_invalid_key_is_error() {
        let path = KeyPath::single("meta").unwrap();
        assert!(path.extract_key(&book()).is_err());
    }

    #[test]
    fn sequence_extracts_array_key() {
        let path = KeyPath::sequence(["author", "meta.pages"]).unwrap();
        assert_eq!(
            path.extract_key(&book()).unwrap(),
            Some(Key::Array(vec![Key::from("Orwell"), Key::from(328)]))
        );

        let partial = KeyPath::sequence(["author", "missing"]).unwrap();
        assert_eq!(partial.extract_key(&book()).unwrap(), None);
    }

    #[test]
    fn inject_creates_intermediate_maps() {
        let path = KeyPath::single("ids.primary").unwrap();
        let mut value = Value::map([("name", "x")]);
        assert!(path.can_inject(&value));

        path.inject(&mut value, &Key::from(1)).unwrap();
        assert_eq!(path.extract_key(&value).unwrap(), Some(Key::from(1)));
        assert_eq!(value.get("name"), Some(&Value::from("x")));
    }

    #[test]
    fn inject_through_scalar_fails() {
        let path = KeyPath::single("author.id").unwrap();
        let mut value = book();
        assert!(!path.can_inject(&value));
        assert!(path.inject(&mut value, &Key::from(1)).is_err());

        let top = KeyPath::single("id").unwrap();
        let mut scalar = Value::from(5);
        assert!(!top.can_inject(&scalar));
        assert!(top.inject(&mut scalar, &Key::from(1)).is_err());
    }

    #[test]
    fn inject_rejects_sequence_and_empty() {
        let mut value = book();
        let seq = KeyPath::sequence(["a", "b"]).unwrap();
        assert!(!seq.can_inject(&value));
        assert!(seq.inject(&mut value, &Key::from(1)).is_err());

        let empty = KeyPath::single("").unwrap();
        assert!(empty.inject(&mut value, &Key::from(1)).is_err());
    }

    #[test]
    fn display_formats() {
        assert_eq!(KeyPath::single("a.b").unwrap().to_string(), "a.b");
        assert_eq!(KeyPath::sequence(["a", "b"]).unwrap().to_string(), "[a, b]");
    }
}
