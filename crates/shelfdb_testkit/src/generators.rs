//! Property-based test generators using proptest.
//!
//! Provides strategies for keys, values and store operations that
//! respect the engine's invariants: generated keys are never `NaN` and
//! generated records always carry a valid key.

use proptest::prelude::*;
use shelfdb_core::{Key, Value};

/// Strategy for generating valid scalar keys.
pub fn scalar_key_strategy() -> impl Strategy<Value = Key> {
    prop_oneof![
        (-1.0e9f64..1.0e9f64).prop_map(Key::Number),
        (0.0f64..4.0e12f64).prop_map(Key::Date),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Key::String),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Key::Binary),
    ]
}

/// Strategy for generating valid keys, including nested arrays.
pub fn key_strategy() -> impl Strategy<Value = Key> {
    scalar_key_strategy().prop_recursive(2, 16, 4, |inner| {
        prop::collection::vec(inner, 0..4).prop_map(Key::Array)
    })
}

/// Strategy for generating small integer keys, which collide often.
pub fn small_key_strategy() -> impl Strategy<Value = Key> {
    (0u32..64).prop_map(Key::from)
}

/// Strategy for generating valid store names.
pub fn store_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-zA-Z][a-zA-Z0-9_]{0,15}").expect("Invalid regex")
}

/// Strategy for generating arbitrary structured values.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1.0e6f64..1.0e6f64).prop_map(Value::Number),
        "[a-z]{0,10}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Bytes),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,6}", inner, 0..4).prop_map(Value::Map),
        ]
    })
}

/// Strategy for generating a record value with an `id` key and an
/// indexable `tag` property.
pub fn tagged_record_strategy() -> impl Strategy<Value = Value> {
    (0u32..64, "[a-d]", value_strategy()).prop_map(|(id, tag, body)| {
        Value::map([
            ("id", Value::from(id)),
            ("tag", Value::Text(tag)),
            ("body", body),
        ])
    })
}

/// An operation against an out-of-line-keyed object store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
    /// Put a value under a key.
    Put {
        /// Record key.
        key: Key,
        /// Record value.
        value: Value,
    },
    /// Add a value, failing if the key exists.
    Add {
        /// Record key.
        key: Key,
        /// Record value.
        value: Value,
    },
    /// Delete the record under a key.
    Delete {
        /// Record key.
        key: Key,
    },
    /// Delete every record.
    Clear,
}

/// Strategy for generating store operations over colliding keys.
pub fn store_operation_strategy() -> impl Strategy<Value = StoreOperation> {
    prop_oneof![
        4 => (small_key_strategy(), value_strategy())
            .prop_map(|(key, value)| StoreOperation::Put { key, value }),
        2 => (small_key_strategy(), value_strategy())
            .prop_map(|(key, value)| StoreOperation::Add { key, value }),
        2 => small_key_strategy().prop_map(|key| StoreOperation::Delete { key }),
        1 => Just(StoreOperation::Clear),
    ]
}

/// Strategy for generating a sequence of operations.
pub fn operation_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<StoreOperation>> {
    prop::collection::vec(store_operation_strategy(), min_ops..max_ops)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_keys_round_trip_through_values(key in key_strategy()) {
            let back = Key::from_value(&key.to_value()).unwrap();
            prop_assert_eq!(back, key);
        }

        #[test]
        fn store_names_start_with_a_letter(name in store_name_strategy()) {
            let first = name.chars().next();
            prop_assert!(first.map_or(false, |c| c.is_ascii_alphabetic()));
        }

        #[test]
        fn tagged_records_carry_a_key(value in tagged_record_strategy()) {
            let id = value.get("id").cloned().unwrap();
            prop_assert!(Key::is_valid(&id));
        }
    }
}
