//! Model-checking harness for object stores.
//!
//! [`IntegrationHarness`] mirrors every operation it sends to the engine
//! in a plain `BTreeMap` and can verify that the two agree, including the
//! index derived from each value's `tag` property.

use crate::generators::StoreOperation;
use shelfdb_core::{
    Connection, CoreError, Factory, Key, KeyPath, ObjectStore, Request, Transaction,
    TransactionMode, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Database opened by the harness.
pub const HARNESS_DATABASE: &str = "harness";
/// Out-of-line-keyed store the harness writes to.
pub const HARNESS_STORE: &str = "records";
/// Non-unique index over each value's `tag` property.
pub const HARNESS_INDEX: &str = "by_tag";

/// A test harness for model-based testing.
pub struct IntegrationHarness {
    /// The factory instance.
    pub factory: Factory,
    /// The harness connection.
    pub connection: Arc<Connection>,
    /// Expected contents of the store.
    model: BTreeMap<Key, Value>,
}

impl IntegrationHarness {
    /// Creates a harness over an in-memory factory.
    pub fn new() -> Self {
        Self::with_factory(Factory::in_memory())
    }

    /// Creates a harness over `factory`.
    pub fn with_factory(factory: Factory) -> Self {
        let connection = crate::fixtures::open_with(&factory, HARNESS_DATABASE, 1, |connection, _| {
            let store = connection
                .create_object_store(HARNESS_STORE, None, false)
                .expect("Failed to create store");
            store
                .create_index(HARNESS_INDEX, KeyPath::single("tag").expect("path"), false, false)
                .expect("Failed to create index");
        });
        Self {
            factory,
            connection,
            model: BTreeMap::new(),
        }
    }

    fn store(&self) -> Arc<ObjectStore> {
        self.factory
            .database(HARNESS_DATABASE)
            .and_then(|database| database.object_store(HARNESS_STORE))
            .expect("Harness store is missing")
    }

    fn queue(&self, ops: &[StoreOperation]) -> (Arc<Transaction>, Vec<Request>) {
        let txn = self
            .connection
            .transaction([HARNESS_STORE], TransactionMode::ReadWrite)
            .expect("Failed to start transaction");
        let store = txn.object_store(HARNESS_STORE).expect("Store not in scope");
        let requests = ops
            .iter()
            .map(|op| {
                match op {
                    StoreOperation::Put { key, value } => store.put(value.clone(), Some(key.clone())),
                    StoreOperation::Add { key, value } => store.add(value.clone(), Some(key.clone())),
                    StoreOperation::Delete { key } => store.delete(key.clone()),
                    StoreOperation::Clear => store.clear(),
                }
                .expect("Failed to queue request")
            })
            .collect();
        (txn, requests)
    }

    /// Applies `ops` in one committed transaction and checks each
    /// request's outcome against the model.
    ///
    /// Returns the error of every request, in order.
    pub fn apply(&mut self, ops: &[StoreOperation]) -> Vec<Option<CoreError>> {
        let (_txn, requests) = self.queue(ops);
        self.factory.run_until_idle();

        let mut errors = Vec::with_capacity(ops.len());
        for (op, request) in ops.iter().zip(&requests) {
            let error = request.error();
            let expect_constraint = match op {
                StoreOperation::Put { key, value } => {
                    self.model.insert(key.clone(), value.clone());
                    false
                }
                StoreOperation::Add { key, value } => {
                    if self.model.contains_key(key) {
                        true
                    } else {
                        self.model.insert(key.clone(), value.clone());
                        false
                    }
                }
                StoreOperation::Delete { key } => {
                    self.model.remove(key);
                    false
                }
                StoreOperation::Clear => {
                    self.model.clear();
                    false
                }
            };
            assert_eq!(
                error.as_ref().map(CoreError::name),
                expect_constraint.then_some("ConstraintError"),
                "Unexpected outcome for {op:?}"
            );
            errors.push(error);
        }
        errors
    }

    /// Runs `ops`, then aborts the transaction before it can commit.
    ///
    /// The model is left untouched.
    pub fn apply_and_abort(&mut self, ops: &[StoreOperation]) {
        let (txn, requests) = self.queue(ops);
        while !requests.iter().all(Request::is_done) {
            assert!(self.factory.tick(), "Queue drained before requests finished");
        }
        txn.abort().expect("Transaction finished before abort");
        self.factory.run_until_idle();
    }

    /// Verifies the store and its index against the model.
    pub fn verify_all(&self) {
        let store = self.store();
        let keys = store.get_all_keys(None, None);
        let expected_keys: Vec<Key> = self.model.keys().cloned().collect();
        assert_eq!(keys, expected_keys, "Key mismatch");

        let values = store.get_all_values(None, None);
        let expected_values: Vec<Value> = self.model.values().cloned().collect();
        assert_eq!(values, expected_values, "Value mismatch");

        let indexed = self
            .model
            .values()
            .filter(|value| value.get("tag").is_some_and(Key::is_valid))
            .count();
        let index = store.index(HARNESS_INDEX).expect("Harness index is missing");
        assert_eq!(index.count(None), indexed, "Index entry count mismatch");
    }

    /// Returns the count of tracked records.
    pub fn tracked_count(&self) -> usize {
        self.model.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{open_request, open_with, put_all, scenarios};
    use crate::generators::{operation_sequence_strategy, tagged_record_strategy, PropTestConfig};
    use proptest::prelude::*;
    use shelfdb_core::{KeyRange, MAX_GENERATED_KEY};

    fn put(key: u32, tag: &str) -> StoreOperation {
        StoreOperation::Put {
            key: Key::from(key),
            value: Value::map([("tag", Value::from(tag))]),
        }
    }

    #[test]
    fn harness_tracks_puts_and_deletes() {
        let mut harness = IntegrationHarness::new();
        harness.apply(&[put(1, "a"), put(2, "b"), put(3, "a")]);
        harness.apply(&[StoreOperation::Delete { key: Key::from(2) }]);
        harness.verify_all();
        assert_eq!(harness.tracked_count(), 2);
    }

    #[test]
    fn add_collision_is_a_constraint_error() {
        let mut harness = IntegrationHarness::new();
        let errors = harness.apply(&[
            put(1, "a"),
            StoreOperation::Add {
                key: Key::from(1),
                value: Value::Null,
            },
        ]);
        assert!(errors[0].is_none());
        assert_eq!(errors[1].as_ref().unwrap().name(), "ConstraintError");
        harness.verify_all();
    }

    #[test]
    fn abort_discards_everything() {
        let mut harness = IntegrationHarness::new();
        harness.apply(&[put(1, "a"), put(2, "b")]);
        harness.apply_and_abort(&[put(3, "c"), StoreOperation::Delete { key: Key::from(1) }, StoreOperation::Clear]);
        harness.verify_all();
        assert_eq!(harness.tracked_count(), 2);
    }

    #[test]
    fn index_range_queries() {
        let factory = Factory::in_memory();
        let connection = scenarios::populated_library(&factory, 6);
        let txn = connection
            .transaction(["books"], TransactionMode::ReadOnly)
            .unwrap();
        let by_author = txn.object_store("books").unwrap().index("by_author").unwrap();
        let freds = by_author
            .get_all_keys(Some(KeyRange::only("Fred".into())), None)
            .unwrap();
        let first_barney = by_author.get_key(Key::from("Barney")).unwrap();
        let counted = by_author.count(Some(Key::from("Barney").into())).unwrap();
        factory.run_until_idle();

        assert_eq!(
            freds.result().unwrap().unwrap().as_keys().unwrap().to_vec(),
            vec![Key::from(0), Key::from(2), Key::from(4)]
        );
        assert_eq!(
            first_barney.result().unwrap().unwrap().as_key(),
            Some(&Key::from(1))
        );
        assert_eq!(counted.result().unwrap().unwrap().as_count(), Some(3));
    }

    #[test]
    fn multi_entry_index_spreads_array_values() {
        let factory = Factory::in_memory();
        let connection = open_with(&factory, "posts", 1, |connection, _| {
            connection
                .create_object_store("posts", Some(KeyPath::single("id").unwrap()), false)
                .unwrap()
                .create_index("by_label", KeyPath::single("labels").unwrap(), false, true)
                .unwrap();
        });
        put_all(
            &factory,
            &connection,
            "posts",
            vec![
                Value::map([
                    ("id", Value::from(1)),
                    ("labels", Value::array(["rust", "db", "rust"])),
                ]),
                Value::map([("id", Value::from(2)), ("labels", Value::array(["db"]))]),
            ],
        );

        let index = factory
            .database("posts")
            .unwrap()
            .object_store("posts")
            .unwrap()
            .index("by_label")
            .unwrap();
        assert_eq!(index.count(None), 3);
        assert_eq!(
            index.get_all_keys(Some(KeyRange::only("db".into())), None),
            vec![Key::from(1), Key::from(2)]
        );
    }

    #[test]
    fn unique_index_population_failure_aborts_upgrade() {
        let factory = Factory::in_memory();
        let connection = scenarios::populated_library(&factory, 4);
        connection.close();

        let request = open_request(&factory, "library", 2, |_, transaction| {
            let books = transaction.object_store("books").unwrap();
            books
                .create_index("by_author_unique", KeyPath::single("author").unwrap(), true, false)
                .unwrap();
        });
        assert_eq!(request.error().unwrap().name(), "AbortError");

        let database = factory.database("library").unwrap();
        assert_eq!(database.version(), 1);
        let books = database.object_store("books").unwrap();
        assert_eq!(
            books.index_names(),
            vec!["by_author".to_string(), "by_title".to_string()]
        );
    }

    #[test]
    fn renames_move_records() {
        let factory = Factory::in_memory();
        let connection = scenarios::populated_library(&factory, 3);
        connection.close();

        let renamed = open_with(&factory, "library", 2, |_, transaction| {
            let books = transaction.object_store("books").unwrap();
            books.index("by_author").unwrap().rename("writer").unwrap();
            books.rename("volumes").unwrap();
        });
        assert_eq!(renamed.object_store_names(), vec!["volumes".to_string()]);

        let volumes = factory
            .database("library")
            .unwrap()
            .object_store("volumes")
            .unwrap();
        assert_eq!(volumes.count(None), 3);
        assert_eq!(volumes.index("writer").unwrap().count(None), 3);
        assert!(volumes.index("by_author").is_none());
    }

    #[test]
    fn generated_keys_are_injected() {
        let factory = Factory::in_memory();
        let connection = open_with(&factory, "notes", 1, |connection, _| {
            connection
                .create_object_store("notes", Some(KeyPath::single("meta.id").unwrap()), true)
                .unwrap();
        });
        put_all(
            &factory,
            &connection,
            "notes",
            vec![Value::map([("meta", Value::map([("x", Value::from(1))]))])],
        );

        let notes = factory.database("notes").unwrap().object_store("notes").unwrap();
        let stored = notes.get_value(&Key::from(1).into()).unwrap();
        assert_eq!(
            stored.get("meta").and_then(|meta| meta.get("id")),
            Some(&Value::from(1))
        );
    }

    #[test]
    fn array_key_path_rejects_auto_increment() {
        let factory = Factory::in_memory();
        let request = open_request(&factory, "db", 1, |connection, _| {
            let path = KeyPath::sequence(["a", "b"]).unwrap();
            let err = connection
                .create_object_store("s", Some(path), true)
                .unwrap_err();
            assert_eq!(err.name(), "InvalidAccessError");
        });
        assert!(request.error().is_none());
    }

    #[test]
    fn generator_ceiling_is_a_constraint_error() {
        let factory = Factory::in_memory();
        let connection = scenarios::counter(&factory, "db");
        let txn = connection
            .transaction(["items"], TransactionMode::ReadWrite)
            .unwrap();
        let items = txn.object_store("items").unwrap();
        let explicit = items
            .put(Value::Null, Some(Key::Number(MAX_GENERATED_KEY as f64)))
            .unwrap();
        let generated = items.add(Value::Null, None).unwrap();
        factory.run_until_idle();

        assert!(explicit.error().is_none());
        assert_eq!(generated.error().unwrap().name(), "ConstraintError");
    }

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn engine_matches_model(ops in operation_sequence_strategy(1, 40)) {
            let mut harness = IntegrationHarness::new();
            harness.apply(&ops);
            harness.verify_all();
        }

        #[test]
        fn rollback_restores_prior_state(
            setup in operation_sequence_strategy(1, 20),
            ops in operation_sequence_strategy(1, 20),
        ) {
            let mut harness = IntegrationHarness::new();
            harness.apply(&setup);
            harness.apply_and_abort(&ops);
            harness.verify_all();
        }

        #[test]
        fn generated_keys_increase(count in 1usize..30, explicit in prop::option::of(0u32..100)) {
            let factory = Factory::in_memory();
            let connection = scenarios::counter(&factory, "db");
            let txn = connection.transaction(["items"], TransactionMode::ReadWrite).unwrap();
            let items = txn.object_store("items").unwrap();
            let requests: Vec<Request> = (0..count)
                .map(|i| match explicit.filter(|_| i == count / 2) {
                    Some(key) => items.put(Value::Null, Some(Key::from(key))).unwrap(),
                    None => items.add(Value::Null, None).unwrap(),
                })
                .collect();
            factory.run_until_idle();

            let mut previous_generated = 0.0;
            let mut highest = 0.0f64;
            for (i, request) in requests.iter().enumerate() {
                let output = request.result().unwrap().unwrap();
                let key = output.as_key().and_then(Key::as_number).unwrap();
                let was_explicit = i == count / 2 && explicit.is_some();
                if !was_explicit {
                    prop_assert!(key > previous_generated);
                    prop_assert!(key > highest);
                    previous_generated = key;
                }
                highest = highest.max(key);
            }
        }

        #[test]
        fn unique_index_never_holds_duplicates(
            values in prop::collection::vec(tagged_record_strategy(), 1..30),
        ) {
            let factory = Factory::in_memory();
            let connection = open_with(&factory, "db", 1, |connection, _| {
                connection
                    .create_object_store("s", Some(KeyPath::single("id").unwrap()), false)
                    .unwrap()
                    .create_index("tag", KeyPath::single("tag").unwrap(), true, false)
                    .unwrap();
            });
            let txn = connection.transaction(["s"], TransactionMode::ReadWrite).unwrap();
            let store = txn.object_store("s").unwrap();
            let requests: Vec<Request> = values
                .iter()
                .map(|value| store.put(value.clone(), None).unwrap())
                .collect();
            factory.run_until_idle();

            let mut owners: BTreeMap<String, Value> = BTreeMap::new();
            for (value, request) in values.iter().zip(&requests) {
                let id = value.get("id").cloned().unwrap();
                let tag = value.get("tag").and_then(Value::as_text).unwrap().to_string();
                let clash = owners.get(&tag).is_some_and(|owner| *owner != id);
                prop_assert_eq!(request.error().is_some(), clash);
                if !clash {
                    owners.retain(|_, owner| *owner != id);
                    owners.insert(tag, id);
                }
            }

            let s = factory.database("db").unwrap().object_store("s").unwrap();
            prop_assert_eq!(s.count(None), owners.len());
            prop_assert_eq!(s.index("tag").unwrap().count(None), owners.len());
        }
    }
}
