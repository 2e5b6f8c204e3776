//! Sorted record store over a persistence host.
//!
//! A record store backs one object store or one index. It keeps every
//! record in memory, sorted by key, and mirrors each mutation into the
//! host under `{namespace}/{hex}` where `hex` is the order-preserving key
//! encoding, so the host's key set sorts exactly like the records.
//!
//! # Layout
//!
//! | kind    | host key suffix                   | payload            |
//! |---------|-----------------------------------|--------------------|
//! | primary | `hex(key)`                        | CBOR of the value  |
//! | index   | `hex(index_key ++ primary_key)`   | empty              |
//!
//! Primary stores hold unique keys. Index stores may hold one index key
//! several times, ordered by primary key.

use crate::error::{CoreError, CoreResult};
use crate::search;
use crate::types::{Direction, Record};
use parking_lot::RwLock;
use shelfdb_codec::{from_cbor, keycode, to_cbor, Key, KeyQuery, KeyRange, Value};
use shelfdb_storage::PersistenceHost;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// What a record store backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// An object store; keys are unique.
    Primary,
    /// An index; values are primary keys and index keys may repeat.
    Index,
}

#[derive(Debug, Clone)]
struct Slot {
    key: Key,
    /// Primary key of an index entry, used as the secondary sort key.
    primary: Option<Key>,
    value: Value,
}

impl Slot {
    fn record(&self) -> Record {
        Record::new(self.key.clone(), self.value.clone())
    }

    fn cmp_order(&self, other: &Slot) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| self.primary.cmp(&other.primary))
    }

    fn host_suffix(&self) -> String {
        match &self.primary {
            Some(primary) => keycode::encode_pair_hex(&self.key, primary),
            None => keycode::encode_hex(&self.key),
        }
    }
}

/// A sorted, host-backed map from keys to values.
pub struct RecordStore {
    host: Arc<dyn PersistenceHost>,
    namespace: RwLock<String>,
    kind: StoreKind,
    verify_ordering: bool,
    slots: RwLock<Vec<Slot>>,
}

impl fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordStore")
            .field("namespace", &*self.namespace.read())
            .field("kind", &self.kind)
            .field("len", &self.slots.read().len())
            .finish_non_exhaustive()
    }
}

impl RecordStore {
    /// Opens the record store persisted under `namespace`.
    ///
    /// Entries that cannot be decoded are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be read.
    pub fn open(
        host: Arc<dyn PersistenceHost>,
        namespace: impl Into<String>,
        kind: StoreKind,
        verify_ordering: bool,
    ) -> CoreResult<Self> {
        let namespace = namespace.into();
        let prefix = format!("{namespace}/");

        let mut slots = Vec::new();
        for suffix in host.keys_with_prefix(&prefix)? {
            let host_key = format!("{prefix}{suffix}");
            match Self::load_slot(host.as_ref(), kind, &host_key, &suffix)? {
                Some(slot) => slots.push(slot),
                None => tracing::warn!(key = %host_key, "skipping undecodable record"),
            }
        }
        slots.sort_by(Slot::cmp_order);

        tracing::trace!(namespace = %namespace, records = slots.len(), "opened record store");

        Ok(Self {
            host,
            namespace: RwLock::new(namespace),
            kind,
            verify_ordering,
            slots: RwLock::new(slots),
        })
    }

    fn load_slot(
        host: &dyn PersistenceHost,
        kind: StoreKind,
        host_key: &str,
        suffix: &str,
    ) -> CoreResult<Option<Slot>> {
        let Ok(mut keys) = keycode::decode_hex(suffix) else {
            return Ok(None);
        };
        match (kind, keys.len()) {
            (StoreKind::Primary, 1) => {
                let Some(payload) = host.get(host_key)? else {
                    return Ok(None);
                };
                let Ok(value) = from_cbor::<Value>(&payload) else {
                    return Ok(None);
                };
                Ok(keys.pop().map(|key| Slot {
                    key,
                    primary: None,
                    value,
                }))
            }
            (StoreKind::Index, 2) => {
                let (Some(primary), Some(key)) = (keys.pop(), keys.pop()) else {
                    return Ok(None);
                };
                Ok(Some(Slot {
                    value: primary.to_value(),
                    key,
                    primary: Some(primary),
                }))
            }
            _ => Ok(None),
        }
    }

    /// Returns what this store backs.
    #[must_use]
    pub fn kind(&self) -> StoreKind {
        self.kind
    }

    /// Returns the host namespace records are persisted under.
    #[must_use]
    pub fn namespace(&self) -> String {
        self.namespace.read().clone()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    /// Returns true if the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    /// Returns the first record matching `query`, in ascending order.
    #[must_use]
    pub fn get(&self, query: &KeyQuery) -> Option<Record> {
        let slots = self.slots.read();
        let range = query.to_range();
        let window = search::window(&slots, &range, |slot| &slot.key);
        slots.get(window.start).filter(|_| !window.is_empty()).map(Slot::record)
    }

    /// Counts the records whose key lies in `range`.
    #[must_use]
    pub fn count(&self, range: Option<&KeyRange>) -> usize {
        let slots = self.slots.read();
        match range {
            Some(range) => search::window(&slots, range, |slot| &slot.key).len(),
            None => slots.len(),
        }
    }

    /// Inserts `record`, replacing any record with the same key.
    ///
    /// In an index store the record's value must be a valid primary key;
    /// an existing `(index_key, primary_key)` pair is left as is.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Data`] if an index record's value is not a
    /// key, or a host error if the write fails.
    pub fn add(&self, record: Record) -> CoreResult<()> {
        let slot = match self.kind {
            StoreKind::Primary => Slot {
                key: record.key,
                primary: None,
                value: record.value,
            },
            StoreKind::Index => {
                let primary = Key::from_value(&record.value)?;
                Slot {
                    key: record.key,
                    value: record.value,
                    primary: Some(primary),
                }
            }
        };

        self.persist(&slot)?;

        let mut slots = self.slots.write();
        let position = match &slot.primary {
            Some(primary) => search::index_of_pair(&slots, &slot.key, primary, |s| {
                (&s.key, s.primary.as_ref().unwrap_or(&s.key))
            }),
            None => search::index_of(&slots, &slot.key, |s| &s.key),
        };
        match position {
            Ok(i) => slots[i] = slot,
            Err(i) => slots.insert(i, slot),
        }
        self.verify(&slots)
    }

    /// Removes every record whose key matches `query`.
    ///
    /// Returns the removed records in ascending order.
    ///
    /// # Errors
    ///
    /// Returns a host error if a removal cannot be written; the store and
    /// the host are then left unchanged.
    pub fn delete(&self, query: &KeyQuery) -> CoreResult<Vec<Record>> {
        let mut slots = self.slots.write();
        let range = query.to_range();
        let window = search::window(&slots, &range, |slot| &slot.key);
        self.unpersist(slots[window.clone()].iter().collect())?;
        let removed: Vec<Record> = slots.drain(window).map(|slot| slot.record()).collect();
        self.verify(&slots)?;
        Ok(removed)
    }

    /// Removes every record whose value, read as a key, matches `query`.
    ///
    /// Values are not sorted, so this scans the whole store. Index stores
    /// use it to drop the entries of a deleted primary record.
    ///
    /// # Errors
    ///
    /// Returns a host error if a removal cannot be written; the store and
    /// the host are then left unchanged.
    pub fn delete_by_value(&self, query: &KeyQuery) -> CoreResult<Vec<Record>> {
        let mut slots = self.slots.write();
        let matches = |slot: &Slot| {
            Key::from_value(&slot.value)
                .map(|key| query.includes(&key))
                .unwrap_or(false)
        };

        self.unpersist(slots.iter().filter(|slot| matches(slot)).collect())?;

        let mut removed = Vec::new();
        slots.retain(|slot| {
            if matches(slot) {
                removed.push(slot.record());
                false
            } else {
                true
            }
        });
        self.verify(&slots)?;
        Ok(removed)
    }

    /// Removes exactly `record`, matching the primary key too for index
    /// stores.
    ///
    /// Returns true if a record was removed.
    ///
    /// # Errors
    ///
    /// Returns a host error if the removal cannot be written.
    pub fn remove(&self, record: &Record) -> CoreResult<bool> {
        let mut slots = self.slots.write();
        let position = match self.kind {
            StoreKind::Primary => search::index_of(&slots, &record.key, |s| &s.key),
            StoreKind::Index => {
                let primary = Key::from_value(&record.value)?;
                search::index_of_pair(&slots, &record.key, &primary, |s| {
                    (&s.key, s.primary.as_ref().unwrap_or(&s.key))
                })
            }
        };
        let Ok(i) = position else {
            return Ok(false);
        };
        self.host
            .update(&self.host_key(&slots[i].host_suffix()), None)?;
        slots.remove(i);
        self.verify(&slots)?;
        Ok(true)
    }

    /// Removes all records and returns them in ascending order.
    ///
    /// # Errors
    ///
    /// Returns a host error if a removal cannot be written; the store and
    /// the host are then left unchanged.
    pub fn clear(&self) -> CoreResult<Vec<Record>> {
        let mut slots = self.slots.write();
        self.unpersist(slots.iter().collect())?;
        let removed = slots.drain(..).map(|slot| slot.record()).collect();
        self.verify(&slots)?;
        Ok(removed)
    }

    /// Returns a restartable view of the records in `range`.
    #[must_use]
    pub fn values(&self, range: Option<KeyRange>, direction: Direction) -> Values<'_> {
        Values {
            store: self,
            range: range.unwrap_or_default(),
            direction,
        }
    }

    /// Moves every record to a new host namespace.
    ///
    /// If a move fails, the records already moved are moved back and the
    /// store keeps its old namespace.
    ///
    /// # Errors
    ///
    /// Returns a host error if a record cannot be moved.
    pub fn relocate(&self, namespace: impl Into<String>) -> CoreResult<()> {
        let namespace = namespace.into();
        let slots = self.slots.read();
        let mut current = self.namespace.write();
        for (moved, slot) in slots.iter().enumerate() {
            if let Err(err) = self.move_slot(slot, &current, &namespace) {
                for slot in slots[..=moved].iter().rev() {
                    if let Err(undo) = self.move_slot(slot, &namespace, &current) {
                        tracing::error!(
                            namespace = %current.as_str(),
                            key = %slot.key,
                            error = %undo,
                            "failed to move record back"
                        );
                    }
                }
                return Err(err);
            }
        }
        tracing::debug!(
            from = %current.as_str(),
            to = %namespace,
            records = slots.len(),
            "relocated record store"
        );
        *current = namespace;
        Ok(())
    }

    fn payload(&self, slot: &Slot) -> CoreResult<Vec<u8>> {
        Ok(match self.kind {
            StoreKind::Primary => to_cbor(&slot.value)?,
            StoreKind::Index => Vec::new(),
        })
    }

    fn persist(&self, slot: &Slot) -> CoreResult<()> {
        let payload = self.payload(slot)?;
        self.host
            .update(&self.host_key(&slot.host_suffix()), Some(&payload))?;
        Ok(())
    }

    /// Removes `doomed` from the host. On failure, the entries already
    /// removed are written back so the host still matches memory.
    fn unpersist(&self, doomed: Vec<&Slot>) -> CoreResult<()> {
        for (done, slot) in doomed.iter().enumerate() {
            if let Err(err) = self.host.update(&self.host_key(&slot.host_suffix()), None) {
                for restored in &doomed[..done] {
                    if let Err(undo) = self.persist(restored) {
                        tracing::error!(
                            key = %restored.key,
                            error = %undo,
                            "failed to restore record after host error"
                        );
                    }
                }
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Copies `slot` from namespace `from` to `to`, then drops the old
    /// entry. Either step failing leaves the old entry in place.
    fn move_slot(&self, slot: &Slot, from: &str, to: &str) -> CoreResult<()> {
        let suffix = slot.host_suffix();
        let payload = self.payload(slot)?;
        let target = format!("{to}/{suffix}");
        self.host.update(&target, Some(&payload))?;
        if let Err(err) = self.host.update(&format!("{from}/{suffix}"), None) {
            let _ = self.host.update(&target, None);
            return Err(err.into());
        }
        Ok(())
    }

    fn host_key(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.namespace.read())
    }

    fn verify(&self, slots: &[Slot]) -> CoreResult<()> {
        if !self.verify_ordering {
            return Ok(());
        }
        for pair in slots.windows(2) {
            let ordered = pair[0].cmp_order(&pair[1]) == Ordering::Less
                && pair[0].host_suffix() < pair[1].host_suffix();
            if !ordered {
                let namespace = self.namespace.read();
                tracing::error!(
                    namespace = %namespace.as_str(),
                    left = %pair[0].key,
                    right = %pair[1].key,
                    "record store out of order"
                );
                return Err(CoreError::corrupted(format!(
                    "records in {} out of order at {}",
                    *namespace, pair[1].key
                )));
            }
        }
        Ok(())
    }
}

/// A lazy, restartable sequence of records.
///
/// Each call to [`Values::iter`] starts a fresh scan of the range.
#[derive(Debug)]
pub struct Values<'a> {
    store: &'a RecordStore,
    range: KeyRange,
    direction: Direction,
}

impl<'a> Values<'a> {
    /// Starts a new scan.
    #[must_use]
    pub fn iter(&self) -> ValuesIter<'a> {
        let slots = self.store.slots.read();
        let window = search::window(&slots, &self.range, |slot| &slot.key);
        ValuesIter {
            store: self.store,
            front: window.start,
            back: window.end,
            direction: self.direction,
        }
    }
}

impl<'a> IntoIterator for &Values<'a> {
    type Item = Record;
    type IntoIter = ValuesIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator returned by [`Values::iter`].
#[derive(Debug)]
pub struct ValuesIter<'a> {
    store: &'a RecordStore,
    front: usize,
    back: usize,
    direction: Direction,
}

impl Iterator for ValuesIter<'_> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.front >= self.back {
            return None;
        }
        let position = match self.direction {
            Direction::Next => {
                self.front += 1;
                self.front - 1
            }
            Direction::Prev => {
                self.back -= 1;
                self.back
            }
        };
        self.store.slots.read().get(position).map(Slot::record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shelfdb_storage::InMemoryHost;

    fn primary_store() -> (Arc<InMemoryHost>, RecordStore) {
        let host = Arc::new(InMemoryHost::new());
        let store = RecordStore::open(host.clone(), "ns", StoreKind::Primary, true).unwrap();
        (host, store)
    }

    fn index_store() -> RecordStore {
        let host = Arc::new(InMemoryHost::new());
        RecordStore::open(host, "idx", StoreKind::Index, true).unwrap()
    }

    fn rec(key: impl Into<Key>, value: impl Into<Value>) -> Record {
        Record::new(key.into(), value.into())
    }

    fn keys_of(records: impl IntoIterator<Item = Record>) -> Vec<Key> {
        records.into_iter().map(|r| r.key).collect()
    }

    /// Fails the `fail_at`-th removal, counting from one.
    struct FailingHost {
        inner: InMemoryHost,
        removals: std::sync::atomic::AtomicUsize,
        fail_at: usize,
    }

    impl FailingHost {
        fn new(fail_at: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryHost::new(),
                removals: std::sync::atomic::AtomicUsize::new(0),
                fail_at,
            })
        }
    }

    impl PersistenceHost for FailingHost {
        fn get(&self, key: &str) -> shelfdb_storage::HostResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn update(&self, key: &str, value: Option<&[u8]>) -> shelfdb_storage::HostResult<()> {
            if value.is_none() {
                let n = self.removals.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
                if n == self.fail_at {
                    return Err(shelfdb_storage::HostError::Closed);
                }
            }
            self.inner.update(key, value)
        }

        fn keys(&self) -> shelfdb_storage::HostResult<Vec<String>> {
            self.inner.keys()
        }
    }

    fn failing_store(fail_at: usize) -> (Arc<FailingHost>, RecordStore) {
        let host = FailingHost::new(fail_at);
        let store = RecordStore::open(host.clone(), "ns", StoreKind::Primary, true).unwrap();
        for k in 1..=3 {
            store.add(rec(k, k * 10)).unwrap();
        }
        (host, store)
    }

    fn reloaded_len(host: &Arc<FailingHost>, namespace: &str) -> usize {
        RecordStore::open(host.clone(), namespace, StoreKind::Primary, true)
            .unwrap()
            .len()
    }

    #[test]
    fn failed_host_removal_keeps_host_and_memory_in_step() {
        let (host, store) = failing_store(2);
        assert!(store.delete(&KeyRange::unbounded().into()).is_err());
        assert_eq!(store.len(), 3);
        assert_eq!(host.keys().unwrap().len(), 3);
        assert_eq!(reloaded_len(&host, "ns"), 3);

        let deleted = store.delete(&KeyRange::unbounded().into()).unwrap();
        assert_eq!(deleted.len(), 3);
        assert_eq!(reloaded_len(&host, "ns"), 0);
    }

    #[test]
    fn failed_clear_and_value_delete_change_nothing() {
        let (host, store) = failing_store(3);
        assert!(store.clear().is_err());
        assert_eq!(store.len(), 3);
        assert_eq!(reloaded_len(&host, "ns"), 3);

        let (host, store) = failing_store(2);
        let everything = KeyQuery::from(KeyRange::unbounded());
        assert!(store.delete_by_value(&everything).is_err());
        assert_eq!(store.len(), 3);
        assert_eq!(reloaded_len(&host, "ns"), 3);
    }

    #[test]
    fn failed_relocate_moves_records_back() {
        let (host, store) = failing_store(2);
        assert!(store.relocate("moved").is_err());
        assert_eq!(store.namespace(), "ns");
        assert_eq!(reloaded_len(&host, "ns"), 3);
        assert_eq!(reloaded_len(&host, "moved"), 0);
    }

    #[test]
    fn remove_and_clear_recheck_order() {
        let (_, store) = primary_store();
        for k in [4, 2, 3, 1] {
            store.add(rec(k, k)).unwrap();
        }
        assert!(store.remove(&rec(3, 3)).unwrap());
        assert!(!store.remove(&rec(3, 3)).unwrap());
        assert_eq!(
            keys_of(store.values(None, Direction::Next).iter()),
            vec![Key::from(1), Key::from(2), Key::from(4)]
        );
        assert_eq!(store.clear().unwrap().len(), 3);
        assert!(store.is_empty());
    }

    #[test]
    fn add_keeps_ascending_order() {
        let (_, store) = primary_store();
        for k in [5, 1, 3, 2, 4] {
            store.add(rec(k, k * 10)).unwrap();
        }
        let values = store.values(None, Direction::Next);
        assert_eq!(keys_of(values.iter()), (1..=5).map(Key::from).collect::<Vec<_>>());
    }

    #[test]
    fn add_overwrites_same_key() {
        let (_, store) = primary_store();
        store.add(rec(1, "a")).unwrap();
        store.add(rec(1, "b")).unwrap();
        assert_eq!(store.len(), 1);
        let record = store.get(&Key::from(1).into()).unwrap();
        assert_eq!(record.value, Value::from("b"));
    }

    #[test]
    fn get_by_range_returns_first_match() {
        let (_, store) = primary_store();
        for k in [10, 20, 30] {
            store.add(rec(k, k)).unwrap();
        }
        let range = KeyRange::lower_bound(Key::from(10), true);
        assert_eq!(store.get(&range.into()).unwrap().key, Key::from(20));

        let empty = KeyRange::bound(Key::from(11), Key::from(19), false, false).unwrap();
        assert!(store.get(&empty.into()).is_none());
    }

    #[test]
    fn delete_range_returns_removed() {
        let (host, store) = primary_store();
        for k in 1..=5 {
            store.add(rec(k, k)).unwrap();
        }
        let range = KeyRange::bound(Key::from(2), Key::from(4), false, true).unwrap();
        let removed = store.delete(&range.into()).unwrap();
        assert_eq!(keys_of(removed), vec![Key::from(2), Key::from(3)]);
        assert_eq!(store.len(), 3);
        assert_eq!(host.len(), 3);
    }

    #[test]
    fn values_reverse_and_restart() {
        let (_, store) = primary_store();
        for k in 1..=4 {
            store.add(rec(k, k)).unwrap();
        }
        let values = store.values(None, Direction::Prev);
        let first: Vec<Key> = keys_of(values.iter());
        let second: Vec<Key> = keys_of(values.iter());
        assert_eq!(first, vec![Key::from(4), Key::from(3), Key::from(2), Key::from(1)]);
        assert_eq!(first, second);
    }

    #[test]
    fn values_are_lazy() {
        let (_, store) = primary_store();
        for k in 1..=100 {
            store.add(rec(k, k)).unwrap();
        }
        let values = store.values(None, Direction::Next);
        let taken: Vec<Key> = keys_of(values.iter().take(2));
        assert_eq!(taken, vec![Key::from(1), Key::from(2)]);
    }

    #[test]
    fn reopen_loads_sorted_records() {
        let (host, store) = primary_store();
        store.add(rec("b", 2)).unwrap();
        store.add(rec("a", 1)).unwrap();
        store.add(rec(7, Value::map([("x", 1)]))).unwrap();
        drop(store);

        let reopened = RecordStore::open(host, "ns", StoreKind::Primary, true).unwrap();
        let records: Vec<Record> = reopened.values(None, Direction::Next).iter().collect();
        assert_eq!(keys_of(records.clone()), vec![Key::from(7), Key::from("a"), Key::from("b")]);
        assert_eq!(records[0].value, Value::map([("x", 1)]));
    }

    #[test]
    fn undecodable_host_entries_are_skipped() {
        let (host, store) = primary_store();
        store.add(rec(1, 1)).unwrap();
        host.update("ns/zz", Some(b"junk")).unwrap();
        host.update(&format!("ns/{}", keycode::encode_hex(&Key::from(2))), Some(b"\xff"))
            .unwrap();
        drop(store);

        let reopened = RecordStore::open(host, "ns", StoreKind::Primary, true).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn namespaces_do_not_leak() {
        let host = Arc::new(InMemoryHost::new());
        let a = RecordStore::open(host.clone(), "a", StoreKind::Primary, true).unwrap();
        let ab = RecordStore::open(host.clone(), "a.b", StoreKind::Primary, true).unwrap();
        a.add(rec(1, 1)).unwrap();
        ab.add(rec(2, 2)).unwrap();

        let reopened = RecordStore::open(host, "a", StoreKind::Primary, true).unwrap();
        assert_eq!(reopened.len(), 1);
    }

    #[test]
    fn index_store_admits_duplicate_index_keys() {
        let store = index_store();
        store.add(rec("Orwell", 2)).unwrap();
        store.add(rec("Orwell", 1)).unwrap();
        store.add(rec("Austen", 3)).unwrap();
        store.add(rec("Orwell", 1)).unwrap();

        let records: Vec<Record> = store.values(None, Direction::Next).iter().collect();
        let pairs: Vec<(Key, Value)> = records.into_iter().map(|r| (r.key, r.value)).collect();
        assert_eq!(
            pairs,
            vec![
                (Key::from("Austen"), Value::from(3)),
                (Key::from("Orwell"), Value::from(1)),
                (Key::from("Orwell"), Value::from(2)),
            ]
        );
        assert_eq!(store.count(Some(&KeyRange::only(Key::from("Orwell")))), 2);
    }

    #[test]
    fn index_store_rejects_non_key_values() {
        let store = index_store();
        let err = store.add(rec("a", Value::Null)).unwrap_err();
        assert_eq!(err.name(), "DataError");
    }

    #[test]
    fn delete_by_value_scans_values() {
        let store = index_store();
        store.add(rec("x", 1)).unwrap();
        store.add(rec("y", 1)).unwrap();
        store.add(rec("z", 2)).unwrap();

        let removed = store.delete_by_value(&Key::from(1).into()).unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(keys_of(store.values(None, Direction::Next).iter()), vec![Key::from("z")]);
    }

    #[test]
    fn remove_exact_pair() {
        let store = index_store();
        store.add(rec("a", 1)).unwrap();
        store.add(rec("a", 2)).unwrap();
        assert!(store.remove(&rec("a", 1)).unwrap());
        assert!(!store.remove(&rec("a", 1)).unwrap());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_returns_everything() {
        let (host, store) = primary_store();
        store.add(rec(1, 1)).unwrap();
        store.add(rec(2, 2)).unwrap();
        assert_eq!(store.clear().unwrap().len(), 2);
        assert!(store.is_empty());
        assert!(host.is_empty());
    }

    #[test]
    fn relocate_moves_host_entries() {
        let (host, store) = primary_store();
        store.add(rec(1, "one")).unwrap();
        store.relocate("moved").unwrap();
        assert_eq!(store.namespace(), "moved");
        store.add(rec(2, "two")).unwrap();
        drop(store);

        assert!(host.keys_with_prefix("ns/").unwrap().is_empty());
        let reopened = RecordStore::open(host, "moved", StoreKind::Primary, true).unwrap();
        assert_eq!(reopened.len(), 2);
    }

    fn small_key() -> impl Strategy<Value = Key> {
        prop_oneof![
            (-20i32..20).prop_map(Key::from),
            "[a-c]{0,2}".prop_map(Key::from),
            proptest::collection::vec((-3i32..3).prop_map(Key::from), 0..3).prop_map(Key::Array),
        ]
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(Key),
        Delete(Key),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => small_key().prop_map(Op::Add),
            1 => small_key().prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn sort_invariant(ops in proptest::collection::vec(op(), 0..40)) {
            let (_, store) = primary_store();
            let mut model: Vec<Key> = Vec::new();
            for op in ops {
                match op {
                    Op::Add(k) => {
                        store.add(Record::new(k.clone(), Value::Null)).unwrap();
                        if !model.contains(&k) {
                            model.push(k);
                        }
                    }
                    Op::Delete(k) => {
                        store.delete(&k.clone().into()).unwrap();
                        model.retain(|m| m != &k);
                    }
                }
            }
            model.sort();
            let forward = keys_of(store.values(None, Direction::Next).iter());
            let mut backward = keys_of(store.values(None, Direction::Prev).iter());
            prop_assert_eq!(&forward, &model);
            backward.reverse();
            prop_assert_eq!(backward, model);
        }

        #[test]
        fn range_correctness(
            keys in proptest::collection::vec(small_key(), 0..30),
            a in small_key(),
            b in small_key(),
            lower_open in any::<bool>(),
            upper_open in any::<bool>(),
        ) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let Ok(range) = KeyRange::bound(lo, hi, lower_open, upper_open) else {
                return Ok(());
            };
            let (_, store) = primary_store();
            for k in &keys {
                store.add(Record::new(k.clone(), Value::Null)).unwrap();
            }
            let mut expected: Vec<Key> = keys.into_iter().filter(|k| range.includes(k)).collect();
            expected.sort();
            expected.dedup();
            let actual = keys_of(store.values(Some(range), Direction::Next).iter());
            prop_assert_eq!(actual, expected);
        }
    }
}
