//! Test fixtures and factory helpers.
//!
//! Provides isolated factories over memory and file hosts and helpers
//! that drive the open/upgrade protocol to completion.

use shelfdb_core::{
    Config, Connection, Factory, KeyPath, Request, Signal, Transaction, TransactionMode, Value,
};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// A test factory with automatic cleanup.
pub struct TestFactory {
    /// The factory instance.
    pub factory: Factory,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestFactory {
    /// Creates a factory over a fresh in-memory host.
    pub fn memory() -> Self {
        Self {
            factory: Factory::in_memory(),
            _temp_dir: None,
        }
    }

    /// Creates a factory over a journal file in a temporary directory.
    pub fn file() -> Self {
        Self::file_with_config(Config::default())
    }

    /// Creates a file-backed factory with `config`.
    pub fn file_with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let factory = Factory::open_path(temp_dir.path().join(JOURNAL_NAME), config)
            .expect("Failed to open file factory");
        Self {
            factory,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the journal path if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|d| d.path().join(JOURNAL_NAME))
    }

    /// Drops the factory and opens a new one over the same journal.
    ///
    /// Connections opened through the old factory must be closed first,
    /// or the journal stays locked.
    pub fn reopen(self) -> Self {
        let temp_dir = self
            ._temp_dir
            .expect("Only file factories can be reopened");
        self.factory.flush().expect("Failed to flush");
        drop(self.factory);
        let factory = Factory::open_path(temp_dir.path().join(JOURNAL_NAME), Config::default())
            .expect("Failed to reopen file factory");
        Self {
            factory,
            _temp_dir: Some(temp_dir),
        }
    }
}

/// File name of the journal inside a file fixture's directory.
pub const JOURNAL_NAME: &str = "test.shelf";

impl std::ops::Deref for TestFactory {
    type Target = Factory;

    fn deref(&self) -> &Self::Target {
        &self.factory
    }
}

/// Runs a test with a temporary in-memory factory.
pub fn with_temp_factory<F, R>(f: F) -> R
where
    F: FnOnce(&Factory) -> R,
{
    let test_factory = TestFactory::memory();
    f(&test_factory.factory)
}

/// Runs a test with a temporary file-backed factory.
pub fn with_file_factory<F, R>(f: F) -> R
where
    F: FnOnce(&Factory, &std::path::Path) -> R,
{
    let test_factory = TestFactory::file();
    let path = test_factory.path().expect("File factory should have a path");
    f(&test_factory.factory, &path)
}

/// Opens `name` at `version`, running `upgrade` if an upgrade is needed,
/// and drives the queue until the open settles.
///
/// Returns the open request so callers can inspect its outcome.
pub fn open_request(
    factory: &Factory,
    name: &str,
    version: u64,
    upgrade: impl Fn(&Arc<Connection>, &Arc<Transaction>) + Send + Sync + 'static,
) -> Request {
    let request = factory.open(name, Some(version)).expect("Invalid version");
    request.listen(move |signal| {
        if let Signal::UpgradeNeeded {
            connection,
            transaction,
            ..
        } = signal
        {
            upgrade(connection, transaction);
        }
    });
    factory.run_until_idle();
    request
}

/// Like [`open_request`], but unwraps the resulting connection.
pub fn open_with(
    factory: &Factory,
    name: &str,
    version: u64,
    upgrade: impl Fn(&Arc<Connection>, &Arc<Transaction>) + Send + Sync + 'static,
) -> Arc<Connection> {
    open_request(factory, name, version, upgrade)
        .result()
        .expect("Open did not settle")
        .expect("Open failed")
        .into_connection()
        .expect("Open did not yield a connection")
}

/// Puts every value in one read-write transaction and runs it.
pub fn put_all(factory: &Factory, connection: &Arc<Connection>, store: &str, values: Vec<Value>) {
    let txn = connection
        .transaction([store], TransactionMode::ReadWrite)
        .expect("Failed to start transaction");
    let handle = txn.object_store(store).expect("Store not in scope");
    for value in values {
        handle.put(value, None).expect("Failed to queue put");
    }
    factory.run_until_idle();
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Builds a book record.
    pub fn book(isbn: u32, title: &str, author: &str) -> Value {
        Value::map([
            ("isbn", Value::from(isbn)),
            ("title", Value::from(title)),
            ("author", Value::from(author)),
        ])
    }

    /// Opens a `library` database with a `books` store keyed by `isbn`,
    /// a unique `by_title` index and a `by_author` index.
    pub fn library(factory: &Factory) -> Arc<Connection> {
        open_with(factory, "library", 1, |connection, _| {
            let books = connection
                .create_object_store("books", Some(KeyPath::single("isbn").expect("path")), false)
                .expect("Failed to create books");
            books
                .create_index("by_title", KeyPath::single("title").expect("path"), true, false)
                .expect("Failed to create by_title");
            books
                .create_index("by_author", KeyPath::single("author").expect("path"), false, false)
                .expect("Failed to create by_author");
        })
    }

    /// Opens `name` with a single auto-increment store `items` and no key
    /// path.
    pub fn counter(factory: &Factory, name: &str) -> Arc<Connection> {
        open_with(factory, name, 1, |connection, _| {
            connection
                .create_object_store("items", None, true)
                .expect("Failed to create items");
        })
    }

    /// A library populated with `count` books by two alternating authors.
    pub fn populated_library(factory: &Factory, count: u32) -> Arc<Connection> {
        let connection = library(factory);
        let books = (0..count)
            .map(|i| {
                let author = if i % 2 == 0 { "Fred" } else { "Barney" };
                book(i, &format!("Title {i}"), author)
            })
            .collect();
        put_all(factory, &connection, "books", books);
        connection
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_factory() {
        let test_factory = TestFactory::memory();
        assert!(test_factory.path().is_none());
        assert!(test_factory.databases().is_empty());
    }

    #[test]
    fn test_with_temp_factory() {
        with_temp_factory(|factory| {
            let connection = scenarios::counter(factory, "db");
            assert_eq!(connection.version(), 1);
        });
    }

    #[test]
    fn test_populated_scenario() {
        let test_factory = TestFactory::memory();
        let _connection = scenarios::populated_library(&test_factory, 10);
        let books = test_factory
            .database("library")
            .unwrap()
            .object_store("books")
            .unwrap();
        assert_eq!(books.count(None), 10);
        assert_eq!(books.index("by_author").unwrap().count(None), 10);
    }

    #[test]
    fn test_file_factory_reopens() {
        let test_factory = TestFactory::file();
        let connection = scenarios::populated_library(&test_factory, 4);
        connection.close();
        drop(connection);
        test_factory.run_until_idle();

        let reopened = test_factory.reopen();
        let books = reopened.database("library").unwrap().object_store("books").unwrap();
        assert_eq!(books.count(None), 4);
    }
}
