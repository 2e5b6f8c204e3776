//! CLI command implementations.

pub mod compact;
pub mod dump;
pub mod inspect;

use crate::error::{CliError, CliResult};
use shelfdb_core::{Config, Factory};
use shelfdb_storage::{FileHost, PersistenceHost};
use std::path::Path;
use std::sync::Arc;

/// Opens an existing journal without creating one.
pub(crate) fn open_host(path: &Path) -> CliResult<Arc<FileHost>> {
    if !path.is_file() {
        return Err(CliError::MissingJournal(path.to_path_buf()));
    }
    Ok(Arc::new(FileHost::open(path)?))
}

/// Loads every database in the journal.
pub(crate) fn open_factory(host: &Arc<FileHost>) -> CliResult<Factory> {
    let host: Arc<dyn PersistenceHost> = Arc::clone(host) as Arc<dyn PersistenceHost>;
    Ok(Factory::new(host, Config::default())?)
}

/// Formats a byte count for humans.
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use shelfdb_core::{Factory, KeyPath, Signal, TransactionMode, Value};
    use std::path::Path;

    /// Writes a `library` database with two books to the journal at `path`.
    pub fn write_library(path: &Path) {
        let factory = Factory::open_path(path, Default::default()).unwrap();
        let open = factory.open("library", Some(1)).unwrap();
        open.listen(|signal| {
            if let Signal::UpgradeNeeded { connection, .. } = signal {
                let books = connection
                    .create_object_store("books", Some(KeyPath::single("isbn").unwrap()), false)
                    .unwrap();
                books
                    .create_index("by_author", KeyPath::single("author").unwrap(), false, false)
                    .unwrap();
            }
        });
        factory.run_until_idle();
        let connection = open.result().unwrap().unwrap().into_connection().unwrap();

        let txn = connection
            .transaction(["books"], TransactionMode::ReadWrite)
            .unwrap();
        let books = txn.object_store("books").unwrap();
        for (isbn, author) in [(1, "Fred"), (2, "Barney")] {
            let book = Value::map([("isbn", Value::from(isbn)), ("author", Value::from(author))]);
            books.put(book, None).unwrap();
        }
        factory.run_until_idle();
        connection.close();
        factory.run_until_idle();
        factory.flush().unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 bytes");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn missing_journal_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let result = open_host(&dir.path().join("absent.shelf"));
        assert!(matches!(result, Err(CliError::MissingJournal(_))));
    }
}
