//! Dump command implementation.

use super::{open_factory, open_host};
use crate::error::{CliError, CliResult};
use crate::render::{key_to_json, value_to_json};
use serde::Serialize;
use shelfdb_core::{Direction, RecordStore};
use std::path::Path;

/// The store or index to dump.
#[derive(Debug, Clone, Copy)]
pub struct Target<'a> {
    /// Database name.
    pub database: &'a str,
    /// Object store name.
    pub store: &'a str,
    /// Index of the store, if dumping index entries.
    pub index: Option<&'a str>,
}

/// One dumped record.
///
/// For an index, `key` is the index key and `value` the primary key.
#[derive(Debug, Serialize)]
pub struct DumpedRecord {
    /// Record key.
    pub key: serde_json::Value,
    /// Record value.
    pub value: serde_json::Value,
}

/// Runs the dump command.
pub fn run(path: &Path, target: &Target<'_>, limit: Option<usize>, format: &str) -> CliResult<()> {
    let records = dump(path, target, limit)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
        _ => {
            for record in &records {
                println!("{} => {}", record.key, record.value);
            }
            println!();
            println!("{} records", records.len());
        }
    }

    Ok(())
}

/// Reads up to `limit` records of `target` in key order.
pub fn dump(path: &Path, target: &Target<'_>, limit: Option<usize>) -> CliResult<Vec<DumpedRecord>> {
    let host = open_host(path)?;
    let factory = open_factory(&host)?;

    let database = factory
        .database(target.database)
        .filter(|database| database.version() > 0)
        .ok_or_else(|| CliError::UnknownDatabase(target.database.to_string()))?;
    let store = database
        .object_store(target.store)
        .ok_or_else(|| CliError::UnknownStore(target.store.to_string()))?;

    let records = match target.index {
        Some(name) => {
            let index = store
                .index(name)
                .ok_or_else(|| CliError::UnknownStore(format!("{}.{}", target.store, name)))?;
            collect(index.records(), limit)
        }
        None => collect(store.records(), limit),
    };
    tracing::debug!(
        database = target.database,
        store = target.store,
        records = records.len(),
        "dumped records"
    );
    Ok(records)
}

fn collect(records: &RecordStore, limit: Option<usize>) -> Vec<DumpedRecord> {
    records
        .values(None, Direction::Next)
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|record| DumpedRecord {
            key: key_to_json(&record.key),
            value: value_to_json(&record.value),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::testing::write_library;
    use serde_json::json;

    fn target<'a>(store: &'a str, index: Option<&'a str>) -> Target<'a> {
        Target {
            database: "library",
            store,
            index,
        }
    }

    #[test]
    fn dumps_records_in_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.shelf");
        write_library(&path);

        let records = dump(&path, &target("books", None), None).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].key, json!(1));
        assert_eq!(records[0].value, json!({ "isbn": 1, "author": "Fred" }));
    }

    #[test]
    fn dumps_index_entries_and_honours_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.shelf");
        write_library(&path);

        let records = dump(&path, &target("books", Some("by_author")), Some(1)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, json!("Barney"));
        assert_eq!(records[0].value, json!(2));
    }

    #[test]
    fn unknown_names_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("library.shelf");
        write_library(&path);

        let missing_db = Target {
            database: "nope",
            store: "books",
            index: None,
        };
        assert!(matches!(
            dump(&path, &missing_db, None),
            Err(CliError::UnknownDatabase(_))
        ));
        assert!(matches!(
            dump(&path, &target("films", None), None),
            Err(CliError::UnknownStore(_))
        ));
    }
}
