//! Inspect command implementation.

use super::{format_size, open_factory, open_host};
use crate::error::CliResult;
use serde::Serialize;
use shelfdb_core::{Database, Factory};
use std::path::Path;

/// Journal inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// Journal file size in bytes.
    pub file_size: u64,
    /// Number of live host entries.
    pub live_entries: usize,
    /// Frames that compaction would drop.
    pub stale_frames: u64,
    /// Databases in the journal.
    pub databases: Vec<DatabaseStats>,
}

/// Schema and counts for one database.
#[derive(Debug, Serialize)]
pub struct DatabaseStats {
    /// Database name.
    pub name: String,
    /// Schema version.
    pub version: u64,
    /// Object stores in name order.
    pub stores: Vec<StoreStats>,
}

/// Schema and counts for one object store.
#[derive(Debug, Serialize)]
pub struct StoreStats {
    /// Store name.
    pub name: String,
    /// Key path, if records carry their own keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_path: Option<String>,
    /// Whether the store generates keys.
    pub auto_increment: bool,
    /// Last generated key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_current: Option<u64>,
    /// Number of records.
    pub record_count: usize,
    /// Indexes in name order.
    pub indexes: Vec<IndexStats>,
}

/// Schema and counts for one index.
#[derive(Debug, Serialize)]
pub struct IndexStats {
    /// Index name.
    pub name: String,
    /// Key path evaluated against each record.
    pub key_path: String,
    /// Whether index keys must be unique.
    pub unique: bool,
    /// Whether array keys produce one entry per element.
    pub multi_entry: bool,
    /// Number of index entries.
    pub entry_count: usize,
}

/// Runs the inspect command.
pub fn run(path: &Path, format: &str) -> CliResult<()> {
    let result = inspect(path)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

/// Collects statistics for the journal at `path`.
pub fn inspect(path: &Path) -> CliResult<InspectResult> {
    let host = open_host(path)?;
    let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let factory = open_factory(&host)?;

    Ok(InspectResult {
        path: path.display().to_string(),
        file_size,
        live_entries: host.len(),
        stale_frames: host.stale_frames(),
        databases: collect_databases(&factory),
    })
}

fn collect_databases(factory: &Factory) -> Vec<DatabaseStats> {
    factory
        .databases()
        .into_iter()
        .filter_map(|info| factory.database(&info.name))
        .map(|database| database_stats(&database))
        .collect()
}

fn database_stats(database: &Database) -> DatabaseStats {
    let stores = database
        .object_store_names()
        .into_iter()
        .filter_map(|name| database.object_store(&name))
        .map(|store| {
            let indexes = store
                .index_names()
                .into_iter()
                .filter_map(|name| store.index(&name))
                .map(|index| IndexStats {
                    name: index.name(),
                    key_path: index.key_path().to_string(),
                    unique: index.unique(),
                    multi_entry: index.multi_entry(),
                    entry_count: index.count(None),
                })
                .collect();
            StoreStats {
                name: store.name(),
                key_path: store.key_path().map(ToString::to_string),
                auto_increment: store.auto_increment(),
                generator_current: store.generator_current(),
                record_count: store.count(None),
                indexes,
            }
        })
        .collect();

    DatabaseStats {
        name: database.name().to_string(),
        version: database.version(),
        stores,
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Journal: {}", result.path);
    println!();
    println!("Journal:");
    println!("  Size:          {}", format_size(result.file_size));
    println!("  Live entries:  {}", result.live_entries);
    println!("  Stale frames:  {}", result.stale_frames);

    for database in &result.databases {
        println!();
        println!("Database '{}' (version {}):", database.name, database.version);
        if database.stores.is_empty() {
            println!("  (no object stores)");
        }
        for store in &database.stores {
            let key_path = store.key_path.as_deref().unwrap_or("(out-of-line)");
            println!(
                "  {} [key path: {}] {} records",
                store.name, key_path, store.record_count
            );
            if let Some(current) = store.generator_current {
                println!("    generator: {}", current);
            }
            for index in &store.indexes {
                let mut flags = Vec::new();
                if index.unique {
                    flags.push("unique");
                }
                if index.multi_entry {
                    flags.push("multi-entry");
                }
                println!(
                    "    index {} [{}] {} entries {}",
                    index.name,
                    index.key_path,
                    index.entry_count,
                    flags.join(", ")
                );
            }
        }
    }
}
