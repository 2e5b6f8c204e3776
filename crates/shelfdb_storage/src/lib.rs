//! # shelfdb Storage
//!
//! Persistence host trait and implementations for shelfdb.
//!
//! This crate provides the lowest-level storage abstraction for shelfdb.
//! Hosts are **opaque key-value stores** - they map string keys to byte
//! payloads and do not interpret what they store.
//!
//! ## Design Principles
//!
//! - Hosts are simple stores (get, update, keys, flush)
//! - No knowledge of databases, key ordering, or value encoding
//! - Must be `Send + Sync` for concurrent access
//! - shelfdb owns all ordering and format interpretation
//!
//! ## Available Hosts
//!
//! - [`InMemoryHost`] - For testing and ephemeral databases
//! - [`FileHost`] - Journal file with exclusive locking and compaction
//! - [`CachedHost`] - Write-behind buffer in front of another host
//!
//! ## Example
//!
//! ```rust
//! use shelfdb_storage::{InMemoryHost, PersistenceHost};
//!
//! let host = InMemoryHost::new();
//! host.update("databases", Some(b"{}")).unwrap();
//! assert_eq!(host.keys().unwrap(), vec!["databases".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod error;
mod file;
mod host;
mod memory;

pub use cache::CachedHost;
pub use error::{HostError, HostResult};
pub use file::{compute_crc32, FileHost, JOURNAL_MAGIC, JOURNAL_VERSION};
pub use host::PersistenceHost;
pub use memory::InMemoryHost;
