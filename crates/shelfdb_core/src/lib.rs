//! # shelfdb Core
//!
//! An embeddable, IndexedDB-style database engine.
//!
//! This crate provides:
//! - Ordered record stores over a pluggable [`shelfdb_storage::PersistenceHost`]
//! - Object stores with key paths, key generators and secondary indexes
//! - Transactions with rollback logs, serialized per database
//! - The open/upgrade/delete lifecycle protocol with `versionchange`,
//!   `blocked` and `upgradeneeded` signals
//!
//! All engine work runs on a cooperative [`TaskQueue`]. Calls such as
//! [`Factory::open`] or [`ObjectStoreHandle::put`] only enqueue work and
//! return a [`Request`]; drive the queue to see results.
//!
//! ## Example
//!
//! ```rust
//! use shelfdb_core::{Factory, KeyPath, Signal, TransactionMode, Value};
//!
//! let factory = Factory::in_memory();
//! let request = factory.open("library", Some(1)).unwrap();
//! request.listen(|signal| {
//!     if let Signal::UpgradeNeeded { connection, .. } = signal {
//!         let path = KeyPath::single("isbn").unwrap();
//!         connection.create_object_store("books", Some(path), false).unwrap();
//!     }
//! });
//! factory.run_until_idle();
//!
//! let connection = request.result().unwrap().unwrap().into_connection().unwrap();
//! let txn = connection.transaction(["books"], TransactionMode::ReadWrite).unwrap();
//! let books = txn.object_store("books").unwrap();
//! let put = books
//!     .put(Value::map([("isbn", Value::from(123)), ("title", Value::from("Quarry"))]), None)
//!     .unwrap();
//! factory.run_until_idle();
//!
//! assert_eq!(put.result().unwrap().unwrap().as_key(), Some(&123.into()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
mod config;
mod connection;
mod database;
mod error;
mod factory;
mod handle;
mod index;
mod key_generator;
mod object_store;
mod record_store;
mod request;
mod rollback;
mod schedule;
mod search;
mod signal;
mod transaction;
mod types;

pub use catalog::{IndexDescriptor, StoreDescriptor};
pub use config::Config;
pub use connection::Connection;
pub use database::Database;
pub use error::{CoreError, CoreResult};
pub use factory::{Factory, MAX_VERSION};
pub use handle::{IndexHandle, ObjectStoreHandle};
pub use index::Index;
pub use key_generator::{KeyGenerator, MAX_GENERATED_KEY};
pub use object_store::ObjectStore;
pub use record_store::{RecordStore, StoreKind, Values, ValuesIter};
pub use request::{Output, Request};
pub use rollback::{RollbackLog, UndoAction};
pub use schedule::{Task, TaskQueue};
pub use signal::{Listener, Notifier, Signal, VersionChange};
pub use transaction::{Transaction, TransactionState};
pub use types::{ConnectionId, DatabaseInfo, Direction, Record, TransactionId, TransactionMode};

pub use shelfdb_codec::{Key, KeyPath, KeyQuery, KeyRange, Value};
