//! Core type definitions for shelfdb.

use shelfdb_codec::{Key, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing within a factory and never
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Unique identifier for a database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Creates a new connection ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn:{}", self.0)
    }
}

/// Allocates connection and transaction IDs for one factory.
#[derive(Debug, Default)]
pub(crate) struct IdSequence {
    connections: AtomicU64,
    transactions: AtomicU64,
}

impl IdSequence {
    pub(crate) fn next_connection(&self) -> ConnectionId {
        ConnectionId(self.connections.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub(crate) fn next_transaction(&self) -> TransactionId {
        TransactionId(self.transactions.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// What a transaction is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    /// Reads only.
    ReadOnly,
    /// Reads and record writes.
    ReadWrite,
    /// Reads, writes and schema changes; only created by an upgrade.
    VersionChange,
}

impl TransactionMode {
    /// Returns true if the mode permits record writes.
    #[must_use]
    pub fn can_write(self) -> bool {
        !matches!(self, TransactionMode::ReadOnly)
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransactionMode::ReadOnly => "readonly",
            TransactionMode::ReadWrite => "readwrite",
            TransactionMode::VersionChange => "versionchange",
        };
        f.write_str(name)
    }
}

/// Iteration order for record scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending key order.
    #[default]
    Next,
    /// Descending key order.
    Prev,
}

/// A key and the value stored under it.
///
/// In an index's record store the value is the owning record's primary
/// key.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The record key.
    pub key: Key,
    /// The stored value.
    pub value: Value,
}

impl Record {
    /// Creates a new record.
    #[must_use]
    pub fn new(key: Key, value: Value) -> Self {
        Self { key, value }
    }
}

/// Name and version of a registered database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Current version.
    pub version: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_display() {
        assert_eq!(TransactionId::new(7).to_string(), "txn:7");
        assert_eq!(ConnectionId::new(3).to_string(), "conn:3");
        assert_eq!(TransactionId::new(9).as_u64(), 9);
    }

    #[test]
    fn id_sequence_is_monotonic() {
        let ids = IdSequence::default();
        assert_eq!(ids.next_connection(), ConnectionId(1));
        assert_eq!(ids.next_connection(), ConnectionId(2));
        assert_eq!(ids.next_transaction(), TransactionId(1));
    }

    #[test]
    fn mode_permissions() {
        assert!(!TransactionMode::ReadOnly.can_write());
        assert!(TransactionMode::ReadWrite.can_write());
        assert!(TransactionMode::VersionChange.can_write());
        assert_eq!(TransactionMode::VersionChange.to_string(), "versionchange");
    }

    #[test]
    fn direction_defaults_to_next() {
        assert_eq!(Direction::default(), Direction::Next);
    }
}
