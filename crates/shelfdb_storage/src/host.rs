//! Persistence host trait definition.

use crate::error::HostResult;

/// An ordered key-value namespace that shelfdb persists into.
///
/// Hosts are **opaque value stores**. They map string keys to byte
/// payloads and know nothing about databases, object stores, or the key
/// encoding shelfdb layers on top of them. shelfdb owns all ordering:
/// the host only has to remember what was written.
///
/// # Invariants
///
/// - `get` returns exactly the bytes last passed to `update` for that key
/// - `update(key, None)` removes the key; a later `get` returns `None`
/// - `keys` lists every present key exactly once, in any order
/// - Hosts must be `Send + Sync`; all methods take `&self`
///
/// # Implementors
///
/// - [`super::InMemoryHost`] - For testing and ephemeral databases
/// - [`super::FileHost`] - Journal-backed persistent storage
/// - [`super::CachedHost`] - Write-behind overlay over any other host
pub trait PersistenceHost: Send + Sync {
    /// Reads the payload stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be read.
    fn get(&self, key: &str) -> HostResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, or removes the key when `value` is `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be recorded.
    fn update(&self, key: &str, value: Option<&[u8]>) -> HostResult<()>;

    /// Returns all keys currently present.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be read.
    fn keys(&self) -> HostResult<Vec<String>>;

    /// Makes all previous updates durable.
    ///
    /// Hosts without buffering can rely on the default no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&self) -> HostResult<()> {
        Ok(())
    }

    /// Returns all keys starting with `prefix`, with the prefix stripped.
    ///
    /// # Errors
    ///
    /// Returns an error if the host cannot be read.
    fn keys_with_prefix(&self, prefix: &str) -> HostResult<Vec<String>> {
        Ok(self
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(prefix).map(str::to_string))
            .collect())
    }
}

impl<H: PersistenceHost + ?Sized> PersistenceHost for std::sync::Arc<H> {
    fn get(&self, key: &str) -> HostResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn update(&self, key: &str, value: Option<&[u8]>) -> HostResult<()> {
        (**self).update(key, value)
    }

    fn keys(&self) -> HostResult<Vec<String>> {
        (**self).keys()
    }

    fn flush(&self) -> HostResult<()> {
        (**self).flush()
    }

    fn keys_with_prefix(&self, prefix: &str) -> HostResult<Vec<String>> {
        (**self).keys_with_prefix(prefix)
    }
}
