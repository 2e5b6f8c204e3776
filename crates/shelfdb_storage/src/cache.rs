//! Write-behind overlay host.

use crate::error::HostResult;
use crate::host::PersistenceHost;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// A host that buffers updates in memory until [`PersistenceHost::flush`].
///
/// Reads consult the overlay first. A buffered `None` marks a key as
/// removed even though the upstream host still holds it.
///
/// # Example
///
/// ```rust
/// use shelfdb_storage::{CachedHost, InMemoryHost, PersistenceHost};
/// use std::sync::Arc;
///
/// let upstream = Arc::new(InMemoryHost::new());
/// let cached = CachedHost::new(Arc::clone(&upstream));
///
/// cached.update("k", Some(b"v")).unwrap();
/// assert!(upstream.get("k").unwrap().is_none());
///
/// cached.flush().unwrap();
/// assert_eq!(upstream.get("k").unwrap(), Some(b"v".to_vec()));
/// ```
#[derive(Debug)]
pub struct CachedHost<H> {
    upstream: H,
    pending: RwLock<HashMap<String, Option<Vec<u8>>>>,
}

impl<H: PersistenceHost> CachedHost<H> {
    /// Wraps `upstream` with an empty write buffer.
    pub fn new(upstream: H) -> Self {
        Self {
            upstream,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the wrapped host.
    pub fn upstream(&self) -> &H {
        &self.upstream
    }

    /// Returns the number of buffered updates.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.read().len()
    }
}

impl<H: PersistenceHost> PersistenceHost for CachedHost<H> {
    fn get(&self, key: &str) -> HostResult<Option<Vec<u8>>> {
        if let Some(buffered) = self.pending.read().get(key) {
            return Ok(buffered.clone());
        }
        self.upstream.get(key)
    }

    fn update(&self, key: &str, value: Option<&[u8]>) -> HostResult<()> {
        self.pending
            .write()
            .insert(key.to_string(), value.map(<[u8]>::to_vec));
        Ok(())
    }

    fn keys(&self) -> HostResult<Vec<String>> {
        let pending = self.pending.read();
        let mut keys: HashSet<String> = self
            .upstream
            .keys()?
            .into_iter()
            .filter(|key| !matches!(pending.get(key), Some(None)))
            .collect();
        for (key, value) in pending.iter() {
            if value.is_some() {
                keys.insert(key.clone());
            }
        }
        Ok(keys.into_iter().collect())
    }

    fn flush(&self) -> HostResult<()> {
        let drained: Vec<(String, Option<Vec<u8>>)> = self.pending.write().drain().collect();
        let count = drained.len();

        let mut remaining = drained.into_iter();
        while let Some((key, value)) = remaining.next() {
            if let Err(err) = self.upstream.update(&key, value.as_deref()) {
                // Put back everything not yet written so a retry can finish.
                let mut pending = self.pending.write();
                pending.entry(key).or_insert(value);
                for (key, value) in remaining {
                    pending.entry(key).or_insert(value);
                }
                return Err(err);
            }
        }

        tracing::trace!(count, "flushed write-behind buffer");
        self.upstream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryHost;
    use std::sync::Arc;

    fn cached() -> (Arc<InMemoryHost>, CachedHost<Arc<InMemoryHost>>) {
        let upstream = Arc::new(InMemoryHost::new());
        let cached = CachedHost::new(Arc::clone(&upstream));
        (upstream, cached)
    }

    #[test]
    fn cache_reads_own_writes() {
        let (upstream, cached) = cached();
        cached.update("a", Some(b"1")).unwrap();

        assert_eq!(cached.get("a").unwrap(), Some(b"1".to_vec()));
        assert!(upstream.is_empty());
        assert_eq!(cached.pending_len(), 1);
    }

    #[test]
    fn cache_masks_upstream_removal() {
        let (upstream, cached) = cached();
        upstream.update("a", Some(b"1")).unwrap();
        cached.update("a", None).unwrap();

        assert!(cached.get("a").unwrap().is_none());
        assert!(cached.keys().unwrap().is_empty());
        assert_eq!(upstream.get("a").unwrap(), Some(b"1".to_vec()));
    }

    #[test]
    fn cache_keys_merge_upstream_and_pending() {
        let (upstream, cached) = cached();
        upstream.update("a", Some(b"1")).unwrap();
        upstream.update("b", Some(b"2")).unwrap();
        cached.update("b", Some(b"3")).unwrap();
        cached.update("c", Some(b"4")).unwrap();

        let mut keys = cached.keys().unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn cache_flush_pushes_upstream() {
        let (upstream, cached) = cached();
        upstream.update("gone", Some(b"x")).unwrap();
        cached.update("new", Some(b"y")).unwrap();
        cached.update("gone", None).unwrap();

        cached.flush().unwrap();

        assert_eq!(cached.pending_len(), 0);
        assert_eq!(upstream.get("new").unwrap(), Some(b"y".to_vec()));
        assert!(upstream.get("gone").unwrap().is_none());
    }
}
