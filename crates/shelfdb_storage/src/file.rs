//! Journal-backed persistence host.
//!
//! The journal is an append-only file of update frames:
//!
//! ```text
//! | magic (4) | version (2) |                          file header
//! | op (1) | key_len (4) | value_len (4) | key | value | crc32 (4) |  frame
//! ```
//!
//! `op` is `1` for a put and `2` for a removal (removals carry no value).
//! All integers are little-endian. The CRC covers everything in the frame
//! before it. On open the journal is replayed into memory; a torn trailing
//! frame is treated as the end of the journal and cut off.

use crate::error::{HostError, HostResult};
use crate::host::PersistenceHost;
use fs2::FileExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes at the start of every journal.
pub const JOURNAL_MAGIC: [u8; 4] = *b"SHLF";

/// Current journal format version.
pub const JOURNAL_VERSION: u16 = 1;

const FILE_HEADER_SIZE: usize = 6;
const FRAME_HEADER_SIZE: usize = 9;
const CRC_SIZE: usize = 4;

const OP_PUT: u8 = 1;
const OP_REMOVE: u8 = 2;

/// A persistence host that records every update in a journal file.
///
/// All live entries are held in memory; the file is only read at open
/// time. The journal is locked exclusively with an advisory file lock so
/// two processes cannot interleave frames.
///
/// # Example
///
/// ```no_run
/// use shelfdb_storage::{FileHost, PersistenceHost};
/// use std::path::Path;
///
/// let host = FileHost::open(Path::new("shelf.journal")).unwrap();
/// host.update("k", Some(b"v")).unwrap();
/// host.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileHost {
    path: PathBuf,
    state: Mutex<JournalState>,
}

#[derive(Debug)]
struct JournalState {
    file: File,
    entries: HashMap<String, Vec<u8>>,
    /// Frames in the journal that no longer describe a live entry.
    stale_frames: u64,
}

impl FileHost {
    /// Opens or creates a journal at `path` and replays it.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Locked`] if another process holds the journal,
    /// [`HostError::Corrupted`] if a frame fails its checksum, or an I/O
    /// error if the file cannot be opened.
    pub fn open(path: &Path) -> HostResult<Self> {
        let mut file = open_locked(path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;

        let (entries, stale_frames, valid_len) = if bytes.is_empty() {
            file.write_all(&file_header())?;
            file.sync_all()?;
            (HashMap::new(), 0, FILE_HEADER_SIZE)
        } else {
            replay(&bytes)?
        };

        if valid_len < bytes.len() {
            tracing::warn!(
                path = %path.display(),
                discarded = bytes.len() - valid_len,
                "discarding torn journal tail"
            );
            file.set_len(valid_len as u64)?;
        }
        file.seek(SeekFrom::End(0))?;

        tracing::debug!(
            path = %path.display(),
            entries = entries.len(),
            stale_frames,
            "opened journal"
        );

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(JournalState {
                file,
                entries,
                stale_frames,
            }),
        })
    }

    /// Opens a journal, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the journal
    /// cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> HostResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of journal frames that no longer hold live data.
    #[must_use]
    pub fn stale_frames(&self) -> u64 {
        self.state.lock().stale_frames
    }

    /// Returns the number of live entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    /// Returns true if the host holds no live entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    /// Rewrites the journal so it contains one frame per live entry.
    ///
    /// The new journal is written beside the old one and renamed over it,
    /// so a crash mid-compaction leaves the previous journal intact.
    ///
    /// # Errors
    ///
    /// Returns an error if the replacement journal cannot be written.
    pub fn compact(&self) -> HostResult<()> {
        let mut state = self.state.lock();

        let tmp_path = self.path.with_extension("compact");
        {
            let mut tmp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp_path)?;
            let mut buffer = file_header();
            let mut keys: Vec<&String> = state.entries.keys().collect();
            keys.sort();
            for key in keys {
                let value = &state.entries[key];
                buffer.extend_from_slice(&encode_frame(key, Some(value)));
            }
            tmp.write_all(&buffer)?;
            tmp.sync_all()?;
        }

        fs::rename(&tmp_path, &self.path)?;
        let mut file = open_locked(&self.path)?;
        file.seek(SeekFrom::End(0))?;

        let reclaimed = state.stale_frames;
        state.file = file;
        state.stale_frames = 0;

        tracing::info!(
            path = %self.path.display(),
            entries = state.entries.len(),
            reclaimed,
            "compacted journal"
        );
        Ok(())
    }
}

impl PersistenceHost for FileHost {
    fn get(&self, key: &str) -> HostResult<Option<Vec<u8>>> {
        Ok(self.state.lock().entries.get(key).cloned())
    }

    fn update(&self, key: &str, value: Option<&[u8]>) -> HostResult<()> {
        let mut state = self.state.lock();
        let existed = state.entries.contains_key(key);
        if value.is_none() && !existed {
            return Ok(());
        }

        let frame = encode_frame(key, value);
        state.file.write_all(&frame)?;

        match value {
            Some(bytes) => {
                state.entries.insert(key.to_string(), bytes.to_vec());
                if existed {
                    state.stale_frames += 1;
                }
            }
            None => {
                state.entries.remove(key);
                // Both the removed put and the removal frame itself are dead.
                state.stale_frames += 2;
            }
        }
        Ok(())
    }

    fn keys(&self) -> HostResult<Vec<String>> {
        Ok(self.state.lock().entries.keys().cloned().collect())
    }

    fn flush(&self) -> HostResult<()> {
        let mut state = self.state.lock();
        state.file.flush()?;
        state.file.sync_data()?;
        Ok(())
    }
}

fn open_locked(path: &Path) -> HostResult<File> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    if file.try_lock_exclusive().is_err() {
        return Err(HostError::Locked {
            path: path.display().to_string(),
        });
    }
    Ok(file)
}

fn file_header() -> Vec<u8> {
    let mut header = Vec::with_capacity(FILE_HEADER_SIZE);
    header.extend_from_slice(&JOURNAL_MAGIC);
    header.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
    header
}

fn encode_frame(key: &str, value: Option<&[u8]>) -> Vec<u8> {
    let payload = value.unwrap_or_default();
    let mut frame =
        Vec::with_capacity(FRAME_HEADER_SIZE + key.len() + payload.len() + CRC_SIZE);
    frame.push(if value.is_some() { OP_PUT } else { OP_REMOVE });
    frame.extend_from_slice(&(key.len() as u32).to_le_bytes());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(key.as_bytes());
    frame.extend_from_slice(payload);
    let crc = compute_crc32(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Replays journal bytes into a live entry map.
///
/// Returns the entries, the count of stale frames, and the length of the
/// valid journal prefix.
fn replay(bytes: &[u8]) -> HostResult<(HashMap<String, Vec<u8>>, u64, usize)> {
    if bytes.len() < FILE_HEADER_SIZE {
        return Ok((HashMap::new(), 0, 0));
    }
    if bytes[..4] != JOURNAL_MAGIC {
        return Err(HostError::Corrupted("bad journal magic".into()));
    }
    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != JOURNAL_VERSION {
        return Err(HostError::Corrupted(format!(
            "unsupported journal version {version}"
        )));
    }

    let mut entries = HashMap::new();
    let mut stale = 0u64;
    let mut offset = FILE_HEADER_SIZE;

    while offset + FRAME_HEADER_SIZE <= bytes.len() {
        let header = &bytes[offset..offset + FRAME_HEADER_SIZE];
        let op = header[0];
        let key_len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
        let value_len = u32::from_le_bytes([header[5], header[6], header[7], header[8]]) as usize;

        let body_end = offset + FRAME_HEADER_SIZE + key_len + value_len;
        let frame_end = body_end + CRC_SIZE;
        if frame_end > bytes.len() {
            break;
        }

        let stored_crc = u32::from_le_bytes([
            bytes[body_end],
            bytes[body_end + 1],
            bytes[body_end + 2],
            bytes[body_end + 3],
        ]);
        if compute_crc32(&bytes[offset..body_end]) != stored_crc {
            return Err(HostError::Corrupted(format!(
                "checksum mismatch in frame at offset {offset}"
            )));
        }

        let key_start = offset + FRAME_HEADER_SIZE;
        let key = std::str::from_utf8(&bytes[key_start..key_start + key_len])
            .map_err(|_| {
                HostError::Corrupted(format!("non-UTF-8 key in frame at offset {offset}"))
            })?
            .to_string();

        match op {
            OP_PUT => {
                let value = bytes[key_start + key_len..body_end].to_vec();
                if entries.insert(key, value).is_some() {
                    stale += 1;
                }
            }
            OP_REMOVE => {
                if entries.remove(&key).is_some() {
                    stale += 2;
                } else {
                    stale += 1;
                }
            }
            other => {
                return Err(HostError::Corrupted(format!(
                    "unknown frame op {other} at offset {offset}"
                )));
            }
        }

        offset = frame_end;
    }

    Ok((entries, stale, offset))
}

/// Computes the IEEE CRC32 of `data`.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        crc = CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn journal_create_new() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shelf.journal");

        let host = FileHost::open(&path).unwrap();
        assert!(host.is_empty());
        assert!(path.exists());
        assert_eq!(fs::metadata(&path).unwrap().len(), FILE_HEADER_SIZE as u64);
    }

    #[test]
    fn journal_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shelf.journal");

        {
            let host = FileHost::open(&path).unwrap();
            host.update("a", Some(b"1")).unwrap();
            host.update("b", Some(b"2")).unwrap();
            host.update("a", Some(b"3")).unwrap();
            host.update("b", None).unwrap();
            host.flush().unwrap();
        }

        let host = FileHost::open(&path).unwrap();
        assert_eq!(host.get("a").unwrap(), Some(b"3".to_vec()));
        assert!(host.get("b").unwrap().is_none());
        assert_eq!(host.len(), 1);
        assert_eq!(host.stale_frames(), 3);
    }

    #[test]
    fn journal_is_locked_while_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shelf.journal");

        let _host = FileHost::open(&path).unwrap();
        let second = FileHost::open(&path);
        assert!(matches!(second, Err(HostError::Locked { .. })));
    }

    #[test]
    fn journal_torn_tail_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shelf.journal");

        {
            let host = FileHost::open(&path).unwrap();
            host.update("kept", Some(b"yes")).unwrap();
            host.flush().unwrap();
        }

        let full_len = fs::metadata(&path).unwrap().len();
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            let frame = encode_frame("torn", Some(b"partial"));
            file.write_all(&frame[..frame.len() - 3]).unwrap();
        }

        let host = FileHost::open(&path).unwrap();
        assert_eq!(host.get("kept").unwrap(), Some(b"yes".to_vec()));
        assert!(host.get("torn").unwrap().is_none());
        assert_eq!(fs::metadata(&path).unwrap().len(), full_len);
    }

    #[test]
    fn journal_checksum_mismatch_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shelf.journal");

        {
            let host = FileHost::open(&path).unwrap();
            host.update("key", Some(b"value")).unwrap();
            host.flush().unwrap();
        }

        let mut bytes = fs::read(&path).unwrap();
        let value_pos = bytes.len() - CRC_SIZE - 1;
        bytes[value_pos] ^= 0xFF;
        fs::write(&path, &bytes).unwrap();

        let result = FileHost::open(&path);
        assert!(matches!(result, Err(HostError::Corrupted(_))));
    }

    #[test]
    fn journal_compact_drops_stale_frames() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shelf.journal");

        let host = FileHost::open(&path).unwrap();
        for i in 0..10u8 {
            host.update("counter", Some(&[i])).unwrap();
        }
        host.update("gone", Some(b"x")).unwrap();
        host.update("gone", None).unwrap();
        let before = fs::metadata(&path).unwrap().len();

        host.compact().unwrap();
        assert_eq!(host.stale_frames(), 0);
        assert!(fs::metadata(&path).unwrap().len() < before);

        host.update("after", Some(b"compact")).unwrap();
        host.flush().unwrap();
        drop(host);

        let host = FileHost::open(&path).unwrap();
        assert_eq!(host.get("counter").unwrap(), Some(vec![9]));
        assert_eq!(host.get("after").unwrap(), Some(b"compact".to_vec()));
        assert!(host.get("gone").unwrap().is_none());
        assert_eq!(host.stale_frames(), 0);
    }

    #[test]
    fn journal_open_with_create_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("dirs").join("shelf.journal");

        let host = FileHost::open_with_create_dirs(&path).unwrap();
        host.update("k", Some(b"v")).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }
}
