//! Compact command implementation.

use super::{format_size, open_host};
use crate::error::CliResult;
use std::path::Path;

/// Compaction statistics.
#[derive(Debug)]
pub struct CompactStats {
    /// Live entries kept.
    pub live_entries: usize,
    /// Stale frames dropped.
    pub stale_frames: u64,
    /// Bytes before compaction.
    pub bytes_before: u64,
    /// Bytes after compaction.
    pub bytes_after: u64,
}

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> CliResult<()> {
    println!("Compacting journal at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let stats = compact(path, dry_run)?;

    println!("Compaction:");
    println!("  Live entries:  {}", stats.live_entries);
    println!("  Stale frames:  {}", stats.stale_frames);
    println!("  Size before:   {}", format_size(stats.bytes_before));
    if dry_run {
        return Ok(());
    }
    println!("  Size after:    {}", format_size(stats.bytes_after));
    println!(
        "  Space saved:   {}",
        format_size(stats.bytes_before.saturating_sub(stats.bytes_after))
    );

    Ok(())
}

/// Compacts the journal at `path` unless `dry_run` is set.
pub fn compact(path: &Path, dry_run: bool) -> CliResult<CompactStats> {
    let host = open_host(path)?;
    let bytes_before = file_size(path);
    let stale_frames = host.stale_frames();

    if !dry_run && stale_frames > 0 {
        host.compact()?;
        tracing::info!(path = %path.display(), stale_frames, "compacted journal");
    }

    Ok(CompactStats {
        live_entries: host.len(),
        stale_frames,
        bytes_before,
        bytes_after: file_size(path),
    })
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}
