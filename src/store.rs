//! Filesystem snapshot store with content-based deduplication.
//!
//! Each entity directory holds write-once snapshot files named
//! `<capture-stamp>_<fingerprint>.jsonl`. A snapshot is only written when
//! no file in the directory already carries its fingerprint.
//!
//! Publishing is exclusive and atomic: contents are written to a temporary
//! file in the target directory, synced, then hard-linked into place under
//! the final name, which fails if that name already exists. Readers never
//! see a partial snapshot, and of two writers racing for the same name
//! exactly one wins. The loser gets [`WriteOutcome::AlreadyExists`], which
//! callers treat as a duplicate.

use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tempfile::NamedTempFile;

use harvest_core::fingerprint::Fingerprint;
use harvest_core::layout::{is_safe_segment, is_snapshot_of, snapshot_file_name, EMPTY_MARKER, SNAPSHOT_EXT};
use harvest_core::record::Record;

/// Contents of the [`EMPTY_MARKER`] file.
const EMPTY_MARKER_BODY: &[u8] = b"no_comments";

/// Result of an exclusive snapshot write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written(PathBuf),
    /// The exact file name was already taken (same fingerprint, same second).
    AlreadyExists(PathBuf),
}

/// Result of a check-then-write store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOutcome {
    Written(PathBuf),
    /// A snapshot with this fingerprint was already on disk.
    Duplicate(PathBuf),
    /// The dedup check passed but another writer published the same name first.
    Raced(PathBuf),
}

/// Find an existing snapshot carrying `fingerprint` in `dir`.
///
/// Only the directory itself is listed. If several files match, the
/// lexicographically last name is returned. A missing directory means
/// not found.
pub fn has_fingerprint(dir: &Path, fingerprint: &Fingerprint) -> Result<Option<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list {}", dir.display()));
        }
    };

    let mut best: Option<String> = None;
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_snapshot_of(&name, fingerprint) {
            continue;
        }
        if best.as_deref().map_or(true, |b| name.as_str() > b) {
            best = Some(name);
        }
    }
    Ok(best.map(|name| dir.join(name)))
}

/// Exclusively publish `payload` as `<stamp>_<fingerprint>.jsonl` in `dir`.
///
/// Creates `dir` and its parents as needed.
pub fn write_snapshot(
    dir: &Path,
    fingerprint: &Fingerprint,
    stamp: &str,
    payload: &[u8],
) -> Result<WriteOutcome> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let final_path = dir.join(snapshot_file_name(stamp, fingerprint));

    let tmp = staged(dir, payload)?;
    match tmp.persist_noclobber(&final_path) {
        Ok(_) => Ok(WriteOutcome::Written(final_path)),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => {
            Ok(WriteOutcome::AlreadyExists(final_path))
        }
        Err(e) => Err(e.error).with_context(|| format!("Failed to publish {}", final_path.display())),
    }
}

/// Write a snapshot unless one with the same fingerprint already exists.
pub fn store_snapshot(
    dir: &Path,
    fingerprint: &Fingerprint,
    stamp: &str,
    payload: &[u8],
) -> Result<StoreOutcome> {
    if let Some(existing) = has_fingerprint(dir, fingerprint)? {
        return Ok(StoreOutcome::Duplicate(existing));
    }
    Ok(match write_snapshot(dir, fingerprint, stamp, payload)? {
        WriteOutcome::Written(path) => StoreOutcome::Written(path),
        WriteOutcome::AlreadyExists(path) => StoreOutcome::Raced(path),
    })
}

/// Record that a fetch for this entity returned nothing.
///
/// Replaces any previous marker atomically, so repeated empty fetches are
/// idempotent.
pub fn write_empty_marker(dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    let marker = dir.join(EMPTY_MARKER);
    staged(dir, EMPTY_MARKER_BODY)?
        .persist(&marker)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write {}", marker.display()))?;
    Ok(marker)
}

/// Write `payload` to a synced temp file inside `dir`. The temp name never
/// ends in the snapshot extension, so dedup scans ignore it.
fn staged(dir: &Path, payload: &[u8]) -> Result<NamedTempFile> {
    let mut tmp = tempfile::Builder::new()
        .prefix(".snapshot-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("Failed to stage a file in {}", dir.display()))?;
    tmp.write_all(payload)?;
    tmp.as_file().sync_all()?;
    Ok(tmp)
}

/// Every snapshot file in `dir`, sorted by name (capture order).
pub fn list_snapshots(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to list {}", dir.display())),
    };
    let mut out = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_file()
            && path.extension().and_then(|e| e.to_str()) == Some(SNAPSHOT_EXT)
        {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// Serialize records as JSON lines: one compact object per line.
pub fn to_jsonl(records: &[Record]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for record in records {
        buf.extend_from_slice(record.to_json_line()?.as_bytes());
        buf.push(b'\n');
    }
    Ok(buf)
}

/// Identity of a stored submission, read back from its snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionSnapshot {
    pub path: PathBuf,
    pub id: String,
    pub name: String,
    pub created_at: i64,
    /// File stem: `<capture-stamp>_<fingerprint>`. Sorts by capture time.
    pub capture: String,
}

/// Read the first line of a submission snapshot.
pub fn read_submission_snapshot(path: &Path) -> Result<SubmissionSnapshot> {
    let file = fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut line = String::new();
    BufReader::new(file).read_line(&mut line)?;
    let record = Record::from_slice(line.trim().as_bytes())
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let id = record.str_field("id").to_string();
    if !is_safe_segment(&id) {
        bail!("snapshot without a usable id: {}", path.display());
    }
    let capture = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    Ok(SubmissionSnapshot {
        path: path.to_path_buf(),
        name: record.str_field("name").to_string(),
        created_at: record.i64_field("created_utc"),
        id,
        capture,
    })
}
