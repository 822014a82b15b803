//! Deterministic storage layout.
//!
//! Every snapshot of an entity lives in one directory derived from the
//! entity's immutable creation time and id:
//!
//! ```text
//! <root>/<prefix><scope>/<kind>/<YYYY>/<MMDD>/<HHMMSS>_<id>/
//!     20231115080000_<fingerprint>.jsonl
//!     20231116080000_<fingerprint>.jsonl
//!     EMPTY.txt
//! ```
//!
//! Fetch time only shows up in snapshot file names, never in directories,
//! so dedup checks scan one small directory regardless of corpus size.
//!
//! # Example
//!
//! ```rust
//! use harvest_core::layout::Layout;
//! use harvest_core::models::EntityKind;
//!
//! let layout = Layout::new("data", "r_");
//! let dir = layout.resolve(EntityKind::Submissions, "rust", 1700000000, "abc123");
//! assert!(dir.ends_with("r_rust/submissions/2023/1114/221320_abc123"));
//! ```

use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Utc};

use crate::fingerprint::Fingerprint;
use crate::models::EntityKind;

/// Extension of snapshot files.
pub const SNAPSHOT_EXT: &str = "jsonl";

/// Marker written when a fetch returned no sub-records.
pub const EMPTY_MARKER: &str = "EMPTY.txt";

/// Format of capture stamps in snapshot file names.
pub const CAPTURE_STAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Storage root plus the prefix prepended to scope directory names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
    scope_prefix: String,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>, scope_prefix: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            scope_prefix: scope_prefix.into(),
        }
    }

    /// `<root>/<prefix><scope>`
    pub fn scope_dir(&self, scope: &str) -> PathBuf {
        self.root.join(format!("{}{}", self.scope_prefix, scope))
    }

    /// `<root>/<prefix><scope>/<kind>`
    pub fn kind_dir(&self, kind: EntityKind, scope: &str) -> PathBuf {
        self.scope_dir(scope).join(kind.dir_name())
    }

    /// `<root>/<prefix><scope>/<kind>/<YYYY>/<MMDD>`, the parent of every
    /// entity directory created on `day`.
    pub fn day_dir(&self, kind: EntityKind, scope: &str, day: NaiveDate) -> PathBuf {
        self.kind_dir(kind, scope)
            .join(day.format("%Y").to_string())
            .join(day.format("%m%d").to_string())
    }

    /// Directory holding every snapshot of one entity.
    pub fn resolve(&self, kind: EntityKind, scope: &str, created_at: i64, id: &str) -> PathBuf {
        self.kind_dir(kind, scope).join(thread_rel(created_at, id))
    }
}

/// Split a creation time into `(YYYY, MMDD, HHMMSS)` in UTC.
///
/// Timestamps chrono cannot represent resolve to the epoch.
pub fn split_utc(created_at: i64) -> (String, String, String) {
    let t: DateTime<Utc> = DateTime::from_timestamp(created_at, 0).unwrap_or_default();
    (
        t.format("%Y").to_string(),
        t.format("%m%d").to_string(),
        t.format("%H%M%S").to_string(),
    )
}

/// `<YYYY>/<MMDD>/<HHMMSS>_<id>`
pub fn thread_rel(created_at: i64, id: &str) -> PathBuf {
    let (year, month_day, time) = split_utc(created_at);
    PathBuf::from(year)
        .join(month_day)
        .join(format!("{}_{}", time, id))
}

/// UTC capture stamp used as a snapshot file name prefix.
pub fn capture_stamp(at: DateTime<Utc>) -> String {
    at.format(CAPTURE_STAMP_FORMAT).to_string()
}

/// Capture stamp from a unix timestamp. Non-positive or out-of-range
/// values yield `None`.
pub fn capture_stamp_from_unix(ts: i64) -> Option<String> {
    if ts <= 0 {
        return None;
    }
    DateTime::from_timestamp(ts, 0).map(capture_stamp)
}

/// `<stamp>_<fingerprint>.jsonl`
pub fn snapshot_file_name(stamp: &str, fingerprint: &Fingerprint) -> String {
    format!("{}_{}.{}", stamp, fingerprint, SNAPSHOT_EXT)
}

/// Whether a file name looks like a snapshot carrying `fingerprint`.
pub fn is_snapshot_of(file_name: &str, fingerprint: &Fingerprint) -> bool {
    file_name.ends_with(&format!(".{}", SNAPSHOT_EXT))
        && file_name.contains(&format!("_{}", fingerprint))
}

/// Whether `s` can be used as a single path component under the root.
/// Rejects empty names, `.` and `..`, separators, and NUL.
pub fn is_safe_segment(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains(['/', '\\', '\0'])
}

/// Normalize a user- or dump-supplied scope name: trims whitespace and
/// strips a leading `r/` or `r_` (either case). Returns an empty string
/// when what remains is not a safe path segment.
pub fn normalize_scope(raw: &str) -> String {
    let s = raw.trim();
    let s = ["r/", "R/"]
        .iter()
        .find_map(|p| s.strip_prefix(p))
        .unwrap_or(s);
    let s = ["r_", "R_"]
        .iter()
        .find_map(|p| s.strip_prefix(p))
        .unwrap_or(s);
    let s = s.trim();
    if is_safe_segment(s) {
        s.to_string()
    } else {
        String::new()
    }
}
