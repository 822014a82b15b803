//! Offline import of JSONL archive dumps.
//!
//! Dump files hold one submission or comment object per line, usually for
//! many scopes at once. Import routes every object through the same
//! canonicalizer, layout, and dedup store as live harvesting, so imported
//! and harvested snapshots deduplicate against each other.
//!
//! Posts files are read first: they establish each submission's creation
//! time, which the comment threads need to resolve their directory.
//! Comment rows are grouped by submission and stored as one thread
//! snapshot per group.

use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use tracing::{info, warn};

use harvest_core::canonical::{canonicalize_submission, canonicalize_thread};
use harvest_core::fingerprint::fingerprint;
use harvest_core::layout::{
    capture_stamp, capture_stamp_from_unix, is_safe_segment, normalize_scope, Layout,
};
use harvest_core::models::EntityKind;
use harvest_core::record::Record;

use crate::config::ImportConfig;
use crate::harvest::Clock;
use crate::store::{self, StoreOutcome};
use crate::thread;

/// `(scope, submission id)`
type PostKey = (String, String);

/// Totals for one import run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub post_files: u64,
    pub comment_files: u64,
    pub posts_scanned: u64,
    pub posts_written: u64,
    pub comments_scanned: u64,
    pub threads_written: u64,
    pub threads_skipped: u64,
    pub errors: u64,
    /// Distinct submissions seen in posts files.
    pub posts_indexed: u64,
}

/// Posts and comments files, classified by file name.
#[derive(Debug, Default)]
pub struct DumpFiles {
    pub posts: Vec<PathBuf>,
    pub comments: Vec<PathBuf>,
}

/// Split `paths` into posts and comments files using the configured globs.
/// Files matching neither are ignored.
pub fn classify(config: &ImportConfig, paths: &[PathBuf]) -> Result<DumpFiles> {
    let posts_set = build_globset(&config.post_globs)?;
    let comments_set = build_globset(&config.comment_globs)?;
    let mut files = DumpFiles::default();
    for path in paths {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if posts_set.is_match(&name) {
            files.posts.push(path.clone());
        } else if comments_set.is_match(&name) {
            files.comments.push(path.clone());
        } else {
            warn!(path = %path.display(), "not a posts or comments dump, ignoring");
        }
    }
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

/// Import dump files into the layout.
pub fn run_import(
    config: &ImportConfig,
    layout: &Layout,
    paths: &[PathBuf],
    clock: &dyn Clock,
) -> Result<ImportSummary> {
    let files = classify(config, paths)?;
    if files.posts.is_empty() {
        bail!("no posts dump files provided (expected names matching {:?})", config.post_globs);
    }

    let mut importer = Importer {
        layout,
        clock,
        report_every: config.report_every,
        post_index: HashMap::new(),
        summary: ImportSummary::default(),
    };
    for path in &files.posts {
        importer.import_posts(path)?;
        importer.summary.post_files += 1;
    }
    for path in &files.comments {
        importer.import_comments(path)?;
        importer.summary.comment_files += 1;
    }
    importer.summary.posts_indexed = importer.post_index.len() as u64;
    info!(posts_index = importer.post_index.len(), "import done");
    Ok(importer.summary)
}

struct Importer<'a> {
    layout: &'a Layout,
    clock: &'a dyn Clock,
    report_every: u64,
    /// Earliest creation time seen per submission.
    post_index: HashMap<PostKey, i64>,
    summary: ImportSummary,
}

impl Importer<'_> {
    fn import_posts(&mut self, path: &Path) -> Result<()> {
        let mut scanned = 0u64;
        let mut wrote = 0u64;
        for_each_object(path, |record| {
            scanned += 1;
            if self.report_every > 0 && scanned % self.report_every == 0 {
                info!(file = %path.display(), scanned, wrote, "posts progress");
            }
            let Some(record) = record else {
                return;
            };

            let mut scope = normalize_scope(record.str_field("subreddit"));
            if scope.is_empty() {
                scope = normalize_scope(record.str_field("subreddit_name_prefixed"));
            }
            let id = record.str_field("id").to_string();
            if scope.is_empty() || id.is_empty() || record.get("created_utc").is_none() {
                return;
            }
            let created = record.i64_field("created_utc");
            if created <= 0 {
                return;
            }
            if !is_safe_segment(&id) {
                warn!(scope = %scope, id = %id, "post skipped: unusable id");
                self.summary.errors += 1;
                return;
            }

            let key = (scope.clone(), id.clone());
            let earliest = self.post_index.entry(key).or_insert(created);
            *earliest = (*earliest).min(created);

            let retrieved = retrieved_field(&record).unwrap_or_else(|| self.clock.now().timestamp());
            let stamp = capture_stamp_from_unix(retrieved)
                .or_else(|| capture_stamp_from_unix(created))
                .unwrap_or_else(|| capture_stamp(self.clock.now()));

            let dir = self.layout.resolve(EntityKind::Submissions, &scope, created, &id);
            let stored = fingerprint(&canonicalize_submission(&record))
                .map_err(anyhow::Error::from)
                .and_then(|fp| {
                    let payload = store::to_jsonl(std::slice::from_ref(&record))?;
                    store::store_snapshot(&dir, &fp, &stamp, &payload)
                });
            match stored {
                Ok(StoreOutcome::Written(_)) => wrote += 1,
                Ok(_) => {}
                Err(e) => {
                    warn!(scope = %scope, id = %id, error = %format!("{:#}", e), "post skipped");
                    self.summary.errors += 1;
                }
            }
        })?;
        self.summary.posts_scanned += scanned;
        self.summary.posts_written += wrote;
        info!(file = %path.display(), scanned, wrote, "posts done");
        Ok(())
    }

    fn import_comments(&mut self, path: &Path) -> Result<()> {
        let mut groups: BTreeMap<PostKey, Vec<Record>> = BTreeMap::new();
        let mut scanned = 0u64;
        let report_every = self.report_every;
        for_each_object(path, |record| {
            scanned += 1;
            if report_every > 0 && scanned % report_every == 0 {
                info!(file = %path.display(), scanned, threads = groups.len(), "comments progress");
            }
            let Some(record) = record else {
                return;
            };
            let scope = normalize_scope(record.str_field("subreddit"));
            if scope.is_empty() {
                return;
            }
            let Some(post_id) = record.str_field("link_id").strip_prefix("t3_") else {
                return;
            };
            if !is_safe_segment(post_id) {
                return;
            }
            let key = (scope, post_id.to_string());
            groups.entry(key).or_default().push(record);
        })?;
        self.summary.comments_scanned += scanned;

        let mut wrote = 0u64;
        let mut skipped = 0u64;
        for ((scope, post_id), rows) in groups {
            let Some(&created) = self.post_index.get(&(scope.clone(), post_id.clone())) else {
                warn!(scope = %scope, post = %post_id, reason = "no_post_created", "comments skipped");
                skipped += 1;
                continue;
            };

            let captured = rows
                .iter()
                .filter_map(retrieved_at)
                .max()
                .unwrap_or_else(|| self.clock.now().timestamp());
            let stamp = capture_stamp_from_unix(captured)
                .or_else(|| capture_stamp_from_unix(created))
                .unwrap_or_else(|| capture_stamp(self.clock.now()));

            let mut rows = thread::dedup_by_id(rows);
            thread::sort_rows(&mut rows);

            let dir = self.layout.resolve(EntityKind::Comments, &scope, created, &post_id);
            let stored = fingerprint(&canonicalize_thread(&rows))
                .map_err(anyhow::Error::from)
                .and_then(|fp| {
                    let payload = store::to_jsonl(&rows)?;
                    store::store_snapshot(&dir, &fp, &stamp, &payload)
                });
            match stored {
                Ok(StoreOutcome::Written(_)) => wrote += 1,
                Ok(_) => skipped += 1,
                Err(e) => {
                    warn!(scope = %scope, post = %post_id, error = %format!("{:#}", e), "thread skipped");
                    self.summary.errors += 1;
                }
            }
        }
        self.summary.threads_written += wrote;
        self.summary.threads_skipped += skipped;
        info!(file = %path.display(), scanned, threads_wrote = wrote, threads_skipped = skipped, "comments done");
        Ok(())
    }
}

/// `retrieved_utc`, else `retrieved_on`, when present. Unparseable values
/// read as 0, which the stamp fallback turns into the creation time.
fn retrieved_field(record: &Record) -> Option<i64> {
    ["retrieved_utc", "retrieved_on"]
        .into_iter()
        .find(|key| record.get(key).map_or(false, |v| !v.is_null()))
        .map(|key| record.i64_field(key))
}

/// Like [`retrieved_field`], keeping only usable (positive) times.
fn retrieved_at(record: &Record) -> Option<i64> {
    retrieved_field(record).filter(|&t| t > 0)
}

/// Call `f` for every line of a JSONL file: `Some(record)` for lines that
/// parse as a JSON object, `None` for blank or malformed lines. Invalid
/// UTF-8 is replaced rather than rejected.
fn for_each_object(path: &Path, mut f: impl FnMut(Option<Record>)) -> Result<()> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader
            .read_until(b'\n', &mut buf)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        let line = line.trim();
        if line.is_empty() {
            f(None);
            continue;
        }
        f(Record::from_slice(line.as_bytes()).ok());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;
    use walkdir::WalkDir;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    /// 2023-11-22 00:00:00 UTC
    const NOW: i64 = 1_700_611_200;

    /// Nested so that an escaping path would still land inside the TempDir.
    fn store_root(tmp: &TempDir) -> PathBuf {
        tmp.path().join("a").join("b").join("c").join("store")
    }

    fn write_lines(path: &Path, rows: &[serde_json::Value]) {
        let body: String = rows.iter().map(|r| format!("{}\n", r)).collect();
        fs::write(path, body).unwrap();
    }

    fn import(
        tmp: &TempDir,
        posts: &[serde_json::Value],
        comments: &[serde_json::Value],
    ) -> ImportSummary {
        let posts_path = tmp.path().join("rust_posts.jsonl");
        let comments_path = tmp.path().join("rust_comments.jsonl");
        write_lines(&posts_path, posts);
        write_lines(&comments_path, comments);
        let clock = FixedClock(Utc.timestamp_opt(NOW, 0).unwrap());
        run_import(
            &ImportConfig::default(),
            &Layout::new(store_root(tmp), "r_"),
            &[posts_path, comments_path],
            &clock,
        )
        .unwrap()
    }

    #[test]
    fn classify_by_file_name() {
        let config = ImportConfig::default();
        let files = classify(
            &config,
            &[
                PathBuf::from("/dumps/rust_posts.jsonl"),
                PathBuf::from("/dumps/rust_comments.jsonl"),
                PathBuf::from("/dumps/notes.txt"),
            ],
        )
        .unwrap();
        assert_eq!(files.posts, vec![PathBuf::from("/dumps/rust_posts.jsonl")]);
        assert_eq!(files.comments, vec![PathBuf::from("/dumps/rust_comments.jsonl")]);
    }

    #[test]
    fn retrieved_prefers_retrieved_utc() {
        let r = Record::from_value(json!({ "retrieved_utc": 20, "retrieved_on": 10 })).unwrap();
        assert_eq!(retrieved_at(&r), Some(20));
        let r = Record::from_value(json!({ "retrieved_on": 10 })).unwrap();
        assert_eq!(retrieved_at(&r), Some(10));
        let r = Record::from_value(json!({ "retrieved_utc": null })).unwrap();
        assert_eq!(retrieved_at(&r), None);
    }

    #[test]
    fn unusable_retrieved_times_are_dropped() {
        let r = Record::from_value(json!({ "retrieved_utc": "soon" })).unwrap();
        assert_eq!(retrieved_field(&r), Some(0));
        assert_eq!(retrieved_at(&r), None);
        let r = Record::from_value(json!({ "retrieved_on": -5 })).unwrap();
        assert_eq!(retrieved_at(&r), None);
    }

    #[test]
    fn path_like_ids_never_leave_the_root() {
        let tmp = TempDir::new().unwrap();
        let summary = import(
            &tmp,
            &[
                json!({ "id": "ok", "subreddit": "rust", "created_utc": 1700000000 }),
                json!({ "id": "../../../escaped", "subreddit": "rust", "created_utc": 1700000000 }),
                json!({ "id": "x", "subreddit": "../escaped", "created_utc": 1700000000 }),
                json!({ "id": "p1", "subreddit": "a/../../../escaped", "created_utc": 1700000000 }),
                json!({ "id": "..", "subreddit": "rust", "created_utc": 1700000000 }),
            ],
            &[
                json!({ "id": "c1", "subreddit": "rust", "link_id": "t3_../../../escaped", "created_utc": 1700000001 }),
                json!({ "id": "c2", "subreddit": "..", "link_id": "t3_ok", "created_utc": 1700000001 }),
            ],
        );
        assert_eq!(summary.posts_written, 1);
        assert_eq!(summary.errors, 2);
        assert_eq!(summary.threads_written, 0);

        let store = store_root(&tmp);
        for entry in WalkDir::new(tmp.path()) {
            let entry = entry.unwrap();
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_dump = path.parent() == Some(tmp.path())
                && path.extension().and_then(|e| e.to_str()) == Some("jsonl");
            assert!(is_dump || path.starts_with(&store), "wrote outside root: {}", path.display());
        }
        assert!(!tmp.path().join("a").join("escaped").exists());
    }

    #[test]
    fn unusable_retrieved_time_falls_back_to_now() {
        let tmp = TempDir::new().unwrap();
        let summary = import(
            &tmp,
            &[json!({ "id": "p1", "subreddit": "rust", "created_utc": 1700000000 })],
            &[
                json!({ "id": "c1", "subreddit": "rust", "link_id": "t3_p1", "parent_id": "t3_p1",
                        "created_utc": 1700000050, "retrieved_on": "later" }),
                json!({ "id": "c2", "subreddit": "rust", "link_id": "t3_p1", "parent_id": "t3_p1",
                        "created_utc": 1700000060, "retrieved_utc": 0 }),
            ],
        );
        assert_eq!(summary.threads_written, 1);

        let dir = Layout::new(store_root(&tmp), "r_")
            .resolve(EntityKind::Comments, "rust", 1700000000, "p1");
        let snapshots = store::list_snapshots(&dir).unwrap();
        assert_eq!(snapshots.len(), 1);
        let name = snapshots[0].file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("20231122000000_"), "{}", name);
    }
}
