//! Harvest driver.
//!
//! Two passes share the same layout and dedup engine:
//!
//! - **Submissions**: page through a scope's newest submissions until the
//!   listing runs dry, the cursor stops advancing, or a submission older
//!   than the cutoff appears. Each submission inside the window is
//!   fingerprinted and stored if novel.
//! - **Comments**: find the submissions already on disk inside the window,
//!   keep the latest capture of each, then fetch and store each comment
//!   thread.
//!
//! Processing is strictly sequential. A failure fetching the listing aborts
//! the run; a failure on one entity is reported and the run moves on.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use harvest_core::canonical::{canonicalize_submission, canonicalize_thread, CANONICAL_EPOCH};
use harvest_core::fingerprint::{fingerprint, Fingerprint};
use harvest_core::layout::{capture_stamp, Layout, SNAPSHOT_EXT};
use harvest_core::models::{Entity, EntityKind};
use harvest_core::record::Record;

use crate::progress::{HarvestEvent, HarvestProgressReporter, HarvestSummary, Outcome};
use crate::source::DataSource;
use crate::store::{self, StoreOutcome, SubmissionSnapshot};

/// Source of "now". Capture stamps and cutoffs read it; nothing else does.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The system wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Per-run settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub scope: String,
    /// Lookback window in days.
    pub days: u32,
    pub page_limit: u32,
    pub layout: Layout,
}

impl HarvestSettings {
    /// Oldest creation time still inside the window.
    pub fn cutoff(&self, now: DateTime<Utc>) -> i64 {
        (now - Duration::days(i64::from(self.days))).timestamp()
    }
}

/// Where the submissions pass is in its listing loop.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ListingState {
    Listing { after: Option<String> },
    Done,
}

pub struct Harvester<S: DataSource> {
    source: S,
    settings: HarvestSettings,
    progress: Box<dyn HarvestProgressReporter>,
    clock: Box<dyn Clock>,
}

impl<S: DataSource> Harvester<S> {
    pub fn new(
        source: S,
        settings: HarvestSettings,
        progress: Box<dyn HarvestProgressReporter>,
    ) -> Self {
        Self {
            source,
            settings,
            progress,
            clock: Box::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Box<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &HarvestSettings {
        &self.settings
    }

    /// Harvest the scope's newest submissions back to the cutoff.
    ///
    /// Precondition: the source lists submissions newest-first. Paging
    /// stops at the first submission older than the cutoff, so an
    /// out-of-order source would truncate the window.
    pub async fn harvest_submissions(&self) -> Result<HarvestSummary> {
        let kind = EntityKind::Submissions;
        let scope = self.settings.scope.as_str();
        let cutoff = self.settings.cutoff(self.clock.now());
        let mut summary = HarvestSummary::default();
        info!(
            scope,
            days = self.settings.days,
            cutoff,
            epoch = CANONICAL_EPOCH,
            "harvesting submissions"
        );

        let mut state = ListingState::Listing { after: None };
        while let ListingState::Listing { after } = state {
            summary.pages += 1;
            let page = summary.pages;
            let records = self
                .source
                .list_new(scope, self.settings.page_limit, after.as_deref())
                .await
                .with_context(|| format!("listing r/{} page {}", scope, page))?;

            if records.is_empty() {
                self.progress.report(HarvestEvent::Page {
                    scope: scope.to_string(),
                    kind,
                    page,
                    written: 0,
                    after: None,
                    stop: true,
                });
                break;
            }

            let stamp = capture_stamp(self.clock.now());
            let mut stop = false;
            let mut next_after: Option<String> = None;
            let written_before = summary.written;

            for record in records {
                let label = match record.str_field("id") {
                    "" => "<unknown>".to_string(),
                    id => id.to_string(),
                };
                let name = record.str_field("name").to_string();
                let entity = match Entity::from_record(record) {
                    Ok(entity) => entity,
                    Err(e) => {
                        // Still advance the cursor past the bad record.
                        if !name.is_empty() {
                            next_after = Some(name);
                        }
                        summary.scanned += 1;
                        self.report(kind, &label, Outcome::Error, format!("parse_error: {}", e));
                        summary.record(Outcome::Error);
                        continue;
                    }
                };
                next_after = Some(entity.name.clone());
                if entity.created_at < cutoff {
                    stop = true;
                    break;
                }
                summary.scanned += 1;

                let outcome = match self.store_submission(&entity, &stamp) {
                    Ok((outcome, fp)) => self.report_store(kind, &entity.id, &outcome, &fp),
                    Err(e) => {
                        self.report(kind, &entity.id, Outcome::Error, format!("{:#}", e));
                        Outcome::Error
                    }
                };
                summary.record(outcome);
            }

            self.progress.report(HarvestEvent::Page {
                scope: scope.to_string(),
                kind,
                page,
                written: summary.written - written_before,
                after: next_after.clone(),
                stop,
            });

            state = match next_after {
                Some(next) if !stop && after.as_deref() != Some(next.as_str()) => {
                    ListingState::Listing { after: Some(next) }
                }
                _ => ListingState::Done,
            };
        }

        self.finish(kind, &summary);
        Ok(summary)
    }

    fn store_submission(&self, entity: &Entity, stamp: &str) -> Result<(StoreOutcome, Fingerprint)> {
        let dir = self.settings.layout.resolve(
            EntityKind::Submissions,
            &self.settings.scope,
            entity.created_at,
            &entity.id,
        );
        let fp = fingerprint(&canonicalize_submission(&entity.raw))?;
        let payload = store::to_jsonl(std::slice::from_ref(&entity.raw))?;
        let outcome = store::store_snapshot(&dir, &fp, stamp, &payload)?;
        Ok((outcome, fp))
    }

    /// Fetch and store the comment thread of every submission on disk
    /// inside the window.
    pub async fn harvest_comments(&self) -> Result<HarvestSummary> {
        let kind = EntityKind::Comments;
        let scope = self.settings.scope.as_str();
        let now = self.clock.now();
        let cutoff = self.settings.cutoff(now);
        let mut summary = HarvestSummary::default();

        let targets = discover_submissions(
            &self.settings.layout,
            scope,
            now,
            self.settings.days,
            cutoff,
        );
        info!(
            scope,
            days = self.settings.days,
            posts = targets.len(),
            epoch = CANONICAL_EPOCH,
            "harvesting comments"
        );
        self.progress.report(HarvestEvent::Discovered {
            scope: scope.to_string(),
            kind,
            total: targets.len() as u64,
        });

        for snapshot in &targets {
            summary.scanned += 1;
            let dir = self.settings.layout.resolve(
                kind,
                scope,
                snapshot.created_at,
                &snapshot.id,
            );

            let rows = match self.source.fetch_comments(&snapshot.id).await {
                Ok(rows) => rows,
                Err(e) => {
                    self.report(kind, &snapshot.id, Outcome::Error, format!("fetch_error: {}", e));
                    summary.record(Outcome::Error);
                    continue;
                }
            };

            let outcome = if rows.is_empty() {
                match store::write_empty_marker(&dir) {
                    Ok(_) => {
                        self.report(kind, &snapshot.id, Outcome::Empty, "no_comments".to_string());
                        Outcome::Empty
                    }
                    Err(e) => {
                        self.report(kind, &snapshot.id, Outcome::Error, format!("{:#}", e));
                        Outcome::Error
                    }
                }
            } else {
                match self.store_thread(&dir, &rows) {
                    Ok((outcome, fp)) => {
                        let outcome = self.report_store(kind, &snapshot.id, &outcome, &fp);
                        debug!(id = %snapshot.id, rows = rows.len(), "thread processed");
                        outcome
                    }
                    Err(e) => {
                        self.report(kind, &snapshot.id, Outcome::Error, format!("{:#}", e));
                        Outcome::Error
                    }
                }
            };
            summary.record(outcome);
        }

        self.finish(kind, &summary);
        Ok(summary)
    }

    fn store_thread(
        &self,
        dir: &std::path::Path,
        rows: &[Record],
    ) -> Result<(StoreOutcome, Fingerprint)> {
        let fp = fingerprint(&canonicalize_thread(rows))?;
        let payload = store::to_jsonl(rows)?;
        let stamp = capture_stamp(self.clock.now());
        let outcome = store::store_snapshot(dir, &fp, &stamp, &payload)?;
        Ok((outcome, fp))
    }

    fn report_store(
        &self,
        kind: EntityKind,
        id: &str,
        outcome: &StoreOutcome,
        fp: &Fingerprint,
    ) -> Outcome {
        let (result, detail) = match outcome {
            StoreOutcome::Written(_) => (Outcome::Write, format!("hash={}", fp.short())),
            StoreOutcome::Duplicate(_) => (Outcome::Skip, format!("hash={}", fp.short())),
            StoreOutcome::Raced(_) => (Outcome::Raced, "exists".to_string()),
        };
        self.report(kind, id, result, detail);
        result
    }

    fn report(&self, kind: EntityKind, id: &str, outcome: Outcome, detail: String) {
        if outcome == Outcome::Error {
            warn!(scope = %self.settings.scope, %kind, id, error = %detail, "entity skipped");
        }
        self.progress.report(HarvestEvent::Entity {
            scope: self.settings.scope.clone(),
            kind,
            id: id.to_string(),
            outcome,
            detail,
        });
    }

    fn finish(&self, kind: EntityKind, summary: &HarvestSummary) {
        info!(
            scope = %self.settings.scope,
            %kind,
            pages = summary.pages,
            scanned = summary.scanned,
            written = summary.written,
            skipped = summary.skipped,
            empty = summary.empty,
            errors = summary.errors,
            "harvest done"
        );
        self.progress.report(HarvestEvent::Done {
            scope: self.settings.scope.clone(),
            kind,
            summary: summary.clone(),
        });
    }
}

/// Submissions stored under the day directories covering the window, one
/// per id (the latest capture), sorted by id.
///
/// Unreadable snapshots are skipped, as are submissions created before
/// `cutoff`.
pub fn discover_submissions(
    layout: &Layout,
    scope: &str,
    now: DateTime<Utc>,
    days: u32,
    cutoff: i64,
) -> Vec<SubmissionSnapshot> {
    let mut paths = Vec::new();
    for i in 0..=i64::from(days) {
        let day = (now - Duration::days(i)).date_naive();
        let day_dir = layout.day_dir(EntityKind::Submissions, scope, day);
        if !day_dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&day_dir).min_depth(2).max_depth(2) {
            match entry {
                Ok(entry)
                    if entry.file_type().is_file()
                        && entry.path().extension().and_then(|e| e.to_str())
                            == Some(SNAPSHOT_EXT) =>
                {
                    paths.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => debug!(error = %e, "skipping unreadable entry"),
            }
        }
    }
    paths.sort();

    let mut by_id: BTreeMap<String, SubmissionSnapshot> = BTreeMap::new();
    for path in paths {
        let snapshot = match store::read_submission_snapshot(&path) {
            Ok(s) => s,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "skipping unreadable snapshot");
                continue;
            }
        };
        if snapshot.created_at < cutoff {
            continue;
        }
        match by_id.get(&snapshot.id) {
            Some(existing) if existing.capture >= snapshot.capture => {}
            _ => {
                by_id.insert(snapshot.id.clone(), snapshot);
            }
        }
    }
    by_id.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_subtracts_days() {
        let settings = HarvestSettings {
            scope: "rust".to_string(),
            days: 7,
            page_limit: 100,
            layout: Layout::new("root", "r_"),
        };
        let now = Utc.with_ymd_and_hms(2023, 11, 21, 22, 13, 20).unwrap();
        assert_eq!(settings.cutoff(now), 1700000000);
    }
}
