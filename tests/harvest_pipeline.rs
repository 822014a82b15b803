use std::collections::HashMap;
use std::fs;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use tempfile::TempDir;

use thread_harvest::error::{SourceError, SourceResult};
use thread_harvest::harvest::{discover_submissions, Clock, HarvestSettings, Harvester};
use thread_harvest::harvest_core::layout::{Layout, EMPTY_MARKER};
use thread_harvest::harvest_core::models::EntityKind;
use thread_harvest::harvest_core::record::Record;
use thread_harvest::progress::NoProgress;
use thread_harvest::source::DataSource;
use thread_harvest::store;

/// 2023-11-21 22:13:20 UTC; with a 7 day window the cutoff is 1700000000.
const NOW: i64 = 1_700_604_800;

struct FixedClock(DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Serves fixed listing pages (chained by the last fullname of each page)
/// and fixed comment rows.
#[derive(Default)]
struct MemorySource {
    pages: Vec<Vec<Value>>,
    comments: HashMap<String, Result<Vec<Value>, String>>,
    listing_fails: bool,
    /// Serve the first page for every cursor.
    ignores_cursor: bool,
}

impl MemorySource {
    fn with_pages(pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages,
            ..Default::default()
        }
    }

    fn comments(mut self, id: &str, rows: Vec<Value>) -> Self {
        self.comments.insert(id.to_string(), Ok(rows));
        self
    }

    fn failing_comments(mut self, id: &str) -> Self {
        self.comments.insert(id.to_string(), Err("connection reset".to_string()));
        self
    }
}

fn records(values: &[Value]) -> Vec<Record> {
    values
        .iter()
        .filter_map(|v| Record::from_value(v.clone()))
        .collect()
}

#[async_trait]
impl DataSource for MemorySource {
    async fn list_new(
        &self,
        _scope: &str,
        _limit: u32,
        after: Option<&str>,
    ) -> SourceResult<Vec<Record>> {
        if self.listing_fails {
            return Err(SourceError::Network("listing unavailable".to_string()));
        }
        let index = match after {
            None => 0,
            Some(_) if self.ignores_cursor => 0,
            Some(after) => match self
                .pages
                .iter()
                .position(|p| p.last().and_then(|r| r["name"].as_str()) == Some(after))
            {
                Some(i) => i + 1,
                None => return Ok(vec![]),
            },
        };
        Ok(self.pages.get(index).map(|p| records(p)).unwrap_or_default())
    }

    async fn fetch_comments(&self, submission_id: &str) -> SourceResult<Vec<Record>> {
        match self.comments.get(submission_id) {
            Some(Ok(rows)) => Ok(records(rows)),
            Some(Err(msg)) => Err(SourceError::Network(msg.clone())),
            None => Ok(vec![]),
        }
    }
}

fn post(id: &str, created: i64, selftext: &str, score: i64) -> Value {
    json!({
        "id": id,
        "name": format!("t3_{}", id),
        "created_utc": created as f64,
        "subreddit": "rust",
        "author": "ferris",
        "title": format!("post {}", id),
        "selftext": selftext,
        "edited": false,
        "score": score,
        "num_comments": 0
    })
}

fn comment(id: &str, parent: &str, created: i64, body: &str) -> Value {
    json!({
        "id": id,
        "name": format!("t1_{}", id),
        "parent_id": parent,
        "link_id": "t3_a",
        "created_utc": created as f64,
        "author": "crab",
        "body": body,
        "score": 3
    })
}

fn harvester(tmp: &TempDir, source: MemorySource, at: i64) -> Harvester<MemorySource> {
    let settings = HarvestSettings {
        scope: "rust".to_string(),
        days: 7,
        page_limit: 100,
        layout: Layout::new(tmp.path(), "r_"),
    };
    let now = Utc.timestamp_opt(at, 0).unwrap();
    Harvester::new(source, settings, Box::new(NoProgress)).with_clock(Box::new(FixedClock(now)))
}

fn snapshots(tmp: &TempDir, kind: EntityKind, created: i64, id: &str) -> Vec<std::path::PathBuf> {
    let dir = Layout::new(tmp.path(), "r_").resolve(kind, "rust", created, id);
    store::list_snapshots(&dir).unwrap()
}

#[tokio::test]
async fn second_run_over_same_data_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let pages = vec![vec![
        post("a", 1_700_600_000, "hello", 1),
        post("b", 1_700_500_000, "world", 1),
    ]];

    let first = harvester(&tmp, MemorySource::with_pages(pages.clone()), NOW)
        .harvest_submissions()
        .await
        .unwrap();
    assert_eq!(first.written, 2);
    assert_eq!(first.skipped, 0);

    let second = harvester(&tmp, MemorySource::with_pages(pages), NOW + 60)
        .harvest_submissions()
        .await
        .unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(snapshots(&tmp, EntityKind::Submissions, 1_700_600_000, "a").len(), 1);
}

#[tokio::test]
async fn follows_cursor_across_pages() {
    let tmp = TempDir::new().unwrap();
    let pages = vec![
        vec![post("a", 1_700_600_000, "", 1), post("b", 1_700_590_000, "", 1)],
        vec![post("c", 1_700_580_000, "", 1)],
    ];
    let summary = harvester(&tmp, MemorySource::with_pages(pages), NOW)
        .harvest_submissions()
        .await
        .unwrap();
    assert_eq!(summary.written, 3);
    // Two full pages, then the empty page that ends the listing.
    assert_eq!(summary.pages, 3);
}

#[tokio::test]
async fn stops_at_first_submission_older_than_cutoff() {
    let tmp = TempDir::new().unwrap();
    let pages = vec![
        vec![
            post("new1", 1_700_600_000, "", 1),
            post("old", 1_699_000_000, "", 1),
            post("new2", 1_700_590_000, "", 1),
        ],
        vec![post("next", 1_700_580_000, "", 1)],
    ];
    let summary = harvester(&tmp, MemorySource::with_pages(pages), NOW)
        .harvest_submissions()
        .await
        .unwrap();

    assert_eq!(summary.pages, 1);
    assert_eq!(summary.written, 1);
    assert!(snapshots(&tmp, EntityKind::Submissions, 1_699_000_000, "old").is_empty());
    assert!(snapshots(&tmp, EntityKind::Submissions, 1_700_590_000, "new2").is_empty());
    assert!(snapshots(&tmp, EntityKind::Submissions, 1_700_580_000, "next").is_empty());
}

#[tokio::test]
async fn unparseable_submission_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let pages = vec![vec![
        json!({ "id": "bad", "name": "t3_bad", "title": "no timestamp" }),
        post("good", 1_700_600_000, "", 1),
    ]];
    let summary = harvester(&tmp, MemorySource::with_pages(pages), NOW)
        .harvest_submissions()
        .await
        .unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.written, 1);
}

#[tokio::test]
async fn noise_fields_dedupe_content_fields_do_not() {
    let tmp = TempDir::new().unwrap();
    let created = 1_700_600_000;

    let run = |selftext: &'static str, score: i64, at: i64| {
        let source = MemorySource::with_pages(vec![vec![post("a", created, selftext, score)]]);
        harvester(&tmp, source, at)
    };

    assert_eq!(run("v1", 1, NOW).harvest_submissions().await.unwrap().written, 1);

    let rescored = run("v1", 99, NOW + 1).harvest_submissions().await.unwrap();
    assert_eq!(rescored.written, 0);
    assert_eq!(rescored.skipped, 1);

    let edited = run("v2", 99, NOW + 2).harvest_submissions().await.unwrap();
    assert_eq!(edited.written, 1);

    assert_eq!(snapshots(&tmp, EntityKind::Submissions, created, "a").len(), 2);
}

#[tokio::test]
async fn listing_failure_aborts_the_run() {
    let tmp = TempDir::new().unwrap();
    let source = MemorySource {
        listing_fails: true,
        ..Default::default()
    };
    let err = harvester(&tmp, source, NOW)
        .harvest_submissions()
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("listing unavailable"));
}

#[tokio::test]
async fn comments_pass_writes_threads_and_empty_markers() {
    let tmp = TempDir::new().unwrap();
    let pages = vec![vec![
        post("a", 1_700_600_000, "", 1),
        post("b", 1_700_500_000, "", 1),
    ]];
    harvester(&tmp, MemorySource::with_pages(pages), NOW)
        .harvest_submissions()
        .await
        .unwrap();

    let source = || {
        MemorySource::default().comments(
            "a",
            vec![
                comment("c1", "t3_a", 1_700_600_100, "first"),
                comment("c2", "t1_c1", 1_700_600_200, "reply"),
            ],
        )
    };

    let first = harvester(&tmp, source(), NOW).harvest_comments().await.unwrap();
    assert_eq!(first.scanned, 2);
    assert_eq!(first.written, 1);
    assert_eq!(first.empty, 1);

    let thread = snapshots(&tmp, EntityKind::Comments, 1_700_600_000, "a");
    assert_eq!(thread.len(), 1);
    let body = fs::read_to_string(&thread[0]).unwrap();
    assert_eq!(body.lines().count(), 2);

    let marker = Layout::new(tmp.path(), "r_")
        .resolve(EntityKind::Comments, "rust", 1_700_500_000, "b")
        .join(EMPTY_MARKER);
    assert_eq!(fs::read_to_string(&marker).unwrap(), "no_comments");

    let second = harvester(&tmp, source(), NOW + 60).harvest_comments().await.unwrap();
    assert_eq!(second.written, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(second.empty, 1);
    assert!(marker.is_file());
}

#[tokio::test]
async fn comment_fetch_failure_skips_only_that_thread() {
    let tmp = TempDir::new().unwrap();
    let pages = vec![vec![
        post("a", 1_700_600_000, "", 1),
        post("b", 1_700_500_000, "", 1),
    ]];
    harvester(&tmp, MemorySource::with_pages(pages), NOW)
        .harvest_submissions()
        .await
        .unwrap();

    let source = MemorySource::default()
        .failing_comments("a")
        .comments("b", vec![comment("c9", "t3_b", 1_700_500_100, "hi")]);
    let summary = harvester(&tmp, source, NOW).harvest_comments().await.unwrap();
    assert_eq!(summary.errors, 1);
    assert_eq!(summary.written, 1);
    assert!(snapshots(&tmp, EntityKind::Comments, 1_700_600_000, "a").is_empty());
}

#[tokio::test]
async fn comments_pass_ignores_submissions_outside_window() {
    let tmp = TempDir::new().unwrap();
    let created = 1_700_600_000;
    harvester(
        &tmp,
        MemorySource::with_pages(vec![vec![post("a", created, "", 1)]]),
        NOW,
    )
    .harvest_submissions()
    .await
    .unwrap();

    // Thirty days later the stored submission is out of the window.
    let later = NOW + 30 * 86_400;
    let summary = harvester(&tmp, MemorySource::default(), later)
        .harvest_comments()
        .await
        .unwrap();
    assert_eq!(summary.scanned, 0);
}

#[tokio::test]
async fn repeated_cursor_ends_the_listing() {
    let tmp = TempDir::new().unwrap();
    let source = MemorySource {
        pages: vec![vec![post("a", 1_700_600_000, "", 1), post("b", 1_700_590_000, "", 1)]],
        ignores_cursor: true,
        ..Default::default()
    };
    let summary = harvester(&tmp, source, NOW)
        .harvest_submissions()
        .await
        .unwrap();
    // The second page ends on the cursor it was asked for.
    assert_eq!(summary.pages, 2);
    assert_eq!(summary.written, 2);
    assert_eq!(summary.skipped, 2);
}

#[tokio::test]
async fn discovery_keeps_latest_capture_per_submission() {
    let tmp = TempDir::new().unwrap();
    let created = 1_700_600_000;
    for (selftext, at) in [("v1", NOW), ("v2", NOW + 60)] {
        let source = MemorySource::with_pages(vec![vec![post("a", created, selftext, 1)]]);
        harvester(&tmp, source, at).harvest_submissions().await.unwrap();
    }
    assert_eq!(snapshots(&tmp, EntityKind::Submissions, created, "a").len(), 2);

    let layout = Layout::new(tmp.path(), "r_");
    let now = Utc.timestamp_opt(NOW + 60, 0).unwrap();
    let found = discover_submissions(&layout, "rust", now, 7, 1_700_000_000);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "a");
    assert!(found[0].capture.starts_with("20231121221420_"), "{}", found[0].capture);
    let line = fs::read_to_string(&found[0].path).unwrap();
    assert!(line.contains("\"v2\""));
}
