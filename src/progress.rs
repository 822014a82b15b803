//! Harvest progress reporting.
//!
//! Reports per-page and per-entity outcomes plus a final summary while a
//! harvest or import runs. Progress is emitted on **stderr** so stdout
//! stays parseable for scripts.

use std::io::Write;

use serde::Serialize;

use harvest_core::models::EntityKind;

/// What happened to one entity.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// A new snapshot was written.
    Write,
    /// A snapshot with the same fingerprint was already on disk.
    Skip,
    /// Another writer published the same snapshot name first.
    Raced,
    /// The fetch returned no sub-records; an EMPTY marker was written.
    Empty,
    /// Fetch, parse, hash, or write failed; the entity was skipped.
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Write => "write",
            Outcome::Skip => "skip",
            Outcome::Raced => "raced",
            Outcome::Empty => "empty",
            Outcome::Error => "error",
        }
    }
}

/// Counts reported when a run finishes.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct HarvestSummary {
    pub pages: u64,
    pub scanned: u64,
    pub written: u64,
    /// Duplicates, including lost publish races.
    pub skipped: u64,
    pub empty: u64,
    pub errors: u64,
}

impl HarvestSummary {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Write => self.written += 1,
            Outcome::Skip | Outcome::Raced => self.skipped += 1,
            Outcome::Empty => self.empty += 1,
            Outcome::Error => self.errors += 1,
        }
    }
}

/// A single progress event.
#[derive(Clone, Debug)]
pub enum HarvestEvent {
    /// Discovery for the comments pass finished.
    Discovered {
        scope: String,
        kind: EntityKind,
        total: u64,
    },
    /// One listing page was processed.
    Page {
        scope: String,
        kind: EntityKind,
        page: u64,
        written: u64,
        after: Option<String>,
        stop: bool,
    },
    /// One entity was processed.
    Entity {
        scope: String,
        kind: EntityKind,
        id: String,
        outcome: Outcome,
        detail: String,
    },
    /// The run finished.
    Done {
        scope: String,
        kind: EntityKind,
        summary: HarvestSummary,
    },
}

/// Reports harvest progress. Implementations write to stderr (human or JSON).
pub trait HarvestProgressReporter: Send + Sync {
    fn report(&self, event: HarvestEvent);
}

/// Human-friendly progress on stderr:
/// `harvest rust submissions  abc123  write  hash=0123456789abcdef`.
pub struct StderrProgress;

impl HarvestProgressReporter for StderrProgress {
    fn report(&self, event: HarvestEvent) {
        let line = match &event {
            HarvestEvent::Discovered { scope, kind, total } => {
                format!("harvest {} {}  start  posts={}\n", scope, kind, format_number(*total))
            }
            HarvestEvent::Page {
                scope,
                kind,
                page,
                written,
                after,
                stop,
            } => format!(
                "harvest {} {}  page {}  wrote={} after={:?} stop={}\n",
                scope,
                kind,
                page,
                written,
                after.as_deref().unwrap_or(""),
                stop
            ),
            HarvestEvent::Entity {
                scope,
                kind,
                id,
                outcome,
                detail,
            } => {
                if detail.is_empty() {
                    format!("harvest {} {}  {}  {}\n", scope, kind, id, outcome.as_str())
                } else {
                    format!(
                        "harvest {} {}  {}  {}  {}\n",
                        scope,
                        kind,
                        id,
                        outcome.as_str(),
                        detail
                    )
                }
            }
            HarvestEvent::Done {
                scope,
                kind,
                summary,
            } => format!(
                "harvest {} {}  done  scanned={} written={} skipped={} empty={} errors={}\n",
                scope,
                kind,
                format_number(summary.scanned),
                format_number(summary.written),
                format_number(summary.skipped),
                format_number(summary.empty),
                format_number(summary.errors)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl HarvestProgressReporter for JsonProgress {
    fn report(&self, event: HarvestEvent) {
        let obj = event_json(&event);
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

fn event_json(event: &HarvestEvent) -> serde_json::Value {
    match event {
        HarvestEvent::Discovered { scope, kind, total } => serde_json::json!({
            "event": "discovered",
            "scope": scope,
            "kind": kind,
            "total": total
        }),
        HarvestEvent::Page {
            scope,
            kind,
            page,
            written,
            after,
            stop,
        } => serde_json::json!({
            "event": "page",
            "scope": scope,
            "kind": kind,
            "page": page,
            "written": written,
            "after": after,
            "stop": stop
        }),
        HarvestEvent::Entity {
            scope,
            kind,
            id,
            outcome,
            detail,
        } => serde_json::json!({
            "event": "entity",
            "scope": scope,
            "kind": kind,
            "id": id,
            "outcome": outcome,
            "detail": detail
        }),
        HarvestEvent::Done {
            scope,
            kind,
            summary,
        } => serde_json::json!({
            "event": "done",
            "scope": scope,
            "kind": kind,
            "summary": summary
        }),
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl HarvestProgressReporter for NoProgress {
    fn report(&self, _event: HarvestEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human lines on a TTY; JSON lines otherwise, so unattended runs still
    /// leave a structured trail.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Json
        }
    }

    pub fn reporter(&self) -> Box<dyn HarvestProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn summary_counts_outcomes() {
        let mut summary = HarvestSummary::default();
        for outcome in [
            Outcome::Write,
            Outcome::Skip,
            Outcome::Raced,
            Outcome::Empty,
            Outcome::Error,
            Outcome::Write,
        ] {
            summary.record(outcome);
        }
        assert_eq!(summary.written, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.empty, 1);
        assert_eq!(summary.errors, 1);
    }

    #[test]
    fn entity_event_json_shape() {
        let obj = event_json(&HarvestEvent::Entity {
            scope: "rust".to_string(),
            kind: EntityKind::Comments,
            id: "abc".to_string(),
            outcome: Outcome::Empty,
            detail: String::new(),
        });
        assert_eq!(obj["event"], "entity");
        assert_eq!(obj["kind"], "comments");
        assert_eq!(obj["outcome"], "empty");
    }
}
