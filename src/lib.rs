//! # Thread Harvest
//!
//! Incremental harvesting of Reddit submissions and comment threads into a
//! content-addressed snapshot tree on local disk.
//!
//! Every run fetches the entities inside a lookback window, reduces each
//! one to a canonical view that ignores volatile fields (scores, vote
//! counts, awards), hashes that view, and writes a new snapshot file only
//! when no snapshot with the same hash exists in the entity's directory.
//! Re-running a harvest over unchanged content writes nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌───────────────┐
//! │  DataSource  │──▶│  Canonical   │──▶│  Fingerprint  │
//! │ Reddit/dumps │   │  view        │   │  SHA-256      │
//! └──────────────┘   └──────────────┘   └───────┬───────┘
//!                                               │
//!                      ┌────────────────────────┤
//!                      ▼                        ▼
//!                 ┌──────────┐           ┌─────────────┐
//!                 │  Layout  │──────────▶│    Store    │
//!                 │ scope/   │           │ dedup, temp │
//!                 │ kind/day │           │ + publish   │
//!                 └──────────┘           └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! harvest submissions --sub rust --days 7
//! harvest comments --sub rust --days 7
//! harvest import dumps/rust_posts.jsonl dumps/rust_comments.jsonl
//! harvest locate --sub rust --kind submissions 1700000000 abc123
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment credentials |
//! | [`error`] | Typed errors at the data-source boundary |
//! | [`source`] | The [`source::DataSource`] trait |
//! | [`reddit`] | OAuth client implementing `DataSource` |
//! | [`thread`] | Comment-tree flattening and ordering |
//! | [`store`] | Dedup check and atomic snapshot publish |
//! | [`harvest`] | Submissions and comments passes |
//! | [`import`] | Offline import of JSONL archive dumps |
//! | [`progress`] | Progress reporting on stderr |
//!
//! The pure pieces (records, canonical views, fingerprints, path layout)
//! live in the `harvest-core` crate, re-exported here.

pub use harvest_core;

pub mod config;
pub mod error;
pub mod harvest;
pub mod import;
pub mod progress;
pub mod reddit;
pub mod source;
pub mod store;
pub mod thread;
