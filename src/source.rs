//! The upstream data source seam.
//!
//! The harvester only needs two calls: one page of a scope's newest
//! submissions, and the flattened comment rows of one submission. The
//! Reddit client implements [`DataSource`] over HTTP; tests implement it
//! in memory.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use harvest_core::record::Record;
//! use thread_harvest::error::SourceResult;
//! use thread_harvest::source::DataSource;
//!
//! struct Nothing;
//!
//! #[async_trait]
//! impl DataSource for Nothing {
//!     async fn list_new(&self, _scope: &str, _limit: u32, _after: Option<&str>) -> SourceResult<Vec<Record>> {
//!         Ok(vec![])
//!     }
//!     async fn fetch_comments(&self, _submission_id: &str) -> SourceResult<Vec<Record>> {
//!         Ok(vec![])
//!     }
//! }
//! ```

use async_trait::async_trait;

use harvest_core::record::Record;

use crate::error::SourceResult;

#[async_trait]
pub trait DataSource: Send + Sync {
    /// One page of the scope's newest submissions.
    ///
    /// Records must arrive newest-first; the harvester stops paging at the
    /// first record older than its cutoff. `after` is the fullname of the
    /// last record of the previous page.
    async fn list_new(
        &self,
        scope: &str,
        limit: u32,
        after: Option<&str>,
    ) -> SourceResult<Vec<Record>>;

    /// Every comment of one submission, flattened, deduplicated by id, and
    /// sorted by `(parent_id, created_utc, id)`.
    async fn fetch_comments(&self, submission_id: &str) -> SourceResult<Vec<Record>>;
}
