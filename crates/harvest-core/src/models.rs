//! Core data models shared by the harvester and the archive importer.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::Serialize;
use serde_json::Value;

use crate::layout::is_safe_segment;
use crate::record::Record;

/// The two kinds of harvested entity. Each kind has its own subtree under
/// a scope directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Submissions,
    Comments,
}

impl EntityKind {
    /// Directory segment for this kind.
    pub fn dir_name(&self) -> &'static str {
        match self {
            EntityKind::Submissions => "submissions",
            EntityKind::Comments => "comments",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

impl FromStr for EntityKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "submissions" | "submission" | "posts" => Ok(EntityKind::Submissions),
            "comments" | "comment" => Ok(EntityKind::Comments),
            other => bail!(
                "Unknown entity kind: '{}'. Must be submissions or comments.",
                other
            ),
        }
    }
}

/// A top-level entity as returned by a listing: the raw record plus the
/// three fields the layout and pagination depend on.
#[derive(Debug, Clone)]
pub struct Entity {
    pub id: String,
    /// Fullname (`t3_<id>`), used as the pagination cursor.
    pub name: String,
    /// Creation time, whole seconds since the epoch (UTC).
    pub created_at: i64,
    pub raw: Record,
}

impl Entity {
    /// Extract identity fields from a listing record.
    ///
    /// Unlike canonical-view extraction this is strict: an entity without a
    /// numeric `created_utc`, an `id`, or a `name` cannot be placed on disk.
    pub fn from_record(raw: Record) -> Result<Self> {
        let created_at = match raw.get("created_utc") {
            None => bail!("no created_utc"),
            Some(Value::Number(n)) => match n.as_i64() {
                Some(v) => v,
                None => match n.as_f64() {
                    Some(f) => f as i64,
                    None => bail!("bad created_utc"),
                },
            },
            Some(_) => bail!("bad created_utc"),
        };
        let id = raw.str_field("id").to_string();
        let name = raw.str_field("name").to_string();
        if id.is_empty() || name.is_empty() {
            bail!("no id/name");
        }
        if !is_safe_segment(&id) {
            bail!("unusable id {:?}", id);
        }
        Ok(Self {
            id,
            name,
            created_at,
            raw,
        })
    }
}
