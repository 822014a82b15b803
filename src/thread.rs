//! Comment thread assembly.
//!
//! The comments endpoint returns a nested tree of `Listing` and `t1`
//! nodes. A thread snapshot is that tree flattened into rows, with a
//! stable order so the fingerprint only depends on content.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde_json::Value;

use harvest_core::record::Record;

/// Walk a comment tree depth-first and collect every `t1` node's data.
///
/// `more` stubs and anything else that is not a comment or a listing is
/// ignored.
pub fn flatten_tree(node: &Value, out: &mut Vec<Record>) {
    let Some(obj) = node.as_object() else {
        return;
    };
    let kind = obj.get("kind").and_then(Value::as_str).unwrap_or("");
    let Some(data) = obj.get("data").and_then(Value::as_object) else {
        return;
    };
    match kind {
        "t1" => {
            out.push(Record::new(data.clone()));
            // Empty replies come back as "" rather than a listing.
            if let Some(children) = data
                .get("replies")
                .and_then(|r| r.get("data"))
                .and_then(|d| d.get("children"))
                .and_then(Value::as_array)
            {
                for child in children {
                    flatten_tree(child, out);
                }
            }
        }
        "Listing" => {
            if let Some(children) = data.get("children").and_then(Value::as_array) {
                for child in children {
                    flatten_tree(child, out);
                }
            }
        }
        _ => {}
    }
}

/// Flatten the second element of a `/comments/<id>` response.
pub fn flatten_response(response: &Value) -> Option<Vec<Record>> {
    let listings = response.as_array()?;
    if listings.len() < 2 {
        return None;
    }
    let mut rows = Vec::new();
    if let Some(children) = listings[1]
        .get("data")
        .and_then(|d| d.get("children"))
        .and_then(Value::as_array)
    {
        for child in children {
            flatten_tree(child, &mut rows);
        }
    }
    Some(rows)
}

/// Drop rows without an id and later duplicates of an id.
pub fn dedup_by_id(rows: Vec<Record>) -> Vec<Record> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|r| {
            let id = r.str_field("id");
            !id.is_empty() && seen.insert(id.to_string())
        })
        .collect()
}

/// Stable sort by `(parent_id, created_utc, id)`.
pub fn sort_rows(rows: &mut [Record]) {
    rows.sort_by(|a, b| {
        a.str_field("parent_id")
            .cmp(b.str_field("parent_id"))
            .then_with(|| {
                a.f64_field("created_utc")
                    .partial_cmp(&b.f64_field("created_utc"))
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.str_field("id").cmp(b.str_field("id")))
    });
}

/// Flatten, dedup, and sort in one step.
pub fn assemble(response: &Value) -> Option<Vec<Record>> {
    let rows = flatten_response(response)?;
    let mut rows = dedup_by_id(rows);
    sort_rows(&mut rows);
    Some(rows)
}
