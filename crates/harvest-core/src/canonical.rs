//! Canonical views: the fixed field projections that get fingerprinted.
//!
//! A canonical view keeps only the fields that describe an entity's content
//! (text, authorship, flags, structural markers) and drops everything that
//! changes without the content changing: scores, vote counts, awards,
//! comment counts, and API bookkeeping. Two fetches of unchanged content
//! therefore serialize to the same bytes.
//!
//! The field lists and their order are part of the on-disk contract. Any
//! change to them changes every fingerprint and must bump
//! [`CANONICAL_EPOCH`].
//!
//! Views borrow from the source [`Record`]; nothing is copied until
//! serialization.

use serde::Serialize;
use serde_json::Value;

use crate::record::Record;

/// Version of the field selection below.
pub const CANONICAL_EPOCH: u32 = 1;

static NULL: Value = Value::Null;

/// Content fields of a submission, in serialization order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionView<'a> {
    pub id: &'a str,
    pub name: &'a str,
    pub subreddit: &'a str,
    pub author: &'a str,
    pub is_self: bool,
    pub domain: &'a str,
    pub title: &'a str,
    pub selftext_html: &'a str,
    pub selftext: &'a str,
    pub url: &'a str,
    pub permalink: &'a str,
    /// `false`, or the edit timestamp.
    pub edited: &'a Value,
    pub over_18: bool,
    pub spoiler: bool,
    pub locked: bool,
    pub stickied: bool,
    pub link_flair_text: &'a str,
    pub link_flair_css_class: &'a str,
}

impl<'a> SubmissionView<'a> {
    pub fn from_record(r: &'a Record) -> Self {
        Self {
            id: r.str_field("id"),
            name: r.str_field("name"),
            subreddit: r.str_field("subreddit"),
            author: r.str_field("author"),
            is_self: r.bool_field("is_self"),
            domain: r.str_field("domain"),
            title: r.str_field("title"),
            selftext_html: r.str_field("selftext_html"),
            selftext: r.str_field("selftext"),
            url: r.str_field("url"),
            permalink: r.str_field("permalink"),
            edited: r.get("edited").unwrap_or(&NULL),
            over_18: r.bool_field("over_18"),
            spoiler: r.bool_field("spoiler"),
            locked: r.bool_field("locked"),
            stickied: r.bool_field("stickied"),
            link_flair_text: r.str_field("link_flair_text"),
            link_flair_css_class: r.str_field("link_flair_css_class"),
        }
    }
}

/// Content fields of a single comment, in serialization order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentView<'a> {
    pub id: &'a str,
    pub parent_id: &'a str,
    pub author: &'a str,
    pub body: &'a str,
    pub body_html: &'a str,
    pub edited: &'a Value,
    pub stickied: bool,
    /// `null`, `"moderator"`, `"admin"`, ...
    pub distinguished: &'a Value,
    pub is_submitter: bool,
    pub permalink: &'a str,
}

impl<'a> CommentView<'a> {
    pub fn from_record(r: &'a Record) -> Self {
        Self {
            id: r.str_field("id"),
            parent_id: r.str_field("parent_id"),
            author: r.str_field("author"),
            body: r.str_field("body"),
            body_html: r.str_field("body_html"),
            edited: r.get("edited").unwrap_or(&NULL),
            stickied: r.bool_field("stickied"),
            distinguished: r.get("distinguished").unwrap_or(&NULL),
            is_submitter: r.bool_field("is_submitter"),
            permalink: r.str_field("permalink"),
        }
    }
}

/// The hashing input for one snapshot.
///
/// Serializes untagged: a submission is a JSON object, a comment thread is a
/// JSON array of comment objects in row order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CanonicalView<'a> {
    Submission(SubmissionView<'a>),
    Thread(Vec<CommentView<'a>>),
}

impl CanonicalView<'_> {
    /// Deterministic compact JSON bytes: fields in declaration order, no
    /// whitespace. Nested objects inside raw values serialize with sorted
    /// keys.
    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

/// Canonical view of a submission record.
pub fn canonicalize_submission(raw: &Record) -> CanonicalView<'_> {
    CanonicalView::Submission(SubmissionView::from_record(raw))
}

/// Canonical view of a comment thread. Row order is preserved, so callers
/// must pass rows in their stable sorted order.
pub fn canonicalize_thread(rows: &[Record]) -> CanonicalView<'_> {
    CanonicalView::Thread(rows.iter().map(CommentView::from_record).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: Value) -> Record {
        Record::from_value(v).unwrap()
    }

    #[test]
    fn submission_ignores_noise_fields() {
        let a = rec(json!({ "id": "x", "title": "Hello", "score": 1, "ups": 1 }));
        let b = rec(json!({ "id": "x", "title": "Hello", "score": 99, "num_comments": 4 }));
        assert_eq!(
            canonicalize_submission(&a).to_bytes().unwrap(),
            canonicalize_submission(&b).to_bytes().unwrap()
        );
    }

    #[test]
    fn submission_field_order_is_fixed() {
        let r = rec(json!({ "title": "T", "id": "x", "edited": false }));
        let bytes = canonicalize_submission(&r).to_bytes().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with(r#"{"id":"x","name":"","subreddit":"""#));
        assert!(text.contains(r#""title":"T""#));
        assert!(text.contains(r#""edited":false"#));
        assert!(text.ends_with(r#""link_flair_text":"","link_flair_css_class":""}"#));
    }

    #[test]
    fn missing_raw_values_become_null() {
        let r = rec(json!({ "id": "c1" }));
        let view = CommentView::from_record(&r);
        assert_eq!(view.edited, &Value::Null);
        assert_eq!(view.distinguished, &Value::Null);
        let text = String::from_utf8(canonicalize_thread(&[r.clone()]).to_bytes().unwrap()).unwrap();
        assert_eq!(
            text,
            r#"[{"id":"c1","parent_id":"","author":"","body":"","body_html":"","edited":null,"stickied":false,"distinguished":null,"is_submitter":false,"permalink":""}]"#
        );
    }

    #[test]
    fn thread_serializes_as_array_in_row_order() {
        let rows = vec![
            rec(json!({ "id": "b", "body": "second" })),
            rec(json!({ "id": "a", "body": "first" })),
        ];
        let view = canonicalize_thread(&rows);
        let text = String::from_utf8(view.to_bytes().unwrap()).unwrap();
        assert!(text.starts_with(r#"[{"id":"b""#));
        assert!(text.find("\"b\"").unwrap() < text.find("\"a\"").unwrap());
    }

    #[test]
    fn canonicalize_is_repeatable() {
        let r = rec(json!({
            "id": "x", "selftext": "body", "edited": 1700000100.0,
            "unknown": { "z": 1, "a": 2 }
        }));
        let first = canonicalize_submission(&r).to_bytes().unwrap();
        let second = canonicalize_submission(&r).to_bytes().unwrap();
        assert_eq!(first, second);
    }
}
