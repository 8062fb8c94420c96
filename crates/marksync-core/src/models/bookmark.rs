use std::cmp::Ordering;

use chrono::{DateTime, FixedOffset};
use serde_json::{Map, Value};

/// A saved link, as persisted by the backing store.
///
/// `id` and `created_at` are assigned by the store when the row is
/// inserted; the client never invents them.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Bookmark {
    pub id: String,
    pub url: String,
    pub title: String,
    pub created_at: String,
}

impl Bookmark {
    /// Build a Bookmark from an untyped change-feed row.
    ///
    /// Missing or null fields become empty strings. Non-string scalars
    /// (numeric ids, for instance) are rendered as text.
    pub fn from_row(row: &Map<String, Value>) -> Self {
        Bookmark {
            id: field_text(row, "id"),
            url: field_text(row, "url"),
            title: field_text(row, "title"),
            created_at: field_text(row, "created_at"),
        }
    }

    /// Parsed creation time, when `created_at` is RFC 3339.
    pub fn created_at_time(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.created_at).ok()
    }

    /// Newest-first ordering used for the initial population.
    ///
    /// Timestamps that parse are compared as instants; anything else falls
    /// back to comparing the raw text.
    pub fn newest_first(a: &Bookmark, b: &Bookmark) -> Ordering {
        match (a.created_at_time(), b.created_at_time()) {
            (Some(ta), Some(tb)) => tb.cmp(&ta),
            _ => b.created_at.cmp(&a.created_at),
        }
    }
}

fn field_text(row: &Map<String, Value>, key: &str) -> String {
    match row.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Payload for a write; the store fills in `id` and `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NewBookmark {
    pub user_id: String,
    pub url: String,
    pub title: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("row must be an object"),
        }
    }

    fn make_test_bookmark(id: &str, created_at: &str) -> Bookmark {
        Bookmark {
            id: id.to_string(),
            url: format!("https://{}.example", id),
            title: format!("Bookmark {}", id),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_from_row_complete() {
        let bookmark = Bookmark::from_row(&row(json!({
            "id": "b1",
            "url": "https://a",
            "title": "A",
            "created_at": "2024-01-01T00:00:00+00:00",
            "user_id": "u1"
        })));
        assert_eq!(bookmark.id, "b1");
        assert_eq!(bookmark.url, "https://a");
        assert_eq!(bookmark.title, "A");
        assert_eq!(bookmark.created_at, "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_from_row_defaults_missing_fields() {
        let bookmark = Bookmark::from_row(&row(json!({ "id": "b1", "title": null })));
        assert_eq!(bookmark.id, "b1");
        assert_eq!(bookmark.url, "");
        assert_eq!(bookmark.title, "");
        assert_eq!(bookmark.created_at, "");
    }

    #[test]
    fn test_from_row_numeric_id() {
        let bookmark = Bookmark::from_row(&row(json!({ "id": 42 })));
        assert_eq!(bookmark.id, "42");
    }

    #[test]
    fn test_newest_first_compares_instants() {
        // Text order says "b" is newer; as instants "a" is (10:00Z vs 08:30Z)
        let a = make_test_bookmark("a", "2024-01-01T10:00:00+00:00");
        let b = make_test_bookmark("b", "2024-01-01T10:30:00+02:00");
        assert_eq!(Bookmark::newest_first(&a, &b), Ordering::Less);

        let mut list = vec![
            make_test_bookmark("old", "2023-05-01T00:00:00Z"),
            make_test_bookmark("new", "2024-05-01T00:00:00Z"),
        ];
        list.sort_by(Bookmark::newest_first);
        assert_eq!(list[0].id, "new");
    }
}
