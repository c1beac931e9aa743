//! Record and payload types held by the cache.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field name carrying a record's identifier.
pub const ID_FIELD: &str = "id";

/// Unique identifier of a record within a resource.
///
/// Backends use either numeric or string identifiers, so both are accepted
/// and serialized without a tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    /// Numeric identifier.
    Int(i64),
    /// String identifier (UUIDs, slugs).
    Str(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Int(n) => write!(f, "{}", n),
            RecordId::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Int(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Str(s.to_string())
    }
}

impl From<String> for RecordId {
    fn from(s: String) -> Self {
        RecordId::Str(s)
    }
}

/// A record: an identifier plus an open set of fields.
///
/// Serialized flat, e.g. `{"id": 1, "title": "Hello"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Create a record with no fields besides its identifier.
    pub fn new(id: impl Into<RecordId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Set a field, builder style.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Merge a patch over this record in place.
    ///
    /// Shallow overwrite: patched fields replace existing values, fields
    /// absent from the patch are kept. The identifier is never changed.
    pub fn merge(&mut self, patch: &Patch) {
        for (field, value) in patch.fields() {
            if field == ID_FIELD {
                continue;
            }
            self.fields.insert(field.clone(), value.clone());
        }
    }

    /// Return a copy of this record with the patch merged over it.
    pub fn merged(&self, patch: &Patch) -> Self {
        let mut record = self.clone();
        record.merge(patch);
        record
    }
}

/// A partial record: the fields to overwrite on every targeted record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(Map<String, Value>);

impl Patch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, builder style.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Set a field.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Get a field value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Iterate over the patched fields.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of patched fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the patch touches no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Patch {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// The payload addressed by a cache key.
///
/// Whether a payload is a collection or a single record is decided once,
/// when the entry is read, and carried from there on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CacheEntry {
    /// A list of records (list, many, many-reference queries).
    Collection {
        records: Vec<Record>,
        /// Total number of matching records on the server, when paginated.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<u64>,
    },
    /// One record (detail queries).
    Single { record: Record },
}

impl CacheEntry {
    /// Create a collection entry without a server-side total.
    pub fn collection(records: Vec<Record>) -> Self {
        CacheEntry::Collection {
            records,
            total: None,
        }
    }

    /// Create a paginated collection entry.
    pub fn page(records: Vec<Record>, total: u64) -> Self {
        CacheEntry::Collection {
            records,
            total: Some(total),
        }
    }

    /// Create a single-record entry.
    pub fn single(record: Record) -> Self {
        CacheEntry::Single { record }
    }

    /// Whether this is a collection entry.
    pub fn is_collection(&self) -> bool {
        matches!(self, CacheEntry::Collection { .. })
    }

    /// The records held by this entry, in order.
    pub fn records(&self) -> &[Record] {
        match self {
            CacheEntry::Collection { records, .. } => records,
            CacheEntry::Single { record } => std::slice::from_ref(record),
        }
    }

    /// Find a record by identifier.
    pub fn find(&self, id: &RecordId) -> Option<&Record> {
        self.records().iter().find(|r| &r.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_record_id_untagged() {
        let ids: Vec<RecordId> = serde_json::from_value(json!([1, "abc"])).unwrap();
        assert_eq!(ids, vec![RecordId::Int(1), RecordId::Str("abc".to_string())]);
        assert_eq!(ids[0].to_string(), "1");
        assert_eq!(ids[1].to_string(), "abc");
    }

    #[test]
    fn test_record_flat_serialization() {
        let record = Record::new(7_i64).with("title", "Hello").with("views", 3);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, json!({"id": 7, "title": "Hello", "views": 3}));

        let decoded: Record = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_merge_is_shallow_overwrite() {
        let mut record = Record::new(1_i64)
            .with("status", "draft")
            .with("meta", json!({"a": 1, "b": 2}));
        let patch = Patch::new()
            .with("status", "archived")
            .with("meta", json!({"a": 9}));

        record.merge(&patch);

        assert_eq!(record.get("status"), Some(&json!("archived")));
        // Nested objects are replaced, not deep-merged
        assert_eq!(record.get("meta"), Some(&json!({"a": 9})));
    }

    #[test]
    fn test_merge_preserves_absent_fields() {
        let record = Record::new(1_i64).with("title", "T").with("status", "draft");
        let merged = record.merged(&Patch::new().with("status", "published"));

        assert_eq!(merged.get("title"), Some(&json!("T")));
        assert_eq!(merged.get("status"), Some(&json!("published")));
        // Original untouched
        assert_eq!(record.get("status"), Some(&json!("draft")));
    }

    #[test]
    fn test_merge_never_changes_id() {
        let mut record = Record::new(1_i64);
        record.merge(&Patch::new().with("id", 99).with("flag", true));

        assert_eq!(record.id, RecordId::Int(1));
        assert!(!record.fields.contains_key("id"));
        assert_eq!(record.get("flag"), Some(&json!(true)));
    }

    #[test]
    fn test_entry_tagged_serialization() {
        let entry = CacheEntry::page(vec![Record::new(1_i64)], 10);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(
            value,
            json!({"type": "collection", "records": [{"id": 1}], "total": 10})
        );

        let single = CacheEntry::single(Record::new("x"));
        let value = serde_json::to_value(&single).unwrap();
        assert_eq!(value, json!({"type": "single", "record": {"id": "x"}}));
    }

    #[test]
    fn test_entry_find() {
        let entry = CacheEntry::collection(vec![Record::new(1_i64), Record::new(2_i64)]);
        assert!(entry.is_collection());
        assert!(entry.find(&RecordId::Int(2)).is_some());
        assert!(entry.find(&RecordId::Int(3)).is_none());

        let single = CacheEntry::single(Record::new(5_i64));
        assert_eq!(single.records().len(), 1);
        assert!(single.find(&RecordId::Int(5)).is_some());
    }
}
