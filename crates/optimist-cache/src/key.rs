//! Cache keys.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::RecordId;

/// The query family a cached result belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QueryKind {
    /// Paginated/filtered list. `params` is the canonical encoding of
    /// pagination, sort and filter.
    List {
        #[serde(default)]
        params: String,
    },
    /// Records fetched by an explicit id list.
    Many { ids: Vec<RecordId> },
    /// Records referencing another record through `target`.
    ManyReference {
        target: String,
        id: RecordId,
        #[serde(default)]
        params: String,
    },
    /// A single record.
    One { id: RecordId },
}

/// Identifies one cached query result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Resource name (e.g. `posts`).
    pub resource: String,
    /// Which query produced the result.
    pub query: QueryKind,
}

impl CacheKey {
    /// Key for a list query.
    pub fn list(resource: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            query: QueryKind::List {
                params: params.into(),
            },
        }
    }

    /// Key for a many-by-ids query.
    pub fn many(resource: impl Into<String>, ids: Vec<RecordId>) -> Self {
        Self {
            resource: resource.into(),
            query: QueryKind::Many { ids },
        }
    }

    /// Key for a many-reference query.
    pub fn many_reference(
        resource: impl Into<String>,
        target: impl Into<String>,
        id: impl Into<RecordId>,
        params: impl Into<String>,
    ) -> Self {
        Self {
            resource: resource.into(),
            query: QueryKind::ManyReference {
                target: target.into(),
                id: id.into(),
                params: params.into(),
            },
        }
    }

    /// Key for a single-record query.
    pub fn one(resource: impl Into<String>, id: impl Into<RecordId>) -> Self {
        Self {
            resource: resource.into(),
            query: QueryKind::One { id: id.into() },
        }
    }

    /// Whether this key caches a result of `resource`.
    pub fn belongs_to(&self, resource: &str) -> bool {
        self.resource == resource
    }

    /// Whether this key addresses a collection result.
    pub fn is_collection(&self) -> bool {
        !matches!(self.query, QueryKind::One { .. })
    }

    /// The record a single-record key addresses.
    pub fn record_id(&self) -> Option<&RecordId> {
        match &self.query {
            QueryKind::One { id } => Some(id),
            _ => None,
        }
    }

    /// Whether a batch on `resource` touching `ids` may affect this key.
    ///
    /// Collection keys of the resource always match since any of their
    /// records may be in the batch; single-record keys match on id.
    pub fn affected_by(&self, resource: &str, ids: &[RecordId]) -> bool {
        if !self.belongs_to(resource) {
            return false;
        }
        match self.record_id() {
            Some(id) => ids.contains(id),
            None => true,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.query {
            QueryKind::List { params } if params.is_empty() => write!(f, "{}/list", self.resource),
            QueryKind::List { params } => write!(f, "{}/list?{}", self.resource, params),
            QueryKind::Many { ids } => {
                let ids: Vec<String> = ids.iter().map(ToString::to_string).collect();
                write!(f, "{}/many[{}]", self.resource, ids.join(","))
            }
            QueryKind::ManyReference { target, id, .. } => {
                write!(f, "{}/reference/{}={}", self.resource, target, id)
            }
            QueryKind::One { id } => write!(f, "{}/{}", self.resource, id),
        }
    }
}
