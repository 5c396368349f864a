//! Firestore REST API types.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Firestore document value types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::StringValue(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::StringValue(s) | Value::TimestampValue(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<HashMap<String, Value>>,
}

/// Firestore document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Document fields
    pub fields: Option<HashMap<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    /// Last update time, used as a write precondition
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

impl Document {
    /// Create a new document with the given fields.
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            fields: Some(fields),
            ..Default::default()
        }
    }

    /// Last path segment of the resource name.
    pub fn id(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.rsplit('/').next())
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.as_ref().and_then(|f| f.get(name))
    }
}

// ============================================================================
// Structured queries
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub all_descendants: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFilter {
    pub field: FieldReference,
    /// EQUAL, IN, LESS_THAN, GREATER_THAN_OR_EQUAL, ...
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeFilter {
    /// AND or OR
    pub op: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_filter: Option<CompositeFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_filter: Option<FieldFilter>,
}

impl Filter {
    pub fn field(path: &str, op: &str, value: Value) -> Self {
        Self {
            composite_filter: None,
            field_filter: Some(FieldFilter {
                field: FieldReference {
                    field_path: path.to_string(),
                },
                op: op.to_string(),
                value,
            }),
        }
    }

    pub fn equal(path: &str, value: Value) -> Self {
        Self::field(path, "EQUAL", value)
    }

    /// Conjunction; a single filter is returned as is.
    pub fn and(mut filters: Vec<Filter>) -> Option<Self> {
        match filters.len() {
            0 => None,
            1 => filters.pop(),
            _ => Some(Self {
                composite_filter: Some(CompositeFilter {
                    op: "AND".to_string(),
                    filters,
                }),
                field_filter: None,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub field: FieldReference,
    /// ASCENDING or DESCENDING
    pub direction: String,
}

impl Order {
    pub fn asc(path: &str) -> Self {
        Self {
            field: FieldReference {
                field_path: path.to_string(),
            },
            direction: "ASCENDING".to_string(),
        }
    }

    pub fn desc(path: &str) -> Self {
        Self {
            field: FieldReference {
                field_path: path.to_string(),
            },
            direction: "DESCENDING".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cursor {
    pub values: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Vec<Order>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<Cursor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

impl StructuredQuery {
    /// Query over a single collection.
    pub fn collection(collection_id: &str) -> Self {
        Self {
            from: vec![CollectionSelector {
                collection_id: collection_id.to_string(),
                all_descendants: None,
            }],
            r#where: None,
            order_by: None,
            start_at: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filters: Vec<Filter>) -> Self {
        self.r#where = Filter::and(filters);
        self
    }

    pub fn order_by(mut self, order: Order) -> Self {
        self.order_by.get_or_insert_with(Vec::new).push(order);
        self
    }

    pub fn limit(mut self, limit: i32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Append a document-name order as tie breaker and cap each page at
    /// `page_size` documents.
    pub fn paged(mut self, page_size: i32) -> Self {
        let direction = self
            .order_by
            .as_ref()
            .and_then(|orders| orders.last())
            .map(|order| order.direction.clone())
            .unwrap_or_else(|| "ASCENDING".to_string());
        self.order_by.get_or_insert_with(Vec::new).push(Order {
            field: FieldReference {
                field_path: DOCUMENT_NAME.to_string(),
            },
            direction,
        });
        self.limit = Some(page_size);
        self
    }

    /// Cursor that resumes right after `doc` in this query's order.
    pub fn cursor_after(&self, doc: &Document) -> Cursor {
        let values = self
            .order_by
            .iter()
            .flatten()
            .map(|order| match order.field.field_path.as_str() {
                DOCUMENT_NAME => Value::ReferenceValue(doc.name.clone().unwrap_or_default()),
                path => doc.field(path).cloned().unwrap_or(Value::NullValue(())),
            })
            .collect();
        Cursor {
            values,
            before: Some(false),
        }
    }
}

/// Field path Firestore uses for the document key.
pub const DOCUMENT_NAME: &str = "__name__";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

/// One element of the runQuery response stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub read_time: Option<String>,
    #[serde(default)]
    pub skipped_results: Option<i64>,
}

// ============================================================================
// Atomic commits
// ============================================================================

/// A single write operation in a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Write {
    /// Update or insert a document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<Document>,

    /// Delete a document by name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<String>,

    /// Field mask for partial updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_mask: Option<DocumentMask>,

    /// Precondition for the write.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_document: Option<Precondition>,
}

/// Document field mask for partial updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMask {
    pub field_paths: Vec<String>,
}

/// Precondition for a write operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Precondition {
    /// Document must exist.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,

    /// Document must have this update time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRequest {
    pub writes: Vec<Write>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    #[serde(default)]
    pub update_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    #[serde(default)]
    pub write_results: Option<Vec<WriteResult>>,
    #[serde(default)]
    pub commit_time: Option<String>,
}
