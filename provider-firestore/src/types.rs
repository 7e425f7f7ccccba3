//! Firestore REST v1 wire types
//!
//! Firestore encodes every field as a typed value object
//! (`{"stringValue": "..."}`, `{"integerValue": "42"}`, ...). These types
//! mirror that encoding and convert to and from [`CloudBookDocument`].

use crate::error::{FirestoreError, Result};
use bridge_traits::storage::CloudBookDocument;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single typed Firestore value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    #[serde(rename = "stringValue")]
    String(String),
    /// 64-bit integers travel as decimal strings
    #[serde(rename = "integerValue")]
    Integer(String),
    #[serde(rename = "doubleValue")]
    Double(f64),
    #[serde(rename = "booleanValue")]
    Boolean(bool),
    #[serde(rename = "timestampValue")]
    Timestamp(String),
    #[serde(rename = "nullValue")]
    Null(()),
    #[serde(rename = "arrayValue")]
    Array(ArrayValue),
    #[serde(rename = "mapValue")]
    Map(MapValue),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl Value {
    pub fn string(value: impl Into<String>) -> Self {
        Value::String(value.into())
    }

    pub fn integer(value: impl Into<i64>) -> Self {
        Value::Integer(value.into().to_string())
    }

    fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(s) => s.parse().ok(),
            Value::Double(d) => Some(*d as i64),
            _ => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
}

/// A document resource as returned by the REST API.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name; empty on write requests
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_time: Option<String>,
}

/// Response of `GET .../books` (list documents).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDocumentsResponse {
    #[serde(default)]
    pub documents: Vec<Document>,
    pub next_page_token: Option<String>,
}

/// Error body returned by Google APIs.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    #[serde(default)]
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub status: String,
}

impl Document {
    /// Encode a book document as a write request body.
    pub fn from_cloud_document(document: &CloudBookDocument) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), Value::string(&document.id));
        fields.insert("title".to_string(), Value::string(&document.title));
        fields.insert("author".to_string(), Value::string(&document.author));
        fields.insert(
            "description".to_string(),
            Value::string(&document.description),
        );
        fields.insert(
            "thumbnailUrl".to_string(),
            Value::string(&document.thumbnail_url),
        );
        fields.insert(
            "publishedDate".to_string(),
            Value::string(&document.published_date),
        );
        fields.insert("pageCount".to_string(), Value::integer(document.page_count));
        fields.insert(
            "categories".to_string(),
            Value::Array(ArrayValue {
                values: document.categories.iter().map(Value::string).collect(),
            }),
        );
        fields.insert(
            "readingStatus".to_string(),
            Value::string(&document.reading_status),
        );
        fields.insert("savedDate".to_string(), Value::integer(document.saved_date));
        fields.insert("isLiked".to_string(), Value::Boolean(document.is_liked));
        fields.insert(
            "readingProgress".to_string(),
            Value::integer(document.reading_progress),
        );
        fields.insert("notes".to_string(), Value::string(&document.notes));

        Self {
            fields,
            ..Default::default()
        }
    }

    /// Last path segment of the resource name.
    pub fn document_id(&self) -> Option<&str> {
        self.name.rsplit('/').next().filter(|id| !id.is_empty())
    }

    /// Decode into a book document.
    ///
    /// Missing fields take their defaults. The id falls back to the resource
    /// name when the `id` field is absent.
    pub fn to_cloud_document(&self) -> Result<CloudBookDocument> {
        let text = |key: &str| {
            self.fields
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let integer = |key: &str| self.fields.get(key).and_then(Value::as_i64).unwrap_or(0);

        let id = match self.fields.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => self
                .document_id()
                .ok_or_else(|| FirestoreError::ParseError("document has no id".to_string()))?
                .to_string(),
        };

        let categories = match self.fields.get("categories") {
            Some(Value::Array(array)) => array
                .values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        };

        let reading_status = match self.fields.get("readingStatus").and_then(Value::as_str) {
            Some(status) if !status.is_empty() => status.to_string(),
            _ => "NONE".to_string(),
        };

        Ok(CloudBookDocument {
            id,
            title: text("title"),
            author: text("author"),
            description: text("description"),
            thumbnail_url: text("thumbnailUrl"),
            published_date: text("publishedDate"),
            page_count: u32::try_from(integer("pageCount")).unwrap_or(0),
            categories,
            reading_status,
            saved_date: integer("savedDate"),
            is_liked: self
                .fields
                .get("isLiked")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            reading_progress: u8::try_from(integer("readingProgress").clamp(0, 100))
                .unwrap_or(0),
            notes: text("notes"),
        })
    }
}
