//! Discovered-schema types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::rule::ApiType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Number,
    Boolean,
    Date,
    Array,
    Object,
    Unknown,
}

impl FieldType {
    /// Whether the field holds a leaf value a mapping can target directly.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldType::Array | FieldType::Object)
    }
}

/// One field found in a sample payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedField {
    pub field_name: String,
    pub field_path: String,
    pub field_type: FieldType,
    pub nesting_level: usize,
    pub sample_value: Value,
    pub is_nested: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceAnalysis {
    pub provider: String,
    pub api_type: ApiType,
    pub sample_data: Value,
    pub extracted_fields: Vec<ExtractedField>,
    pub total_fields: usize,
    pub confidence: f64,
    pub analysis_timestamp: DateTime<Utc>,
}

impl DataSourceAnalysis {
    pub fn field(&self, path: &str) -> Option<&ExtractedField> {
        self.extracted_fields.iter().find(|f| f.field_path == path)
    }
}
