//! Field-by-field application of mapping rules.
//!
//! Pure and synchronous: the same (mappings, data) pair always produces the
//! same result, and nothing outside the returned value is touched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::extraction::json_path::FieldPath;
use crate::registry::rule::FieldMapping;

/// Counts for one application of a mapping list.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingStats {
    pub total_mappings: usize,
    pub successful_mappings: usize,
    pub failed_mappings: usize,
    pub success_rate: f64,
}

impl MappingStats {
    fn from_counts(successful: usize, failed: usize) -> Self {
        let total = successful + failed;
        let success_rate = if total == 0 {
            0.0
        } else {
            successful as f64 / total as f64
        };
        Self {
            total_mappings: total,
            successful_mappings: successful,
            failed_mappings: failed,
            success_rate,
        }
    }
}

/// Per-mapping trace, returned when debug info is requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingDebug {
    pub source_field_path: String,
    pub target_field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_value: Option<Value>,
    pub matched: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationResult {
    pub transformed_data: Value,
    pub success: bool,
    pub mapping_stats: MappingStats,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debug_info: Option<Vec<MappingDebug>>,
}

/// Apply `mappings` to `raw_data`.
///
/// A source path that resolves (a present `null` included) writes its value
/// under the target field. A path that does not resolve, or does not parse,
/// counts as failed and leaves the target key absent.
pub fn apply_mappings(
    mappings: &[FieldMapping],
    raw_data: &Value,
    include_debug_info: bool,
) -> TransformationResult {
    let mut output = Map::new();
    let mut debug = include_debug_info.then(|| Vec::with_capacity(mappings.len()));
    let mut successful = 0;
    let mut failed = 0;

    for mapping in mappings {
        let resolved = match FieldPath::parse(&mapping.source_field_path) {
            Ok(path) => path.resolve(raw_data),
            Err(e) => {
                log::debug!(
                    "MAPPING_PATH_INVALID source={} error={}",
                    mapping.source_field_path,
                    e
                );
                None
            }
        };

        match resolved {
            Some(value) => {
                successful += 1;
                output.insert(mapping.target_field.clone(), value.clone());
            }
            None => {
                failed += 1;
                log::debug!(
                    "MAPPING_UNRESOLVED source={} target={}",
                    mapping.source_field_path,
                    mapping.target_field
                );
            }
        }

        if let Some(entries) = debug.as_mut() {
            entries.push(MappingDebug {
                source_field_path: mapping.source_field_path.clone(),
                target_field: mapping.target_field.clone(),
                source_value: resolved.cloned(),
                matched: resolved.is_some(),
            });
        }
    }

    TransformationResult {
        transformed_data: Value::Object(output),
        success: failed == 0,
        mapping_stats: MappingStats::from_counts(successful, failed),
        debug_info: debug,
    }
}
