//! Schema inference from one sample payload.
//!
//! Pure and synchronous. Objects are walked recursively; for arrays only
//! the first element's shape is analyzed, addressed as `name[0].child`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Number, Value};

use crate::analysis::types::{DataSourceAnalysis, ExtractedField, FieldType};
use crate::cycle::{CycleGuard, WalkViolation};
use crate::error::{Error, Result};
use crate::extraction::json_path::{join_index, join_key};
use crate::registry::rule::ApiType;

/// Deepest object nesting the analyzer descends into. Matches the default
/// recursion limit of the serde_json parser.
pub const MAX_ANALYSIS_DEPTH: usize = 128;

/// Field count at which coverage stops adding confidence.
const FULL_COVERAGE_FIELDS: f64 = 10.0;
/// Confidence a non-empty sample starts from before coverage is added.
const BASE_CONFIDENCE: f64 = 0.7;
/// Penalty weight applied to the fraction of null fields.
const NULL_PENALTY: f64 = 0.7;

const NAIVE_DATE_TIME_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

const ARRAY_MARKER: &str = "[...]";
const OBJECT_MARKER: &str = "{...}";

lazy_static! {
    static ref DATE_ONLY: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    static ref DATE_TIME: Regex = Regex::new(
        r"^\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?$"
    )
    .unwrap();
}

/// Analyze `sample` and report its discovered fields.
///
/// Non-object input (null, primitives, arrays without an object first
/// element) yields zero fields and confidence 0.
pub fn analyze(sample: &Value, provider: &str, api_type: ApiType) -> Result<DataSourceAnalysis> {
    let mut walker = SchemaWalker::new();

    match sample {
        Value::Object(map) => walker.visit_object(map, "", 0)?,
        Value::Array(items) => {
            if let Some(Value::Object(first)) = items.first() {
                walker.visit_object(first, &join_index("", 0), 0)?;
            }
        }
        _ => {}
    }

    let total_fields = walker.fields.len();
    let confidence = confidence_score(total_fields, walker.null_fields);

    log::info!(
        "SCHEMA_ANALYZED provider={} api_type={} fields={} nulls={} confidence={:.3}",
        provider,
        api_type,
        total_fields,
        walker.null_fields,
        confidence
    );

    Ok(DataSourceAnalysis {
        provider: provider.to_string(),
        api_type,
        sample_data: sample.clone(),
        extracted_fields: walker.fields,
        total_fields,
        confidence,
        analysis_timestamp: Utc::now(),
    })
}

/// `min(total/10, 1)` scaled onto `[BASE, 1]`, minus the null penalty.
/// Zero fields is exactly zero.
pub fn confidence_score(total_fields: usize, null_fields: usize) -> f64 {
    if total_fields == 0 {
        return 0.0;
    }
    let coverage = (total_fields as f64 / FULL_COVERAGE_FIELDS).min(1.0);
    let null_fraction = null_fields as f64 / total_fields as f64;
    (BASE_CONFIDENCE + (1.0 - BASE_CONFIDENCE) * coverage - NULL_PENALTY * null_fraction)
        .clamp(0.0, 1.0)
}

/// Type of a single sampled value, without descending into it.
pub fn classify(value: &Value) -> FieldType {
    match value {
        Value::Null => FieldType::Unknown,
        Value::Array(_) => FieldType::Array,
        Value::String(s) if is_date_string(s) => FieldType::Date,
        Value::String(_) => FieldType::String,
        Value::Number(n) if is_integral(n) => FieldType::Integer,
        Value::Number(_) => FieldType::Number,
        Value::Bool(_) => FieldType::Boolean,
        Value::Object(_) => FieldType::Object,
    }
}

fn is_integral(n: &Number) -> bool {
    n.is_i64()
        || n.is_u64()
        || n.as_f64()
            .map_or(false, |f| f.is_finite() && f.fract() == 0.0)
}

/// ISO-8601 date-time or date-only string that also parses as a real date.
pub fn is_date_string(s: &str) -> bool {
    if DATE_ONLY.is_match(s) {
        return NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok();
    }
    if !DATE_TIME.is_match(s) {
        return false;
    }
    DateTime::parse_from_rfc3339(s).is_ok()
        || DateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f%z").is_ok()
        || NAIVE_DATE_TIME_FORMATS
            .iter()
            .any(|fmt| NaiveDateTime::parse_from_str(s, fmt).is_ok())
}

struct SchemaWalker {
    fields: Vec<ExtractedField>,
    null_fields: usize,
    // Keyed by node address.
    guard: CycleGuard<usize>,
}

impl SchemaWalker {
    fn new() -> Self {
        Self {
            fields: Vec::new(),
            null_fields: 0,
            guard: CycleGuard::new(MAX_ANALYSIS_DEPTH),
        }
    }

    fn visit_object(&mut self, map: &Map<String, Value>, prefix: &str, level: usize) -> Result<()> {
        let identity = map as *const Map<String, Value> as usize;
        let at = if prefix.is_empty() { "$" } else { prefix };
        self.guard.enter(identity).map_err(|violation| match violation {
            WalkViolation::Revisited(_) => Error::CircularReference {
                path: at.to_string(),
            },
            WalkViolation::TooDeep(_) => Error::NestingTooDeep {
                path: at.to_string(),
                max_depth: MAX_ANALYSIS_DEPTH,
            },
        })?;

        for (key, value) in map {
            let path = join_key(prefix, key);
            let field_type = classify(value);
            let sample_value = match field_type {
                FieldType::Array => Value::String(ARRAY_MARKER.to_string()),
                FieldType::Object => Value::String(OBJECT_MARKER.to_string()),
                _ => value.clone(),
            };
            if field_type == FieldType::Unknown {
                self.null_fields += 1;
            }

            self.fields.push(ExtractedField {
                field_name: key.clone(),
                field_path: path.clone(),
                field_type,
                nesting_level: level,
                sample_value,
                is_nested: level > 0,
            });

            match value {
                Value::Object(child) => self.visit_object(child, &path, level + 1)?,
                Value::Array(items) => {
                    if let Some(Value::Object(first)) = items.first() {
                        self.visit_object(first, &join_index(&path, 0), level + 1)?;
                    }
                }
                _ => {}
            }
        }

        self.guard.leave();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_quote_scenario() {
        let sample = json!({
            "symbol": "AAPL",
            "price": 150.25,
            "volume": 1000000,
            "active": true,
            "timestamp": "2023-12-01T10:00:00Z"
        });
        let analysis = analyze(&sample, "longport", ApiType::Rest).unwrap();

        assert_eq!(analysis.total_fields, 5);
        let type_of = |path: &str| analysis.field(path).unwrap().field_type;
        assert_eq!(type_of("symbol"), FieldType::String);
        assert_eq!(type_of("price"), FieldType::Number);
        assert_eq!(type_of("volume"), FieldType::Integer);
        assert_eq!(type_of("active"), FieldType::Boolean);
        assert_eq!(type_of("timestamp"), FieldType::Date);
        assert!(analysis.confidence > 0.8);
        assert!(analysis.confidence <= 1.0);
    }

    #[test]
    fn test_non_object_input_has_no_fields() {
        for sample in [json!(null), json!(42), json!("AAPL"), json!([]), json!([1, 2])] {
            let analysis = analyze(&sample, "p", ApiType::Rest).unwrap();
            assert_eq!(analysis.total_fields, 0);
            assert_eq!(analysis.confidence, 0.0);
        }
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let sample = json!({
            "quote": {"last": 10.5},
            "bids": [{"price": 10.4, "size": 200}]
        });
        let analysis = analyze(&sample, "p", ApiType::Stream).unwrap();

        let quote = analysis.field("quote").unwrap();
        assert_eq!(quote.field_type, FieldType::Object);
        assert_eq!(quote.sample_value, json!("{...}"));
        assert!(!quote.is_nested);

        let last = analysis.field("quote.last").unwrap();
        assert_eq!(last.nesting_level, 1);
        assert!(last.is_nested);

        let bids = analysis.field("bids").unwrap();
        assert_eq!(bids.field_type, FieldType::Array);
        assert_eq!(bids.sample_value, json!("[...]"));

        let size = analysis.field("bids[0].size").unwrap();
        assert_eq!(size.field_type, FieldType::Integer);
        assert_eq!(size.field_name, "size");
        assert_eq!(size.nesting_level, 1);
        assert_eq!(analysis.total_fields, 5);
    }

    #[test]
    fn test_top_level_array_uses_first_element() {
        let sample = json!([{"symbol": "700.HK"}, {"symbol": "9988.HK", "extra": 1}]);
        let analysis = analyze(&sample, "p", ApiType::Rest).unwrap();
        assert_eq!(analysis.total_fields, 1);
        assert!(analysis.field("[0].symbol").is_some());
    }

    #[test]
    fn test_nulls_lower_confidence() {
        let clean = analyze(&json!({"a": 1, "b": 2}), "p", ApiType::Rest).unwrap();
        let sparse = analyze(&json!({"a": 1, "b": null}), "p", ApiType::Rest).unwrap();
        assert_eq!(sparse.field("b").unwrap().field_type, FieldType::Unknown);
        assert!(sparse.confidence < clean.confidence);
        assert!(sparse.confidence > 0.0);
    }

    #[test]
    fn test_date_detection() {
        assert!(is_date_string("2023-12-01"));
        assert!(is_date_string("2023-12-01T10:00:00Z"));
        assert!(is_date_string("2023-12-01T10:00:00.123+08:00"));
        assert!(is_date_string("2023-12-01 10:00:00"));
        assert!(!is_date_string("2023-13-45"));
        assert!(!is_date_string("AAPL"));
        assert!(!is_date_string("20231201"));
    }

    fn nested(levels: usize) -> Value {
        let mut sample = json!({"leaf": 1});
        for _ in 1..levels {
            sample = json!({ "next": sample });
        }
        sample
    }

    #[test]
    fn test_deep_acyclic_nesting_is_analyzed() {
        let analysis = analyze(&nested(33), "p", ApiType::Rest).unwrap();
        assert_eq!(analysis.total_fields, 33);
        let leaf = analysis.extracted_fields.last().unwrap();
        assert_eq!(leaf.field_name, "leaf");

        assert!(analyze(&nested(MAX_ANALYSIS_DEPTH), "p", ApiType::Rest).is_ok());
    }

    #[test]
    fn test_nesting_past_the_bound_is_rejected() {
        match analyze(&nested(MAX_ANALYSIS_DEPTH + 1), "p", ApiType::Rest) {
            Err(Error::NestingTooDeep { path, max_depth }) => {
                assert_eq!(max_depth, MAX_ANALYSIS_DEPTH);
                assert!(path.starts_with("next."));
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn test_integral_floats_are_integers() {
        assert_eq!(classify(&json!(100.0)), FieldType::Integer);
        assert_eq!(classify(&json!(-3)), FieldType::Integer);
        assert_eq!(classify(&json!(0.5)), FieldType::Number);
    }

    proptest! {
        #[test]
        fn prop_zero_fields_iff_zero_confidence(total in 0usize..50, nulls_seed in 0usize..50) {
            let nulls = if total == 0 { 0 } else { nulls_seed % (total + 1) };
            let confidence = confidence_score(total, nulls);
            prop_assert!((0.0..=1.0).contains(&confidence));
            prop_assert_eq!(total == 0, confidence == 0.0);
        }
    }
}
