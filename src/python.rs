//! Python bindings over the synchronous components.
//!
//! Every function takes and returns JSON strings so callers never deal
//! with intermediate Python object graphs.

use std::sync::Arc;

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use serde_json::Value;

use crate::analysis::analyze;
use crate::extraction::apply_mappings as apply_field_mappings;
use crate::registry::rule::{ApiType, FieldMapping};
use crate::validation::{CapabilityTable, CapabilityValidator, ValidationOptions};

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse_json<T: serde::de::DeserializeOwned>(what: &str, raw: &str) -> PyResult<T> {
    serde_json::from_str(raw).map_err(|e| PyValueError::new_err(format!("invalid {}: {}", what, e)))
}

/// Infer the schema of one sample payload.
///
/// Returns a serialized DataSourceAnalysis.
#[pyfunction]
#[pyo3(signature = (sample_json, provider, api_type="rest"))]
fn analyze_sample(sample_json: &str, provider: &str, api_type: &str) -> PyResult<String> {
    crate::init_logger();

    let sample: Value = parse_json("sample", sample_json)?;
    let api_type: ApiType = api_type.parse().map_err(value_error)?;
    let analysis = analyze(&sample, provider, api_type).map_err(value_error)?;
    serde_json::to_string(&analysis).map_err(value_error)
}

/// Validate a rule-list type against the capability table.
///
/// # Arguments
/// * `rule_type` - Rule-list type name
/// * `options_json` - Optional ValidationOptions (camelCase keys)
/// * `capabilities_json` - Optional capability table; the built-in table
///   is used when absent
#[pyfunction]
#[pyo3(signature = (rule_type, options_json=None, capabilities_json=None))]
fn validate_rule_type(
    rule_type: &str,
    options_json: Option<&str>,
    capabilities_json: Option<&str>,
) -> PyResult<String> {
    crate::init_logger();

    let options: ValidationOptions = match options_json {
        Some(raw) => parse_json("options", raw)?,
        None => ValidationOptions::default(),
    };
    let table = match capabilities_json {
        Some(raw) => CapabilityTable::from_json_str(raw).map_err(value_error)?,
        None => CapabilityTable::builtin(),
    };

    let validator = CapabilityValidator::new(Arc::new(table));
    let result = validator.validate(rule_type, &options).map_err(value_error)?;
    serde_json::to_string(&result).map_err(value_error)
}

/// Apply a list of field mappings to a raw payload.
///
/// Returns a serialized TransformationResult.
#[pyfunction]
#[pyo3(signature = (mappings_json, raw_data_json, include_debug_info=false))]
fn apply_mappings(
    mappings_json: &str,
    raw_data_json: &str,
    include_debug_info: bool,
) -> PyResult<String> {
    let mappings: Vec<FieldMapping> = parse_json("field mappings", mappings_json)?;
    let raw_data: Value = parse_json("raw data", raw_data_json)?;
    let result = apply_field_mappings(&mappings, &raw_data, include_debug_info);
    serde_json::to_string(&result).map_err(value_error)
}

/// Python module definition
#[pymodule]
fn marketmap_core(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(analyze_sample, m)?)?;
    m.add_function(wrap_pyfunction!(validate_rule_type, m)?)?;
    m.add_function(wrap_pyfunction!(apply_mappings, m)?)?;
    m.add("__version__", crate::VERSION)?;
    Ok(())
}
