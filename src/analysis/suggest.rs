//! Mapping suggestions for an analyzed payload.
//!
//! Pairs discovered leaf fields with canonical target field names by
//! normalized-name similarity.

use crate::analysis::types::{DataSourceAnalysis, ExtractedField};
use crate::registry::rule::FieldSuggestion;

const EXACT_MATCH: f64 = 1.0;
const CONTAINS_MATCH: f64 = 0.6;

/// Lowercase and drop separators: `last_done`, `lastDone` and `LAST-DONE`
/// all normalize to `lastdone`.
fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn similarity(source: &str, target: &str) -> f64 {
    let (source, target) = (normalize(source), normalize(target));
    if source.is_empty() || target.is_empty() {
        0.0
    } else if source == target {
        EXACT_MATCH
    } else if source.contains(&target) || target.contains(&source) {
        CONTAINS_MATCH
    } else {
        0.0
    }
}

/// Best source field for each target, ordered like `targets`. Targets with
/// no plausible source are omitted; ties keep the shallower field.
pub fn suggest_mappings(analysis: &DataSourceAnalysis, targets: &[&str]) -> Vec<FieldSuggestion> {
    targets
        .iter()
        .filter_map(|target| {
            analysis
                .extracted_fields
                .iter()
                .filter(|f| f.field_type.is_scalar())
                .map(|f| (f, similarity(&f.field_name, target)))
                .filter(|(_, score)| *score > 0.0)
                .fold(None::<(&ExtractedField, f64)>, |best, (field, score)| match best {
                    Some((b, s)) if s > score || (s == score && b.nesting_level <= field.nesting_level) => {
                        Some((b, s))
                    }
                    _ => Some((field, score)),
                })
                .map(|(field, score)| FieldSuggestion {
                    source_field_path: field.field_path.clone(),
                    target_field: target.to_string(),
                    confidence: score,
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::analyze;
    use crate::registry::rule::ApiType;
    use serde_json::json;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("last_done"), "lastdone");
        assert_eq!(normalize("lastDone"), "lastdone");
        assert_eq!(normalize("LAST-DONE"), "lastdone");
    }

    #[test]
    fn test_suggestions_prefer_exact_and_shallow() {
        let sample = json!({
            "symbol": "700.HK",
            "last_done": "385.2",
            "detail": {"symbol": "dup", "prev_close_price": "380.0"},
            "depth": {"bids": []}
        });
        let analysis = analyze(&sample, "longport", ApiType::Rest).unwrap();

        let suggestions =
            suggest_mappings(&analysis, &["symbol", "lastDone", "prevClose", "turnover"]);
        assert_eq!(suggestions.len(), 3);

        assert_eq!(suggestions[0].source_field_path, "symbol");
        assert_eq!(suggestions[0].confidence, 1.0);
        assert_eq!(suggestions[1].source_field_path, "last_done");
        assert_eq!(suggestions[1].target_field, "lastDone");
        assert_eq!(suggestions[2].source_field_path, "detail.prev_close_price");
        assert_eq!(suggestions[2].confidence, 0.6);
    }
}
