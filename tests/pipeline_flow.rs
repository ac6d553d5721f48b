//! End-to-end flow against the in-memory collaborators: author a rule from
//! a sample, transform payloads through the pipeline, then evolve the rule.

use std::sync::Arc;

use marketmap_core::registry::{InMemoryRuleCache, InMemoryRuleStore, RuleFilter, RulePatch};
use marketmap_core::{
    analyze, build_pipeline, suggest_mappings, ApiType, BatchItemOutcome, CreateRuleSpec,
    EngineConfig, Error, FieldMapping, MappingRuleResponse, TransformRequest,
};
use serde_json::json;

fn engine() -> marketmap_core::MarketDataPipeline {
    build_pipeline(
        &EngineConfig::default(),
        Arc::new(InMemoryRuleStore::new()),
        Arc::new(InMemoryRuleCache::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn sample_to_rule_to_transformation() {
    let pipeline = engine();
    let sample = json!({
        "symbol": "700.HK",
        "last_done": "385.2",
        "volume": 1200,
        "timestamp": "2023-12-01T10:00:00Z"
    });

    let analysis = analyze(&sample, "longport", ApiType::Rest).unwrap();
    assert_eq!(analysis.total_fields, 4);

    let suggestions = suggest_mappings(&analysis, &["symbol", "lastDone", "volume"]);
    assert_eq!(suggestions.len(), 3);

    let rule = pipeline
        .registry()
        .create_from_suggestions(
            CreateRuleSpec::new("longport quote", "longport", ApiType::Rest, "quote_fields")
                .as_default(),
            &suggestions,
            &[0, 1, 2],
        )
        .await
        .unwrap();
    assert_eq!(rule.version, 1);
    assert_eq!(rule.overall_confidence, 1.0);

    let outcome = pipeline
        .transform(
            TransformRequest::new(
                "longport",
                ApiType::Rest,
                "quote_fields",
                json!({"symbol": "9988.HK", "last_done": "80.1", "volume": 300}),
            )
            .with_debug_info(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.rule_id, rule.id);
    assert!(!outcome.is_fallback);
    assert!(outcome.result.success);
    assert_eq!(
        outcome.result.transformed_data,
        json!({"symbol": "9988.HK", "lastDone": "80.1", "volume": 300})
    );
    assert_eq!(outcome.result.debug_info.as_ref().map(Vec::len), Some(3));

    let partial = pipeline
        .transform(TransformRequest::new(
            "longport",
            ApiType::Rest,
            "quote_fields",
            json!({"symbol": "1810.HK"}),
        ))
        .await
        .unwrap();
    assert!(!partial.result.success);
    assert_eq!(partial.result.mapping_stats.failed_mappings, 2);
    assert_eq!(partial.result.transformed_data, json!({"symbol": "1810.HK"}));

    let stored = pipeline.registry().find_by_id(&rule.id).await.unwrap();
    assert_eq!(stored.usage_count, 2);
    assert_eq!(stored.successful_transformations, 1);
    assert_eq!(stored.failed_transformations, 1);
    assert_eq!(stored.success_rate, 0.5);

    let response = serde_json::to_value(MappingRuleResponse::from(&stored)).unwrap();
    assert!(response.get("fingerprint").is_none());
    assert_eq!(response["usageCount"], json!(2));
}

#[tokio::test]
async fn default_promotion_and_versioning() {
    let pipeline = engine();
    let registry = pipeline.registry();

    let first = registry
        .create(
            CreateRuleSpec::new("v1", "futu", ApiType::Stream, "quote_fields")
                .with_mappings(vec![FieldMapping::new("code", "symbol")])
                .as_default()
                .with_confidence(0.6),
        )
        .await
        .unwrap();
    let second = registry
        .create(
            CreateRuleSpec::new("v2", "futu", ApiType::Stream, "quote_fields")
                .with_mappings(vec![FieldMapping::new("security.code", "symbol")])
                .as_default()
                .with_confidence(0.8),
        )
        .await
        .unwrap();

    let defaults = registry
        .count(&RuleFilter {
            provider: Some("futu".into()),
            is_default: Some(true),
            ..RuleFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(defaults, 1);

    let best = registry
        .find_best_matching("futu", ApiType::Stream, "quote_fields")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(best.id, second.id);

    let updated = registry
        .update(
            &first.id,
            RulePatch {
                field_mappings: Some(vec![FieldMapping::new("quote.code", "symbol")]),
                ..RulePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_ne!(updated.fingerprint, first.fingerprint);

    let renamed = registry
        .update(
            &first.id,
            RulePatch {
                name: Some("v1-renamed".into()),
                ..RulePatch::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(renamed.version, 2);

    registry.delete(&second.id).await.unwrap();
    assert!(matches!(
        registry.find_by_id(&second.id).await,
        Err(Error::NotFound(_))
    ));
}

#[tokio::test]
async fn batch_over_fallback_types() {
    let pipeline = engine();
    pipeline
        .registry()
        .create(
            CreateRuleSpec::new("quote", "longport", ApiType::Rest, "quote_fields")
                .with_mappings(vec![FieldMapping::new("symbol", "symbol")])
                .as_default(),
        )
        .await
        .unwrap();

    let requests = vec![
        TransformRequest::new("longport", ApiType::Rest, "quote_fields", json!({"symbol": "A"})),
        TransformRequest::new("longport", ApiType::Rest, "historical_fields", json!({"symbol": "B"})),
        TransformRequest::new("longport", ApiType::Rest, "not_a_type", json!({"symbol": "C"})),
    ];
    let batch = pipeline.transform_batch(requests).await.unwrap();

    assert_eq!(batch.received_count, 3);
    assert_eq!(batch.completed_count, 2);
    assert_eq!(batch.failed_count, 1);
    match &batch.items[1] {
        BatchItemOutcome::Completed(outcome) => {
            assert!(outcome.is_fallback);
            assert_eq!(outcome.requested_rule_type, "historical_fields");
            assert_eq!(outcome.effective_rule_type, "quote_fields");
            assert_eq!(outcome.result.transformed_data, json!({"symbol": "B"}));
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert!(matches!(
        batch.items[2],
        BatchItemOutcome::Failed(Error::UnsupportedType(_))
    ));
}
