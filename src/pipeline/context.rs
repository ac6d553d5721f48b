//! Request and batch context.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::logging::structured::LogContext;
use crate::registry::rule::ApiType;
use crate::validation::validator::ValidationOptions;

/// One raw provider payload to normalize.
#[derive(Debug, Clone)]
pub struct TransformRequest {
    pub provider: String,
    pub api_type: ApiType,
    pub rule_list_type: String,
    pub raw_data: Value,
    pub include_debug_info: bool,
    pub options: ValidationOptions,
}

impl TransformRequest {
    pub fn new(provider: &str, api_type: ApiType, rule_list_type: &str, raw_data: Value) -> Self {
        Self {
            provider: provider.to_string(),
            api_type,
            rule_list_type: rule_list_type.to_string(),
            raw_data,
            include_debug_info: false,
            options: ValidationOptions::default(),
        }
    }

    pub fn with_debug_info(mut self) -> Self {
        self.include_debug_info = true;
        self
    }

    pub fn with_options(mut self, options: ValidationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn log_context(&self, request_id: &str) -> LogContext {
        LogContext::new(request_id)
            .with_provider(&self.provider)
            .with_rule_type(&self.rule_list_type)
    }
}

/// Context for a batch of requests.
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub batch_id: String,
    pub started_at: DateTime<Utc>,
}

impl BatchContext {
    pub fn new() -> Self {
        Self {
            batch_id: format!("batch-{}", &Uuid::new_v4().simple().to_string()[..8]),
            started_at: Utc::now(),
        }
    }

    /// Log context for the item at `index`.
    pub fn item_context(&self, index: usize, request: &TransformRequest) -> LogContext {
        request.log_context(&format!("{}#{}", self.batch_id, index))
    }
}

impl Default for BatchContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_context() {
        let ctx = BatchContext::new();
        assert!(ctx.batch_id.starts_with("batch-"));
        assert_eq!(ctx.batch_id.len(), "batch-".len() + 8);

        let request = TransformRequest::new("longport", ApiType::Rest, "quote_fields", json!({}));
        let item = ctx.item_context(3, &request);
        assert_eq!(
            item.to_string(),
            format!("[req={}#3] [provider=longport] [type=quote_fields]", ctx.batch_id)
        );
    }

    #[test]
    fn test_request_defaults() {
        let request = TransformRequest::new("p", ApiType::Stream, "quote_fields", json!(null));
        assert!(!request.include_debug_info);
        assert!(request.options.allow_fallback);
        assert!(request.with_debug_info().include_debug_info);
    }
}
