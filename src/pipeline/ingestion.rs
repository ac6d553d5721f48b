//! Market data transformation pipeline.
//!
//! Coordinates one request end to end:
//! 1. Rule-type validation with fallback
//! 2. Best-matching rule resolution for the effective type
//! 3. Field mapping with usage statistics
//!
//! Batches run every item as a task on the [`TaskLimiter`] and report each
//! item in input order.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::extraction::transform::TransformationResult;
use crate::limiter::{ScheduleOutcome, TaskLimiter, TaskStatus};
use crate::logging::structured::LogContext;
use crate::registry::MappingRuleRegistry;
use crate::validation::validator::CapabilityValidator;
use crate::{log_debug, log_info, log_warn};

use super::context::{BatchContext, TransformRequest};

/// Output of one successful request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformOutcome {
    pub rule_id: String,
    pub requested_rule_type: String,
    /// The type the rule was resolved for; differs from the request when a
    /// fallback was taken.
    pub effective_rule_type: String,
    pub is_fallback: bool,
    pub warnings: Vec<String>,
    pub result: TransformationResult,
}

#[derive(Debug)]
pub enum BatchItemOutcome {
    Completed(TransformOutcome),
    Failed(Error),
    TimedOut,
    Dropped,
}

impl BatchItemOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, BatchItemOutcome::Completed(_))
    }
}

#[derive(Debug)]
pub struct BatchResult {
    pub batch_id: String,
    pub received_count: usize,
    pub completed_count: usize,
    pub failed_count: usize,
    pub timed_out_count: usize,
    pub dropped_count: usize,
    pub items: Vec<BatchItemOutcome>,
}

/// Cheap to clone; clones share the registry and the limiter.
#[derive(Clone)]
pub struct MarketDataPipeline {
    validator: Arc<CapabilityValidator>,
    registry: Arc<MappingRuleRegistry>,
    limiter: TaskLimiter,
}

impl MarketDataPipeline {
    pub fn new(
        validator: Arc<CapabilityValidator>,
        registry: Arc<MappingRuleRegistry>,
        limiter: TaskLimiter,
    ) -> Self {
        Self {
            validator,
            registry,
            limiter,
        }
    }

    pub fn registry(&self) -> &MappingRuleRegistry {
        &self.registry
    }

    pub fn limiter(&self) -> &TaskLimiter {
        &self.limiter
    }

    /// Normalize one payload.
    pub async fn transform(&self, request: TransformRequest) -> Result<TransformOutcome> {
        let ctx = request.log_context(&LogContext::generate("xform").request_id);
        self.transform_with_context(&request, &ctx).await
    }

    async fn transform_with_context(
        &self,
        request: &TransformRequest,
        ctx: &LogContext,
    ) -> Result<TransformOutcome> {
        log_debug!(ctx, "TRANSFORM_START", api_type = request.api_type);

        let validation = match self.validator.validate(&request.rule_list_type, &request.options) {
            Ok(v) => v,
            Err(e) => {
                log_warn!(ctx, "TRANSFORM_TYPE_REJECTED", error = e.to_string());
                return Err(e);
            }
        };
        if validation.is_fallback {
            log_info!(
                ctx,
                "TRANSFORM_FALLBACK",
                effective = validation.rule_type,
                warnings = validation.warnings
            );
        }

        let rule = self
            .registry
            .find_best_matching(&request.provider, request.api_type, &validation.rule_type)
            .await?
            .ok_or_else(|| Error::NoMatchingRule {
                provider: request.provider.clone(),
                api_type: request.api_type.to_string(),
                rule_list_type: validation.rule_type.clone(),
            })?;

        let result = self
            .registry
            .apply_rule(&rule, &request.raw_data, request.include_debug_info)
            .await;

        log_info!(
            ctx,
            "TRANSFORM_COMPLETE",
            rule_id = rule.id,
            success = result.success,
            success_rate = result.mapping_stats.success_rate
        );

        Ok(TransformOutcome {
            rule_id: rule.id,
            requested_rule_type: request.rule_list_type.clone(),
            effective_rule_type: validation.rule_type,
            is_fallback: validation.is_fallback,
            warnings: validation.warnings,
            result,
        })
    }

    /// Run every request through the limiter. Items the limiter sheds are
    /// reported as [`BatchItemOutcome::Dropped`] without being attempted.
    pub async fn transform_batch(&self, requests: Vec<TransformRequest>) -> Result<BatchResult> {
        if requests.is_empty() {
            return Err(Error::EmptyInput("no transform requests".into()));
        }
        if self.limiter.config().max_pending == 0 {
            return Err(Error::Config(
                "task limiter admits no running tasks; batch would never start".into(),
            ));
        }

        let batch = BatchContext::new();
        let received_count = requests.len();
        let mut admitted = Vec::with_capacity(received_count);

        for (index, request) in requests.into_iter().enumerate() {
            let ctx = batch.item_context(index, &request);
            let slot: Arc<Mutex<Option<TransformOutcome>>> = Arc::new(Mutex::new(None));
            let pipeline = self.clone();
            let filled = Arc::clone(&slot);

            let outcome = self.limiter.schedule(async move {
                let outcome = pipeline.transform_with_context(&request, &ctx).await?;
                *filled.lock() = Some(outcome);
                Ok(())
            });
            admitted.push((outcome, slot));
        }

        let mut items = Vec::with_capacity(received_count);
        for (outcome, slot) in admitted {
            let item = match outcome {
                ScheduleOutcome::Dropped => BatchItemOutcome::Dropped,
                ScheduleOutcome::Started(handle) | ScheduleOutcome::Queued(handle) => {
                    match handle.settled().await {
                        TaskStatus::Completed => match slot.lock().take() {
                            Some(done) => BatchItemOutcome::Completed(done),
                            None => BatchItemOutcome::Failed(Error::TaskAborted(
                                "task completed without output".into(),
                            )),
                        },
                        TaskStatus::Failed(e) => BatchItemOutcome::Failed(e),
                        TaskStatus::TimedOut => BatchItemOutcome::TimedOut,
                    }
                }
            };
            items.push(item);
        }

        let count = |pred: fn(&BatchItemOutcome) -> bool| items.iter().filter(|i| pred(i)).count();
        let result = BatchResult {
            batch_id: batch.batch_id.clone(),
            received_count,
            completed_count: count(|i| matches!(i, BatchItemOutcome::Completed(_))),
            failed_count: count(|i| matches!(i, BatchItemOutcome::Failed(_))),
            timed_out_count: count(|i| matches!(i, BatchItemOutcome::TimedOut)),
            dropped_count: count(|i| matches!(i, BatchItemOutcome::Dropped)),
            items,
        };

        log::info!(
            "[batch={}] BATCH_COMPLETE received={} completed={} failed={} timed_out={} dropped={}",
            result.batch_id,
            result.received_count,
            result.completed_count,
            result.failed_count,
            result.timed_out_count,
            result.dropped_count
        );
        Ok(result)
    }
}
