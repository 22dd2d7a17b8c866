//! Wide-event builder: the mutable, guarded wrapper around
//! [`vigil_types::wide_event::WideEvent`], plus the tail-sampling decision
//! applied once a wide event ends.

use std::collections::HashSet;

use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use vigil_types::context::CorrelationContext;
use vigil_types::error::SerializedError;
use vigil_types::wide_event::{WideEvent, WideEventStatus};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum WideEventError {
    #[error("wide event has already ended; mutation is no longer permitted")]
    AlreadyEnded,
}

/// Accumulates categorized fields over the lifetime of a unit of work,
/// then freezes at `end()`. Every mutator after that point returns
/// [`WideEventError::AlreadyEnded`] rather than panicking.
pub struct WideEventBuilder {
    inner: Mutex<WideEvent>,
}

impl WideEventBuilder {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self { inner: Mutex::new(WideEvent::new(event_type, Utc::now())) }
    }

    pub fn set(&self, category: impl Into<String>, key: impl Into<String>, value: impl Into<Value>) -> Result<(), WideEventError> {
        let mut event = self.inner.lock();
        if event.is_ended() {
            return Err(WideEventError::AlreadyEnded);
        }
        event.fields.entry(category.into()).or_default().insert(key.into(), value.into());
        Ok(())
    }

    pub fn get(&self, category: &str, key: &str) -> Option<Value> {
        self.inner.lock().fields.get(category).and_then(|m| m.get(key)).cloned()
    }

    pub fn merge(&self, category: impl Into<String>, fields: IndexMap<String, Value>) -> Result<(), WideEventError> {
        let mut event = self.inner.lock();
        if event.is_ended() {
            return Err(WideEventError::AlreadyEnded);
        }
        event.fields.entry(category.into()).or_default().extend(fields);
        Ok(())
    }

    pub fn merge_all(&self, fields_by_category: IndexMap<String, IndexMap<String, Value>>) -> Result<(), WideEventError> {
        let mut event = self.inner.lock();
        if event.is_ended() {
            return Err(WideEventError::AlreadyEnded);
        }
        for (category, fields) in fields_by_category {
            event.fields.entry(category).or_default().extend(fields);
        }
        Ok(())
    }

    pub fn set_context(&self, context: CorrelationContext) -> Result<(), WideEventError> {
        let mut event = self.inner.lock();
        if event.is_ended() {
            return Err(WideEventError::AlreadyEnded);
        }
        event.context = Some(context);
        Ok(())
    }

    pub fn get_context(&self) -> Option<CorrelationContext> {
        self.inner.lock().context.clone()
    }

    pub fn get_fields(&self) -> IndexMap<String, IndexMap<String, Value>> {
        self.inner.lock().fields.clone()
    }

    pub fn is_ended(&self) -> bool {
        self.inner.lock().is_ended()
    }

    /// Freeze the event, recording `ended_at`/`duration_ms`/`status`/`error`,
    /// and return a snapshot of the final state.
    pub fn end(&self, status: Option<WideEventStatus>, error: Option<SerializedError>) -> Result<WideEvent, WideEventError> {
        let mut event = self.inner.lock();
        if event.is_ended() {
            return Err(WideEventError::AlreadyEnded);
        }
        let now = Utc::now();
        event.ended_at = Some(now);
        event.duration_ms = Some((now - event.started_at).num_milliseconds());
        event.status = status;
        event.error = error;
        Ok(event.clone())
    }

    /// Flatten to dotted `category.key` metadata, for emission through the
    /// logger pipeline. Valid before or after `end()`.
    pub fn to_metadata(&self) -> IndexMap<String, Value> {
        self.inner.lock().to_metadata()
    }
}

/// Configuration for [`tail_sample`].
#[derive(Debug, Clone)]
pub struct TailSamplingConfig {
    pub always_keep_statuses: Vec<WideEventStatus>,
    pub slow_threshold_ms: Option<i64>,
    pub vip_user_ids: HashSet<String>,
    /// Dot-path (`category.key`) to the subscription-tier field.
    pub vip_tier_path: String,
    pub vip_tiers: HashSet<String>,
    pub success_sample_rate: f64,
}

impl Default for TailSamplingConfig {
    fn default() -> Self {
        Self {
            always_keep_statuses: vec![WideEventStatus::Error],
            slow_threshold_ms: None,
            vip_user_ids: HashSet::new(),
            vip_tier_path: "user.subscription".to_string(),
            vip_tiers: HashSet::new(),
            success_sample_rate: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailSampleReason {
    AlwaysKeepStatus,
    SlowThreshold,
    VipUser,
    VipTier,
    Probabilistic,
}

#[derive(Debug, Clone, Copy)]
pub struct TailSampleDecision {
    pub keep: bool,
    pub reason: TailSampleReason,
}

/// Decide whether an ended wide event survives sampling. Checked in the
/// fixed order the always-keep statuses, slow threshold, VIP user, VIP
/// tier, and finally a coin flip weighted by `success_sample_rate`.
pub fn tail_sample(event: &WideEvent, config: &TailSamplingConfig) -> TailSampleDecision {
    if let Some(status) = &event.status {
        if config.always_keep_statuses.contains(status) {
            return TailSampleDecision { keep: true, reason: TailSampleReason::AlwaysKeepStatus };
        }
    }

    if let (Some(threshold), Some(duration)) = (config.slow_threshold_ms, event.duration_ms) {
        if duration >= threshold {
            return TailSampleDecision { keep: true, reason: TailSampleReason::SlowThreshold };
        }
    }

    if let Some(user_id) = event.context.as_ref().and_then(|ctx| ctx.user_id()) {
        if config.vip_user_ids.contains(user_id) {
            return TailSampleDecision { keep: true, reason: TailSampleReason::VipUser };
        }
    }

    if let Some((category, key)) = config.vip_tier_path.split_once('.') {
        if let Some(tier) = event.fields.get(category).and_then(|m| m.get(key)).and_then(Value::as_str) {
            if config.vip_tiers.contains(tier) {
                return TailSampleDecision { keep: true, reason: TailSampleReason::VipTier };
            }
        }
    }

    TailSampleDecision { keep: rand::random::<f64>() < config.success_sample_rate, reason: TailSampleReason::Probabilistic }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn mutators_after_end_are_rejected() {
        let builder = WideEventBuilder::new("http.request");
        builder.end(Some(WideEventStatus::Success), None).unwrap();
        assert_eq!(builder.set("a", "b", json!(1)), Err(WideEventError::AlreadyEnded));
        assert_eq!(builder.end(None, None).unwrap_err(), WideEventError::AlreadyEnded);
    }

    #[test]
    fn end_computes_duration_and_freezes_status() {
        let builder = WideEventBuilder::new("job.run");
        builder.set("request", "method", json!("GET")).unwrap();
        let event = builder.end(Some(WideEventStatus::Success), None).unwrap();
        assert!(event.duration_ms.unwrap() >= 0);
        assert_eq!(event.status, Some(WideEventStatus::Success));
    }

    #[test]
    fn to_metadata_is_available_before_and_after_end() {
        let builder = WideEventBuilder::new("job.run");
        builder.set("request", "method", json!("GET")).unwrap();
        assert_eq!(builder.to_metadata().get("request.method"), Some(&json!("GET")));
        builder.end(None, None).unwrap();
        assert_eq!(builder.to_metadata().get("request.method"), Some(&json!("GET")));
    }

    fn sample_event(status: Option<WideEventStatus>, duration_ms: Option<i64>) -> WideEvent {
        let mut event = WideEvent::new("op", Utc::now());
        event.status = status;
        event.duration_ms = duration_ms;
        event
    }

    #[test]
    fn error_status_is_always_kept() {
        let config = TailSamplingConfig { success_sample_rate: 0.0, ..TailSamplingConfig::default() };
        let decision = tail_sample(&sample_event(Some(WideEventStatus::Error), Some(1)), &config);
        assert!(decision.keep);
        assert_eq!(decision.reason, TailSampleReason::AlwaysKeepStatus);
    }

    #[test]
    fn slow_duration_is_kept_even_at_zero_sample_rate() {
        let config = TailSamplingConfig { slow_threshold_ms: Some(500), success_sample_rate: 0.0, ..TailSamplingConfig::default() };
        let decision = tail_sample(&sample_event(Some(WideEventStatus::Success), Some(900)), &config);
        assert!(decision.keep);
        assert_eq!(decision.reason, TailSampleReason::SlowThreshold);
    }

    #[test]
    fn fast_success_falls_through_to_probabilistic() {
        let config = TailSamplingConfig { success_sample_rate: 0.0, ..TailSamplingConfig::default() };
        let decision = tail_sample(&sample_event(Some(WideEventStatus::Success), Some(1)), &config);
        assert!(!decision.keep);
        assert_eq!(decision.reason, TailSampleReason::Probabilistic);
    }

    #[test]
    fn vip_tier_field_is_kept() {
        let mut config = TailSamplingConfig { success_sample_rate: 0.0, ..TailSamplingConfig::default() };
        config.vip_tiers.insert("enterprise".to_string());
        let mut event = sample_event(Some(WideEventStatus::Success), Some(1));
        event.fields.entry("user".to_string()).or_default().insert("subscription".to_string(), json!("enterprise"));
        let decision = tail_sample(&event, &config);
        assert!(decision.keep);
        assert_eq!(decision.reason, TailSampleReason::VipTier);
    }
}
