//! Search configuration with sensible defaults.
//!
//! [`SearchConfig`] controls which backends are enabled, time budgets,
//! fusion behaviour, deduplication, and temporal-search windows. It is
//! built once and passed as an immutable value into the pipeline; nothing
//! in this crate mutates it after construction.

use std::collections::BTreeMap;

use crate::error::SearchError;
use crate::orchestrator::fusion::FusionMethod;
use crate::types::SearchModel;

/// Fusion-engine settings.
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// Which fusion algorithm combines per-model ranked lists.
    pub method: FusionMethod,
    /// The `k` constant in the reciprocal-rank formula `1 / (k + rank)`.
    pub rrf_k: u32,
    /// Per-model priority weights for the `weighted` method. Models absent
    /// from this map fall back to [`SearchModel::priority`].
    pub model_weights: BTreeMap<SearchModel, f64>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            method: FusionMethod::ReciprocalRank,
            rrf_k: 60,
            model_weights: BTreeMap::new(),
        }
    }
}

/// Temporal-search defaults, overridable per request.
#[derive(Debug, Clone)]
pub struct TemporalConfig {
    /// Frame candidates retrieved per sentence before sequence matching.
    pub topk_per_sentence: usize,
    /// Cap on the number of videos evaluated by the sequence matcher.
    pub max_candidate_videos: usize,
    /// Minimum frame-index gap between consecutive sentence matches.
    /// Must be at least 1 so that matched sequences strictly increase.
    pub w_min: u32,
    /// Maximum frame-index gap between consecutive sentence matches.
    /// `None` leaves the gap unbounded above.
    pub w_max: Option<u32>,
    /// When true (the default), candidate videos are drawn from every
    /// sentence's shortlist; when false, only from sentence 0's.
    pub candidates_from_all_sentences: bool,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            topk_per_sentence: 200,
            max_candidate_videos: 30,
            w_min: 1,
            w_max: None,
            candidates_from_all_sentences: true,
        }
    }
}

/// Configuration for the search orchestration engine.
///
/// Use [`Default::default()`] for sensible defaults, or construct with
/// field overrides for custom behaviour.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Which models are enabled. A registered backend whose model is not
    /// listed here is never queried.
    pub models: Vec<SearchModel>,
    /// Maximum number of results returned after fusion and deduplication.
    pub max_results: usize,
    /// Per-backend search time budget in milliseconds.
    pub per_backend_timeout_ms: u64,
    /// Global deadline for one request's backend fan-out in milliseconds.
    /// The effective per-backend budget is the tighter of this and
    /// `per_backend_timeout_ms`.
    pub global_deadline_ms: u64,
    /// How long to cache fused responses in seconds. 0 disables caching.
    pub cache_ttl_seconds: u64,
    /// Fusion-engine settings.
    pub fusion: FusionConfig,
    /// Frames within this index distance in the same video are collapsed
    /// by the deduplication filter. 0 disables frame-proximity dedup
    /// (exact duplicate keys are always collapsed).
    pub dedup_frame_window: u32,
    /// Temporal-search defaults.
    pub temporal: TemporalConfig,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            models: vec![
                SearchModel::Clip,
                SearchModel::LongClip,
                SearchModel::Beit3,
            ],
            max_results: 20,
            per_backend_timeout_ms: 3_000,
            global_deadline_ms: 8_000,
            cache_ttl_seconds: 600,
            fusion: FusionConfig::default(),
            dedup_frame_window: 0,
            temporal: TemporalConfig::default(),
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `models` must not be empty
    /// - `max_results` and timeouts must be greater than 0
    /// - `fusion.rrf_k` must be greater than 0; weights must be positive
    /// - `temporal.w_min` must be at least 1 and not exceed `w_max`
    /// - temporal shortlist and candidate caps must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.models.is_empty() {
            return Err(SearchError::InvalidConfig(
                "at least one model must be enabled".into(),
            ));
        }
        if self.max_results == 0 {
            return Err(SearchError::InvalidConfig(
                "max_results must be greater than 0".into(),
            ));
        }
        if self.per_backend_timeout_ms == 0 {
            return Err(SearchError::InvalidConfig(
                "per_backend_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.global_deadline_ms == 0 {
            return Err(SearchError::InvalidConfig(
                "global_deadline_ms must be greater than 0".into(),
            ));
        }
        if self.fusion.rrf_k == 0 {
            return Err(SearchError::InvalidConfig(
                "fusion.rrf_k must be greater than 0".into(),
            ));
        }
        if let Some((model, weight)) = self
            .fusion
            .model_weights
            .iter()
            .find(|(_, w)| !w.is_finite() || **w <= 0.0)
        {
            return Err(SearchError::InvalidConfig(format!(
                "fusion weight for {model} must be a positive number, got {weight}"
            )));
        }
        self.validate_window(self.temporal.w_min, self.temporal.w_max)?;
        if self.temporal.topk_per_sentence == 0 {
            return Err(SearchError::InvalidConfig(
                "temporal.topk_per_sentence must be greater than 0".into(),
            ));
        }
        if self.temporal.max_candidate_videos == 0 {
            return Err(SearchError::InvalidConfig(
                "temporal.max_candidate_videos must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Validates a temporal window, shared between config validation and
    /// per-request overrides.
    pub fn validate_window(&self, w_min: u32, w_max: Option<u32>) -> Result<(), SearchError> {
        if w_min == 0 {
            return Err(SearchError::InvalidConfig(
                "w_min must be at least 1 so frame sequences strictly increase".into(),
            ));
        }
        if let Some(w_max) = w_max {
            if w_min > w_max {
                return Err(SearchError::InvalidConfig(format!(
                    "w_min ({w_min}) must be <= w_max ({w_max})"
                )));
            }
        }
        Ok(())
    }
}
