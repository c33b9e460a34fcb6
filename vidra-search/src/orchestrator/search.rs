//! Core plain-search pipeline: encode, concurrent fan-out, fuse, dedup.
//!
//! Encodes the query once per selected model, fans the embeddings out to
//! the backends concurrently under time bounds, fuses the per-model
//! ranked lists with the configured method, collapses near-duplicates,
//! and truncates to the requested maximum.

use futures::future::join_all;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendRegistry;
use crate::cache::{self, CacheKey};
use crate::config::SearchConfig;
use crate::dispatch::dispatch;
use crate::error::{Result, SearchError};
use crate::types::{RankedHit, SearchModel, SearchRequest, SearchResponse};

use super::dedup::dedup;
use super::fusion::fuse;

/// Orchestrate one plain search across the selected backends.
///
/// # Pipeline
///
/// 1. Resolve the model selector against the registry and enabled set
/// 2. Serve from the response cache when possible (text queries only)
/// 3. Encode the query per model concurrently; per-model failures are
///    absorbed unless every encode fails
/// 4. Fan out with [`dispatch`] under per-backend and global deadlines
/// 5. Fuse per-model ranked lists with the configured method
/// 6. Deduplicate, preserving the fused order
/// 7. Cache and return
///
/// # Errors
///
/// [`SearchError::InvalidConfig`] for an unsatisfiable model selector or
/// zero limit, [`SearchError::EncodingFailed`] if no model produced a
/// query embedding, [`SearchError::AllBackendsFailed`] if every backend
/// failed. Partial failures are logged and absorbed.
pub async fn orchestrate_search(
    request: &SearchRequest,
    registry: &BackendRegistry,
    config: &SearchConfig,
    cancel: &CancellationToken,
) -> Result<SearchResponse> {
    let method = request.fusion_method.unwrap_or(config.fusion.method);
    let limit = request.limit.unwrap_or(config.max_results);
    if limit == 0 {
        return Err(SearchError::InvalidConfig(
            "limit must be greater than 0".into(),
        ));
    }

    let models = registry.select(&request.models, config);
    if models.is_empty() {
        return Err(SearchError::InvalidConfig(
            "no enabled backend matches the requested models".into(),
        ));
    }

    let cache_key = request.query.as_text().and_then(|text| {
        (config.cache_ttl_seconds > 0)
            .then(|| CacheKey::new(text, &models, limit, method, config))
    });
    if let Some(key) = &cache_key {
        if let Some(cached) = cache::get(key, config.cache_ttl_seconds).await {
            tracing::debug!(models = models.len(), "serving fused response from cache");
            return Ok(cached);
        }
    }

    let deadline = Instant::now() + std::time::Duration::from_millis(config.global_deadline_ms);

    // 3. One embedding per model; each backend owns its vector space.
    let encodes = join_all(models.iter().map(|model| {
        let backend = registry.get(*model).cloned();
        async move {
            match backend {
                Some(backend) => (*model, backend.encoder.encode(&request.query).await),
                None => (
                    *model,
                    Err(SearchError::InvalidConfig(format!(
                        "no backend registered for {model}"
                    ))),
                ),
            }
        }
    }))
    .await;

    let mut embeddings: Vec<(SearchModel, Vec<f32>)> = Vec::with_capacity(encodes.len());
    let mut encode_errors: Vec<String> = Vec::new();
    for (model, outcome) in encodes {
        match outcome {
            Ok(embedding) => embeddings.push((model, embedding)),
            Err(err) => {
                tracing::warn!(%model, error = %err, "query encoding failed for model");
                encode_errors.push(format!("{model}: {err}"));
            }
        }
    }
    if embeddings.is_empty() {
        return Err(SearchError::EncodingFailed(encode_errors.join("; ")));
    }

    let per_model = dispatch(registry, &embeddings, limit, config, deadline, cancel).await?;

    let fused = fuse(&per_model, method, limit, &config.fusion);
    let deduped = dedup(fused, config.dedup_frame_window);

    let response = SearchResponse {
        results: deduped
            .into_iter()
            .map(|candidate| RankedHit {
                id: candidate.id.clone(),
                score: candidate.combined,
                source_models: candidate.source_models(),
                metadata: candidate.best.metadata.clone(),
            })
            .collect(),
    };
    tracing::debug!(
        results = response.results.len(),
        %method,
        "search pipeline complete"
    );

    if let Some(key) = cache_key {
        cache::insert(key, response.clone(), config.cache_ttl_seconds).await;
    }
    Ok(response)
}
