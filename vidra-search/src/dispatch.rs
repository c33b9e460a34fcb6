//! Concurrent, bounded fan-out of one query embedding per backend.
//!
//! Launches one search task per backend that is both enabled and has a
//! supplied embedding. Every task is bounded by the per-backend timeout
//! and the request's global deadline, whichever is tighter, and aborts
//! promptly when the caller's cancellation token fires. Single-backend
//! failures are absorbed and logged; only a total wipeout is an error.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::{BackendRegistry, VectorSearchBackend};
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::types::{SearchModel, SearchResult};

/// Fan a query out to every backend with a supplied embedding.
///
/// Returns one ranked list per backend that answered in time. Backends
/// that time out or fail are omitted from the map; this is recoverable
/// and logged at warn level.
///
/// # Errors
///
/// Returns [`SearchError::AllBackendsFailed`] if **zero** backends
/// produce a usable result.
pub async fn dispatch(
    registry: &BackendRegistry,
    embeddings: &[(SearchModel, Vec<f32>)],
    k: usize,
    config: &SearchConfig,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<HashMap<SearchModel, Vec<SearchResult>>> {
    let jobs: Vec<_> = embeddings
        .iter()
        .filter_map(|(model, embedding)| {
            registry
                .get(*model)
                .map(|backend| (*model, backend.index.clone(), embedding.as_slice()))
        })
        .collect();

    if jobs.is_empty() {
        return Err(SearchError::AllBackendsFailed(
            "no backend had a usable query embedding".into(),
        ));
    }

    let per_backend = Duration::from_millis(config.per_backend_timeout_ms);
    let futures: Vec<_> = jobs
        .into_iter()
        .map(|(model, index, embedding)| {
            let cancel = cancel.clone();
            async move {
                let outcome = search_with_budget(
                    index.as_ref(),
                    model,
                    embedding,
                    k,
                    per_backend,
                    deadline,
                    &cancel,
                )
                .await;
                (model, outcome)
            }
        })
        .collect();

    let outcomes = futures::future::join_all(futures).await;

    let mut per_model: HashMap<SearchModel, Vec<SearchResult>> = HashMap::new();
    let mut errors: Vec<String> = Vec::new();

    for (model, outcome) in outcomes {
        match outcome {
            Ok(results) => {
                tracing::debug!(%model, count = results.len(), "backend returned results");
                per_model.insert(model, results);
            }
            Err(err) => {
                tracing::warn!(%model, error = %err, "backend search failed");
                errors.push(format!("{model}: {err}"));
            }
        }
    }

    if per_model.is_empty() {
        return Err(SearchError::AllBackendsFailed(errors.join("; ")));
    }

    Ok(per_model)
}

/// Run a single backend search under its time budget and the caller's
/// cancellation token.
///
/// The effective budget is the smaller of `per_backend` and the time
/// remaining until `deadline`. Also used by the temporal pipeline for
/// its per-sentence shortlist retrieval.
pub(crate) async fn search_with_budget(
    index: &dyn VectorSearchBackend,
    model: SearchModel,
    embedding: &[f32],
    k: usize,
    per_backend: Duration,
    deadline: Instant,
    cancel: &CancellationToken,
) -> Result<Vec<SearchResult>> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    let budget = per_backend.min(remaining);
    if budget.is_zero() {
        return Err(SearchError::BackendTimeout { model });
    }

    let hits = tokio::select! {
        _ = cancel.cancelled() => {
            return Err(SearchError::BackendTimeout { model });
        }
        outcome = tokio::time::timeout(budget, index.search(embedding, k)) => match outcome {
            Ok(inner) => inner?,
            Err(_) => return Err(SearchError::BackendTimeout { model }),
        },
    };

    // Ids must be unique within one backend's list; keep first occurrence.
    let mut seen: HashSet<String> = HashSet::with_capacity(hits.len());
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
        if !seen.insert(hit.id.clone()) {
            tracing::debug!(%model, id = %hit.id, "dropping duplicate id within backend list");
            continue;
        }
        results.push(SearchResult {
            id: hit.id,
            score: hit.score,
            model,
            rank: results.len() + 1,
            metadata: hit.metadata,
        });
    }
    Ok(results)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::backend::test_support::{hit, StaticBackend, StaticEncoder};
    use crate::types::BackendHit;

    fn registry(entries: Vec<(SearchModel, StaticBackend)>) -> BackendRegistry {
        let mut builder = BackendRegistry::builder();
        for (model, backend) in entries {
            builder = builder.register(
                model,
                Arc::new(StaticEncoder::new(vec![0.5; 4])),
                Arc::new(backend),
            );
        }
        builder.build()
    }

    fn embedding_for(models: &[SearchModel]) -> Vec<(SearchModel, Vec<f32>)> {
        models.iter().map(|m| (*m, vec![0.5; 4])).collect()
    }

    fn deadline_in(ms: u64) -> Instant {
        Instant::now() + Duration::from_millis(ms)
    }

    #[tokio::test]
    async fn collects_results_from_all_backends() {
        let registry = registry(vec![
            (
                SearchModel::Clip,
                StaticBackend::new(SearchModel::Clip, vec![hit("v/1", 0.9), hit("v/2", 0.7)]),
            ),
            (
                SearchModel::Beit3,
                StaticBackend::new(SearchModel::Beit3, vec![hit("v/3", 0.8)]),
            ),
        ]);
        let config = SearchConfig::default();
        let cancel = CancellationToken::new();

        let per_model = dispatch(
            &registry,
            &embedding_for(&[SearchModel::Clip, SearchModel::Beit3]),
            10,
            &config,
            deadline_in(5_000),
            &cancel,
        )
        .await
        .expect("dispatch should succeed");

        assert_eq!(per_model.len(), 2);
        assert_eq!(per_model[&SearchModel::Clip].len(), 2);
        assert_eq!(per_model[&SearchModel::Clip][0].rank, 1);
        assert_eq!(per_model[&SearchModel::Clip][1].rank, 2);
        assert_eq!(per_model[&SearchModel::Beit3][0].id, "v/3");
    }

    #[tokio::test]
    async fn one_failing_backend_is_omitted() {
        let registry = registry(vec![
            (
                SearchModel::Clip,
                StaticBackend::new(SearchModel::Clip, vec![hit("v/1", 0.9)]),
            ),
            (SearchModel::Beit3, StaticBackend::failing(SearchModel::Beit3)),
        ]);
        let config = SearchConfig::default();
        let cancel = CancellationToken::new();

        let per_model = dispatch(
            &registry,
            &embedding_for(&[SearchModel::Clip, SearchModel::Beit3]),
            10,
            &config,
            deadline_in(5_000),
            &cancel,
        )
        .await
        .expect("partial failure is recoverable");

        assert_eq!(per_model.len(), 1);
        assert!(per_model.contains_key(&SearchModel::Clip));
        assert!(!per_model.contains_key(&SearchModel::Beit3));
    }

    #[tokio::test]
    async fn all_backends_failing_is_fatal() {
        let registry = registry(vec![
            (SearchModel::Clip, StaticBackend::failing(SearchModel::Clip)),
            (SearchModel::Beit3, StaticBackend::failing(SearchModel::Beit3)),
        ]);
        let config = SearchConfig::default();
        let cancel = CancellationToken::new();

        let err = dispatch(
            &registry,
            &embedding_for(&[SearchModel::Clip, SearchModel::Beit3]),
            10,
            &config,
            deadline_in(5_000),
            &cancel,
        )
        .await
        .unwrap_err();

        match err {
            SearchError::AllBackendsFailed(detail) => {
                assert!(detail.contains("clip"));
                assert!(detail.contains("beit3"));
            }
            other => panic!("expected AllBackendsFailed, got {other}"),
        }
    }

    #[tokio::test]
    async fn slow_backend_times_out_and_is_omitted() {
        let registry = registry(vec![
            (
                SearchModel::Clip,
                StaticBackend::new(SearchModel::Clip, vec![hit("v/1", 0.9)]),
            ),
            (
                SearchModel::Beit3,
                StaticBackend::slow(SearchModel::Beit3, vec![hit("v/2", 0.8)], 60_000),
            ),
        ]);
        let mut config = SearchConfig::default();
        config.per_backend_timeout_ms = 100;
        let cancel = CancellationToken::new();

        let per_model = dispatch(
            &registry,
            &embedding_for(&[SearchModel::Clip, SearchModel::Beit3]),
            10,
            &config,
            deadline_in(5_000),
            &cancel,
        )
        .await
        .expect("surviving backend keeps the request alive");

        assert_eq!(per_model.len(), 1);
        assert!(per_model.contains_key(&SearchModel::Clip));
    }

    #[tokio::test]
    async fn expired_deadline_fails_without_calling_backends() {
        let registry = registry(vec![(
            SearchModel::Clip,
            StaticBackend::new(SearchModel::Clip, vec![hit("v/1", 0.9)]),
        )]);
        let config = SearchConfig::default();
        let cancel = CancellationToken::new();

        let err = dispatch(
            &registry,
            &embedding_for(&[SearchModel::Clip]),
            10,
            &config,
            Instant::now(),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SearchError::AllBackendsFailed(_)));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_backends() {
        let registry = registry(vec![(
            SearchModel::Clip,
            StaticBackend::slow(SearchModel::Clip, vec![hit("v/1", 0.9)], 10_000),
        )]);
        let config = SearchConfig::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = dispatch(
            &registry,
            &embedding_for(&[SearchModel::Clip]),
            10,
            &config,
            deadline_in(60_000),
            &cancel,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SearchError::AllBackendsFailed(_)));
    }

    #[tokio::test]
    async fn no_embeddings_is_all_backends_failed() {
        let registry = registry(vec![(
            SearchModel::Clip,
            StaticBackend::new(SearchModel::Clip, vec![hit("v/1", 0.9)]),
        )]);
        let config = SearchConfig::default();
        let cancel = CancellationToken::new();

        let err = dispatch(&registry, &[], 10, &config, deadline_in(5_000), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::AllBackendsFailed(_)));
    }

    #[tokio::test]
    async fn duplicate_ids_within_one_backend_are_collapsed() {
        let hits = vec![
            BackendHit {
                id: "v/1".into(),
                score: 0.9,
                metadata: serde_json::Value::Null,
            },
            BackendHit {
                id: "v/1".into(),
                score: 0.4,
                metadata: serde_json::Value::Null,
            },
            BackendHit {
                id: "v/2".into(),
                score: 0.3,
                metadata: serde_json::Value::Null,
            },
        ];
        let registry = registry(vec![(
            SearchModel::Clip,
            StaticBackend::new(SearchModel::Clip, hits),
        )]);
        let config = SearchConfig::default();
        let cancel = CancellationToken::new();

        let per_model = dispatch(
            &registry,
            &embedding_for(&[SearchModel::Clip]),
            10,
            &config,
            deadline_in(5_000),
            &cancel,
        )
        .await
        .expect("dispatch should succeed");

        let results = &per_model[&SearchModel::Clip];
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, "v/1");
        assert!((results[0].score - 0.9).abs() < f64::EPSILON);
        assert_eq!(results[1].id, "v/2");
        assert_eq!(results[1].rank, 2);
    }
}
