//! In-memory TTL cache for fused search responses.
//!
//! Caches the final fused, deduplicated response keyed by the
//! (normalised query text, model set, limit, fusion method) tuple. Uses
//! [`moka`] for async-friendly caching with automatic eviction. Only
//! text queries are cached; image queries always go to the backends.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use std::time::Duration;

use moka::future::Cache;

use crate::config::SearchConfig;
use crate::orchestrator::fusion::FusionMethod;
use crate::types::{SearchModel, SearchResponse};

/// Maximum number of cached responses.
const MAX_CACHE_ENTRIES: u64 = 100;

/// Global process-wide response cache.
///
/// Lazily initialised on first access. TTL is set when first created
/// and cannot be changed after initialisation.
static CACHE: OnceLock<Cache<CacheKey, SearchResponse>> = OnceLock::new();

/// Composite cache key for one plain-search request shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Lowercased, trimmed query text.
    query: String,
    /// Hash of the sorted model set, so different fan-out sets produce
    /// different entries.
    model_hash: u64,
    /// Requested result cap.
    limit: usize,
    /// Fusion method in effect.
    method: FusionMethod,
    /// Hash of the fusion constants and dedup window the response was
    /// computed under. Configs that differ only in tuning must not alias.
    tuning_hash: u64,
}

impl CacheKey {
    /// Build a deterministic cache key.
    ///
    /// The query is lowercased and trimmed; the model list is sorted and
    /// hashed so `[clip, beit3]` and `[beit3, clip]` produce the same key.
    /// The fusion constants (`rrf_k`, model weights) and the dedup frame
    /// window are hashed in because they change the computed scores.
    pub fn new(
        query: &str,
        models: &[SearchModel],
        limit: usize,
        method: FusionMethod,
        config: &SearchConfig,
    ) -> Self {
        Self {
            query: query.trim().to_lowercase(),
            model_hash: hash_models(models),
            limit,
            method,
            tuning_hash: hash_tuning(config),
        }
    }
}

fn get_or_init_cache(ttl_seconds: u64) -> &'static Cache<CacheKey, SearchResponse> {
    CACHE.get_or_init(|| {
        Cache::builder()
            .max_capacity(MAX_CACHE_ENTRIES)
            .time_to_live(Duration::from_secs(ttl_seconds))
            .build()
    })
}

/// Look up a cached response. Returns `None` on miss.
pub async fn get(key: &CacheKey, ttl_seconds: u64) -> Option<SearchResponse> {
    let cache = get_or_init_cache(ttl_seconds);
    cache.get(key).await
}

/// Insert a response into the cache.
pub async fn insert(key: CacheKey, response: SearchResponse, ttl_seconds: u64) {
    let cache = get_or_init_cache(ttl_seconds);
    cache.insert(key, response).await;
}

/// Hash of every config field that influences the fused scores.
fn hash_tuning(config: &SearchConfig) -> u64 {
    let mut hasher = DefaultHasher::new();
    config.fusion.rrf_k.hash(&mut hasher);
    for (model, weight) in &config.fusion.model_weights {
        model.name().hash(&mut hasher);
        weight.to_bits().hash(&mut hasher);
    }
    config.dedup_frame_window.hash(&mut hasher);
    hasher.finish()
}

/// Deterministic, order-independent hash of a model set.
fn hash_models(models: &[SearchModel]) -> u64 {
    let mut sorted: Vec<&SearchModel> = models.iter().collect();
    sorted.sort();
    let mut hasher = DefaultHasher::new();
    for model in sorted {
        model.name().hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RankedHit;

    fn key(
        query: &str,
        models: &[SearchModel],
        limit: usize,
        method: FusionMethod,
    ) -> CacheKey {
        CacheKey::new(query, models, limit, method, &SearchConfig::default())
    }

    fn response_with(id: &str) -> SearchResponse {
        SearchResponse {
            results: vec![RankedHit {
                id: id.to_string(),
                score: 1.0,
                source_models: vec![SearchModel::Clip],
                metadata: serde_json::Value::Null,
            }],
        }
    }

    #[test]
    fn cache_key_deterministic_for_same_inputs() {
        let key1 = key(
            "a red car",
            &[SearchModel::Clip, SearchModel::Beit3],
            20,
            FusionMethod::ReciprocalRank,
        );
        let key2 = key(
            "a red car",
            &[SearchModel::Clip, SearchModel::Beit3],
            20,
            FusionMethod::ReciprocalRank,
        );
        assert_eq!(key1, key2);
    }

    #[test]
    fn cache_key_same_for_reordered_models() {
        let key1 = key(
            "test",
            &[SearchModel::Clip, SearchModel::Beit3],
            20,
            FusionMethod::ReciprocalRank,
        );
        let key2 = key(
            "test",
            &[SearchModel::Beit3, SearchModel::Clip],
            20,
            FusionMethod::ReciprocalRank,
        );
        assert_eq!(key1, key2);
    }

    #[test]
    fn cache_key_normalises_query() {
        let key1 = key("  A Red CAR ", &[SearchModel::Clip], 20, FusionMethod::Rank);
        let key2 = key("a red car", &[SearchModel::Clip], 20, FusionMethod::Rank);
        assert_eq!(key1, key2);
    }

    #[test]
    fn cache_key_differs_by_limit_and_method() {
        let base = key("q", &[SearchModel::Clip], 20, FusionMethod::ReciprocalRank);
        assert_ne!(
            base,
            key("q", &[SearchModel::Clip], 10, FusionMethod::ReciprocalRank)
        );
        assert_ne!(
            base,
            key("q", &[SearchModel::Clip], 20, FusionMethod::Borda)
        );
    }

    #[test]
    fn cache_key_differs_by_fusion_tuning() {
        let base = key("q", &[SearchModel::Clip], 20, FusionMethod::ReciprocalRank);

        let mut config = SearchConfig::default();
        config.fusion.rrf_k = 1;
        assert_ne!(
            base,
            CacheKey::new(
                "q",
                &[SearchModel::Clip],
                20,
                FusionMethod::ReciprocalRank,
                &config
            )
        );

        let mut config = SearchConfig::default();
        config.fusion.model_weights.insert(SearchModel::Clip, 2.0);
        assert_ne!(
            base,
            CacheKey::new(
                "q",
                &[SearchModel::Clip],
                20,
                FusionMethod::ReciprocalRank,
                &config
            )
        );

        let config = SearchConfig {
            dedup_frame_window: 5,
            ..Default::default()
        };
        assert_ne!(
            base,
            CacheKey::new(
                "q",
                &[SearchModel::Clip],
                20,
                FusionMethod::ReciprocalRank,
                &config
            )
        );
    }

    #[test]
    fn cache_key_differs_by_model_set() {
        let key1 = key("q", &[SearchModel::Clip], 20, FusionMethod::Rank);
        let key2 = key("q", &[SearchModel::Beit3], 20, FusionMethod::Rank);
        assert_ne!(key1, key2);
    }

    #[tokio::test]
    async fn cache_miss_returns_none() {
        let key = key(
            "cache_test_never_inserted_xyz",
            &[SearchModel::Clip],
            20,
            FusionMethod::Rank,
        );
        assert!(get(&key, 600).await.is_none());
    }

    #[tokio::test]
    async fn cache_insert_and_retrieve() {
        let key = key(
            "cache_test_insert_retrieve",
            &[SearchModel::Clip],
            20,
            FusionMethod::ReciprocalRank,
        );
        insert(key.clone(), response_with("L21_V001/5"), 600).await;

        let cached = get(&key, 600).await.expect("should be cached");
        assert_eq!(cached.results.len(), 1);
        assert_eq!(cached.results[0].id, "L21_V001/5");
    }

    #[tokio::test]
    async fn overwrite_same_key_updates_value() {
        let key = key(
            "cache_test_overwrite",
            &[SearchModel::LongClip],
            20,
            FusionMethod::ReciprocalRank,
        );
        insert(key.clone(), response_with("old/1"), 600).await;
        insert(key.clone(), response_with("new/2"), 600).await;

        let cached = get(&key, 600).await.expect("should be cached");
        assert_eq!(cached.results[0].id, "new/2");
    }

    #[test]
    fn model_hash_order_independent() {
        let hash1 = hash_models(&[SearchModel::Clip, SearchModel::Beit3]);
        let hash2 = hash_models(&[SearchModel::Beit3, SearchModel::Clip]);
        assert_eq!(hash1, hash2);
    }
}
