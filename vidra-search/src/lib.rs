//! # vidra-search
//!
//! Search orchestration and temporal sequence matching for Vidra's video
//! frame retrieval. This crate fans a query out to multiple
//! embedding-model/vector-index backends concurrently under time bounds,
//! fuses their ranked lists with a configurable strategy, and answers
//! multi-sentence temporal queries by stitching per-sentence frame
//! candidates into window-constrained sequences via dynamic programming.
//!
//! ## Design
//!
//! - Backends and embedding providers are external collaborators behind
//!   trait objects; this crate owns only orchestration and ranking
//! - One bounded, cancellable task per backend; partial failures are
//!   absorbed, a total wipeout is [`SearchError::AllBackendsFailed`]
//! - Fusion methods (`score`, `rank`, `reciprocal_rank`, `weighted`,
//!   `borda`) are selected by configuration, `reciprocal_rank` by default
//! - All per-request state is request-local; the pipeline is a pure,
//!   stateless computation over externally supplied inputs
//! - In-memory TTL cache for fused text-query responses
//!
//! ## Security
//!
//! - No network listeners — this is a library, not a server
//! - Query text is logged only at trace level or below

pub mod backend;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod orchestrator;
pub mod types;

use tokio_util::sync::CancellationToken;

pub use backend::{BackendRegistry, EmbeddingProvider, VectorSearchBackend};
pub use config::{FusionConfig, SearchConfig, TemporalConfig};
pub use error::{Result, SearchError};
pub use orchestrator::fusion::FusionMethod;
pub use types::{
    BackendHit, FrameCandidate, ModelSelector, QueryInput, SearchModel, SearchRequest,
    SearchResponse, SequenceMatch, TemporalRequest, TemporalResponse,
};

/// Search the registered backends concurrently and return one fused,
/// deduplicated ranking.
///
/// # Errors
///
/// Returns [`SearchError::AllBackendsFailed`] if every selected backend
/// fails, [`SearchError::EncodingFailed`] if no query embedding could be
/// produced, or [`SearchError::InvalidConfig`] for invalid configuration
/// or request parameters. Individual backend failures are logged but do
/// not fail the search as long as one backend returns results.
///
/// # Examples
///
/// ```no_run
/// # async fn example(registry: vidra_search::BackendRegistry) -> vidra_search::Result<()> {
/// let config = vidra_search::SearchConfig::default();
/// let request = vidra_search::SearchRequest::text("a man opens a red door");
/// let response = vidra_search::search(&request, &registry, &config).await?;
/// for hit in &response.results {
///     println!("{}: {:.4}", hit.id, hit.score);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn search(
    request: &SearchRequest,
    registry: &BackendRegistry,
    config: &SearchConfig,
) -> Result<SearchResponse> {
    search_with_cancellation(request, registry, config, &CancellationToken::new()).await
}

/// [`search`] with a caller-supplied cancellation token.
///
/// Cancelling the token aborts in-flight backend calls promptly rather
/// than letting them run to completion.
///
/// # Errors
///
/// Same as [`search`].
pub async fn search_with_cancellation(
    request: &SearchRequest,
    registry: &BackendRegistry,
    config: &SearchConfig,
    cancel: &CancellationToken,
) -> Result<SearchResponse> {
    config.validate()?;
    orchestrator::search::orchestrate_search(request, registry, config, cancel).await
}

/// Answer a multi-sentence temporal query: retrieve per-sentence frame
/// candidates and rank videos by their best window-constrained sequence.
///
/// # Errors
///
/// Returns [`SearchError::EncodingFailed`] if any sentence fails to
/// encode, [`SearchError::AllBackendsFailed`] if retrieval fails for
/// any sentence, or [`SearchError::InvalidConfig`] for an invalid
/// window, an unknown model, or a sentence-less query. A candidate video
/// with no feasible sequence is skipped silently.
///
/// # Examples
///
/// ```no_run
/// # async fn example(registry: vidra_search::BackendRegistry) -> vidra_search::Result<()> {
/// let config = vidra_search::SearchConfig::default();
/// let request = vidra_search::TemporalRequest::new(
///     "A man opens a door. He walks into the rain.",
///     vidra_search::SearchModel::Beit3,
/// );
/// let response = vidra_search::temporal_search(&request, &registry, &config).await?;
/// for m in &response.results {
///     println!("{}: frames {:?} ({:.1})", m.video_id, m.frames, m.score);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn temporal_search(
    request: &TemporalRequest,
    registry: &BackendRegistry,
    config: &SearchConfig,
) -> Result<TemporalResponse> {
    temporal_search_with_cancellation(request, registry, config, &CancellationToken::new()).await
}

/// [`temporal_search`] with a caller-supplied cancellation token.
///
/// # Errors
///
/// Same as [`temporal_search`].
pub async fn temporal_search_with_cancellation(
    request: &TemporalRequest,
    registry: &BackendRegistry,
    config: &SearchConfig,
    cancel: &CancellationToken,
) -> Result<TemporalResponse> {
    config.validate()?;
    orchestrator::temporal::orchestrate_temporal_search(request, registry, config, cancel).await
}
