//! Core types for multi-model search results and temporal sequence matching.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SearchError;

/// Embedding-model/index pairs the engine can dispatch to.
///
/// Each variant names one backend: an embedding model plus the vector
/// index built from its features. Backends are registered per variant
/// in a [`crate::backend::BackendRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchModel {
    /// CLIP ViT-B/32 — fast general-purpose baseline.
    Clip,
    /// Long-CLIP — extended token window, better for long queries.
    LongClip,
    /// CLIP2Video — shot-level video features.
    Clip2Video,
    /// BEiT-3 — strongest retrieval quality, slowest encode.
    Beit3,
}

impl SearchModel {
    /// Returns the configuration/wire name of this model.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Clip => "clip",
            Self::LongClip => "longclip",
            Self::Clip2Video => "clip2video",
            Self::Beit3 => "beit3",
        }
    }

    /// Returns the default fusion priority weight for this model.
    /// Higher weight means results from this model count for more
    /// under the `weighted` fusion method.
    pub fn priority(&self) -> f64 {
        match self {
            Self::Clip => 1.0,
            Self::LongClip => 1.0,
            Self::Clip2Video => 0.8,
            Self::Beit3 => 1.2,
        }
    }

    /// Returns all model variants.
    pub fn all() -> &'static [SearchModel] {
        &[Self::Clip, Self::LongClip, Self::Clip2Video, Self::Beit3]
    }
}

impl fmt::Display for SearchModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SearchModel {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "clip" => Ok(Self::Clip),
            "longclip" => Ok(Self::LongClip),
            "clip2video" => Ok(Self::Clip2Video),
            "beit3" => Ok(Self::Beit3),
            other => Err(SearchError::InvalidConfig(format!(
                "unknown search model: {other}"
            ))),
        }
    }
}

/// Which backends a plain search request should fan out to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSelector {
    /// Every enabled, registered backend.
    All,
    /// An explicit subset of backends.
    Only(Vec<SearchModel>),
}

/// A query payload for the embedding provider.
#[derive(Debug, Clone)]
pub enum QueryInput {
    /// Free-text query.
    Text(String),
    /// Raw image bytes for query-by-example.
    Image(Vec<u8>),
}

impl QueryInput {
    /// Returns the text form of this query, if it is textual.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Image(_) => None,
        }
    }
}

/// A plain multi-model search request.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// The query to encode and search for.
    pub query: QueryInput,
    /// Which backends to fan out to.
    pub models: ModelSelector,
    /// Result cap; defaults to the configured `max_results`.
    pub limit: Option<usize>,
    /// Fusion method; defaults to the configured method.
    pub fusion_method: Option<crate::orchestrator::fusion::FusionMethod>,
}

impl SearchRequest {
    /// A text query against all enabled backends with configured defaults.
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            query: QueryInput::Text(query.into()),
            models: ModelSelector::All,
            limit: None,
            fusion_method: None,
        }
    }
}

/// A temporal (multi-sentence) search request against one model.
#[derive(Debug, Clone)]
pub struct TemporalRequest {
    /// Sentence-separated query text (split on `.`).
    pub query: String,
    /// The single model whose backend retrieves per-sentence candidates.
    pub model: SearchModel,
    /// Result cap; defaults to the configured `max_results`.
    pub limit: Option<usize>,
    /// Per-sentence shortlist size; defaults from [`crate::config::TemporalConfig`].
    pub topk_per_sentence: Option<usize>,
    /// Candidate-video cap; defaults from [`crate::config::TemporalConfig`].
    pub max_candidate_videos: Option<usize>,
    /// Minimum frame gap between consecutive sentences; configured default.
    pub w_min: Option<u32>,
    /// Maximum frame gap between consecutive sentences; configured default.
    pub w_max: Option<u32>,
}

impl TemporalRequest {
    /// A temporal query with configured defaults for all tuning knobs.
    pub fn new(query: impl Into<String>, model: SearchModel) -> Self {
        Self {
            query: query.into(),
            model,
            limit: None,
            topk_per_sentence: None,
            max_candidate_videos: None,
            w_min: None,
            w_max: None,
        }
    }
}

/// A raw hit returned by a vector search backend.
///
/// For frame-level backends the `id` encodes frame identity as
/// `"<video_id>/<frame_index>"` (e.g. `"L21_V001/42"`); see
/// [`FrameRef::parse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendHit {
    /// Backend-scoped identifier of the matched item.
    pub id: String,
    /// Raw similarity score from the index (higher is better).
    pub score: f64,
    /// Opaque per-hit metadata passed through to callers.
    #[serde(default)]
    pub metadata: Value,
}

/// A single per-backend search result, immutable once created.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    /// Identifier of the matched item, unique within one backend's list.
    pub id: String,
    /// Raw similarity score from the backend.
    pub score: f64,
    /// Which model/index produced this result.
    pub model: SearchModel,
    /// 1-based position within the backend's ranked list.
    pub rank: usize,
    /// Opaque per-hit metadata.
    pub metadata: Value,
}

/// An id being merged across model result lists during fusion.
///
/// Built by the fusion engine, consumed by the deduplication filter,
/// and discarded once the final response is produced.
#[derive(Debug, Clone)]
pub struct FusionCandidate {
    /// The shared item id.
    pub id: String,
    /// Raw score per contributing model.
    pub per_model_score: std::collections::BTreeMap<SearchModel, f64>,
    /// 1-based rank per contributing model.
    pub per_model_rank: std::collections::BTreeMap<SearchModel, usize>,
    /// Combined score under the selected fusion method.
    pub combined: f64,
    /// The highest-scored underlying result, kept for metadata passthrough.
    pub best: SearchResult,
}

impl FusionCandidate {
    /// Models that returned this id, in stable (enum) order.
    pub fn source_models(&self) -> Vec<SearchModel> {
        self.per_model_rank.keys().copied().collect()
    }
}

/// One sentence of a temporal query, ordered and immutable.
#[derive(Debug, Clone)]
pub struct SentenceQuery {
    /// 0-based position within the temporal query.
    pub index: usize,
    /// The sentence text.
    pub text: String,
    /// Query embedding produced for this sentence.
    pub embedding: Vec<f32>,
}

/// A frame-level match for one sentence of a temporal query.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameCandidate {
    /// Video the frame belongs to.
    pub video_id: String,
    /// 0-based keyframe index within the video.
    pub frame_index: u32,
    /// Raw similarity score for this sentence/frame pair.
    pub score: f64,
    /// Which sentence this candidate matches.
    pub sentence_index: usize,
}

/// Frame identity parsed from a backend hit id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef {
    /// Video identifier, e.g. `"L21_V001"`.
    pub video_id: String,
    /// 0-based keyframe index.
    pub frame_index: u32,
}

impl FrameRef {
    /// Parse a `"<video_id>/<frame_index>"` hit id.
    ///
    /// Returns `None` if the id does not carry frame identity, which
    /// callers treat as "not a frame-level hit" rather than an error.
    pub fn parse(id: &str) -> Option<Self> {
        let (video_id, frame) = id.rsplit_once('/')?;
        if video_id.is_empty() {
            return None;
        }
        let frame_index = frame.parse::<u32>().ok()?;
        Some(Self {
            video_id: video_id.to_string(),
            frame_index,
        })
    }
}

/// A temporally ordered frame sequence matched against a multi-sentence
/// query. Immutable output entity.
#[derive(Debug, Clone, Serialize)]
pub struct SequenceMatch {
    /// The matched video.
    pub video_id: String,
    /// One frame index per sentence, strictly increasing.
    pub frames: Vec<u32>,
    /// Display score: `100 * total / num_sentences`, clamped to [0, 100].
    pub score: f64,
}

/// A fused, deduplicated hit in a plain-search response.
#[derive(Debug, Clone, Serialize)]
pub struct RankedHit {
    /// The matched item id.
    pub id: String,
    /// Combined fusion score.
    pub score: f64,
    /// Models that returned this id.
    pub source_models: Vec<SearchModel>,
    /// Opaque metadata from the best underlying hit.
    pub metadata: Value,
}

/// Response payload for a plain multi-model search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// Fused, deduplicated, ranked results.
    pub results: Vec<RankedHit>,
}

/// Response payload for a temporal search.
#[derive(Debug, Clone, Serialize)]
pub struct TemporalResponse {
    /// The ordered sentences the query was split into.
    pub sentences: Vec<String>,
    /// Videos that were evaluated by the sequence matcher, in selection order.
    pub candidate_videos: Vec<String>,
    /// Feasible sequences ranked by score descending.
    pub results: Vec<SequenceMatch>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_model_display_and_name() {
        assert_eq!(SearchModel::Clip.to_string(), "clip");
        assert_eq!(SearchModel::LongClip.name(), "longclip");
        assert_eq!(SearchModel::Clip2Video.name(), "clip2video");
        assert_eq!(SearchModel::Beit3.to_string(), "beit3");
    }

    #[test]
    fn search_model_from_str_round_trip() {
        for model in SearchModel::all() {
            let parsed: SearchModel = model.name().parse().expect("parse");
            assert_eq!(parsed, *model);
        }
    }

    #[test]
    fn search_model_from_str_rejects_unknown() {
        let err = "resnet".parse::<SearchModel>().unwrap_err();
        assert!(err.to_string().contains("unknown search model"));
    }

    #[test]
    fn search_model_serde_round_trip() {
        let json = serde_json::to_string(&SearchModel::Beit3).expect("serialize");
        assert_eq!(json, "\"beit3\"");
        let decoded: SearchModel = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(decoded, SearchModel::Beit3);
    }

    #[test]
    fn search_model_all_has_four_variants() {
        assert_eq!(SearchModel::all().len(), 4);
    }

    #[test]
    fn search_model_priority_favours_beit3() {
        assert!(SearchModel::Beit3.priority() > SearchModel::Clip.priority());
        assert!(SearchModel::Clip2Video.priority() < SearchModel::Clip.priority());
    }

    #[test]
    fn query_input_as_text() {
        assert_eq!(QueryInput::Text("a dog".into()).as_text(), Some("a dog"));
        assert!(QueryInput::Image(vec![0xFF, 0xD8]).as_text().is_none());
    }

    #[test]
    fn frame_ref_parses_video_and_index() {
        let frame = FrameRef::parse("L21_V001/42").expect("should parse");
        assert_eq!(frame.video_id, "L21_V001");
        assert_eq!(frame.frame_index, 42);
    }

    #[test]
    fn frame_ref_rejects_malformed_ids() {
        assert!(FrameRef::parse("no-separator").is_none());
        assert!(FrameRef::parse("L21_V001/not-a-number").is_none());
        assert!(FrameRef::parse("/42").is_none());
    }

    #[test]
    fn frame_ref_uses_last_separator() {
        let frame = FrameRef::parse("batch/L21_V001/7").expect("should parse");
        assert_eq!(frame.video_id, "batch/L21_V001");
        assert_eq!(frame.frame_index, 7);
    }

    #[test]
    fn model_selector_serde() {
        let json = serde_json::to_string(&ModelSelector::All).expect("serialize");
        assert_eq!(json, "\"all\"");
        let only: ModelSelector =
            serde_json::from_str("{\"only\":[\"clip\",\"beit3\"]}").expect("deserialize");
        assert_eq!(
            only,
            ModelSelector::Only(vec![SearchModel::Clip, SearchModel::Beit3])
        );
    }

    #[test]
    fn backend_hit_metadata_defaults_to_null() {
        let hit: BackendHit = serde_json::from_str("{\"id\":\"x\",\"score\":0.5}")
            .expect("deserialize");
        assert!(hit.metadata.is_null());
    }

    #[test]
    fn types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SearchResult>();
        assert_send_sync::<FusionCandidate>();
        assert_send_sync::<SequenceMatch>();
        assert_send_sync::<TemporalResponse>();
    }
}
