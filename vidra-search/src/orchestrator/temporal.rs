//! Temporal sequence matching: stitching per-sentence frame candidates
//! into temporally ordered sequences via dynamic programming.
//!
//! A multi-sentence query is split into ordered sentences, each encoded
//! and retrieved independently. Per candidate video, `DP[i][j]` holds the
//! best cumulative score of a partial sequence covering sentences `0..=i`
//! and ending at that video's `j`-th candidate frame for sentence `i`,
//! subject to consecutive frame gaps lying in `[w_min, w_max]`. Videos
//! with no feasible full path are skipped without error.
//!
//! Complexity is `O(M * K²)` per candidate video for `M` sentences and
//! `K` per-sentence candidates, bounded by the shortlist caps.

use std::collections::{HashMap, HashSet};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::backend::BackendRegistry;
use crate::config::SearchConfig;
use crate::dispatch::search_with_budget;
use crate::error::{Result, SearchError};
use crate::types::{
    FrameCandidate, FrameRef, SentenceQuery, SequenceMatch, TemporalRequest, TemporalResponse,
};

use super::dedup::dedup_frame_candidates;

/// Window and ranking parameters for one temporal match run.
#[derive(Debug, Clone)]
pub struct TemporalParams {
    /// Minimum frame gap between consecutive sentence matches (>= 1).
    pub w_min: u32,
    /// Maximum frame gap; `None` is unbounded above.
    pub w_max: Option<u32>,
    /// Cap on videos evaluated by the matcher.
    pub max_candidate_videos: usize,
    /// Cap on returned sequences.
    pub limit: usize,
    /// Draw candidate videos from every sentence's shortlist, not just
    /// sentence 0's.
    pub candidates_from_all_sentences: bool,
}

/// Run the full temporal pipeline: split, encode, retrieve per sentence,
/// then sequence-match.
///
/// # Errors
///
/// - [`SearchError::InvalidConfig`] for a sentence-less query, an
///   unregistered/disabled model, or an invalid window.
/// - [`SearchError::EncodingFailed`] if **any** sentence fails to encode —
///   a temporal query cannot proceed with a missing sentence embedding.
/// - [`SearchError::AllBackendsFailed`] if retrieval fails for **any**
///   sentence. A missing shortlist makes every video infeasible for that
///   sentence, so nothing was recovered; an empty success here would be
///   indistinguishable from genuine infeasibility.
pub async fn orchestrate_temporal_search(
    request: &TemporalRequest,
    registry: &BackendRegistry,
    config: &SearchConfig,
    cancel: &CancellationToken,
) -> Result<TemporalResponse> {
    let w_min = request.w_min.unwrap_or(config.temporal.w_min);
    let w_max = request.w_max.or(config.temporal.w_max);
    config.validate_window(w_min, w_max)?;

    let limit = request.limit.unwrap_or(config.max_results);
    if limit == 0 {
        return Err(SearchError::InvalidConfig(
            "limit must be greater than 0".into(),
        ));
    }
    let params = TemporalParams {
        w_min,
        w_max,
        max_candidate_videos: request
            .max_candidate_videos
            .unwrap_or(config.temporal.max_candidate_videos),
        limit,
        candidates_from_all_sentences: config.temporal.candidates_from_all_sentences,
    };

    let texts = split_sentences(&request.query);
    if texts.is_empty() {
        return Err(SearchError::InvalidConfig(
            "temporal query contains no sentences".into(),
        ));
    }

    if !config.models.contains(&request.model) {
        return Err(SearchError::InvalidConfig(format!(
            "model {} is not enabled",
            request.model
        )));
    }
    let backend = registry.get(request.model).ok_or_else(|| {
        SearchError::InvalidConfig(format!("no backend registered for {}", request.model))
    })?;
    tracing::debug!(model = %request.model, sentences = texts.len(), "temporal search");

    // Encode every sentence up front; any failure is fatal.
    let sentences = encode_sentences(&texts, backend.encoder.as_ref()).await?;

    // Retrieve a shortlist per sentence on the selected model.
    let topk = request
        .topk_per_sentence
        .unwrap_or(config.temporal.topk_per_sentence);
    let deadline =
        Instant::now() + std::time::Duration::from_millis(config.global_deadline_ms);
    let per_backend = std::time::Duration::from_millis(config.per_backend_timeout_ms);

    let retrievals: Vec<_> = sentences
        .iter()
        .map(|sentence| {
            let cancel = cancel.clone();
            let index = backend.index.clone();
            async move {
                let outcome = search_with_budget(
                    index.as_ref(),
                    request.model,
                    &sentence.embedding,
                    topk,
                    per_backend,
                    deadline,
                    &cancel,
                )
                .await;
                (sentence.index, outcome)
            }
        })
        .collect();
    let outcomes = futures::future::join_all(retrievals).await;

    let mut shortlists: Vec<Vec<FrameCandidate>> = vec![Vec::new(); sentences.len()];
    let mut errors: Vec<String> = Vec::new();
    for (sentence_index, outcome) in outcomes {
        match outcome {
            Ok(results) => {
                let mut candidates = Vec::with_capacity(results.len());
                for result in results {
                    match FrameRef::parse(&result.id) {
                        Some(frame) => candidates.push(FrameCandidate {
                            video_id: frame.video_id,
                            frame_index: frame.frame_index,
                            score: result.score,
                            sentence_index,
                        }),
                        None => {
                            tracing::debug!(id = %result.id, "hit id carries no frame identity, skipping");
                        }
                    }
                }
                shortlists[sentence_index] = dedup_frame_candidates(candidates);
            }
            Err(err) => {
                tracing::warn!(sentence = sentence_index, error = %err, "sentence retrieval failed");
                errors.push(format!("sentence {sentence_index}: {err}"));
            }
        }
    }

    // Every sentence's shortlist is required; a single missing one makes
    // all videos infeasible, which must not look like an empty success.
    if !errors.is_empty() {
        return Err(SearchError::AllBackendsFailed(format!(
            "{} backend failed for {} of {} sentences: {}",
            request.model,
            errors.len(),
            sentences.len(),
            errors.join("; ")
        )));
    }

    let candidate_videos = select_candidate_videos(
        &shortlists,
        params.max_candidate_videos,
        params.candidates_from_all_sentences,
    );
    let results = match_sequences(&shortlists, &candidate_videos, &params);

    Ok(TemporalResponse {
        sentences: texts,
        candidate_videos,
        results,
    })
}

/// Split a temporal query into ordered, non-empty sentences.
pub fn split_sentences(query: &str) -> Vec<String> {
    query
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

async fn encode_sentences(
    texts: &[String],
    encoder: &dyn crate::backend::EmbeddingProvider,
) -> Result<Vec<SentenceQuery>> {
    let encodes = texts.iter().enumerate().map(|(index, text)| async move {
        let input = crate::types::QueryInput::Text(text.clone());
        (index, text, encoder.encode(&input).await)
    });
    let mut sentences = Vec::with_capacity(texts.len());
    for (index, text, outcome) in futures::future::join_all(encodes).await {
        let embedding = outcome
            .map_err(|err| SearchError::EncodingFailed(format!("sentence {index}: {err}")))?;
        sentences.push(SentenceQuery {
            index,
            text: text.clone(),
            embedding,
        });
    }
    Ok(sentences)
}

/// Rank and cap the videos worth evaluating.
///
/// Videos are ranked by the number of sentences whose shortlist contains
/// them, then by their best raw score, then by id ascending — all
/// deterministic. When `from_all_sentences` is false only videos present
/// in sentence 0's shortlist are considered.
pub fn select_candidate_videos(
    sentence_candidates: &[Vec<FrameCandidate>],
    max_candidates: usize,
    from_all_sentences: bool,
) -> Vec<String> {
    let mut sentence_count: HashMap<&str, usize> = HashMap::new();
    let mut best_score: HashMap<&str, f64> = HashMap::new();

    for candidates in sentence_candidates {
        let mut seen_this_sentence: HashSet<&str> = HashSet::new();
        for candidate in candidates {
            let video = candidate.video_id.as_str();
            if seen_this_sentence.insert(video) {
                *sentence_count.entry(video).or_insert(0) += 1;
            }
            let best = best_score.entry(video).or_insert(f64::NEG_INFINITY);
            if candidate.score > *best {
                *best = candidate.score;
            }
        }
    }

    let allowed: Option<HashSet<&str>> = if from_all_sentences {
        None
    } else {
        Some(
            sentence_candidates
                .first()
                .map(|candidates| {
                    candidates
                        .iter()
                        .map(|c| c.video_id.as_str())
                        .collect::<HashSet<_>>()
                })
                .unwrap_or_default(),
        )
    };

    let mut videos: Vec<&str> = sentence_count
        .keys()
        .copied()
        .filter(|video| allowed.as_ref().map_or(true, |set| set.contains(video)))
        .collect();
    videos.sort_by(|a, b| {
        sentence_count[b]
            .cmp(&sentence_count[a])
            .then_with(|| {
                best_score[b]
                    .partial_cmp(&best_score[a])
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.cmp(b))
    });
    videos.truncate(max_candidates);
    videos.into_iter().map(str::to_string).collect()
}

/// Evaluate each candidate video with the DP and rank the feasible ones.
///
/// Videos are ranked by the DP's raw cumulative total descending, which
/// stays meaningful even when totals exceed `M`; the clamped display
/// score `100 * total / M` is derived only after ranking.
pub fn match_sequences(
    sentence_candidates: &[Vec<FrameCandidate>],
    candidate_videos: &[String],
    params: &TemporalParams,
) -> Vec<SequenceMatch> {
    let m = sentence_candidates.len();
    if m == 0 {
        return Vec::new();
    }

    let mut sequences: Vec<(String, Vec<u32>, f64)> = Vec::new();
    for video_id in candidate_videos {
        let Some(per_sentence) = gather_video_frames(sentence_candidates, video_id) else {
            tracing::debug!(video = %video_id, "no candidates for some sentence, skipping");
            continue;
        };
        match best_sequence(&per_sentence, params.w_min, params.w_max) {
            Some((frames, total)) => {
                sequences.push((video_id.clone(), frames, total));
            }
            None => {
                tracing::debug!(video = %video_id, "no feasible sequence, skipping");
            }
        }
    }

    sequences.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    sequences.truncate(params.limit);
    sequences
        .into_iter()
        .map(|(video_id, frames, total)| SequenceMatch {
            video_id,
            frames,
            score: display_score(total, m),
        })
        .collect()
}

/// Per-sentence `(frame, score)` lists for one video, each sorted by
/// frame index ascending with duplicate frames collapsed to their best
/// score. Returns `None` if any sentence has no candidate for the video,
/// which marks the video infeasible.
fn gather_video_frames(
    sentence_candidates: &[Vec<FrameCandidate>],
    video_id: &str,
) -> Option<Vec<Vec<(u32, f64)>>> {
    let mut per_sentence = Vec::with_capacity(sentence_candidates.len());
    for candidates in sentence_candidates {
        let mut frames: Vec<(u32, f64)> = candidates
            .iter()
            .filter(|c| c.video_id == video_id)
            .map(|c| (c.frame_index, c.score))
            .collect();
        if frames.is_empty() {
            return None;
        }
        frames.sort_by(|a, b| {
            a.0.cmp(&b.0).then_with(|| {
                b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        frames.dedup_by(|next, kept| next.0 == kept.0);
        per_sentence.push(frames);
    }
    Some(per_sentence)
}

/// The DP core: best window-constrained frame sequence over one video.
///
/// `per_sentence[i]` holds sentence `i`'s `(frame, score)` candidates
/// sorted by frame ascending. Returns the strictly increasing frame
/// sequence and its total raw score, or `None` if no full sequence
/// satisfies the window. With a single sentence this degenerates to
/// picking the best-scored frame; the window is never consulted.
pub fn best_sequence(
    per_sentence: &[Vec<(u32, f64)>],
    w_min: u32,
    w_max: Option<u32>,
) -> Option<(Vec<u32>, f64)> {
    let m = per_sentence.len();
    if m == 0 || per_sentence.iter().any(Vec::is_empty) {
        return None;
    }

    // dp[i][j]: best cumulative score ending at candidate j of sentence i;
    // back[i][j]: the chosen j' in sentence i-1, for path reconstruction.
    let mut dp: Vec<Vec<f64>> = Vec::with_capacity(m);
    let mut back: Vec<Vec<Option<usize>>> = Vec::with_capacity(m);

    dp.push(per_sentence[0].iter().map(|(_, score)| *score).collect());
    back.push(vec![None; per_sentence[0].len()]);

    for i in 1..m {
        let prev = &per_sentence[i - 1];
        let current = &per_sentence[i];
        let mut row = vec![f64::NEG_INFINITY; current.len()];
        let mut row_back = vec![None; current.len()];

        for (j, (frame, score)) in current.iter().enumerate() {
            let mut best_prev = f64::NEG_INFINITY;
            let mut best_prev_idx = None;
            for (jp, (prev_frame, _)) in prev.iter().enumerate() {
                if dp[i - 1][jp] == f64::NEG_INFINITY {
                    continue;
                }
                let gap = i64::from(*frame) - i64::from(*prev_frame);
                if gap < i64::from(w_min) {
                    continue;
                }
                if let Some(w_max) = w_max {
                    if gap > i64::from(w_max) {
                        continue;
                    }
                }
                if dp[i - 1][jp] > best_prev {
                    best_prev = dp[i - 1][jp];
                    best_prev_idx = Some(jp);
                }
            }
            if let Some(jp) = best_prev_idx {
                row[j] = best_prev + score;
                row_back[j] = Some(jp);
            }
        }

        dp.push(row);
        back.push(row_back);
    }

    // Best terminal state; NEG_INFINITY everywhere means infeasible.
    let (mut j, total) = dp[m - 1]
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(j, total)| (j, *total))?;
    if total == f64::NEG_INFINITY {
        return None;
    }

    let mut frames = vec![0u32; m];
    for i in (0..m).rev() {
        frames[i] = per_sentence[i][j].0;
        if i > 0 {
            // Feasible terminal states always have a full backpointer chain.
            j = back[i][j]?;
        }
    }
    Some((frames, total))
}

fn display_score(total: f64, num_sentences: usize) -> f64 {
    (100.0 * total / num_sentences as f64).clamp(0.0, 100.0)
}
