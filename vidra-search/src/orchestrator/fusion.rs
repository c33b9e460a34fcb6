//! Result fusion: merging per-model ranked lists into one ranking.
//!
//! Five named strategies are supported, selected by configuration. Every
//! strategy reduces to "each model contributes a number per id, sum the
//! contributions", so the method dispatch is a match over pure scoring
//! functions rather than anything polymorphic.
//!
//! Ties are broken deterministically: more contributing models first,
//! then lexicographic id ascending. Identical inputs always produce the
//! identical output order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;
use crate::error::SearchError;
use crate::types::{FusionCandidate, SearchModel, SearchResult};

/// A named fusion strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMethod {
    /// Per-model scores min-max normalised to [0, 1], then summed.
    Score,
    /// Rank position converted to points: `K - r + 1` for 1-indexed rank
    /// `r` among `K` results, summed.
    Rank,
    /// Reciprocal rank fusion: `1 / (k + r)` per model, summed. The
    /// default and preferred method.
    ReciprocalRank,
    /// Like `score`, with each model's normalised score multiplied by
    /// its configured priority weight.
    Weighted,
    /// Borda count. Identical formula to `rank`; kept as a distinct name
    /// for configuration clarity.
    Borda,
}

impl FusionMethod {
    /// Returns the configuration/wire name of this method.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Score => "score",
            Self::Rank => "rank",
            Self::ReciprocalRank => "reciprocal_rank",
            Self::Weighted => "weighted",
            Self::Borda => "borda",
        }
    }
}

impl fmt::Display for FusionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FusionMethod {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "score" => Ok(Self::Score),
            "rank" => Ok(Self::Rank),
            "reciprocal_rank" => Ok(Self::ReciprocalRank),
            "weighted" => Ok(Self::Weighted),
            "borda" => Ok(Self::Borda),
            other => Err(SearchError::InvalidConfig(format!(
                "unknown fusion method: {other}"
            ))),
        }
    }
}

/// Fuse per-model ranked lists into a single ranking.
///
/// An id absent from a given model simply contributes 0 for that model;
/// absence is never an error. Output is sorted by combined score
/// descending with deterministic tie-breaking and truncated to `limit`.
pub fn fuse(
    per_model: &HashMap<SearchModel, Vec<SearchResult>>,
    method: FusionMethod,
    limit: usize,
    fusion: &FusionConfig,
) -> Vec<FusionCandidate> {
    let mut candidates: HashMap<String, FusionCandidate> = HashMap::new();

    // Sort model iteration order so accumulation (and `best` selection on
    // equal scores) is reproducible regardless of HashMap ordering.
    let mut models: Vec<&SearchModel> = per_model.keys().collect();
    models.sort();

    for model in models {
        let results = &per_model[model];
        let contributions = contributions_for(results, *model, method, fusion);

        for (result, contribution) in results.iter().zip(contributions) {
            let entry = candidates
                .entry(result.id.clone())
                .or_insert_with(|| FusionCandidate {
                    id: result.id.clone(),
                    per_model_score: Default::default(),
                    per_model_rank: Default::default(),
                    combined: 0.0,
                    best: result.clone(),
                });
            entry.per_model_score.insert(*model, result.score);
            entry.per_model_rank.insert(*model, result.rank);
            entry.combined += contribution;
            if result.score > entry.best.score {
                entry.best = result.clone();
            }
        }
    }

    let mut fused: Vec<FusionCandidate> = candidates.into_values().collect();
    fused.sort_by(|a, b| {
        b.combined
            .partial_cmp(&a.combined)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.per_model_rank.len().cmp(&a.per_model_rank.len()))
            .then_with(|| a.id.cmp(&b.id))
    });
    fused.truncate(limit);
    fused
}

/// Per-result fusion contributions for one model's ranked list.
fn contributions_for(
    results: &[SearchResult],
    model: SearchModel,
    method: FusionMethod,
    fusion: &FusionConfig,
) -> Vec<f64> {
    match method {
        FusionMethod::Score => min_max_normalise(results),
        FusionMethod::Weighted => {
            let weight = fusion
                .model_weights
                .get(&model)
                .copied()
                .unwrap_or_else(|| model.priority());
            min_max_normalise(results)
                .into_iter()
                .map(|norm| norm * weight)
                .collect()
        }
        FusionMethod::Rank | FusionMethod::Borda => {
            // Points follow list position, `K - r + 1` for 1-indexed rank
            // `r`. Using the position rather than the `rank` field keeps
            // this total even for callers whose rank values do not match
            // their list order.
            let k = results.len();
            (0..k).map(|position| (k - position) as f64).collect()
        }
        FusionMethod::ReciprocalRank => results
            .iter()
            .map(|r| 1.0 / (f64::from(fusion.rrf_k) + r.rank as f64))
            .collect(),
    }
}

/// Min-max normalise one model's raw scores to [0, 1].
///
/// A degenerate list (all scores equal, including a single result) maps
/// to 1.0 for every entry: each item is that model's best.
fn min_max_normalise(results: &[SearchResult]) -> Vec<f64> {
    let min = results.iter().map(|r| r.score).fold(f64::INFINITY, f64::min);
    let max = results
        .iter()
        .map(|r| r.score)
        .fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    if !span.is_finite() || span < 1e-9 {
        return vec![1.0; results.len()];
    }
    results.iter().map(|r| (r.score - min) / span).collect()
}
