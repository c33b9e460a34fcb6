//! Near-duplicate collapse over the fused ranking.
//!
//! Two candidates are duplicates when their declared duplicate key (the
//! underlying media identity) matches, or when both are frames of the
//! same video within the configured frame-proximity window. Because the
//! fused list is already sorted best-first, keeping the first occurrence
//! of each group keeps the highest combined score; the order of the
//! survivors is the fused order, untouched.

use std::collections::{HashMap, HashSet};

use crate::types::{FrameCandidate, FrameRef, FusionCandidate};

/// Remove near-duplicates from a fused, best-first candidate list.
///
/// `frame_window` is the maximum frame-index distance at which two
/// frames of the same video are considered the same moment; 0 disables
/// frame-proximity matching (exact key matches still collapse).
pub fn dedup(candidates: Vec<FusionCandidate>, frame_window: u32) -> Vec<FusionCandidate> {
    let mut seen_keys: HashSet<String> = HashSet::new();
    let mut kept_frames: HashMap<String, Vec<u32>> = HashMap::new();
    let mut kept = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        let key = duplicate_key(&candidate);
        if !seen_keys.insert(key) {
            continue;
        }

        if let Some(frame) = FrameRef::parse(&candidate.id) {
            let frames = kept_frames.entry(frame.video_id.clone()).or_default();
            if frame_window > 0
                && frames
                    .iter()
                    .any(|kept| kept.abs_diff(frame.frame_index) <= frame_window)
            {
                continue;
            }
            frames.push(frame.frame_index);
        }

        kept.push(candidate);
    }

    kept
}

/// The identity under which a candidate is considered "the same media".
///
/// Prefers an explicit `link` in the hit metadata (the original media
/// path); falls back to the item id.
fn duplicate_key(candidate: &FusionCandidate) -> String {
    candidate
        .best
        .metadata
        .get("link")
        .and_then(|v| v.as_str())
        .map_or_else(|| candidate.id.clone(), str::to_string)
}

/// Collapse duplicate frames within one sentence's candidate list,
/// keeping the best score per `(video, frame)` pair. Used by the
/// temporal pipeline before sequence matching.
pub fn dedup_frame_candidates(candidates: Vec<FrameCandidate>) -> Vec<FrameCandidate> {
    let mut best: HashMap<(String, u32), FrameCandidate> = HashMap::new();
    for candidate in candidates {
        let key = (candidate.video_id.clone(), candidate.frame_index);
        match best.get(&key) {
            Some(existing) if existing.score >= candidate.score => {}
            _ => {
                best.insert(key, candidate);
            }
        }
    }
    let mut out: Vec<FrameCandidate> = best.into_values().collect();
    out.sort_by(|a, b| {
        a.video_id
            .cmp(&b.video_id)
            .then_with(|| a.frame_index.cmp(&b.frame_index))
    });
    out
}
