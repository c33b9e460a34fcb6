//! Search orchestration: concurrent fan-out, fusion, dedup, and temporal
//! sequence matching.
//!
//! `search` runs the plain pipeline over multiple backends; `fusion` and
//! `dedup` are its pure merge stages; `temporal` stitches per-sentence
//! frame candidates into window-constrained sequences.

pub mod dedup;
pub mod fusion;
pub mod search;
pub mod temporal;
