// src/analyze/mod.rs
//! Analysis primitives: lexicons, scoring, duplicate detection and the LLM adapter.

pub mod ai_adapter;
pub mod dedup;
pub mod lexicon;
pub mod scoring;

// Re-export convenient types.
pub use crate::analyze::dedup::{is_repeated, DuplicateFilter, MIN_SHARED_TOKENS};
pub use crate::analyze::lexicon::{Lexicon, Lexicons, ScoringPolicy};
pub use crate::analyze::scoring::{best, foreign_battle, rank, Evaluation, Scorer};
