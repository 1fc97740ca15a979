// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod candidate;
pub mod config;
pub mod net;

// Selection core: lexicons, scoring, duplicate filter, LLM adapter
pub mod analyze;
pub mod selector;
pub mod verify;

// Collaborators around the core
pub mod compose;
pub mod history;
pub mod ingest;
pub mod pending;
pub mod publish;

pub mod engine;
pub mod metrics;

// ---- Re-exports for stable public API ----
pub use analyze::ai_adapter;
pub use candidate::{CandidateEvent, ClaimType, DayMonth, ScoredCandidate, SourceTag};
pub use engine::{App, Engine, Outcome};
pub use selector::Selector;
