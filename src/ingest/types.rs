// src/ingest/types.rs
use thiserror::Error;

use crate::analyze::ai_adapter::LlmError;
use crate::candidate::{CandidateEvent, ClaimType, DayMonth, SourceTag};
use crate::net::Retryable;

/// Raw record as produced by one adapter, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawCandidate {
    KnowledgeGraph {
        year: i32,
        label: String,
        description: Option<String>,
        entity_id: String,
        image_url: Option<String>,
    },
    Scraped {
        site: String,
        year: i32,
        text: String,
    },
    Generated {
        year: i32,
        text: String,
        entity: Option<String>,
        claim_type: Option<ClaimType>,
    },
}

impl RawCandidate {
    pub fn source(&self) -> SourceTag {
        match self {
            RawCandidate::KnowledgeGraph { .. } => SourceTag::KnowledgeGraph,
            RawCandidate::Scraped { .. } => SourceTag::Scraped,
            RawCandidate::Generated { .. } => SourceTag::Generated,
        }
    }

    /// Normalize into the uniform pipeline record. Blank text or year 0 yields `None`.
    pub fn into_candidate(self) -> Option<CandidateEvent> {
        let source = self.source();
        match self {
            RawCandidate::KnowledgeGraph {
                year,
                label,
                description,
                image_url,
                ..
            } => {
                if year == 0 {
                    return None;
                }
                let label = super::normalize_text(&label);
                let text = match description.map(|d| super::normalize_text(&d)) {
                    Some(d) if !d.is_empty() => format!("{label}: {d}"),
                    _ => label.clone(),
                };
                let mut c = CandidateEvent::new(year, text, source)?
                    .with_entity(label, ClaimType::Event);
                if let Some(url) = image_url {
                    c = c.with_image(url);
                }
                Some(c)
            }
            RawCandidate::Scraped { year, text, .. } => {
                if year == 0 {
                    return None;
                }
                CandidateEvent::new(year, super::normalize_text(&text), source)
            }
            RawCandidate::Generated {
                year,
                text,
                entity,
                claim_type,
            } => {
                if year == 0 {
                    return None;
                }
                let c = CandidateEvent::new(year, super::normalize_text(&text), source)?;
                Some(match entity {
                    Some(e) => c.with_entity(e.trim(), claim_type.unwrap_or(ClaimType::Event)),
                    None => c,
                })
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{provider} answered HTTP {status}")]
    Status {
        provider: &'static str,
        status: reqwest::StatusCode,
    },
    #[error("parse: {0}")]
    Parse(String),
    #[error("llm: {0}")]
    Llm(#[from] LlmError),
    #[error("provider disabled: {0}")]
    Disabled(&'static str),
}

impl Retryable for SourceError {
    fn is_transient(&self) -> bool {
        match self {
            SourceError::Http(e) => e.is_transient(),
            SourceError::Status { status, .. } => status.is_server_error(),
            SourceError::Llm(e) => e.is_transient(),
            SourceError::Parse(_) | SourceError::Disabled(_) => false,
        }
    }
}

#[async_trait::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Candidates for the given calendar day.
    async fn fetch(&self, today: DayMonth) -> Result<Vec<RawCandidate>, SourceError>;
    fn name(&self) -> &'static str;
}
