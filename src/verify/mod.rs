//! Date verifier: confirms a candidate's claimed day/month against a
//! structured knowledge base before it can be selected.
//!
//! Protocol
//! 1. resolve `entity_name` to an id (no match → reject, never guess)
//! 2. fetch the entity's date facts
//! 3. for the claim's properties in priority order, normalize values to
//!    day/month (dropping unknown day/month components)
//! 4. the first property with any usable value decides:
//!    one distinct value equal to today → accept; several → ambiguous reject;
//!    one different value → reject
//! 5. no property with usable values → reject
//!
//! Lookup failures reject the candidate; they are not run errors.

pub mod wikidata;

use std::collections::BTreeSet;
use std::fmt;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::candidate::{CandidateEvent, ClaimType, DayMonth};

pub use wikidata::WikidataClient;

/// Date-valued properties consulted by the verifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateProperty {
    PointInTime,
    StartTime,
    EndTime,
    DateOfBirth,
    DateOfDeath,
}

impl DateProperty {
    pub const ALL: [DateProperty; 5] = [
        DateProperty::PointInTime,
        DateProperty::StartTime,
        DateProperty::EndTime,
        DateProperty::DateOfBirth,
        DateProperty::DateOfDeath,
    ];

    /// Wikidata property id.
    pub fn pid(self) -> &'static str {
        match self {
            DateProperty::PointInTime => "P585",
            DateProperty::StartTime => "P580",
            DateProperty::EndTime => "P582",
            DateProperty::DateOfBirth => "P569",
            DateProperty::DateOfDeath => "P570",
        }
    }

    pub fn from_pid(pid: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.pid() == pid)
    }

    /// Properties to consult for a claim, highest priority first.
    pub fn for_claim(claim: ClaimType) -> &'static [DateProperty] {
        match claim {
            ClaimType::Event => &[
                DateProperty::PointInTime,
                DateProperty::StartTime,
                DateProperty::EndTime,
            ],
            ClaimType::Birth => &[DateProperty::DateOfBirth],
            ClaimType::Death => &[DateProperty::DateOfDeath],
        }
    }
}

/// One raw date statement, e.g. `+1588-07-31T00:00:00Z` with precision 11 (day).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFact {
    pub property: DateProperty,
    pub value: String,
    /// Wikidata precision code (11 = day). `None` when the source has no notion of it.
    pub precision: Option<u8>,
}

impl DateFact {
    pub fn new(property: DateProperty, value: impl Into<String>) -> Self {
        Self {
            property,
            value: value.into(),
            precision: None,
        }
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = Some(precision);
        self
    }
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("knowledge base transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("knowledge base API error: {0}")]
    Api(String),
    #[error("unexpected knowledge base response: {0}")]
    Parse(String),
}

impl crate::net::Retryable for VerifyError {
    fn is_transient(&self) -> bool {
        matches!(self, VerifyError::Transport(e) if crate::net::Retryable::is_transient(e))
    }
}

/// External structured knowledge source.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    /// Text search for an entity; `None` when there is no unambiguous hit.
    async fn resolve_entity(&self, name: &str) -> Result<Option<String>, VerifyError>;
    /// All date-valued facts of the entity.
    async fn date_facts(&self, entity_id: &str) -> Result<Vec<DateFact>, VerifyError>;
}

/// Outcome of one verification, with the reason for rejections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted(DayMonth),
    /// Candidate carries no entity name to look up.
    MissingEntity,
    NoEntityMatch,
    NoExactDate,
    Ambiguous(Vec<DayMonth>),
    Mismatch(DayMonth),
    Unavailable(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted(_))
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Accepted(_) => "accepted",
            Verdict::MissingEntity => "missing_entity",
            Verdict::NoEntityMatch => "no_entity_match",
            Verdict::NoExactDate => "no_exact_date",
            Verdict::Ambiguous(_) => "ambiguous",
            Verdict::Mismatch(_) => "mismatch",
            Verdict::Unavailable(_) => "unavailable",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Accepted(d) => write!(f, "accepted ({d})"),
            Verdict::Ambiguous(v) => {
                let list: Vec<String> = v.iter().map(ToString::to_string).collect();
                write!(f, "ambiguous ({})", list.join(", "))
            }
            Verdict::Mismatch(d) => write!(f, "mismatch ({d})"),
            Verdict::Unavailable(e) => write!(f, "unavailable ({e})"),
            other => f.write_str(other.label()),
        }
    }
}

static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+-(\d{2})-(\d{2})").expect("date regex"));

/// Normalize an ISO-like date (`+1588-07-31T00:00:00Z`, `1588-07-31`) to
/// day/month. Zero day or month, or a precision coarser than a day, yields `None`.
pub fn normalize_fact(fact: &DateFact) -> Option<DayMonth> {
    if matches!(fact.precision, Some(p) if p < 11) {
        return None;
    }
    normalize_date(&fact.value)
}

pub fn normalize_date(raw: &str) -> Option<DayMonth> {
    let caps = DATE_RE.captures(raw.trim())?;
    let month: u32 = caps.get(1)?.as_str().parse().ok()?;
    let day: u32 = caps.get(2)?.as_str().parse().ok()?;
    DayMonth::new(day, month)
}

/// Decide from already-fetched facts (pure part of the protocol).
pub fn judge(facts: &[DateFact], claim: ClaimType, today: DayMonth) -> Verdict {
    for prop in DateProperty::for_claim(claim) {
        let values: BTreeSet<DayMonth> = facts
            .iter()
            .filter(|f| f.property == *prop)
            .filter_map(normalize_fact)
            .collect();
        if values.is_empty() {
            continue;
        }
        if values.len() > 1 {
            return Verdict::Ambiguous(values.into_iter().collect());
        }
        return match values.into_iter().next() {
            Some(only) if only == today => Verdict::Accepted(only),
            Some(only) => Verdict::Mismatch(only),
            None => Verdict::NoExactDate,
        };
    }
    Verdict::NoExactDate
}

/// Runs the protocol against a knowledge base.
pub struct DateVerifier<K: KnowledgeBase> {
    kb: K,
}

impl<K: KnowledgeBase> DateVerifier<K> {
    pub fn new(kb: K) -> Self {
        Self { kb }
    }

    pub async fn check(&self, candidate: &CandidateEvent, today: DayMonth) -> Verdict {
        let Some(name) = candidate.entity_name.as_deref() else {
            return Verdict::MissingEntity;
        };
        let claim = candidate.claim_type.unwrap_or(ClaimType::Event);

        let id = match self.kb.resolve_entity(name).await {
            Ok(Some(id)) => id,
            Ok(None) => return Verdict::NoEntityMatch,
            Err(e) => return Verdict::Unavailable(e.to_string()),
        };
        let facts = match self.kb.date_facts(&id).await {
            Ok(f) => f,
            Err(e) => return Verdict::Unavailable(e.to_string()),
        };
        let verdict = judge(&facts, claim, today);
        tracing::debug!(
            target: "verify",
            entity = name,
            %id,
            claim = ?claim,
            facts = facts.len(),
            verdict = %verdict,
            "date check"
        );
        verdict
    }

    pub async fn verify(&self, candidate: &CandidateEvent, today: DayMonth) -> bool {
        self.check(candidate, today).await.is_accepted()
    }
}

/// Object-safe view used by the selector.
#[async_trait]
pub trait CandidateVerifier: Send + Sync {
    async fn check(&self, candidate: &CandidateEvent, today: DayMonth) -> Verdict;
}

#[async_trait]
impl<K: KnowledgeBase> CandidateVerifier for DateVerifier<K> {
    async fn check(&self, candidate: &CandidateEvent, today: DayMonth) -> Verdict {
        DateVerifier::check(self, candidate, today).await
    }
}
