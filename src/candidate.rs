//! Candidate records flowing through the selection pipeline, plus the
//! `DayMonth` date key shared by the verifier, the pending slot and the engine.

use std::fmt;
use std::str::FromStr;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Which adapter produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTag {
    /// Structured knowledge-graph query already scoped to today's date.
    KnowledgeGraph,
    /// HTML list scraped from a per-day history page.
    Scraped,
    /// Candidate proposed by the language model (unverified).
    Generated,
}

impl SourceTag {
    /// Pre-scoped sources were filtered to today's day/month upstream (query
    /// filter or per-day page) and do not need a date cross-check.
    pub fn is_prescoped(self) -> bool {
        matches!(self, SourceTag::KnowledgeGraph | SourceTag::Scraped)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SourceTag::KnowledgeGraph => "knowledge_graph",
            SourceTag::Scraped => "scraped",
            SourceTag::Generated => "generated",
        }
    }
}

/// What kind of fact the candidate claims happened on the date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimType {
    Event,
    Birth,
    Death,
}

impl FromStr for ClaimType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "event" | "evento" => Ok(ClaimType::Event),
            "birth" | "nacimiento" => Ok(ClaimType::Birth),
            "death" | "muerte" | "fallecimiento" => Ok(ClaimType::Death),
            other => anyhow::bail!("unknown claim type: {other}"),
        }
    }
}

/// A prospective historical fact, normalized from one of the source adapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CandidateRecord")]
pub struct CandidateEvent {
    /// Negative years are BCE.
    pub year: i32,
    pub text: String,
    pub source: SourceTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claim_type: Option<ClaimType>,
    /// Illustration that may be attached to the headline post.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Wire shape of a candidate; deserialization goes through the same checks as `new`.
#[derive(Deserialize)]
struct CandidateRecord {
    year: i32,
    text: String,
    source: SourceTag,
    #[serde(default)]
    entity_name: Option<String>,
    #[serde(default)]
    claim_type: Option<ClaimType>,
    #[serde(default)]
    image_url: Option<String>,
}

impl TryFrom<CandidateRecord> for CandidateEvent {
    type Error = &'static str;

    fn try_from(r: CandidateRecord) -> Result<Self, Self::Error> {
        let mut c = CandidateEvent::new(r.year, r.text, r.source).ok_or("candidate text is empty")?;
        c.entity_name = r.entity_name.filter(|n| !n.trim().is_empty());
        c.claim_type = r.claim_type;
        c.image_url = r.image_url;
        Ok(c)
    }
}

impl CandidateEvent {
    /// Returns `None` when the text is blank; a candidate never carries empty text.
    pub fn new(year: i32, text: impl Into<String>, source: SourceTag) -> Option<Self> {
        let text = text.into();
        if text.trim().is_empty() {
            return None;
        }
        Some(Self {
            year,
            text,
            source,
            entity_name: None,
            claim_type: None,
            image_url: None,
        })
    }

    pub fn with_entity(mut self, name: impl Into<String>, claim: ClaimType) -> Self {
        let name = name.into();
        if !name.trim().is_empty() {
            self.entity_name = Some(name);
            self.claim_type = Some(claim);
        }
        self
    }

    pub fn with_image(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    /// Short stable id for logs (never log raw text at info level).
    pub fn log_id(&self) -> String {
        use sha2::{Digest, Sha256};
        let digest = Sha256::digest(self.text.as_bytes());
        let mut out = String::with_capacity(12);
        for b in digest.iter().take(6) {
            use std::fmt::Write as _;
            let _ = write!(&mut out, "{:02x}", b);
        }
        out
    }
}

/// Boolean lexicon membership computed by the scorer. Pure function of the text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CandidateFlags {
    pub has_spanish_actor: bool,
    pub has_spanish_wide: bool,
    pub has_spanish_theatre: bool,
    pub has_military: bool,
    pub has_diplomatic: bool,
    pub has_foreign: bool,
    /// Number of distinct low-priority tokens found.
    pub low_priority_hits: usize,
}

/// A candidate after one scoring pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredCandidate {
    pub candidate: CandidateEvent,
    pub score: f32,
    pub flags: CandidateFlags,
    /// Human-readable trace of every contribution, e.g. `actor:+35`.
    pub reasons: Vec<String>,
}

/// Day/month key used to compare "today" against claimed and stored dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DayMonth {
    pub day: u32,
    pub month: u32,
}

/// Calendar order: month first, then day.
impl Ord for DayMonth {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.month, self.day).cmp(&(other.month, other.day))
    }
}

impl PartialOrd for DayMonth {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl DayMonth {
    /// Rejects zero/out-of-range components (unknown day or month).
    pub fn new(day: u32, month: u32) -> Option<Self> {
        if (1..=31).contains(&day) && (1..=12).contains(&month) {
            Some(Self { day, month })
        } else {
            None
        }
    }

    pub fn from_date<D: Datelike>(date: &D) -> Self {
        Self {
            day: date.day(),
            month: date.month(),
        }
    }

    pub fn month_name_es(&self) -> &'static str {
        const MONTHS: [&str; 12] = [
            "enero",
            "febrero",
            "marzo",
            "abril",
            "mayo",
            "junio",
            "julio",
            "agosto",
            "septiembre",
            "octubre",
            "noviembre",
            "diciembre",
        ];
        MONTHS[(self.month as usize).saturating_sub(1).min(11)]
    }
}

impl fmt::Display for DayMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}/{:02}", self.day, self.month)
    }
}

impl FromStr for DayMonth {
    type Err = anyhow::Error;

    /// Parses the `DD/MM` form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (d, m) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| anyhow::anyhow!("date key must look like DD/MM, got {s:?}"))?;
        let day: u32 = d.parse()?;
        let month: u32 = m.parse()?;
        DayMonth::new(day, month).ok_or_else(|| anyhow::anyhow!("date key out of range: {s:?}"))
    }
}
