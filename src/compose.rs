//! # Compose
//! Post text for the selected candidate: a headline that must open with the
//! fixed date prefix and fit the hard length limit (hashtags included), plus
//! optional follow-ups for a thread.
//!
//! The language model writes the prose; everything it returns is repaired
//! here before it can reach the publisher. Output that cannot be repaired is
//! `GenerationError::Malformed` and aborts the run.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::analyze::ai_adapter::{strip_code_fence, ChatRequest, DynLlm, LlmError};
use crate::candidate::{CandidateEvent, DayMonth};
use crate::config::BotConfig;

static HASHTAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"#[\p{L}\p{N}_]+").unwrap());
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:\d{1,2}\s*[./)]|[-*•])\s+").unwrap());
static SPACES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("malformed generation: {0}")]
    Malformed(String),
    #[error(transparent)]
    Provider(#[from] LlmError),
}

/// `{flag} {phrase} {year}, ` with BCE years written as `218 a. C.`.
pub fn headline_prefix(flag: &str, phrase: &str, year: i32) -> String {
    let year = if year < 0 {
        format!("{} a. C.", year.unsigned_abs())
    } else {
        year.to_string()
    };
    format!("{flag} {phrase} {year}, ")
}

/// Formatting contract shared by every generator.
#[derive(Debug, Clone)]
pub struct PostFormat {
    pub flag: String,
    pub phrase: String,
    /// Space-joined hashtag line; empty means no hashtags.
    pub hashtags: String,
    pub soft_limit: usize,
    pub hard_limit: usize,
    pub max_followups: usize,
    prefix_re: Regex,
}

impl PostFormat {
    pub fn new(
        flag: &str,
        phrase: &str,
        hashtags: &str,
        soft_limit: usize,
        hard_limit: usize,
        max_followups: usize,
    ) -> Self {
        // Any leading symbols (flag emoji), the phrase, the year, then its comma.
        let pattern = format!(
            r"(?i)^[^\p{{L}}\p{{N}}]*{}\s+[\d.]{{1,5}}(?:\s*a\.\s*c\.)?(?:\s*,\s*|\s+|$)",
            regex::escape(phrase.trim())
        );
        let prefix_re = Regex::new(&pattern).unwrap_or_else(|_| Regex::new(r"^\b$").unwrap());
        Self {
            flag: flag.to_string(),
            phrase: phrase.trim().to_string(),
            hashtags: hashtags.trim().to_string(),
            soft_limit,
            hard_limit,
            max_followups,
            prefix_re,
        }
    }

    pub fn from_config(cfg: &BotConfig) -> Self {
        Self::new(
            &cfg.bot.flag,
            &cfg.bot.phrase,
            &cfg.hashtag_line(),
            cfg.generation.soft_limit,
            cfg.generation.hard_limit,
            if cfg.generation.thread {
                cfg.generation.max_followups
            } else {
                0
            },
        )
    }

    pub fn prefix(&self, year: i32) -> String {
        headline_prefix(&self.flag, &self.phrase, year)
    }

    fn strip_prefix<'a>(&self, s: &'a str) -> &'a str {
        match self.prefix_re.find(s) {
            Some(m) => &s[m.end()..],
            None => s,
        }
    }
}

/// Cut to at most `max_chars` characters at a word boundary, ending with `…`.
pub fn truncate_words(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    if max_chars < 2 {
        return String::new();
    }
    let keep: String = s.chars().take(max_chars - 1).collect();
    let cut = match keep.rfind(char::is_whitespace) {
        Some(i) if i > 0 => &keep[..i],
        _ => keep.as_str(),
    };
    let cut = cut.trim_end_matches(|c: char| {
        c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-' | '–' | '(')
    });
    if cut.is_empty() {
        return String::new();
    }
    format!("{cut}…")
}

/// Normalize model prose: markup, quotes around the whole answer, hashtags.
fn clean_text(raw: &str) -> String {
    let s = crate::ingest::normalize_text(raw);
    let s = HASHTAG.replace_all(&s, "");
    let s = SPACES.replace_all(s.trim(), " ");
    s.trim_matches(|c: char| c == '"' || c == '\'' || c.is_whitespace())
        .to_string()
}

/// Repair a headline: force the prefix, fit the hard limit, append hashtags.
pub fn enforce_headline(raw: &str, year: i32, fmt: &PostFormat) -> Result<String, GenerationError> {
    let cleaned = clean_text(raw);
    let body = fmt.strip_prefix(&cleaned).trim();
    if body.is_empty() {
        return Err(GenerationError::Malformed("headline has no body".into()));
    }

    let prefix = fmt.prefix(year);
    let prefix_len = prefix.chars().count();
    let tags_len = if fmt.hashtags.is_empty() {
        0
    } else {
        fmt.hashtags.chars().count() + 1
    };

    let (room, with_tags) = if tags_len > 0 && prefix_len + tags_len < fmt.hard_limit {
        (fmt.hard_limit - prefix_len - tags_len, true)
    } else {
        (fmt.hard_limit.saturating_sub(prefix_len), false)
    };
    let body = truncate_words(body, room);
    if body.is_empty() {
        return Err(GenerationError::Malformed(format!(
            "no room for text within {} chars",
            fmt.hard_limit
        )));
    }

    let mut out = format!("{prefix}{body}");
    if with_tags {
        out.push(' ');
        out.push_str(&fmt.hashtags);
    }
    Ok(out)
}

/// Follow-ups from a JSON array of strings, or one per non-empty line.
pub fn clean_followups(raw: &str, fmt: &PostFormat) -> Vec<String> {
    let raw = strip_code_fence(raw);
    let items: Vec<String> = match serde_json::from_str::<Vec<String>>(raw) {
        Ok(v) => v,
        Err(_) => raw.lines().map(str::to_string).collect(),
    };
    items
        .iter()
        .map(|s| LIST_MARKER.replace(s, "").to_string())
        .map(|s| clean_text(&s))
        .map(|s| fmt.strip_prefix(&s).trim().to_string())
        .filter(|s| !s.is_empty())
        .map(|s| truncate_words(&s, fmt.hard_limit))
        .filter(|s| !s.is_empty())
        .take(fmt.max_followups)
        .collect()
}

/// Text generation seam.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_headline(
        &self,
        candidate: &CandidateEvent,
        today: DayMonth,
    ) -> Result<String, GenerationError>;

    async fn generate_followups(
        &self,
        candidate: &CandidateEvent,
    ) -> Result<Vec<String>, GenerationError>;
}

const SYSTEM: &str = "Eres un divulgador de historia de España que escribe publicaciones \
breves, rigurosas y sin opiniones para la red social X.";

pub struct LlmTextGenerator {
    llm: DynLlm,
    format: PostFormat,
    temperature: f32,
}

impl LlmTextGenerator {
    pub fn new(llm: DynLlm, format: PostFormat, temperature: f32) -> Self {
        Self {
            llm,
            format,
            temperature,
        }
    }

    fn headline_prompt(&self, c: &CandidateEvent, today: DayMonth) -> String {
        format!(
            "Escribe una publicación sobre este hecho del {day} de {month}: {text}\n\
Debe empezar exactamente por \"{prefix}\" y tener como máximo {limit} caracteres en total. \
No añadas hashtags ni comillas.",
            day = today.day,
            month = today.month_name_es(),
            text = c.text,
            prefix = self.format.prefix(c.year),
            limit = self.format.soft_limit,
        )
    }

    fn followup_prompt(&self, c: &CandidateEvent) -> String {
        format!(
            "Escribe hasta {n} publicaciones que continúen un hilo sobre este hecho del año {year}: {text}\n\
Cada una con un dato nuevo y como máximo {limit} caracteres. Sin hashtags y sin repetir la fecha. \
Devuelve solo un array JSON de cadenas.",
            n = self.format.max_followups,
            year = c.year,
            text = c.text,
            limit = self.format.soft_limit,
        )
    }
}

#[async_trait]
impl TextGenerator for LlmTextGenerator {
    async fn generate_headline(
        &self,
        candidate: &CandidateEvent,
        today: DayMonth,
    ) -> Result<String, GenerationError> {
        let prompt = self.headline_prompt(candidate, today);
        let raw = self
            .llm
            .complete(ChatRequest {
                system: SYSTEM,
                user: &prompt,
                temperature: self.temperature,
                max_tokens: 300,
            })
            .await?;
        enforce_headline(&raw, candidate.year, &self.format)
    }

    async fn generate_followups(
        &self,
        candidate: &CandidateEvent,
    ) -> Result<Vec<String>, GenerationError> {
        if self.format.max_followups == 0 {
            return Ok(Vec::new());
        }
        let prompt = self.followup_prompt(candidate);
        let raw = self
            .llm
            .complete(ChatRequest {
                system: SYSTEM,
                user: &prompt,
                temperature: self.temperature,
                max_tokens: 900,
            })
            .await?;
        Ok(clean_followups(&raw, &self.format))
    }
}

/// Deterministic fallback used when no model is configured: the candidate
/// text itself under the required prefix, no follow-ups.
pub struct TemplateGenerator {
    format: PostFormat,
}

impl TemplateGenerator {
    pub fn new(format: PostFormat) -> Self {
        Self { format }
    }
}

#[async_trait]
impl TextGenerator for TemplateGenerator {
    async fn generate_headline(
        &self,
        candidate: &CandidateEvent,
        _today: DayMonth,
    ) -> Result<String, GenerationError> {
        enforce_headline(&candidate.text, candidate.year, &self.format)
    }

    async fn generate_followups(
        &self,
        _candidate: &CandidateEvent,
    ) -> Result<Vec<String>, GenerationError> {
        Ok(Vec::new())
    }
}

/// Headline plus follow-ups, ready to publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedThread {
    pub headline: String,
    pub followups: Vec<String>,
}

/// The headline is mandatory; a failed follow-up call degrades to a single post.
pub async fn compose_thread(
    generator: &dyn TextGenerator,
    candidate: &CandidateEvent,
    today: DayMonth,
    with_followups: bool,
) -> Result<ComposedThread, GenerationError> {
    let headline = generator.generate_headline(candidate, today).await?;
    let followups = if with_followups {
        match generator.generate_followups(candidate).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(target: "compose", error = %e, "follow-ups unavailable, posting headline only");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };
    tracing::info!(
        target: "compose",
        id = %candidate.log_id(),
        headline_chars = headline.chars().count(),
        followups = followups.len(),
        "thread composed"
    );
    Ok(ComposedThread {
        headline,
        followups,
    })
}
