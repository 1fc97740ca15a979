//! Weighted token lexicons and the scoring policy table.
//!
//! TOML shape (see `config/lexicons.toml`):
//! ```toml
//! [weights]
//! actor = 35
//! wide = 18
//! # ...
//! [lexicons]
//! spanish_actor = ["tercios", "armada española"]
//! # ...
//! ```
//!
//! Loaded once at startup and shared read-only with the scorer and the
//! duplicate filter.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_LEXICON_PATH: &str = "config/lexicons.toml";
pub const ENV_LEXICON_PATH: &str = "EFEMERIDES_LEXICON_PATH";

/// Shipped copy of `config/lexicons.toml`, used when no file is found on disk.
pub const BUILTIN_LEXICONS_TOML: &str = include_str!("../../config/lexicons.toml");

/// Numeric weights applied by the scorer. Every value is configurable.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    pub actor: f32,
    pub wide: f32,
    pub theatre: f32,
    pub military: f32,
    pub diplomatic: f32,
    /// Subtracted once per low-priority token found.
    pub low_priority_each: f32,
    pub era_bonus: f32,
    pub era_start: i32,
    pub era_end: i32,
    /// Subtracted when a foreign military event lacks Spanish agency and diplomacy.
    pub foreign_battle: f32,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            actor: 35.0,
            wide: 18.0,
            theatre: 5.0,
            military: 12.0,
            diplomatic: 8.0,
            low_priority_each: 12.0,
            era_bonus: 5.0,
            era_start: 1400,
            era_end: 1899,
            foreign_battle: 40.0,
        }
    }
}

/// A named, ordered set of lowercase tokens with a signed weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexicon {
    pub name: &'static str,
    tokens: Vec<String>,
    /// Positive = bonus, negative = penalty, zero = only used as a flag.
    pub weight: f32,
}

impl Lexicon {
    pub fn new<I, S>(name: &'static str, tokens: I, weight: f32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<String> = Vec::new();
        for t in tokens {
            let t = t.as_ref().trim().to_lowercase();
            if !t.is_empty() && !out.contains(&t) {
                out.push(t);
            }
        }
        Self {
            name,
            tokens: out,
            weight,
        }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// `lower_text` must already be lowercased.
    pub fn matches(&self, lower_text: &str) -> bool {
        self.tokens.iter().any(|t| lower_text.contains(t.as_str()))
    }

    /// All tokens contained in `lower_text`, in lexicon order.
    pub fn matched<'a>(&'a self, lower_text: &str) -> Vec<&'a str> {
        self.tokens
            .iter()
            .filter(|t| lower_text.contains(t.as_str()))
            .map(String::as_str)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct LexiconFile {
    #[serde(default)]
    weights: ScoringPolicy,
    lexicons: LexiconLists,
}

#[derive(Debug, Deserialize)]
struct LexiconLists {
    #[serde(default)]
    spanish_actor: Vec<String>,
    #[serde(default)]
    spanish_wide: Vec<String>,
    #[serde(default)]
    spanish_theatre: Vec<String>,
    #[serde(default)]
    military: Vec<String>,
    #[serde(default)]
    diplomatic: Vec<String>,
    #[serde(default)]
    foreign_actor: Vec<String>,
    #[serde(default)]
    low_priority: Vec<String>,
}

/// The seven lexicons plus the policy that weights them.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexicons {
    pub policy: ScoringPolicy,
    pub spanish_actor: Lexicon,
    pub spanish_wide: Lexicon,
    pub spanish_theatre: Lexicon,
    pub military: Lexicon,
    pub diplomatic: Lexicon,
    pub foreign_actor: Lexicon,
    pub low_priority: Lexicon,
}

impl Lexicons {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: LexiconFile = toml::from_str(s).context("parsing lexicon TOML")?;
        let p = file.weights;
        let l = file.lexicons;
        let out = Self {
            policy: p,
            spanish_actor: Lexicon::new("spanish_actor", l.spanish_actor, p.actor),
            spanish_wide: Lexicon::new("spanish_wide", l.spanish_wide, p.wide),
            spanish_theatre: Lexicon::new("spanish_theatre", l.spanish_theatre, p.theatre),
            military: Lexicon::new("military", l.military, p.military),
            diplomatic: Lexicon::new("diplomatic", l.diplomatic, p.diplomatic),
            foreign_actor: Lexicon::new("foreign_actor", l.foreign_actor, 0.0),
            low_priority: Lexicon::new("low_priority", l.low_priority, -p.low_priority_each),
        };
        if p.era_start > p.era_end {
            anyhow::bail!(
                "era_start ({}) must not be after era_end ({})",
                p.era_start,
                p.era_end
            );
        }
        Ok(out)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading lexicons from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// The lexicons compiled into the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_LEXICONS_TOML)
    }

    /// Resolve the lexicon file:
    /// 1) `$EFEMERIDES_LEXICON_PATH` (must exist)
    /// 2) `config/lexicons.toml`
    /// 3) built-in copy
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_LEXICON_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                anyhow::bail!("{ENV_LEXICON_PATH} points to non-existent path");
            }
            return Self::load_from(&pb);
        }
        let default = PathBuf::from(DEFAULT_LEXICON_PATH);
        if default.exists() {
            return Self::load_from(&default);
        }
        tracing::debug!(target: "lexicon", "no lexicon file on disk, using built-in lists");
        Self::builtin()
    }

    /// Tokens whose co-occurrence marks a topic as already covered:
    /// actor + wide + military + diplomatic, first occurrence wins.
    pub fn thematic_tokens(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for lex in [
            &self.spanish_actor,
            &self.spanish_wide,
            &self.military,
            &self.diplomatic,
        ] {
            for t in lex.tokens() {
                if !out.contains(&t.as_str()) {
                    out.push(t.as_str());
                }
            }
        }
        out
    }
}
