// src/config/bot.rs
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf, time::Duration};

use crate::net::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/bot.toml";
pub const ENV_CONFIG_PATH: &str = "EFEMERIDES_CONFIG_PATH";
pub const ENV_DRY_RUN: &str = "EFEMERIDES_DRY_RUN";
pub const ENV_TZ: &str = "EFEMERIDES_TZ";
pub const ENV_PENDING_PATH: &str = "EFEMERIDES_PENDING_PATH";

/// Hard ceiling for follow-up posts in one thread.
pub const MAX_FOLLOWUPS: usize = 5;

/// Immutable runtime configuration. Built once in `main` and passed down.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    pub bot: BotSection,
    pub sources: SourcesSection,
    pub verify: VerifySection,
    pub generation: GenerationSection,
    pub publish: PublishSection,
    pub net: NetSection,
    pub pending: PendingSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSection {
    /// IANA zone used to decide what "today" is.
    pub timezone: String,
    pub hashtags: Vec<String>,
    /// Fixed phrase of the headline prefix, followed by the year.
    pub phrase: String,
    pub flag: String,
    /// Log the thread instead of publishing it.
    pub dry_run: bool,
}

impl Default for BotSection {
    fn default() -> Self {
        Self {
            timezone: "Europe/Madrid".into(),
            hashtags: vec![
                "#TalDiaComoHoy".into(),
                "#España".into(),
                "#HistoriaDeEspaña".into(),
                "#Efemérides".into(),
            ],
            phrase: "En tal día como hoy del año".into(),
            flag: "🇪🇸".into(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesSection {
    pub knowledge_graph: bool,
    pub scrape: bool,
    pub generated: bool,
    pub sparql_endpoint: String,
    pub sites: Vec<SiteConfig>,
}

impl Default for SourcesSection {
    fn default() -> Self {
        Self {
            knowledge_graph: true,
            scrape: true,
            generated: false,
            sparql_endpoint: "https://query.wikidata.org/sparql".into(),
            sites: vec![SiteConfig {
                name: "wikipedia_es".into(),
                url_template: "https://es.wikipedia.org/wiki/{day}_de_{month_name}".into(),
                item_selector: "#mw-content-text ul > li".into(),
            }],
        }
    }
}

/// One scraped history page. The URL template understands `{day}`,
/// `{month}` (two digits) and `{month_name}` (Spanish, lowercase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub url_template: String,
    pub item_selector: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifySection {
    /// Cross-check generated candidates against Wikidata.
    pub enabled: bool,
    pub api_url: String,
    pub language: String,
}

impl Default for VerifySection {
    fn default() -> Self {
        Self {
            enabled: true,
            api_url: "https://www.wikidata.org/w/api.php".into(),
            language: "es".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSection {
    pub model: String,
    pub api_url: String,
    pub soft_limit: usize,
    pub hard_limit: usize,
    pub thread: bool,
    pub max_followups: usize,
    pub temperature: f32,
}

impl Default for GenerationSection {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            api_url: "https://api.openai.com/v1/chat/completions".into(),
            soft_limit: 260,
            hard_limit: 275,
            thread: true,
            max_followups: 3,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishSection {
    pub api_base: String,
    pub attach_media: bool,
    pub recent_lookback_days: u32,
    /// Only recent posts containing this substring count as previous efemérides.
    pub recent_filter: String,
}

impl Default for PublishSection {
    fn default() -> Self {
        Self {
            api_base: "https://api.x.com".into(),
            attach_media: true,
            recent_lookback_days: 7,
            recent_filter: "En tal día como hoy".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetSection {
    pub retries: u32,
    pub backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for NetSection {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff_ms: 2_000,
            timeout_secs: 20,
        }
    }
}

impl NetSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retries, Duration::from_millis(self.backoff_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PendingSection {
    pub path: PathBuf,
}

impl Default for PendingSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("state/pending_thread.json"),
        }
    }
}

impl BotConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: BotConfig = toml::from_str(s).context("parsing bot config TOML")?;
        cfg.validated()
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading bot config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolve the config file:
    /// 1) `$EFEMERIDES_CONFIG_PATH` (must exist)
    /// 2) `config/bot.toml`
    /// 3) built-in defaults
    ///
    /// Env overrides are applied last.
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                anyhow::bail!("{ENV_CONFIG_PATH} points to non-existent path");
            }
            Self::load_from(&pb)?
        } else if Path::new(DEFAULT_CONFIG_PATH).exists() {
            Self::load_from(Path::new(DEFAULT_CONFIG_PATH))?
        } else {
            Self::default()
        };
        cfg.with_env_overrides()
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(v) = env::var(ENV_DRY_RUN) {
            self.bot.dry_run = matches!(v.trim(), "1" | "true" | "yes");
        }
        if let Ok(tz) = env::var(ENV_TZ) {
            if !tz.trim().is_empty() {
                self.bot.timezone = tz.trim().to_string();
            }
        }
        if let Ok(p) = env::var(ENV_PENDING_PATH) {
            if !p.trim().is_empty() {
                self.pending.path = PathBuf::from(p.trim());
            }
        }
        self.validated()
    }

    fn validated(mut self) -> Result<Self> {
        self.timezone()?;
        if self.generation.hard_limit == 0 {
            anyhow::bail!("generation.hard_limit must be positive");
        }
        if self.generation.soft_limit > self.generation.hard_limit {
            self.generation.soft_limit = self.generation.hard_limit;
        }
        self.generation.max_followups = self.generation.max_followups.min(MAX_FOLLOWUPS);
        self.bot.hashtags.retain(|h| !h.trim().is_empty());
        Ok(self)
    }

    pub fn timezone(&self) -> Result<chrono_tz::Tz> {
        self.bot
            .timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|e| anyhow::anyhow!("invalid timezone {:?}: {e}", self.bot.timezone))
    }

    /// Literal opening every headline must carry, e.g. `🇪🇸 En tal día como hoy del año 1492, `.
    pub fn headline_prefix(&self, year: i32) -> String {
        crate::compose::headline_prefix(&self.bot.flag, &self.bot.phrase, year)
    }

    pub fn hashtag_line(&self) -> String {
        self.bot.hashtags.join(" ")
    }

    /// Generated candidates are only trusted after a date cross-check.
    pub fn verification_active(&self) -> bool {
        self.verify.enabled && self.sources.generated
    }
}

/// Credentials read from the environment only. Never logged.
#[derive(Clone, Default)]
pub struct Secrets {
    pub openai_api_key: Option<String>,
    pub x_access_token: Option<String>,
    pub x_user_id: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        fn non_empty(key: &str) -> Option<String> {
            env::var(key).ok().filter(|v| !v.trim().is_empty())
        }
        Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            x_access_token: non_empty("X_USER_ACCESS_TOKEN"),
            x_user_id: non_empty("X_USER_ID"),
        }
    }
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let len = |v: &Option<String>| v.as_ref().map(|s| s.len()).unwrap_or(0);
        f.debug_struct("Secrets")
            .field("openai_key_len", &len(&self.openai_api_key))
            .field("x_token_len", &len(&self.x_access_token))
            .field("x_user_id_set", &self.x_user_id.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_daily_bot() {
        let cfg = BotConfig::default();
        assert_eq!(cfg.bot.timezone, "Europe/Madrid");
        assert_eq!(cfg.generation.soft_limit, 260);
        assert_eq!(cfg.generation.hard_limit, 275);
        assert_eq!(
            cfg.hashtag_line(),
            "#TalDiaComoHoy #España #HistoriaDeEspaña #Efemérides"
        );
        assert!(!cfg.verification_active());
    }

    #[test]
    fn prefix_handles_bce_years() {
        let cfg = BotConfig::default();
        assert_eq!(
            cfg.headline_prefix(1492),
            "🇪🇸 En tal día como hoy del año 1492, "
        );
        assert_eq!(
            cfg.headline_prefix(-218),
            "🇪🇸 En tal día como hoy del año 218 a. C., "
        );
    }

    #[test]
    fn partial_toml_keeps_defaults_and_clamps() {
        let cfg = BotConfig::from_toml_str(
            r#"
[generation]
soft_limit = 400
hard_limit = 275
max_followups = 9

[sources]
generated = true
"#,
        )
        .unwrap();
        assert_eq!(cfg.generation.soft_limit, 275);
        assert_eq!(cfg.generation.max_followups, MAX_FOLLOWUPS);
        assert!(cfg.sources.knowledge_graph);
        assert!(cfg.verification_active());
        assert_eq!(cfg.net, NetSection::default());
    }

    #[test]
    fn bad_timezone_is_an_error() {
        let err = BotConfig::from_toml_str("[bot]\ntimezone = \"Mars/Olympus\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn secrets_debug_hides_values() {
        let s = Secrets {
            openai_api_key: Some("sk-secret".into()),
            x_access_token: None,
            x_user_id: Some("42".into()),
        };
        let dbg = format!("{s:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("openai_key_len: 9"));
    }
}
