//! # Engine
//! One scheduled invocation: pending thread first, then
//! ingest → recent posts → select → compose → publish.
//!
//! Collaborators are injected through `Engine`; `App` owns the real ones
//! built from configuration.

use anyhow::{Context, Result};
use chrono::Utc;
use metrics::counter;
use std::sync::Arc;
use tracing::{info, warn};

use crate::analyze::ai_adapter::build_llm_client;
use crate::analyze::Lexicons;
use crate::candidate::DayMonth;
use crate::compose::{compose_thread, LlmTextGenerator, PostFormat, TemplateGenerator, TextGenerator};
use crate::config::{BotConfig, Secrets};
use crate::history::{previous_texts, NoHistory, RecentPosts};
use crate::ingest::{self, providers, types::SourceProvider};
use crate::pending::{PendingStore, PendingThread};
use crate::publish::{
    download_media, publish_thread, DryRunPublisher, Media, Publisher, ThreadError,
    ThreadPlan, XClient,
};
use crate::selector::Selector;
use crate::verify::{CandidateVerifier, DateVerifier, WikidataClient};

/// How a run ended. Every variant is a clean exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published { posts: usize, year: i32 },
    PendingPublished { posts: usize },
    /// Rate limited; the thread is in the pending slot for the next run.
    Deferred,
    NothingToPublish,
}

impl Outcome {
    pub fn code(&self) -> i32 {
        match self {
            Outcome::Published { .. } => 0,
            Outcome::PendingPublished { .. } => 1,
            Outcome::Deferred => 2,
            Outcome::NothingToPublish => 3,
        }
    }
}

/// Today's day/month in the configured zone.
pub fn today_in(tz: chrono_tz::Tz) -> DayMonth {
    DayMonth::from_date(&Utc::now().with_timezone(&tz))
}

pub struct Engine<'a> {
    pub config: &'a BotConfig,
    pub lexicons: &'a Lexicons,
    pub providers: &'a [Box<dyn SourceProvider>],
    pub history: &'a dyn RecentPosts,
    /// `Some` enables strict mode.
    pub verifier: Option<&'a dyn CandidateVerifier>,
    pub generator: &'a dyn TextGenerator,
    pub publisher: &'a dyn Publisher,
    pub pending: &'a PendingStore,
    /// Client for headline images; `None` disables media.
    pub media_http: Option<&'a reqwest::Client>,
    /// Leave the pending slot alone (dry runs).
    pub read_only_state: bool,
}

impl<'a> Engine<'a> {
    pub async fn run_once(&self, today: DayMonth) -> Result<Outcome> {
        info!(target: "engine", today = %today, "run started");

        // 1) pending thread for today goes first
        if let Some(p) = self.pending.load() {
            if p.is_for(today) {
                return self.publish_pending(p, today).await;
            }
            info!(
                target: "engine",
                stored = %p.target_date_key,
                today = %today,
                "pending thread is for another date, leaving it untouched"
            );
        }

        // 2) ingest (fail-skip per provider)
        let report = ingest::run_once(self.providers, today).await;
        if report.candidates.is_empty() {
            if report.all_failed(self.providers.len()) {
                warn!(target: "engine", "all sources failed, nothing to publish");
            } else {
                info!(target: "engine", "no candidates for today");
            }
            return Ok(Outcome::NothingToPublish);
        }

        // 3) previous posts (fail-open)
        let previous = previous_texts(self.history, &self.config.publish.recent_filter).await;

        // 4) select
        let mut selector = Selector::new(self.lexicons);
        if let Some(v) = self.verifier {
            selector = selector.with_verifier(v);
        }
        let Some(chosen) = selector.select(report.candidates, &previous, today).await else {
            info!(target: "engine", "no acceptable candidate, not publishing today");
            return Ok(Outcome::NothingToPublish);
        };

        // 5) compose; malformed output aborts before anything is posted
        let with_followups =
            self.config.generation.thread && self.config.generation.max_followups > 0;
        let thread = compose_thread(self.generator, &chosen.candidate, today, with_followups)
            .await
            .context("composing post text")?;

        // 6) publish
        let media = self.fetch_media(chosen.candidate.image_url.as_deref()).await;
        let plan = ThreadPlan {
            headline: thread.headline,
            followups: thread.followups,
            reply_to: None,
        };
        match publish_thread(self.publisher, &plan, media.as_ref()).await {
            Ok(ids) => {
                info!(target: "engine", posts = ids.len(), year = chosen.candidate.year, "thread published");
                Ok(Outcome::Published {
                    posts: ids.len(),
                    year: chosen.candidate.year,
                })
            }
            Err(e) if e.is_rate_limited() => {
                self.defer(e.into_pending(&plan.headline, today))?;
                Ok(Outcome::Deferred)
            }
            Err(e) => Err(anyhow::Error::new(e).context("publishing thread")),
        }
    }

    async fn publish_pending(&self, p: PendingThread, today: DayMonth) -> Result<Outcome> {
        info!(
            target: "engine",
            followups = p.followups.len(),
            resumed = p.reply_to.is_some(),
            "publishing pending thread before new work"
        );
        let headline = p.headline.clone();
        let plan = ThreadPlan::from(p);
        match publish_thread(self.publisher, &plan, None).await {
            Ok(ids) => {
                if !self.read_only_state {
                    self.pending.clear().context("clearing pending thread")?;
                }
                Ok(Outcome::PendingPublished { posts: ids.len() })
            }
            Err(e) if e.is_rate_limited() => {
                self.defer(e.into_pending(&headline, today))?;
                Ok(Outcome::Deferred)
            }
            Err(e) => {
                // Never repost what already went out.
                if !e.published.is_empty() {
                    self.keep_remainder(&e, &headline, today)?;
                }
                Err(anyhow::Error::new(e).context("publishing pending thread"))
            }
        }
    }

    fn keep_remainder(&self, e: &ThreadError, headline: &str, today: DayMonth) -> Result<()> {
        let mut rest = PendingThread::new(headline, e.remaining.clone(), today);
        rest.reply_to = e.reply_to.clone();
        self.save(&rest)
    }

    fn defer(&self, thread: PendingThread) -> Result<()> {
        warn!(
            target: "engine",
            followups = thread.followups.len(),
            headline_posted = thread.reply_to.is_some(),
            "rate limited, saving thread for the next run"
        );
        self.save(&thread)?;
        counter!("pending_saved_total").increment(1);
        Ok(())
    }

    fn save(&self, thread: &PendingThread) -> Result<()> {
        if self.read_only_state {
            info!(target: "engine", "dry run: pending thread not saved");
            return Ok(());
        }
        self.pending.save(thread).context("saving pending thread")
    }

    async fn fetch_media(&self, url: Option<&str>) -> Option<Media> {
        if !self.config.publish.attach_media {
            return None;
        }
        let (http, url) = (self.media_http?, url?);
        match download_media(http, url).await {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(target: "engine", error = %e, "media unavailable, posting text only");
                None
            }
        }
    }
}

/// Real collaborators built from configuration and secrets.
pub struct App {
    pub config: BotConfig,
    pub lexicons: Lexicons,
    providers: Vec<Box<dyn SourceProvider>>,
    history: Arc<dyn RecentPosts>,
    verifier: Option<Box<dyn CandidateVerifier>>,
    generator: Box<dyn TextGenerator>,
    publisher: Arc<dyn Publisher>,
    pending: PendingStore,
    media_http: reqwest::Client,
}

impl App {
    pub fn from_config(config: BotConfig, lexicons: Lexicons, secrets: &Secrets) -> Result<Self> {
        let llm = build_llm_client(
            &config.generation,
            &config.net,
            secrets.openai_api_key.as_deref(),
        )?;
        let providers = providers::from_config(&config, &llm)?;

        let verifier: Option<Box<dyn CandidateVerifier>> = if config.verification_active() {
            let kb = WikidataClient::new(&config.verify, &config.net)?;
            Some(Box::new(DateVerifier::new(kb)))
        } else {
            None
        };

        let format = PostFormat::from_config(&config);
        let generator: Box<dyn TextGenerator> = if secrets.openai_api_key.is_some() {
            Box::new(LlmTextGenerator::new(
                llm,
                format,
                config.generation.temperature,
            ))
        } else {
            warn!(target: "engine", "no LLM key, headlines use the candidate text");
            Box::new(TemplateGenerator::new(format))
        };

        let x = match secrets.x_access_token.as_deref() {
            Some(token) => Some(Arc::new(XClient::new(
                &config.publish,
                &config.net,
                token,
                secrets.x_user_id.clone(),
            )?)),
            None => None,
        };
        let (publisher, history): (Arc<dyn Publisher>, Arc<dyn RecentPosts>) =
            match (config.bot.dry_run, x) {
                (false, Some(x)) => (x.clone() as Arc<dyn Publisher>, x as Arc<dyn RecentPosts>),
                (false, None) => anyhow::bail!(
                    "X_USER_ACCESS_TOKEN is not set (use EFEMERIDES_DRY_RUN=1 to run without publishing)"
                ),
                (true, Some(x)) => (Arc::new(DryRunPublisher::new()) as Arc<dyn Publisher>, x as Arc<dyn RecentPosts>),
                (true, None) => (
                    Arc::new(DryRunPublisher::new()) as Arc<dyn Publisher>,
                    Arc::new(NoHistory) as Arc<dyn RecentPosts>,
                ),
            };

        Ok(Self {
            pending: PendingStore::new(&config.pending.path),
            media_http: crate::net::http_client(config.net.timeout())?,
            config,
            lexicons,
            providers,
            history,
            verifier,
            generator,
            publisher,
        })
    }

    pub fn today(&self) -> Result<DayMonth> {
        Ok(today_in(self.config.timezone()?))
    }

    pub fn engine(&self) -> Engine<'_> {
        Engine {
            config: &self.config,
            lexicons: &self.lexicons,
            providers: &self.providers,
            history: self.history.as_ref(),
            verifier: self.verifier.as_deref(),
            generator: self.generator.as_ref(),
            publisher: self.publisher.as_ref(),
            pending: &self.pending,
            media_http: Some(&self.media_http),
            read_only_state: self.config.bot.dry_run,
        }
    }
}
