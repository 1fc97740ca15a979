// src/publish/mod.rs
pub mod dry_run;
pub mod x;

use async_trait::async_trait;
use thiserror::Error;

use crate::candidate::DayMonth;
use crate::net::Retryable;
use crate::pending::PendingThread;

pub use dry_run::DryRunPublisher;
pub use x::XClient;

pub type PostId = String;

/// X rejects images above 5 MB.
pub const MAX_MEDIA_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum PublishError {
    /// Not retried within the run; the thread goes to the pending slot.
    #[error("rate limited by platform")]
    RateLimited { reset_at: Option<i64> },
    #[error("rejected by platform (HTTP {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("unexpected response: {0}")]
    Response(String),
}

impl PublishError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, PublishError::RateLimited { .. })
    }
}

impl Retryable for PublishError {
    fn is_transient(&self) -> bool {
        match self {
            PublishError::Transport(e) => e.is_transient(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    pub bytes: Vec<u8>,
    pub mime: String,
}

/// Social platform seam.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, text: &str, media: Option<&Media>) -> Result<PostId, PublishError>;
    async fn reply(&self, parent: &PostId, text: &str) -> Result<PostId, PublishError>;
    fn name(&self) -> &'static str;
}

/// What still has to go out. `reply_to` set means the headline is already live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadPlan {
    pub headline: String,
    pub followups: Vec<String>,
    pub reply_to: Option<PostId>,
}

impl From<PendingThread> for ThreadPlan {
    fn from(p: PendingThread) -> Self {
        Self {
            headline: p.headline,
            followups: p.followups,
            reply_to: p.reply_to,
        }
    }
}

/// Publishing stopped part-way. Carries enough to resume without reposting.
#[derive(Debug, Error)]
#[error("thread publishing stopped after {} post(s): {error}", .published.len())]
pub struct ThreadError {
    #[source]
    pub error: PublishError,
    pub published: Vec<PostId>,
    /// Post the next follow-up must reply to; `None` if the headline never went out.
    pub reply_to: Option<PostId>,
    pub remaining: Vec<String>,
}

impl ThreadError {
    pub fn is_rate_limited(&self) -> bool {
        self.error.is_rate_limited()
    }

    /// Pending record holding only what was not published.
    pub fn into_pending(self, headline: &str, target: DayMonth) -> PendingThread {
        let mut p = PendingThread::new(headline, self.remaining, target);
        p.reply_to = self.reply_to;
        p
    }
}

/// Headline (unless already posted), then each follow-up replying to the previous post.
pub async fn publish_thread(
    publisher: &dyn Publisher,
    plan: &ThreadPlan,
    media: Option<&Media>,
) -> Result<Vec<PostId>, ThreadError> {
    let mut published = Vec::with_capacity(plan.followups.len() + 1);

    let mut parent = match &plan.reply_to {
        Some(id) => id.clone(),
        None => match publisher.publish(&plan.headline, media).await {
            Ok(id) => {
                tracing::info!(target: "publish", publisher = publisher.name(), post_id = %id, "headline published");
                metrics::counter!("posts_published_total").increment(1);
                published.push(id.clone());
                id
            }
            Err(error) => {
                return Err(ThreadError {
                    error,
                    published,
                    reply_to: None,
                    remaining: plan.followups.clone(),
                })
            }
        },
    };

    for (i, text) in plan.followups.iter().enumerate() {
        match publisher.reply(&parent, text).await {
            Ok(id) => {
                tracing::info!(target: "publish", post_id = %id, parent = %parent, n = i + 1, "follow-up published");
                metrics::counter!("posts_published_total").increment(1);
                published.push(id.clone());
                parent = id;
            }
            Err(error) => {
                return Err(ThreadError {
                    error,
                    published,
                    reply_to: Some(parent),
                    remaining: plan.followups[i..].to_vec(),
                })
            }
        }
    }
    Ok(published)
}

/// Fetch an image for the headline. Non-image or oversized bodies are errors.
pub async fn download_media(http: &reqwest::Client, url: &str) -> anyhow::Result<Media> {
    use anyhow::Context;

    let resp = http
        .get(url)
        .send()
        .await
        .with_context(|| format!("fetching media {url}"))?
        .error_for_status()
        .context("media HTTP status")?;
    let mime = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_ascii_lowercase())
        .unwrap_or_default();
    if !mime.starts_with("image/") {
        anyhow::bail!("media is not an image ({mime:?})");
    }
    let bytes = resp.bytes().await.context("reading media body")?;
    if bytes.len() > MAX_MEDIA_BYTES {
        anyhow::bail!("media too large: {} bytes", bytes.len());
    }
    Ok(Media {
        bytes: bytes.to_vec(),
        mime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Succeeds `ok` times, then answers with rate limits.
    struct Flaky {
        ok: usize,
        calls: Mutex<Vec<(Option<String>, String)>>,
    }

    impl Flaky {
        fn step(&self, parent: Option<&PostId>, text: &str) -> Result<PostId, PublishError> {
            let mut calls = self.calls.lock().unwrap();
            if calls.len() >= self.ok {
                return Err(PublishError::RateLimited { reset_at: None });
            }
            calls.push((parent.cloned(), text.to_string()));
            Ok(format!("p{}", calls.len()))
        }
    }

    #[async_trait]
    impl Publisher for Flaky {
        async fn publish(&self, text: &str, _media: Option<&Media>) -> Result<PostId, PublishError> {
            self.step(None, text)
        }
        async fn reply(&self, parent: &PostId, text: &str) -> Result<PostId, PublishError> {
            self.step(Some(parent), text)
        }
        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    fn plan() -> ThreadPlan {
        ThreadPlan {
            headline: "h".into(),
            followups: vec!["a".into(), "b".into()],
            reply_to: None,
        }
    }

    #[tokio::test]
    async fn followups_chain_on_previous_post() {
        let p = Flaky {
            ok: 10,
            calls: Mutex::new(vec![]),
        };
        let ids = publish_thread(&p, &plan(), None).await.unwrap();
        assert_eq!(ids, vec!["p1", "p2", "p3"]);
        let calls = p.calls.lock().unwrap();
        assert_eq!(calls[1].0.as_deref(), Some("p1"));
        assert_eq!(calls[2].0.as_deref(), Some("p2"));
    }

    #[tokio::test]
    async fn rate_limit_mid_thread_keeps_only_the_rest() {
        let p = Flaky {
            ok: 2,
            calls: Mutex::new(vec![]),
        };
        let err = publish_thread(&p, &plan(), None).await.unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.published, vec!["p1", "p2"]);
        let pending = err.into_pending("h", DayMonth::new(1, 1).unwrap());
        assert_eq!(pending.reply_to.as_deref(), Some("p2"));
        assert_eq!(pending.followups, vec!["b".to_string()]);
    }

    #[tokio::test]
    async fn resumed_plan_skips_the_headline() {
        let p = Flaky {
            ok: 10,
            calls: Mutex::new(vec![]),
        };
        let plan = ThreadPlan {
            headline: "h".into(),
            followups: vec!["b".into()],
            reply_to: Some("p9".into()),
        };
        publish_thread(&p, &plan, None).await.unwrap();
        let calls = p.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (Some("p9".to_string()), "b".to_string()));
    }

    #[tokio::test]
    async fn headline_failure_has_nothing_to_reply_to() {
        let p = Flaky {
            ok: 0,
            calls: Mutex::new(vec![]),
        };
        let err = publish_thread(&p, &plan(), None).await.unwrap_err();
        assert!(err.reply_to.is_none());
        assert_eq!(err.remaining.len(), 2);
    }
}
