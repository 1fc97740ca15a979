//! history.rs: previously published posts, read fresh every run for the
//! duplicate filter. Failures never block publication: no history means
//! "nothing is repeated".

use async_trait::async_trait;
use thiserror::Error;

use crate::net::Retryable;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("rate limited")]
    RateLimited,
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("parse: {0}")]
    Parse(String),
    #[error("not configured: {0}")]
    Unconfigured(&'static str),
}

impl Retryable for HistoryError {
    fn is_transient(&self) -> bool {
        match self {
            HistoryError::Transport(e) => e.is_transient(),
            HistoryError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Recent posts of the bot's account whose text contains `filter`.
#[async_trait]
pub trait RecentPosts: Send + Sync {
    async fn recent_posts(&self, filter: &str) -> Result<Vec<String>, HistoryError>;
}

/// Case-insensitive substring filter shared by implementations.
pub fn matches_filter(text: &str, filter: &str) -> bool {
    filter.is_empty() || text.to_lowercase().contains(&filter.to_lowercase())
}

/// Used when no account is configured (dry runs without credentials).
pub struct NoHistory;

#[async_trait]
impl RecentPosts for NoHistory {
    async fn recent_posts(&self, _filter: &str) -> Result<Vec<String>, HistoryError> {
        Ok(Vec::new())
    }
}

/// Lowercased previous texts, or an empty list when the query fails.
pub async fn previous_texts(source: &dyn RecentPosts, filter: &str) -> Vec<String> {
    match source.recent_posts(filter).await {
        Ok(posts) => {
            let out: Vec<String> = posts.iter().map(|p| p.to_lowercase()).collect();
            tracing::info!(target: "history", count = out.len(), "recent posts loaded");
            out
        }
        Err(e) => {
            tracing::warn!(target: "history", error = %e, "recent posts unavailable, duplicate filter disabled");
            metrics::counter!("history_unavailable_total").increment(1);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Result<Vec<String>, ()>);

    #[async_trait]
    impl RecentPosts for Fixed {
        async fn recent_posts(&self, _filter: &str) -> Result<Vec<String>, HistoryError> {
            self.0.clone().map_err(|_| HistoryError::RateLimited)
        }
    }

    #[tokio::test]
    async fn fails_open() {
        assert!(previous_texts(&Fixed(Err(())), "x").await.is_empty());
    }

    #[tokio::test]
    async fn texts_are_lowercased() {
        let src = Fixed(Ok(vec!["Batalla de LEPANTO".into()]));
        assert_eq!(previous_texts(&src, "").await, vec!["batalla de lepanto"]);
    }

    #[test]
    fn filter_is_case_insensitive() {
        assert!(matches_filter("🇪🇸 En tal día como hoy del año 1492", "en tal DÍA"));
        assert!(!matches_filter("Otra cosa", "en tal día"));
        assert!(matches_filter("Otra cosa", ""));
    }
}
