// src/publish/x.rs
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::{Media, PostId, PublishError, Publisher};
use crate::config::bot::{NetSection, PublishSection};
use crate::history::{matches_filter, HistoryError, RecentPosts};
use crate::net::{with_retries, RetryPolicy};

/// X API v2 client acting as the bot account (OAuth 2.0 user-context token).
pub struct XClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
    user_id: Option<String>,
    lookback_days: u32,
    retry: RetryPolicy,
}

#[derive(Serialize)]
struct ReplyTo<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Serialize)]
struct MediaIds {
    media_ids: Vec<String>,
}

#[derive(Serialize)]
struct CreatePost<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyTo<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    media: Option<MediaIds>,
}

#[derive(Deserialize)]
struct IdData {
    id: String,
}

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: Option<T>,
}

#[derive(Deserialize)]
struct Post {
    text: String,
}

fn rate_limit_reset(headers: &reqwest::header::HeaderMap) -> Option<i64> {
    headers
        .get("x-rate-limit-reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Map an X response to the publish error taxonomy.
async fn check(resp: reqwest::Response) -> Result<reqwest::Response, PublishError> {
    let status = resp.status();
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(PublishError::RateLimited {
            reset_at: rate_limit_reset(resp.headers()),
        });
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(PublishError::Rejected {
            status: status.as_u16(),
            body: body.chars().take(300).collect(),
        });
    }
    Ok(resp)
}

impl XClient {
    pub fn new(
        publish: &PublishSection,
        net: &NetSection,
        token: &str,
        user_id: Option<String>,
    ) -> anyhow::Result<Self> {
        tracing::info!(
            target: "publish",
            api_base = %publish.api_base,
            token_len = token.len(),
            user_id_set = user_id.is_some(),
            "X client ready"
        );
        Ok(Self {
            http: crate::net::http_client(net.timeout())?,
            api_base: publish.api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            user_id,
            lookback_days: publish.recent_lookback_days,
            retry: net.retry_policy(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn create_post_once(&self, body: &CreatePost<'_>) -> Result<PostId, PublishError> {
        let resp = self
            .http
            .post(self.url("/2/tweets"))
            .bearer_auth(&self.token)
            .json(body)
            .send()
            .await?;
        let env: DataEnvelope<IdData> = check(resp).await?.json().await?;
        env.data
            .map(|d| d.id)
            .ok_or_else(|| PublishError::Response("post created without id".into()))
    }

    async fn create_post(&self, body: CreatePost<'_>) -> Result<PostId, PublishError> {
        with_retries(self.retry, "x.post", || self.create_post_once(&body)).await
    }

    async fn upload_media_once(&self, media: &Media) -> Result<String, PublishError> {
        let part = reqwest::multipart::Part::bytes(media.bytes.clone())
            .file_name("efemeride")
            .mime_str(&media.mime)?;
        let form = reqwest::multipart::Form::new()
            .text("media_category", "tweet_image")
            .text("media_type", media.mime.clone())
            .part("media", part);
        let resp = self
            .http
            .post(self.url("/2/media/upload"))
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await?;
        let env: DataEnvelope<IdData> = check(resp).await?.json().await?;
        env.data
            .map(|d| d.id)
            .ok_or_else(|| PublishError::Response("media uploaded without id".into()))
    }

    pub async fn upload_media(&self, media: &Media) -> Result<String, PublishError> {
        with_retries(self.retry, "x.media", || self.upload_media_once(media)).await
    }

    async fn recent_once(&self, user_id: &str, start: &str) -> Result<Vec<String>, HistoryError> {
        let resp = self
            .http
            .get(self.url(&format!("/2/users/{user_id}/tweets")))
            .bearer_auth(&self.token)
            .query(&[
                ("max_results", "100"),
                ("start_time", start),
                ("exclude", "retweets,replies"),
            ])
            .send()
            .await?;
        let status = resp.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(HistoryError::RateLimited);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HistoryError::Api {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        let env: DataEnvelope<Vec<Post>> = resp
            .json()
            .await
            .map_err(|e| HistoryError::Parse(e.to_string()))?;
        Ok(env.data.unwrap_or_default().into_iter().map(|p| p.text).collect())
    }
}

#[async_trait]
impl Publisher for XClient {
    async fn publish(&self, text: &str, media: Option<&Media>) -> Result<PostId, PublishError> {
        let media_ids = match media {
            Some(m) => match self.upload_media(m).await {
                Ok(id) => Some(MediaIds {
                    media_ids: vec![id],
                }),
                Err(e) if e.is_rate_limited() => return Err(e),
                Err(e) => {
                    tracing::warn!(target: "publish", error = %e, "media upload failed, posting text only");
                    None
                }
            },
            None => None,
        };
        self.create_post(CreatePost {
            text,
            reply: None,
            media: media_ids,
        })
        .await
    }

    async fn reply(&self, parent: &PostId, text: &str) -> Result<PostId, PublishError> {
        self.create_post(CreatePost {
            text,
            reply: Some(ReplyTo {
                in_reply_to_tweet_id: parent,
            }),
            media: None,
        })
        .await
    }

    fn name(&self) -> &'static str {
        "x"
    }
}

#[async_trait]
impl RecentPosts for XClient {
    async fn recent_posts(&self, filter: &str) -> Result<Vec<String>, HistoryError> {
        let user_id = self
            .user_id
            .as_deref()
            .ok_or(HistoryError::Unconfigured("X_USER_ID"))?;
        let start = (Utc::now() - ChronoDuration::days(i64::from(self.lookback_days.max(1))))
            .to_rfc3339_opts(SecondsFormat::Secs, true);
        let posts = with_retries(self.retry, "x.recent", || self.recent_once(user_id, &start)).await?;
        Ok(posts.into_iter().filter(|t| matches_filter(t, filter)).collect())
    }
}
