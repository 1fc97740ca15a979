//! LLM adapter: provider abstraction over chat completions.
//!
//! Used by the generated-candidate source and by post composition. The real
//! provider is OpenAI's Chat Completions API; `DisabledClient` and
//! `MockClient` cover runs without a key and tests.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::bot::{GenerationSection, NetSection};
use crate::net::{with_retries, RetryPolicy, Retryable};

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM disabled (no API key configured)")]
    Disabled,
    #[error("LLM transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("LLM returned an empty completion")]
    Empty,
}

impl Retryable for LlmError {
    fn is_transient(&self) -> bool {
        match self {
            LlmError::Transport(e) => e.is_transient(),
            LlmError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// One system + user exchange.
#[derive(Debug, Clone, Copy)]
pub struct ChatRequest<'a> {
    pub system: &'a str,
    pub user: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait object used by sources and composition.
pub trait LlmClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        req: ChatRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

pub type DynLlm = Arc<dyn LlmClient>;

/// Factory: OpenAI when a key is present, otherwise a disabled client.
pub fn build_llm_client(
    gen: &GenerationSection,
    net: &NetSection,
    api_key: Option<&str>,
) -> anyhow::Result<DynLlm> {
    match api_key {
        Some(key) if !key.trim().is_empty() => {
            tracing::info!(
                target: "llm",
                provider = "openai",
                model = %gen.model,
                key_len = key.len(),
                "LLM client ready"
            );
            Ok(Arc::new(OpenAiClient::new(gen, net, key)?))
        }
        _ => {
            tracing::warn!(target: "llm", "OPENAI_API_KEY missing, LLM disabled");
            Ok(Arc::new(DisabledClient))
        }
    }
}

// ------------------------------------------------------------
// OpenAI
// ------------------------------------------------------------

pub struct OpenAiClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    retry: RetryPolicy,
}

impl OpenAiClient {
    pub fn new(gen: &GenerationSection, net: &NetSection, api_key: &str) -> anyhow::Result<Self> {
        Ok(Self {
            http: crate::net::http_client(net.timeout())?,
            api_url: gen.api_url.clone(),
            api_key: api_key.to_string(),
            model: gen.model.clone(),
            retry: net.retry_policy(),
        })
    }

    async fn complete_once(&self, req: ChatRequest<'_>) -> Result<String, LlmError> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            #[serde(default)]
            content: Option<String>,
        }

        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: req.system,
                },
                Msg {
                    role: "user",
                    content: req.user,
                },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                body: body.chars().take(300).collect(),
            });
        }
        let parsed: Resp = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        let content = content.trim().to_string();
        if content.is_empty() {
            Err(LlmError::Empty)
        } else {
            Ok(content)
        }
    }
}

impl LlmClient for OpenAiClient {
    fn complete<'a>(
        &'a self,
        req: ChatRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        Box::pin(async move {
            with_retries(self.retry, "openai.chat", || self.complete_once(req)).await
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

// ------------------------------------------------------------
// Disabled + mock
// ------------------------------------------------------------

/// Always fails with `LlmError::Disabled`.
pub struct DisabledClient;

impl LlmClient for DisabledClient {
    fn complete<'a>(
        &'a self,
        _req: ChatRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        Box::pin(async { Err(LlmError::Disabled) })
    }

    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Scripted replies, returned in order. Also records the user prompts it saw.
#[derive(Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<String>>,
    pub prompts: Mutex<Vec<String>>,
}

impl MockClient {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }
}

impl LlmClient for MockClient {
    fn complete<'a>(
        &'a self,
        req: ChatRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<String, LlmError>> + Send + 'a>> {
        if let Ok(mut p) = self.prompts.lock() {
            p.push(req.user.to_string());
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        Box::pin(async move { next.ok_or(LlmError::Empty) })
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

// ------------------------------------------------------------
// Output helpers
// ------------------------------------------------------------

/// Strip a Markdown code fence (```json ... ```) if the model wrapped its answer.
pub fn strip_code_fence(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = match rest.find('\n') {
        Some(nl) => &rest[nl + 1..],
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}
