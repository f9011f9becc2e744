// src/enrich/openai.rs
//! Hosted chat-completions backend (OpenAI-compatible API).
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::enrich::{looks_like_quota, SummaryBackend};
use crate::error::BackendError;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const SYSTEM_PROMPT: &str = "You are a legislative explainer. Stay neutral and factual, avoid legalese, and answer with the summary only.";

pub struct OpenAiBackend {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    max_input_chars: usize,
}

impl OpenAiBackend {
    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("bill-backlog/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()
            .context("building openai http client")?;
        Ok(Self {
            http,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: model.into(),
            max_input_chars: 60_000,
        })
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

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

/// Error body shape: `{"error":{"message":"...","code":"..."}}`.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().chars().take(300).collect())
}

/// Map a non-2xx status + body onto backend errors.
fn status_error(status: StatusCode, body: &str) -> BackendError {
    let detail = format!("HTTP {}: {}", status.as_u16(), error_message(body));
    match status {
        StatusCode::TOO_MANY_REQUESTS => BackendError::Quota(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unavailable(detail),
        _ if looks_like_quota(body) => BackendError::Quota(detail),
        _ => BackendError::Remote(detail),
    }
}

fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[async_trait]
impl SummaryBackend for OpenAiBackend {
    async fn summarize(&self, prompt: &str, document: &str) -> Result<String, BackendError> {
        if self.api_key.is_empty() {
            return Err(BackendError::Unavailable("OPENAI_API_KEY is empty".into()));
        }
        let user = format!(
            "{prompt}\n\n---\n\n{}",
            truncate_chars(document, self.max_input_chars)
        );
        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                Msg {
                    role: "user",
                    content: &user,
                },
            ],
            temperature: 0.3,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| BackendError::Remote(format!("request failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| BackendError::Remote(format!("reading body failed: {e}")))?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }

        let parsed: Resp = serde_json::from_str(&body)
            .map_err(|e| BackendError::Remote(format!("unexpected response: {e}")))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        if content.trim().is_empty() {
            return Err(BackendError::Remote("empty completion".into()));
        }
        Ok(content.trim().to_string())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}
