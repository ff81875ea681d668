// src/summarize/llm.rs
//! LLM completion client: provider trait, the OpenAI chat-completions
//! implementation, and a counting stub for tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{AppConfig, Capability};

/// Deterministic low-temperature setting shared by every summarization call.
pub const TEMPERATURE: f32 = 0.3;

/// One chat-style completion per call. Implementations must not retry.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String>;

    /// Provider name for diagnostics.
    fn name(&self) -> &'static str;
}

pub type SharedLlm = Arc<dyn LlmClient>;

/// Build the LLM capability from config. No key means every summary caller
/// sees `Unavailable` and renders its fixed notice instead of calling out.
pub fn build_llm(config: &AppConfig) -> Capability<SharedLlm> {
    match &config.llm {
        Some(creds) => Capability::Configured(Arc::new(OpenAiClient::new(
            creds.api_key.clone(),
            creds.model.clone(),
        )) as SharedLlm),
        None => Capability::Unavailable("LLM API key not set".to_string()),
    }
}

const COMPLETIONS_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI chat-completions provider.
pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl OpenAiClient {
    pub fn new(api_key: String, model: String) -> Self {
        // Explicit deadlines: an unbounded completion call can stall the whole
        // sequential run.
        let http = reqwest::Client::builder()
            .user_agent("watchlist-news-agent/0.1")
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model,
        }
    }
}

#[derive(Serialize)]
struct WireMsg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct WireReq<'a> {
    model: &'a str,
    messages: Vec<WireMsg<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct WireResp {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChoiceMsg,
}

#[derive(Deserialize)]
struct WireChoiceMsg {
    content: String,
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let req = WireReq {
            model: &self.model,
            messages: vec![
                WireMsg {
                    role: "system",
                    content: system,
                },
                WireMsg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: TEMPERATURE,
            max_tokens,
        };

        let resp = self
            .http
            .post(COMPLETIONS_URL)
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .context("completion request")?;

        let resp = resp.error_for_status().context("completion status")?;
        let body: WireResp = resp.json().await.context("completion body")?;
        let content = body
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        anyhow::ensure!(!content.is_empty(), "empty completion");
        Ok(content)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Test double: returns a fixed response and counts calls, recording the last
/// prompt so conformance tests can assert on request shape.
#[derive(Default)]
pub struct CountingStub {
    pub response: String,
    calls: AtomicUsize,
    last_user_prompt: std::sync::Mutex<Option<String>>,
}

impl CountingStub {
    pub fn with_response(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_user_prompt(&self) -> Option<String> {
        self.last_user_prompt.lock().expect("stub lock").clone()
    }
}

#[async_trait]
impl LlmClient for CountingStub {
    async fn complete(&self, _system: &str, user: &str, _max_tokens: u32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_user_prompt.lock().expect("stub lock") = Some(user.to_string());
        Ok(self.response.clone())
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}

/// Always-failing client for exercising the error-placeholder path.
pub struct FailingStub;

#[async_trait]
impl LlmClient for FailingStub {
    async fn complete(&self, _system: &str, _user: &str, _max_tokens: u32) -> Result<String> {
        anyhow::bail!("simulated provider outage")
    }

    fn name(&self) -> &'static str {
        "failing-stub"
    }
}
