use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{LlmError, LlmResult};
use crate::{CompletionProvider, CompletionRequest};

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f64,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f64>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints (Groq by default).
#[derive(Clone)]
pub struct GroqClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GroqClient {
    pub fn new(api_key: String, base_url: String, timeout: Duration) -> LlmResult<Self> {
        if api_key.is_empty() {
            return Err(LlmError::NotConfigured);
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn from_config(config: &crate::LlmConfig) -> LlmResult<Self> {
        let api_key = config.api_key.clone().ok_or(LlmError::NotConfigured)?;
        Self::new(api_key, config.base_url.clone(), config.timeout)
    }
}

fn build_body(request: &CompletionRequest) -> ChatCompletionRequest<'_> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.system {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });

    ChatCompletionRequest {
        model: &request.model,
        messages,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        top_p: request.top_p,
        stream: false,
    }
}

fn first_choice(response: ChatCompletionResponse) -> LlmResult<String> {
    response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .map(|content| content.trim().to_string())
        .ok_or_else(|| LlmError::InvalidResponse("completion has no choices".to_string()))
}

#[async_trait]
impl CompletionProvider for GroqClient {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String> {
        let body = build_body(&request);
        tracing::debug!("Requesting completion from {} (max_tokens={})", request.model, request.max_tokens);

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!("Completion request failed with {}: {}", status, detail);
            return Err(LlmError::ServiceUnavailable(format!("Status: {} {}", status, detail)));
        }

        let parsed = response
            .json::<ChatCompletionResponse>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        first_choice(parsed)
    }

    fn backend_name(&self) -> &'static str {
        "groq"
    }
}
