pub mod assistant;
pub mod error;
pub mod groq;

pub use assistant::{DocumentContext, FinancialAssistant};
pub use error::{LlmError, LlmResult};
pub use groq::GroqClient;

use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

/// Configuration for the completion API
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub narrative_model: String,
    pub timeout: Duration,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: std::env::var("GROQ_API_KEY").ok().filter(|k| !k.is_empty()),
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://api.groq.com/openai/v1".to_string()),
            chat_model: std::env::var("LLM_CHAT_MODEL")
                .unwrap_or_else(|_| "llama3-70b-8192".to_string()),
            narrative_model: std::env::var("LLM_NARRATIVE_MODEL")
                .unwrap_or_else(|_| "deepseek-r1-distill-llama-70b".to_string()),
            timeout: Duration::from_secs(120),
        }
    }
}

/// A single-turn chat completion.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: Option<f64>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
            max_tokens: 1000,
            top_p: None,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// Backend-agnostic text completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> LlmResult<String>;

    fn backend_name(&self) -> &'static str;
}

static THINK_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think pattern"));
static ORPHAN_CLOSE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\A.*?</think>").expect("valid close pattern"));
static UNCLOSED_THINK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<think>.*\z").expect("valid open pattern"));

/// Remove `<think>...</think>` reasoning blocks from a completion. An
/// unterminated opening tag drops the rest of the text; a closing tag with
/// no opener drops everything before it.
pub fn strip_reasoning(text: &str) -> String {
    let text = match ORPHAN_CLOSE.find(text) {
        Some(m) if !m.as_str().contains("<think>") => &text[m.end()..],
        _ => text,
    };
    let text = THINK_BLOCK.replace_all(text, "");
    UNCLOSED_THINK.replace(&text, "").trim().to_string()
}
