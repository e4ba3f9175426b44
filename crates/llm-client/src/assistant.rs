use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{LlmError, LlmResult};
use crate::{CompletionProvider, CompletionRequest};

const EDUCATION_PROMPT: &str = "You are a Market Education Chatbot, designed to explain financial concepts, \
investment principles, and economic fundamentals in a clear and engaging way. You do not provide financial \
advice, stock recommendations, or market predictions. If a user asks an off-topic question, politely redirect \
them to market-related topics. Keep responses simple, factual, and educational.";

const PERSONA_PROMPT: &str = "You are FinSaathi, a Market Education and Financial Document Analysis Expert. \
You explain financial concepts, investment principles, and economic fundamentals in a clear and engaging way. \
You can analyze financial documents, regulatory filings, earnings reports, and extract key insights. \
You're fluent in financial terminology and jargon. If a user asks an off-topic question, politely redirect \
them to market-related topics. Keep responses factual and educational.\n\n\
When responding on WhatsApp, keep responses concise and well-formatted. Use bullet points and headings \
when appropriate, and use emoji occasionally to make the response engaging.";

const SUMMARY_PROMPT: &str = "You are a Financial Document Analysis Expert. Your task is to analyze and \
summarize financial documents, regulatory filings, earnings reports, and extract key insights. Use your \
expertise in financial terminology and jargon to generate accurate, concise summaries that highlight the \
most important information.";

/// Longest slice of raw document text sent as chat context, in characters.
pub const MAX_CONTEXT_CHARS: usize = 6000;

/// A document attached to a chat session. Text extraction happens upstream;
/// either the plain text, a structured analysis, or both may be present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentContext {
    pub name: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
}

impl DocumentContext {
    pub fn is_empty(&self) -> bool {
        self.text.as_deref().map_or(true, str::is_empty) && self.analysis.is_none()
    }

    /// Context block appended to the persona prompt.
    fn context_block(&self) -> String {
        let mut context = String::new();
        if let Some(analysis) = &self.analysis {
            context.push_str("\n\nHere is detailed analysis from a financial document that you can reference:\n");
            context.push_str(&pretty(analysis));
        }
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            context.push_str("\n\nHere is additional text content from the document:\n");
            context.push_str(&truncate_chars(text, MAX_CONTEXT_CHARS));
        }
        context
    }
}

/// Prompt layer over a completion provider: market education chat,
/// document-grounded chat and document summaries.
#[derive(Clone)]
pub struct FinancialAssistant {
    provider: Arc<dyn CompletionProvider>,
    model: String,
}

impl FinancialAssistant {
    pub fn new(provider: Arc<dyn CompletionProvider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }

    /// General market education answer. Never gives advice.
    pub async fn educate(&self, message: &str) -> LlmResult<String> {
        let request = CompletionRequest::new(&self.model, message)
            .system(EDUCATION_PROMPT)
            .temperature(0.7)
            .max_tokens(1000);
        self.provider.complete(request).await
    }

    /// Persona answer, grounded in the session's document when there is one.
    pub async fn reply(&self, message: &str, document: Option<&DocumentContext>) -> LlmResult<String> {
        let mut system = PERSONA_PROMPT.to_string();
        if let Some(doc) = document {
            system.push_str(&doc.context_block());
        }

        let request = CompletionRequest::new(&self.model, message)
            .system(system)
            .temperature(0.7)
            .max_tokens(1000);
        self.provider.complete(request).await
    }

    /// Summary of the session's document, prefixed for display.
    pub async fn summarize(&self, document: Option<&DocumentContext>) -> LlmResult<String> {
        let document = document.filter(|d| !d.is_empty()).ok_or(LlmError::NoDocument)?;

        let prompt = match (&document.analysis, &document.text) {
            (Some(analysis), _) => format!(
                "Please summarize the following financial document analysis. \
                 Focus on key financial metrics, trends, and important information. \
                 The analysis data is provided in JSON format below:\n\n{}",
                pretty(analysis)
            ),
            (None, Some(text)) => format!(
                "Please summarize the following financial document. \
                 Focus on key financial metrics, trends, and important information:\n\n{}",
                text
            ),
            (None, None) => return Err(LlmError::NoDocument),
        };

        let request = CompletionRequest::new(&self.model, prompt)
            .system(SUMMARY_PROMPT)
            .temperature(0.3)
            .max_tokens(1500);
        let summary = self.provider.complete(request).await?;
        Ok(format!("📝 Document Summary:\n\n{}", summary))
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

/// First `max` characters, with a marker when anything was cut.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((cut, _)) => format!("{}...[content truncated]", &text[..cut]),
        None => text.to_string(),
    }
}
