use axum::{extract::State, routing::post, Json, Router};
use chrono::Local;
use llm_client::DocumentContext;
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatReply {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub content: String,
    /// Wall-clock time of the reply, e.g. `03:45 PM`.
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ChatReply {
    fn text(content: String, session_id: Option<String>) -> Self {
        Self {
            kind: "text",
            content,
            timestamp: Local::now().format("%I:%M %p").to_string(),
            session_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadDocumentRequest {
    pub session_id: String,
    pub name: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub analysis: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct DocumentStored {
    pub session_id: String,
    pub name: String,
    pub characters: usize,
    pub has_analysis: bool,
}

#[derive(Debug, Deserialize)]
pub struct SummarizeRequest {
    pub session_id: String,
}

pub fn chat_routes() -> Router<AppState> {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/documents", post(upload_document))
        .route("/api/documents/summarize", post(summarize_document))
}

/// Education answer, or a document-grounded answer when the session has a document.
async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ApiResponse<ChatReply>>, AppError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err(AppError::bad_request("No message provided"));
    }
    let assistant = state.assistant()?;

    let document = req.session_id.as_deref().and_then(|id| {
        state.sessions.touch(id);
        state.sessions.document(id)
    });

    let content = match &document {
        Some(doc) => assistant.reply(message, Some(doc)).await?,
        None => assistant.educate(message).await?,
    };

    Ok(Json(ApiResponse::success(ChatReply::text(content, req.session_id))))
}

/// Attach already-extracted document text to a session.
async fn upload_document(
    State(state): State<AppState>,
    Json(req): Json<UploadDocumentRequest>,
) -> Result<Json<ApiResponse<DocumentStored>>, AppError> {
    if req.session_id.trim().is_empty() {
        return Err(AppError::bad_request("session_id is required"));
    }
    let document = DocumentContext {
        name: req.name,
        text: req.text.filter(|t| !t.trim().is_empty()),
        analysis: req.analysis,
    };
    if document.is_empty() {
        return Err(AppError::bad_request("Document has no text or analysis"));
    }

    let stored = DocumentStored {
        session_id: req.session_id.clone(),
        name: document.name.clone(),
        characters: document.text.as_deref().map_or(0, |t| t.chars().count()),
        has_analysis: document.analysis.is_some(),
    };
    tracing::info!("Stored document '{}' for session {}", stored.name, stored.session_id);
    state.sessions.set_document(&req.session_id, document);

    Ok(Json(ApiResponse::success(stored)))
}

async fn summarize_document(
    State(state): State<AppState>,
    Json(req): Json<SummarizeRequest>,
) -> Result<Json<ApiResponse<ChatReply>>, AppError> {
    let assistant = state.assistant()?;
    let document = state.sessions.document(&req.session_id);
    let summary = assistant.summarize(document.as_ref()).await?;
    Ok(Json(ApiResponse::success(ChatReply::text(summary, Some(req.session_id)))))
}
