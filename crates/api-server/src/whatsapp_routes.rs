use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::post,
    Form, Router,
};
use llm_client::{DocumentContext, LlmError};

use crate::sessions::SessionStore;
use crate::twilio::{split_message, TwilioClient, MAX_MESSAGE_CHARS, SIGNATURE_HEADER};
use crate::AppState;

const HELP_TEXT: &str = "FinSaathi WhatsApp Commands 📱

- Send a text or JSON document to analyze it
- Type summarize to get a summary of the current document
- Ask any question about finance or the uploaded document
- Type help to see this message again";

const WELCOME_TEXT: &str = "Welcome to FinSaathi! 🤖

I'm your financial assistant. I can help with:

📊 Financial concepts
📑 Document analysis
📈 Market education

To get started:
- Send a financial document as a text file
- Ask me any finance-related question

Type help to see all commands.";

const NO_DOCUMENT: &str = "❌ No document has been loaded or processed. Please upload a document first.";

/// Inbound Twilio webhook fields. Twilio sends many more; only these are read.
#[derive(Debug, Default)]
pub struct InboundMessage {
    pub from: String,
    pub body: String,
    pub num_media: u32,
    pub media_url: Option<String>,
    pub media_type: Option<String>,
}

impl InboundMessage {
    pub fn from_params(params: &[(String, String)]) -> Self {
        let mut msg = Self::default();
        for (key, value) in params {
            match key.as_str() {
                "From" => msg.from = value.clone(),
                "Body" => msg.body = value.clone(),
                "NumMedia" => msg.num_media = value.trim().parse().unwrap_or(0),
                "MediaUrl0" => msg.media_url = Some(value.clone()),
                "MediaContentType0" => msg.media_type = Some(value.clone()),
                _ => {}
            }
        }
        msg
    }
}

#[derive(Debug, PartialEq)]
enum MediaKind {
    Text,
    NeedsExtraction,
    Unsupported,
}

fn classify_media(content_type: &str) -> MediaKind {
    let content_type = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
    if content_type.starts_with("text/") || content_type == "application/json" {
        MediaKind::Text
    } else if content_type == "application/pdf" || content_type.starts_with("image/") {
        MediaKind::NeedsExtraction
    } else {
        MediaKind::Unsupported
    }
}

pub fn whatsapp_routes() -> Router<AppState> {
    Router::new().route("/whatsapp", post(whatsapp_webhook))
}

/// URL Twilio signed: the configured public webhook URL, else rebuilt from
/// the `Host` header.
fn signed_url(twilio: &TwilioClient, headers: &HeaderMap, uri: &Uri) -> String {
    if let Some(url) = &twilio.config().webhook_url {
        return url.clone();
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/whatsapp");
    format!("https://{}{}", host, path)
}

/// Twilio webhook. With Twilio credentials configured, requests must carry
/// a valid `X-Twilio-Signature`.
async fn whatsapp_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    if let Some(twilio) = &state.twilio {
        let signature = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !twilio.signature_is_valid(&signed_url(twilio, &headers, &uri), &params, signature) {
            tracing::warn!("Rejected WhatsApp webhook with a missing or invalid signature");
            return (StatusCode::FORBIDDEN, "Invalid Twilio signature").into_response();
        }
    }

    let msg = InboundMessage::from_params(&params);
    tracing::info!("WhatsApp message from {} ({} media)", msg.from, msg.num_media);
    state.sessions.touch(&msg.from);

    let reply = if msg.num_media > 0 {
        handle_media(&state, msg)
    } else {
        handle_text(&state, &msg.from, msg.body.trim()).await
    };

    ([(header::CONTENT_TYPE, "application/xml")], twiml(&reply)).into_response()
}

async fn handle_text(state: &AppState, sender: &str, text: &str) -> String {
    let command = text.to_lowercase();
    match command.as_str() {
        "help" | "commands" => return HELP_TEXT.to_string(),
        "hi" | "hello" | "start" => return WELCOME_TEXT.to_string(),
        _ => {}
    }

    let Some(assistant) = state.assistant.as_ref() else {
        return "❌ AI assistant is not configured".to_string();
    };
    let document = state.sessions.document(sender);

    if command == "summarize" {
        match assistant.summarize(document.as_ref()).await {
            Ok(summary) => summary,
            Err(LlmError::NoDocument) => NO_DOCUMENT.to_string(),
            Err(e) => format!("❌ Error generating document summary: {}", e),
        }
    } else if text.is_empty() {
        HELP_TEXT.to_string()
    } else {
        match assistant.reply(text, document.as_ref()).await {
            Ok(answer) => answer,
            Err(e) => format!("❌ Error getting AI response: {}", e),
        }
    }
}

/// Acknowledge a media message; text documents are fetched and stored in
/// the background and the outcome is sent as a follow-up message.
fn handle_media(state: &AppState, msg: InboundMessage) -> String {
    let Some(twilio) = state.twilio.clone() else {
        return "❌ Twilio credentials not properly configured".to_string();
    };
    let Some(url) = msg.media_url.filter(|u| !u.trim().is_empty()) else {
        return "❌ Could not retrieve the media file".to_string();
    };
    let content_type = msg.media_type.unwrap_or_default();

    match classify_media(&content_type) {
        MediaKind::Text => {
            tokio::spawn(ingest_document(
                twilio,
                state.sessions.clone(),
                msg.from,
                url,
                content_type,
            ));
            "🔍 I've received your document. Processing it now...".to_string()
        }
        MediaKind::NeedsExtraction => format!(
            "❌ {} documents are not supported yet. Please send the document as a text file.",
            content_type
        ),
        MediaKind::Unsupported => "❌ Please upload a text document".to_string(),
    }
}

async fn ingest_document(
    twilio: TwilioClient,
    sessions: SessionStore,
    sender: String,
    url: String,
    content_type: String,
) {
    let outcome = match twilio.download_media(&url).await {
        Ok(bytes) => match document_from_bytes(&url, &content_type, bytes) {
            Ok(document) => {
                let name = document.name.clone();
                sessions.set_document(&sender, document);
                format!(
                    "✅ Successfully processed document: {}\n\nYou can now ask questions about this document or type 'summarize' to get a summary.",
                    name
                )
            }
            Err(reason) => format!("❌ Error processing document: {}", reason),
        },
        Err(e) => {
            tracing::warn!("Media download for {} failed: {:#}", sender, e);
            format!("❌ Error processing document: {}", e)
        }
    };

    if let Err(e) = twilio.send_message(&sender, &outcome).await {
        tracing::error!("Failed to notify {} about document: {:#}", sender, e);
    }
}

/// Session document from a downloaded attachment. JSON bodies also become
/// the structured analysis.
fn document_from_bytes(url: &str, content_type: &str, bytes: Vec<u8>) -> Result<DocumentContext, String> {
    let text = String::from_utf8(bytes).map_err(|_| "document is not valid UTF-8 text".to_string())?;
    if text.trim().is_empty() {
        return Err("document is empty".to_string());
    }

    let media_id = url.trim_end_matches('/').rsplit('/').next().unwrap_or("media");
    let analysis = if content_type.starts_with("application/json") {
        serde_json::from_str(&text).ok()
    } else {
        None
    };

    Ok(DocumentContext {
        name: format!("whatsapp-{}", media_id),
        text: Some(text),
        analysis,
    })
}

fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// TwiML messaging response, one `<Message>` per chunk.
fn twiml(reply: &str) -> String {
    let messages: String = split_message(reply, MAX_MESSAGE_CHARS)
        .iter()
        .map(|chunk| format!("<Message>{}</Message>", xml_escape(chunk)))
        .collect();
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?><Response>{}</Response>", messages)
}
