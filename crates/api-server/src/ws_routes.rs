use analysis_orchestrator::{AnalysisOrchestrator, MarketCategory, MarketOverview};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::AppState;

const STOCK_UPDATE_INTERVAL: Duration = Duration::from_secs(1);
const STOCK_UPDATE_BACKOFF: Duration = Duration::from_secs(5);

/// A named event pushed to WebSocket clients.
#[derive(Debug, Clone, Serialize)]
pub struct MarketEvent {
    pub event: String,
    pub data: serde_json::Value,
}

impl MarketEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self::new("error", json!({ "message": message.into() }))
    }
}

/// Latest market overview plus a broadcast of per-category events.
#[derive(Clone)]
pub struct MarketFeed {
    events: broadcast::Sender<MarketEvent>,
    latest: Arc<RwLock<Option<MarketOverview>>>,
}

impl Default for MarketFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketFeed {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            events,
            latest: Arc::new(RwLock::new(None)),
        }
    }

    /// One `market_data_<category>` event per category.
    pub fn events_for(overview: &MarketOverview) -> Vec<MarketEvent> {
        overview
            .categories
            .iter()
            .map(|c| MarketEvent::new(format!("market_data_{}", c.category), json!({ "stocks": c.stocks })))
            .collect()
    }

    /// Store the snapshot and broadcast its events. Returns how many
    /// receivers were listening.
    pub fn publish(&self, overview: MarketOverview) -> usize {
        let mut receivers = 0;
        for event in Self::events_for(&overview) {
            // Err only means nobody is subscribed right now.
            receivers = self.events.send(event).unwrap_or(0);
        }
        if let Ok(mut latest) = self.latest.write() {
            *latest = Some(overview);
        }
        receivers
    }

    pub fn latest(&self) -> Option<MarketOverview> {
        self.latest.read().ok().and_then(|guard| guard.clone())
    }

    /// Events replaying the latest snapshot, empty before the first poll.
    pub fn snapshot_events(&self) -> Vec<MarketEvent> {
        self.latest().map(|o| Self::events_for(&o)).unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MarketEvent> {
        self.events.subscribe()
    }
}

/// Poll the overview forever. A cycle where every category comes back
/// empty counts as failed and waits `backoff` instead of `poll`.
pub fn spawn_overview_poller(
    orchestrator: Arc<AnalysisOrchestrator>,
    feed: MarketFeed,
    categories: Vec<MarketCategory>,
    poll: Duration,
    backoff: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tracing::info!(
            "Market overview poller started ({} categories, every {:?})",
            categories.len(),
            poll
        );
        loop {
            let overview = orchestrator.market_overview(&categories).await;
            let delay = if overview.categories.iter().all(|c| c.stocks.is_empty()) {
                tracing::warn!("Market overview poll returned no quotes; retrying in {:?}", backoff);
                backoff
            } else {
                let listeners = feed.publish(overview);
                tracing::trace!("Published market overview to {} listeners", listeners);
                poll
            };
            tokio::time::sleep(delay).await;
        }
    })
}

#[derive(Debug, Deserialize)]
struct ClientCommand {
    action: String,
    #[serde(default)]
    symbol: Option<String>,
}

pub fn ws_routes() -> Router<AppState> {
    Router::new().route("/ws/market", get(ws_market_handler))
}

async fn ws_market_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_market_socket(socket, state))
}

async fn handle_market_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<MarketEvent>(64);
    let mut broadcasts = state.market_feed.subscribe();

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode {} event: {}", event.event, e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    for event in state.market_feed.snapshot_events() {
        if tx.send(event).await.is_err() {
            writer.abort();
            return;
        }
    }

    let forward_tx = tx.clone();
    let forwarder = tokio::spawn(async move {
        loop {
            match broadcasts.recv().await {
                Ok(event) => {
                    if forward_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("WebSocket client lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    tracing::info!("Market WebSocket client connected");
    let mut subscription: Option<JoinHandle<()>> = None;

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientCommand>(&text) {
                Ok(command) => {
                    if let Some(reply) = apply_command(command, &state, &tx, &mut subscription) {
                        let _ = tx.send(reply).await;
                    }
                }
                Err(e) => {
                    let _ = tx.send(MarketEvent::error(format!("Invalid message: {}", e))).await;
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    if let Some(handle) = subscription.take() {
        handle.abort();
    }
    forwarder.abort();
    writer.abort();
    tracing::info!("Market WebSocket client disconnected");
}

/// Start, replace or stop the connection's quote stream. Returns an event
/// to send back when the command needs an answer.
fn apply_command(
    command: ClientCommand,
    state: &AppState,
    tx: &mpsc::Sender<MarketEvent>,
    subscription: &mut Option<JoinHandle<()>>,
) -> Option<MarketEvent> {
    match command.action.as_str() {
        "subscribe" => {
            let raw = command.symbol.unwrap_or_default();
            let symbol = match analysis_orchestrator::normalize_symbol(&raw) {
                Ok(symbol) => symbol,
                Err(e) => return Some(MarketEvent::error(e.to_string())),
            };
            if let Some(previous) = subscription.take() {
                previous.abort();
            }
            tracing::debug!("WebSocket client subscribed to {}", symbol);
            *subscription = Some(tokio::spawn(stream_stock_updates(
                state.orchestrator.clone(),
                symbol.clone(),
                tx.clone(),
            )));
            Some(MarketEvent::new("subscribed", json!({ "symbol": symbol })))
        }
        "unsubscribe" => {
            if let Some(handle) = subscription.take() {
                handle.abort();
            }
            Some(MarketEvent::new("unsubscribed", json!({})))
        }
        other => Some(MarketEvent::error(format!("Unknown action '{}'", other))),
    }
}

/// `stock_update` events for one symbol until the receiver goes away.
async fn stream_stock_updates(
    orchestrator: Arc<AnalysisOrchestrator>,
    symbol: String,
    tx: mpsc::Sender<MarketEvent>,
) {
    loop {
        let delay = match orchestrator.quote(&symbol).await {
            Ok(quote) => {
                let event = MarketEvent::new(
                    "stock_update",
                    json!({
                        "symbol": quote.symbol,
                        "price": quote.price,
                        "volume": quote.volume,
                        "timestamp": quote.timestamp.to_rfc3339(),
                    }),
                );
                if tx.send(event).await.is_err() {
                    return;
                }
                STOCK_UPDATE_INTERVAL
            }
            Err(e) => {
                tracing::warn!("Error updating {}: {}", symbol, e);
                STOCK_UPDATE_BACKOFF
            }
        };
        tokio::time::sleep(delay).await;
    }
}
