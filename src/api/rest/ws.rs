use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use tracing::{info, warn};
use uuid::Uuid;

use crate::fanout::{self, Scope};
use crate::state::AppState;

pub async fn company_ws(
    ws: WebSocketUpgrade,
    Path(company_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Scope::Company { company_id }))
}

pub async fn driver_ws(
    ws: WebSocketUpgrade,
    Path(driver_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Scope::Driver { driver_id }))
}

pub async fn customer_ws(
    ws: WebSocketUpgrade,
    Path(customer_id): Path<Uuid>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, Scope::Customer { customer_id }))
}

/// One socket, one scope, one subscription. Each message is the complete
/// current result set for the scope, JSON-encoded.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, scope: Scope) {
    let (mut sender, mut receiver) = socket.split();

    state.metrics.active_subscriptions.inc();
    info!(scope = scope.kind(), "observer subscribed");

    let watch_state = state.clone();
    let mut send_task = tokio::spawn(async move {
        let mut stream = Box::pin(fanout::watch(watch_state, scope));
        while let Some(deliveries) = stream.next().await {
            let json = match serde_json::to_string(&deliveries) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize scoped set for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    // Whichever side finishes first takes the subscription down with it.
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.metrics.active_subscriptions.dec();
    info!(scope = scope.kind(), "observer unsubscribed");
}
