//! WebSocket upgrade + message loop. Each client message is parsed as JSON and
//! forwarded to the console; we reply with a single JSON message per request.
//! Settled session changes are pushed as `changed` notifications.

use std::sync::Arc;

use axum::{
  extract::{
    ws::{Message, WebSocket},
    State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::console::Console;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::routes::http::snapshot_out;

#[instrument(level = "info", skip(ws, console))]
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(console): State<Arc<Console>>) -> impl IntoResponse {
  info!(target: "hinteval_console", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, console))
}

fn encode(msg: &ServerWsMessage) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

#[instrument(level = "info", skip(socket, console), fields(conn = %Uuid::new_v4()))]
async fn handle_ws(mut socket: WebSocket, console: Arc<Console>) {
  info!(target: "hinteval_console", "WebSocket connected");
  let mut changes = console.subscribe();
  loop {
    tokio::select! {
      incoming = socket.recv() => {
        let Some(Ok(msg)) = incoming else { break };
        match msg {
          Message::Text(txt) => {
            let reply = match serde_json::from_str::<ClientWsMessage>(&txt) {
              Ok(incoming) => {
                debug!(target: "hinteval_console", "WS received: {:?}", &incoming);
                handle_client_ws(incoming, &console).await
              }
              Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
            };
            if let Err(e) = socket.send(Message::Text(encode(&reply))).await {
              error!(target: "hinteval_console", error = %e, "WS send error");
              break;
            }
          }
          Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
          Message::Close(_) => break,
          _ => {}
        }
      }
      changed = changes.changed() => {
        if changed.is_err() { break; }
        let version = *changes.borrow_and_update();
        if let Err(e) = socket.send(Message::Text(encode(&ServerWsMessage::Changed { version }))).await {
          error!(target: "hinteval_console", error = %e, "WS push error");
          break;
        }
      }
    }
  }
  info!(target: "hinteval_console", "WebSocket disconnected");
}

async fn handle_client_ws(msg: ClientWsMessage, console: &Console) -> ServerWsMessage {
  let result = match msg {
    ClientWsMessage::Ping => return ServerWsMessage::Pong,
    ClientWsMessage::Snapshot => return ServerWsMessage::Snapshot { snapshot: Box::new(snapshot_out(console).await) },
    ClientWsMessage::Reduction => return ServerWsMessage::Reduction { steps: console.reduction().await },
    ClientWsMessage::CandidateStatus => {
      return ServerWsMessage::CandidateStatus { candidates: console.candidate_statuses().await }
    }
    ClientWsMessage::Similarity => return ServerWsMessage::Similarity { report: console.similarity().await },
    ClientWsMessage::SetStep { step } => return ServerWsMessage::Step { step: console.set_step(step).await },
    ClientWsMessage::SetMode { mode } => {
      console.set_mode(mode).await;
      return ServerWsMessage::Ok;
    }
    ClientWsMessage::ApplySort { metric, dir } => {
      return ServerWsMessage::Sorted { changed: console.apply_sort(metric, dir).await }
    }
    ClientWsMessage::Generate { question } => console.generate(&question).await.map(|_| ServerWsMessage::Ok),
    ClientWsMessage::Evaluate => console.evaluate().await.map(|summary| ServerWsMessage::Evaluated { summary }),
    ClientWsMessage::ToggleReveal { id } => {
      console.set_revealed(id, None).await.map(|revealed| ServerWsMessage::Revealed { id, revealed })
    }
    ClientWsMessage::Resync => console.resync().await.map(|_| ServerWsMessage::Ok),
  };
  result.unwrap_or_else(|e| ServerWsMessage::Error { message: e.to_string() })
}
