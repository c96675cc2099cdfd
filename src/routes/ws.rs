//! WebSocket upgrade + message loop for one session. Each client message is
//! one controller event; we reply with the resulting session view.
//!
//! Start, reset and submit answer right away with the loading view and run the
//! model call on a separate task, so `restart` and pastes keep flowing while a
//! request is in flight. Finished calls (including countdown auto-submits)
//! arrive through the session's update channel and are pushed as `session`.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Path, State, WebSocketUpgrade,
  },
  response::{IntoResponse, Response},
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, instrument, warn};

use crate::logic::*;
use crate::protocol::{ClientWsMessage, ServerWsMessage};
use crate::session::SessionError;
use crate::state::{AppState, SharedSession};

use super::http::ApiError;

#[instrument(level = "info", skip(state, ws), fields(%id))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Response {
  let session = match state.get_session(&id).await {
    Ok(s) => s,
    Err(e) => return ApiError::from(e).into_response(),
  };
  info!(target: "codekata_backend", %id, "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, session))
}

#[instrument(level = "info", skip(socket, state, session))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, session: SharedSession) {
  info!(target: "codekata_backend", "WebSocket connected");
  let mut updates = session.lock().await.subscribe();

  loop {
    let reply_msg = tokio::select! {
      incoming = socket.recv() => {
        match incoming {
          Some(Ok(Message::Text(txt))) => match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(incoming) => {
              debug!(target: "codekata_backend", "WS received: {:?}", &incoming);
              match handle_client_ws(incoming, &state, &session).await {
                Ok(msg) => msg,
                Err(e) => ServerWsMessage::Error { message: e.to_string() },
              }
            }
            Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
          },
          Some(Ok(Message::Ping(payload))) => {
            let _ = socket.send(Message::Pong(payload)).await;
            continue;
          }
          Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
          Some(Ok(_)) => continue,
        }
      }
      update = updates.recv() => {
        match update {
          Ok(view) => ServerWsMessage::Session { session: view },
          Err(RecvError::Lagged(skipped)) => {
            warn!(target: "codekata_backend", skipped, "WS client fell behind session updates");
            continue;
          }
          Err(RecvError::Closed) => break,
        }
      }
    };

    let out = serde_json::to_string(&reply_msg).unwrap_or_else(|e| {
      serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
    });

    if let Err(e) = socket.send(Message::Text(out)).await {
      error!(target: "codekata_backend", error = %e, "WS send error");
      break;
    }
  }
  info!(target: "codekata_backend", "WebSocket disconnected");
}

async fn handle_client_ws(
  msg: ClientWsMessage,
  state: &AppState,
  session: &SharedSession,
) -> Result<ServerWsMessage, SessionError> {
  let view = match msg {
    ClientWsMessage::Ping => return Ok(ServerWsMessage::Pong),
    ClientWsMessage::View => do_view(session).await,
    ClientWsMessage::Configure(c) => do_configure(session, c.mode, &c.language, c.difficulty).await?,
    ClientWsMessage::Start => start_in_background(state, session).await?,
    ClientWsMessage::Submit => submit_in_background(state, session).await?,
    ClientWsMessage::Restart => do_restart(session).await,
    ClientWsMessage::Reset { confirm } => reset_in_background(state, session, confirm).await?,
    ClientWsMessage::Edit { content } => do_edit(state, session, &content).await?,
    ClientWsMessage::Paste { text } => do_paste(session, &text).await?,
    ClientWsMessage::Answer(answer) => do_answer(session, &answer).await?,
    ClientWsMessage::Next => do_next(session).await?,
    ClientWsMessage::Prev => do_prev(session).await?,
  };
  Ok(ServerWsMessage::Session { session: view })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::AppConfig;
  use crate::domain::Phase;
  use crate::gateway::Gateway;

  #[tokio::test]
  async fn start_message_replies_before_generation_finishes() {
    let state = AppState::with_parts(AppConfig::default(), Gateway::new(None), None);
    let session = state.create_session().await;
    let mut updates = session.lock().await.subscribe();

    let reply = handle_client_ws(ClientWsMessage::Start, &state, &session).await.unwrap();
    assert!(matches!(reply, ServerWsMessage::Session { ref session } if session.phase == Phase::Loading));

    let pushed = updates.recv().await.unwrap();
    assert_eq!(pushed.phase, Phase::Challenge);
  }

  #[tokio::test]
  async fn restart_message_is_handled_during_loading() {
    let state = AppState::with_parts(AppConfig::default(), Gateway::new(None), None);
    let session = state.create_session().await;
    handle_client_ws(ClientWsMessage::Start, &state, &session).await.unwrap();
    let reply = handle_client_ws(ClientWsMessage::Restart, &state, &session).await.unwrap();
    assert!(matches!(reply, ServerWsMessage::Session { ref session } if session.phase == Phase::Setup));
  }
}
