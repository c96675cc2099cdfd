//! Same-origin relay: forwards `{ "prompt": ... }` to the AI backend with the
//! server-held credential and returns the upstream reply untouched.

use std::sync::Arc;

use axum::{
  body::Bytes,
  extract::State,
  http::{header::CONTENT_TYPE, Method, StatusCode},
  response::{IntoResponse, Response},
  Json,
};
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use crate::protocol::ErrorBody;
use crate::state::AppState;

#[derive(Deserialize)]
struct RelayIn {
  #[serde(default)]
  prompt: Option<String>,
}

fn relay_error(status: StatusCode, message: impl Into<String>) -> Response {
  (status, Json(ErrorBody::new(message))).into_response()
}

#[instrument(level = "info", skip(state, body), fields(%method, body_len = body.len()))]
pub async fn relay(State(state): State<Arc<AppState>>, method: Method, body: Bytes) -> Response {
  if method != Method::POST {
    return relay_error(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
  }

  let prompt = serde_json::from_slice::<RelayIn>(&body)
    .ok()
    .and_then(|b| b.prompt)
    .unwrap_or_default();
  // "" and "0" count as missing; whitespace-only prompts are forwarded.
  if prompt.is_empty() || prompt == "0" {
    return relay_error(StatusCode::BAD_REQUEST, "Prompt is required");
  }

  let Some(upstream) = &state.upstream else {
    warn!(target: "relay", "Relay called without an upstream API key");
    return relay_error(StatusCode::SERVICE_UNAVAILABLE, "Relay is not configured");
  };

  match upstream.generate_content(&prompt).await {
    Ok(reply) => {
      info!(target: "relay", status = reply.status, body_len = reply.body.len(), "Relayed upstream reply");
      let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::BAD_GATEWAY);
      (status, [(CONTENT_TYPE, "application/json")], reply.body).into_response()
    }
    Err(e) => {
      error!(target: "relay", error = %e, "Upstream unreachable");
      relay_error(StatusCode::INTERNAL_SERVER_ERROR, format!("Proxy Error: {e}"))
    }
  }
}
