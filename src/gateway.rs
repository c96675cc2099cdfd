//! AI gateway: one funnel for every model call a session makes.
//!
//! A `PendingRequest` produced by the session controller goes out through a
//! pluggable `Transport` (remote relay over HTTP, or the upstream client
//! in-process), the assistant text is pulled out of the reply, and
//! `parse_json` digs the JSON object out of whatever prose surrounds it.
//!
//! The gateway never retries. Retry policy belongs to the session controller.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::{error, info, instrument, warn};

use crate::domain::Mode;
use crate::gemini::Gemini;
use crate::seeds;
use crate::util::{extract_json_object, trunc_for_log};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
  /// Relay/upstream unreachable or returned a non-2xx status without details.
  #[error("Transport failure: {0}")]
  Transport(String),

  /// The AI backend reported an error object; message passed through.
  #[error("{0}")]
  Upstream(String),

  /// Reply did not have the expected chat/completion shape.
  #[error("Invalid response from AI service")]
  InvalidResponse,

  /// Reply text held no parseable JSON object (or not the expected schema).
  #[error("Could not parse AI response: {0}")]
  Parse(String),
}

impl GatewayError {
  /// Malformed replies are worth asking for again; transport problems are not.
  pub fn is_retryable(&self) -> bool {
    matches!(self, GatewayError::InvalidResponse | GatewayError::Parse(_))
  }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestKind {
  Generate { mode: Mode, language: String },
  Grade { mode: Mode },
}

/// A model call the controller wants made, tagged with the session's
/// request token at the time it was issued.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
  pub token: u64,
  pub kind: RequestKind,
  pub prompt: String,
}

/// Whatever carries a prompt to the AI backend and brings back its JSON reply.
#[async_trait]
pub trait Transport: Send + Sync {
  fn name(&self) -> &'static str;
  async fn send(&self, prompt: &str) -> Result<Value, GatewayError>;
}

/// Talks to a relay (ours or a compatible one) at `url` with `{ "prompt": ... }`.
pub struct RelayTransport {
  client: reqwest::Client,
  url: String,
}

impl RelayTransport {
  pub fn new(url: impl Into<String>) -> Result<Self, GatewayError> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(90))
      .build()
      .map_err(|e| GatewayError::Transport(e.to_string()))?;
    Ok(Self { client, url: url.into() })
  }
}

#[async_trait]
impl Transport for RelayTransport {
  fn name(&self) -> &'static str {
    "relay"
  }

  async fn send(&self, prompt: &str) -> Result<Value, GatewayError> {
    let res = self
      .client
      .post(&self.url)
      .header(USER_AGENT, "codekata-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .json(&serde_json::json!({ "prompt": prompt }))
      .send()
      .await
      .map_err(|e| GatewayError::Transport(e.to_string()))?;
    let status = res.status().as_u16();
    let body = res.text().await.map_err(|e| GatewayError::Transport(e.to_string()))?;
    interpret_reply(status, &body)
  }
}

/// Calls the upstream client directly, the same way the relay endpoint does.
pub struct UpstreamTransport {
  gemini: Gemini,
}

impl UpstreamTransport {
  pub fn new(gemini: Gemini) -> Self {
    Self { gemini }
  }
}

#[async_trait]
impl Transport for UpstreamTransport {
  fn name(&self) -> &'static str {
    "upstream"
  }

  async fn send(&self, prompt: &str) -> Result<Value, GatewayError> {
    let reply = self.gemini.generate_content(prompt).await.map_err(GatewayError::Transport)?;
    interpret_reply(reply.status, &reply.body)
  }
}

/// Classify a relay/upstream reply: explicit error object, bad status, or a JSON body.
pub fn interpret_reply(status: u16, body: &str) -> Result<Value, GatewayError> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }

  if let Ok(w) = serde_json::from_str::<EWrap>(body) {
    return Err(GatewayError::Upstream(w.error.message));
  }
  if !(200..300).contains(&status) {
    return Err(GatewayError::Transport(format!("HTTP {status}")));
  }
  serde_json::from_str::<Value>(body).map_err(|_| GatewayError::InvalidResponse)
}

/// Pull the assistant text out of a generateContent or chat-completion reply.
pub fn extract_text(reply: &Value) -> Option<&str> {
  reply
    .pointer("/candidates/0/content/parts/0/text")
    .or_else(|| reply.pointer("/choices/0/message/content"))
    .and_then(Value::as_str)
}

/// Parse the first JSON object embedded in `text`; the whole text if no object is found.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, GatewayError> {
  let candidate = extract_json_object(text).unwrap_or(text);
  serde_json::from_str::<T>(candidate).map_err(|e| {
    warn!(target: "session", error = %e, raw = %trunc_for_log(text, 400), "Failed to parse AI JSON");
    GatewayError::Parse(e.to_string())
  })
}

#[derive(Clone)]
pub struct Gateway {
  transport: Option<Arc<dyn Transport>>,
}

impl Gateway {
  /// `None` means offline: built-in seed content stands in for the model.
  pub fn new(transport: Option<Arc<dyn Transport>>) -> Self {
    Self { transport }
  }

  /// RELAY_URL wins over a local upstream client; neither means offline.
  pub fn from_env(gemini: Option<Gemini>) -> Self {
    if let Ok(url) = std::env::var("RELAY_URL") {
      match RelayTransport::new(url.clone()) {
        Ok(t) => {
          info!(target: "codekata_backend", %url, "AI gateway using remote relay");
          return Self::new(Some(Arc::new(t)));
        }
        Err(e) => error!(target: "codekata_backend", %url, error = %e, "Relay transport unavailable"),
      }
    }
    match gemini {
      Some(g) => Self::new(Some(Arc::new(UpstreamTransport::new(g)))),
      None => Self::new(None),
    }
  }

  pub fn transport_name(&self) -> &'static str {
    self.transport.as_ref().map(|t| t.name()).unwrap_or("offline_seeds")
  }

  #[instrument(level = "info", skip(self, request), fields(token = request.token, transport = self.transport_name()))]
  pub async fn generate(&self, request: &PendingRequest) -> Result<String, GatewayError> {
    self.call(request).await
  }

  #[instrument(level = "info", skip(self, request), fields(token = request.token, transport = self.transport_name()))]
  pub async fn grade(&self, request: &PendingRequest) -> Result<String, GatewayError> {
    self.call(request).await
  }

  async fn call(&self, request: &PendingRequest) -> Result<String, GatewayError> {
    let Some(transport) = &self.transport else {
      return Ok(seeds::offline_reply(&request.kind));
    };
    let start = std::time::Instant::now();
    let reply = transport.send(&request.prompt).await.map_err(|e| {
      error!(elapsed = ?start.elapsed(), error = %e, "AI call failed");
      e
    })?;
    let text = extract_text(&reply).ok_or_else(|| {
      warn!(raw = %trunc_for_log(&reply.to_string(), 400), "AI reply missing message text");
      GatewayError::InvalidResponse
    })?;
    info!(elapsed = ?start.elapsed(), text_len = text.len(), "AI reply received");
    Ok(text.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parse_json_finds_object_in_prose() {
    let v: Value = parse_json("Sure! {\"score\":80,\"rating\":\"x\",\"feedback\":\"y\",\"suggestions\":[]}").unwrap();
    assert_eq!(v, json!({ "score": 80, "rating": "x", "feedback": "y", "suggestions": [] }));
  }

  #[test]
  fn parse_json_reports_failure_instead_of_panicking() {
    let r: Result<Value, _> = parse_json("not json");
    assert!(matches!(r, Err(GatewayError::Parse(_))));
  }

  #[test]
  fn text_extraction_supports_both_reply_shapes() {
    let gemini = json!({ "candidates": [{ "content": { "parts": [{ "text": "hi" }] } }] });
    let chat = json!({ "choices": [{ "message": { "content": "hey" } }] });
    assert_eq!(extract_text(&gemini), Some("hi"));
    assert_eq!(extract_text(&chat), Some("hey"));
    assert_eq!(extract_text(&json!({ "candidates": [] })), None);
  }

  #[test]
  fn reply_classification() {
    assert_eq!(
      interpret_reply(429, r#"{"error":{"message":"quota","status":"RESOURCE_EXHAUSTED"}}"#),
      Err(GatewayError::Upstream("quota".into()))
    );
    assert_eq!(interpret_reply(502, "<html>bad gateway</html>"), Err(GatewayError::Transport("HTTP 502".into())));
    assert_eq!(interpret_reply(200, "<html>"), Err(GatewayError::InvalidResponse));
    assert!(interpret_reply(200, r#"{"candidates":[]}"#).is_ok());
  }

  #[test]
  fn only_malformed_replies_are_retryable() {
    assert!(GatewayError::InvalidResponse.is_retryable());
    assert!(GatewayError::Parse("x".into()).is_retryable());
    assert!(!GatewayError::Upstream("x".into()).is_retryable());
    assert!(!GatewayError::Transport("x".into()).is_retryable());
  }

  struct Canned(Value);

  #[async_trait]
  impl Transport for Canned {
    fn name(&self) -> &'static str {
      "canned"
    }
    async fn send(&self, _prompt: &str) -> Result<Value, GatewayError> {
      Ok(self.0.clone())
    }
  }

  fn request() -> PendingRequest {
    PendingRequest { token: 1, kind: RequestKind::Grade { mode: Mode::Challenge }, prompt: "p".into() }
  }

  #[tokio::test]
  async fn gateway_returns_message_text() {
    let canned: Arc<dyn Transport> = Arc::new(Canned(json!({
      "candidates": [{ "content": { "parts": [{ "text": "{\"ok\":true}" }] } }]
    })));
    let gw = Gateway::new(Some(canned));
    assert_eq!(gw.grade(&request()).await.unwrap(), "{\"ok\":true}");
  }

  #[tokio::test]
  async fn gateway_flags_missing_message_as_invalid() {
    let canned: Arc<dyn Transport> = Arc::new(Canned(json!({ "foo": 1 })));
    let gw = Gateway::new(Some(canned));
    assert_eq!(gw.generate(&request()).await, Err(GatewayError::InvalidResponse));
  }

  #[tokio::test]
  async fn offline_gateway_serves_parseable_seed_content() {
    let gw = Gateway::new(None);
    let text = gw.grade(&request()).await.unwrap();
    let v: Value = parse_json(&text).unwrap();
    assert!(v.get("score").is_some());
  }
}
