//! Minimal client for the generative-AI backend (Gemini `generateContent`).
//!
//! The relay forwards prompts through this client unmodified and hands the
//! upstream body back verbatim; interpreting the body is the gateway's job.
//! Calls are instrumented and log model name, latency and response size (not contents).
//!
//! NOTE: We never log the API key. It travels in a header, never in the URL.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Serialize;
use tracing::{error, info, instrument};

#[derive(Clone)]
pub struct Gemini {
  pub client: reqwest::Client,
  api_key: String,
  pub base_url: String,
  pub model: String,
}

/// Raw upstream reply: HTTP status plus the untouched body.
#[derive(Debug)]
pub struct UpstreamReply {
  pub status: u16,
  pub body: String,
}

impl Gemini {
  /// Construct the client if we find GEMINI_API_KEY; otherwise return None.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
    let base_url = std::env::var("GEMINI_BASE_URL")
      .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".into());
    let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| "gemini-flash-latest".into());
    Self::new(api_key, base_url, model)
  }

  pub fn new(api_key: String, base_url: String, model: String) -> Option<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(60))
      .build()
      .ok()?;
    Some(Self { client, api_key, base_url, model })
  }

  /// Send one prompt as a single-turn `generateContent` request.
  ///
  /// Err is reserved for transport failures (DNS, TLS, timeout, unreadable
  /// body). Non-2xx replies are returned as-is so the caller can relay them.
  #[instrument(level = "info", skip(self, prompt), fields(model = %self.model, prompt_len = prompt.len()))]
  pub async fn generate_content(&self, prompt: &str) -> Result<UpstreamReply, String> {
    let url = format!(
      "{}/models/{}:generateContent",
      self.base_url.trim_end_matches('/'),
      self.model
    );
    let req = GenerateContentRequest {
      contents: vec![Content { parts: vec![Part { text: prompt }] }],
    };

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "codekata-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header("x-goog-api-key", &self.api_key)
      .json(&req)
      .send()
      .await
      .map_err(|e| {
        error!(elapsed = ?start.elapsed(), error = %e, "Upstream request failed");
        e.to_string()
      })?;

    let status = res.status().as_u16();
    let body = res.text().await.map_err(|e| e.to_string())?;
    info!(elapsed = ?start.elapsed(), status, body_len = body.len(), "Upstream response received");
    Ok(UpstreamReply { status, body })
  }
}

// --- Request DTOs ---

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
  contents: Vec<Content<'a>>,
}
#[derive(Serialize)]
struct Content<'a> {
  parts: Vec<Part<'a>>,
}
#[derive(Serialize)]
struct Part<'a> {
  text: &'a str,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn request_body_has_single_text_part() {
    let req = GenerateContentRequest {
      contents: vec![Content { parts: vec![Part { text: "hello" }] }],
    };
    let v = serde_json::to_value(&req).unwrap();
    assert_eq!(v, serde_json::json!({ "contents": [{ "parts": [{ "text": "hello" }] }] }));
  }
}
