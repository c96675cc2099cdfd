//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs the session id plus basic result info.

use std::sync::Arc;

use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument};

use crate::domain::{Difficulty, Mode};
use crate::logic::*;
use crate::protocol::*;
use crate::session::SessionError;
use crate::state::AppState;

/// `SessionError` as an HTTP response with a `{ "error": { "message" } }` body.
pub struct ApiError(SessionError);

impl From<SessionError> for ApiError {
  fn from(e: SessionError) -> Self {
    ApiError(e)
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = match &self.0 {
      SessionError::Violated | SessionError::InvalidTransition { .. } => StatusCode::CONFLICT,
      SessionError::UnknownSession(_) => StatusCode::NOT_FOUND,
      SessionError::InvalidAnswer(_) | SessionError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, Json(ErrorBody::new(self.0.to_string()))).into_response()
  }
}

type ApiResult = Result<Json<SessionView>, ApiError>;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut {
    ok: true,
    transport: state.gateway.transport_name(),
    relay_configured: state.upstream.is_some(),
  })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_settings(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let difficulties = Difficulty::ALL
    .iter()
    .map(|&level| DifficultyOut {
      level,
      guideline: state.config.prompts.guideline(level).to_string(),
      settings: state.config.settings_for(level),
    })
    .collect();
  Json(SettingsOut { modes: vec![Mode::Challenge, Mode::MultipleChoice, Mode::FillBlanks], difficulties })
}

#[instrument(level = "info", skip(state))]
pub async fn http_create_session(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  let session = state.create_session().await;
  let view = do_view(&session).await;
  (StatusCode::CREATED, Json(view))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_session(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
  let session = state.get_session(&id).await?;
  Ok(Json(do_view(&session).await))
}

#[instrument(level = "info", skip(state, body), fields(%id, mode = ?body.mode, difficulty = ?body.difficulty))]
pub async fn http_configure(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ConfigureIn>,
) -> ApiResult {
  let session = state.get_session(&id).await?;
  Ok(Json(do_configure(&session, body.mode, &body.language, body.difficulty).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_start(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
  let session = state.get_session(&id).await?;
  let view = do_start(&state, &session).await?;
  info!(target: "session", %id, phase = ?view.phase, retries = view.retry_count, "HTTP start served");
  Ok(Json(view))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_submit(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
  let session = state.get_session(&id).await?;
  let view = do_submit(&state, &session).await?;
  info!(
    target: "session",
    %id,
    phase = ?view.phase,
    score = ?view.evaluation.as_ref().map(|e| e.score),
    "HTTP submit evaluated"
  );
  Ok(Json(view))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_restart(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
  let session = state.get_session(&id).await?;
  Ok(Json(do_restart(&session).await))
}

#[instrument(level = "info", skip(state, body), fields(%id, confirm = body.confirm))]
pub async fn http_reset(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ResetIn>,
) -> ApiResult {
  let session = state.get_session(&id).await?;
  Ok(Json(do_reset(&state, &session, body.confirm).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id, content_len = body.content.len()))]
pub async fn http_edit(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<EditIn>,
) -> ApiResult {
  let session = state.get_session(&id).await?;
  Ok(Json(do_edit(&state, &session, &body.content).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id, text_len = body.text.len()))]
pub async fn http_paste(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<PasteIn>,
) -> ApiResult {
  let session = state.get_session(&id).await?;
  Ok(Json(do_paste(&session, &body.text).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_answer(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<AnswerIn>,
) -> ApiResult {
  let session = state.get_session(&id).await?;
  Ok(Json(do_answer(&session, &body).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_next(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
  let session = state.get_session(&id).await?;
  Ok(Json(do_next(&session).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_prev(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
  let session = state.get_session(&id).await?;
  Ok(Json(do_prev(&session).await?))
}
