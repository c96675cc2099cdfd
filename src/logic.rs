//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Running generation (with the controller's retry loop) and grading
//!     against the AI gateway without holding the session lock
//!   - Spawning timer drivers and wiring countdown expiry to auto-submit
//!   - Background variants of start/reset/submit for the WebSocket, which
//!     answer with the loading view and publish the outcome later
//!   - Thin wrappers for the synchronous controller events

use std::future::Future;
use std::pin::Pin;

use tracing::{info, instrument, warn};

use crate::anticheat::Violation;
use crate::domain::{Difficulty, Mode};
use crate::gateway::PendingRequest;
use crate::protocol::{AnswerIn, SessionView};
use crate::session::{GenerationOutcome, GradingOutcome, PasteOutcome, SessionError};
use crate::state::{spawn_ticker, AppState, ExpiryHandler, SharedSession};

#[instrument(level = "info", skip(session))]
pub async fn do_view(session: &SharedSession) -> SessionView {
  session.lock().await.view()
}

#[instrument(level = "info", skip(session, language), fields(language_len = language.len()))]
pub async fn do_configure(
  session: &SharedSession,
  mode: Mode,
  language: &str,
  difficulty: Difficulty,
) -> Result<SessionView, SessionError> {
  let mut s = session.lock().await;
  s.configure(mode, language, difficulty)?;
  Ok(s.view())
}

#[instrument(level = "info", skip(state, session))]
pub async fn do_start(state: &AppState, session: &SharedSession) -> Result<SessionView, SessionError> {
  let req = session.lock().await.begin_start()?;
  Ok(run_generation(state, session, req).await)
}

#[instrument(level = "info", skip(state, session))]
pub async fn do_reset(state: &AppState, session: &SharedSession, confirm: bool) -> Result<SessionView, SessionError> {
  let req = session.lock().await.reset_challenge(confirm)?;
  match req {
    Some(req) => Ok(run_generation(state, session, req).await),
    None => Ok(session.lock().await.view()),
  }
}

#[instrument(level = "info", skip(session))]
pub async fn do_restart(session: &SharedSession) -> SessionView {
  let mut s = session.lock().await;
  s.restart();
  s.view()
}

#[instrument(level = "info", skip(state, session))]
pub async fn do_submit(state: &AppState, session: &SharedSession) -> Result<SessionView, SessionError> {
  let req = session.lock().await.begin_submit()?;
  Ok(run_grading(state, session, req).await)
}

#[instrument(level = "info", skip(state, session, content), fields(content_len = content.len()))]
pub async fn do_edit(state: &AppState, session: &SharedSession, content: &str) -> Result<SessionView, SessionError> {
  let mut s = session.lock().await;
  if let Some(run) = s.on_edit(content)? {
    spawn_ticker(session.clone(), run, expiry_handler(state.clone()));
  }
  Ok(s.view())
}

#[instrument(level = "info", skip(session, text), fields(text_len = text.len()))]
pub async fn do_paste(session: &SharedSession, text: &str) -> Result<SessionView, SessionError> {
  let mut s = session.lock().await;
  match s.on_paste(text)? {
    PasteOutcome::Violation(rules) => {
      info!(target: "session", id = %s.id(), rules = %describe(&rules), "Paste rejected");
    }
    PasteOutcome::Accepted | PasteOutcome::Ignored => {}
  }
  Ok(s.view())
}

#[instrument(level = "info", skip(session, answer))]
pub async fn do_answer(session: &SharedSession, answer: &AnswerIn) -> Result<SessionView, SessionError> {
  let mut s = session.lock().await;
  match answer {
    AnswerIn::Choice { question, option } => s.select_option(*question, *option)?,
    AnswerIn::Blank { question, blank, text } => s.fill_blank(*question, *blank, text)?,
  }
  Ok(s.view())
}

#[instrument(level = "info", skip(session))]
pub async fn do_next(session: &SharedSession) -> Result<SessionView, SessionError> {
  let mut s = session.lock().await;
  s.next_question()?;
  Ok(s.view())
}

#[instrument(level = "info", skip(session))]
pub async fn do_prev(session: &SharedSession) -> Result<SessionView, SessionError> {
  let mut s = session.lock().await;
  s.prev_question()?;
  Ok(s.view())
}

/// Enter loading and run generation on a separate task. The finished view is
/// published to the session's subscribers.
#[instrument(level = "info", skip(state, session))]
pub async fn start_in_background(state: &AppState, session: &SharedSession) -> Result<SessionView, SessionError> {
  let mut s = session.lock().await;
  let req = s.begin_start()?;
  spawn_generation(state, session, req);
  Ok(s.view())
}

#[instrument(level = "info", skip(state, session))]
pub async fn reset_in_background(
  state: &AppState,
  session: &SharedSession,
  confirm: bool,
) -> Result<SessionView, SessionError> {
  let mut s = session.lock().await;
  if let Some(req) = s.reset_challenge(confirm)? {
    spawn_generation(state, session, req);
  }
  Ok(s.view())
}

#[instrument(level = "info", skip(state, session))]
pub async fn submit_in_background(state: &AppState, session: &SharedSession) -> Result<SessionView, SessionError> {
  let mut s = session.lock().await;
  let req = s.begin_submit()?;
  let (state, session) = (state.clone(), session.clone());
  tokio::spawn(async move {
    run_grading(&state, &session, req).await;
  });
  Ok(s.view())
}

fn spawn_generation(state: &AppState, session: &SharedSession, req: PendingRequest) {
  let (state, session) = (state.clone(), session.clone());
  tokio::spawn(async move {
    run_generation(&state, &session, req).await;
  });
}

/// Send generation requests until the controller is satisfied or gives up.
async fn run_generation(state: &AppState, session: &SharedSession, mut req: PendingRequest) -> SessionView {
  loop {
    let reply = state.gateway.generate(&req).await;
    let mut s = session.lock().await;
    match s.finish_generation(req.token, reply) {
      GenerationOutcome::Ready { timer_run } => {
        if let Some(run) = timer_run {
          spawn_ticker(session.clone(), run, expiry_handler(state.clone()));
        }
        return s.publish();
      }
      GenerationOutcome::Retry(next) => req = next,
      GenerationOutcome::Failed { .. } => return s.publish(),
      GenerationOutcome::Stale => {
        warn!(target: "session", id = %s.id(), token = req.token, "Generation finished after the session moved on");
        return s.view();
      }
    }
  }
}

async fn run_grading(state: &AppState, session: &SharedSession, req: PendingRequest) -> SessionView {
  let reply = state.gateway.grade(&req).await;
  let mut s = session.lock().await;
  match s.finish_grading(req.token, reply) {
    GradingOutcome::Failed { timer_run: Some(run), .. } => {
      spawn_ticker(session.clone(), run, expiry_handler(state.clone()));
      s.publish()
    }
    GradingOutcome::Stale => {
      warn!(target: "session", id = %s.id(), token = req.token, "Grading finished after the session moved on");
      s.view()
    }
    GradingOutcome::Graded | GradingOutcome::Failed { timer_run: None, .. } => s.publish(),
  }
}

/// Countdown expiry behaves exactly like a manual submit.
pub async fn auto_submit(state: &AppState, session: &SharedSession) -> Result<SessionView, SessionError> {
  let req = session.lock().await.begin_auto_submit()?;
  Ok(run_grading(state, session, req).await)
}

type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn expiry_handler(state: AppState) -> ExpiryHandler {
  Box::new(move |session: SharedSession| {
    let fut: BoxFuture = Box::pin(async move {
      if let Err(e) = auto_submit(&state, &session).await {
        warn!(target: "session", error = %e, "Automatic submission rejected");
      }
    });
    tokio::spawn(fut);
  })
}

fn describe(rules: &[Violation]) -> String {
  rules.iter().map(|r| format!("{r:?}")).collect::<Vec<_>>().join(",")
}
