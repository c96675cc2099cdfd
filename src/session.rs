//! Session controller: the setup → loading → challenge → results state machine.
//!
//! One `SessionController` owns everything mutable about a practice session:
//! the selected mode/language/difficulty, the phase, the violation flag, the
//! timer, the paste monitor, the generated content and the user's answers.
//!
//! Network calls never happen in here. Transitions that need the model
//! (`begin_start`, `begin_submit`, `reset_challenge`) hand back a
//! `PendingRequest`; the caller sends it through the gateway and reports the
//! result with `finish_generation` / `finish_grading`. Every request carries
//! the session's token at the time it was issued. A result whose token is no
//! longer current (the user restarted meanwhile) is dropped as `Stale`.
//!
//! Results of model calls that finish in the background are also pushed to
//! subscribers (WebSocket clients) through `publish`.

use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::anticheat::{Monitor, Violation};
use crate::config::AppConfig;
use crate::domain::{
  count_blanks, rating_for_score, CompletionStatus, Content, Difficulty, Evaluation, Mode, Phase, Problem,
  Question, UserAnswers,
};
use crate::gateway::{parse_json, GatewayError, PendingRequest, RequestKind};
use crate::prompts;
use crate::protocol::{QuestionView, QuizView, SessionView};
use crate::timer::{format_time, TickOutcome, Timer, TimerKind};

pub const GENERATION_FAILED_MSG: &str = "Could not generate a valid exercise. Please try again.";
pub const GRADING_FAILED_MSG: &str = "Evaluation failed. Please try submitting again.";
pub const VIOLATION_MSG: &str = "Anti-cheat violation detected. This session has been invalidated.";
pub const TIME_UP_MSG: &str = "Time is up! Submitting your answers.";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
  #[error("Session was invalidated by the anti-cheat monitor; restart to continue")]
  Violated,

  #[error("Cannot {action} while in the {phase:?} phase")]
  InvalidTransition { action: &'static str, phase: Phase },

  #[error("Unknown session: {0}")]
  UnknownSession(String),

  #[error("Invalid answer: {0}")]
  InvalidAnswer(String),

  #[error("Invalid configuration: {0}")]
  InvalidConfig(String),
}

/// Configuration and lifecycle fields of a session.
#[derive(Clone, Debug)]
pub struct Session {
  pub mode: Mode,
  pub language: String,
  pub difficulty: Difficulty,
  pub phase: Phase,
  pub violated: bool,
  pub retry_count: u32,
  /// Token of the request the session is currently waiting for (or last issued).
  pub token: u64,
}

impl Default for Session {
  fn default() -> Self {
    Self {
      mode: Mode::Challenge,
      language: "javascript".into(),
      difficulty: Difficulty::Beginner,
      phase: Phase::Setup,
      violated: false,
      retry_count: 0,
      token: 0,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
  /// Content installed; `timer_run` is set when a countdown started.
  Ready { timer_run: Option<u64> },
  /// Reply was malformed; send this request again.
  Retry(PendingRequest),
  /// Back in setup; `message` is for the user.
  Failed { message: String },
  Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GradingOutcome {
  Graded,
  /// Back in the challenge view with answers intact.
  Failed { message: String, timer_run: Option<u64> },
  Stale,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteOutcome {
  Accepted,
  Violation(Vec<Violation>),
  /// Paste outside the challenge view; nothing to monitor.
  Ignored,
}

pub struct SessionController {
  id: String,
  config: Arc<AppConfig>,
  session: Session,
  timer: Timer,
  monitor: Monitor,
  content: Option<Content>,
  answers: Option<UserAnswers>,
  question_index: usize,
  code: String,
  evaluation: Option<Evaluation>,
  time_taken: String,
  resume_timer: bool,
  notice: Option<String>,
  updates: broadcast::Sender<SessionView>,
}

/// Views buffered per subscriber before it starts lagging.
const UPDATE_CAPACITY: usize = 16;

impl SessionController {
  pub fn new(id: impl Into<String>, config: Arc<AppConfig>) -> Self {
    let monitor = Monitor::new(config.anticheat.clone());
    let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
    Self {
      id: id.into(),
      config,
      session: Session::default(),
      timer: Timer::default(),
      monitor,
      content: None,
      answers: None,
      question_index: 0,
      code: String::new(),
      evaluation: None,
      time_taken: format_time(0),
      resume_timer: false,
      notice: None,
      updates,
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  pub fn session(&self) -> &Session {
    &self.session
  }

  pub fn timer(&self) -> &Timer {
    &self.timer
  }

  pub fn evaluation(&self) -> Option<&Evaluation> {
    self.evaluation.as_ref()
  }

  pub fn answers(&self) -> Option<&UserAnswers> {
    self.answers.as_ref()
  }

  pub fn question_index(&self) -> usize {
    self.question_index
  }

  /// Receive every view passed to `publish` from now on.
  pub fn subscribe(&self) -> broadcast::Receiver<SessionView> {
    self.updates.subscribe()
  }

  /// Current view, also sent to all subscribers. No subscribers is fine.
  pub fn publish(&self) -> SessionView {
    let view = self.view();
    let _ = self.updates.send(view.clone());
    view
  }

  // ------------------------------------------------------------------
  // Setup
  // ------------------------------------------------------------------

  pub fn configure(&mut self, mode: Mode, language: &str, difficulty: Difficulty) -> Result<(), SessionError> {
    self.require_phase(Phase::Setup, "change settings")?;
    let language = language.trim().to_lowercase();
    if language.is_empty() {
      return Err(SessionError::InvalidConfig("language must not be empty".into()));
    }
    self.session.mode = mode;
    self.session.language = language;
    self.session.difficulty = difficulty;
    Ok(())
  }

  /// Setup → Loading. Returns the generation request to send.
  pub fn begin_start(&mut self) -> Result<PendingRequest, SessionError> {
    self.require_phase(Phase::Setup, "start")?;
    Ok(self.enter_generation())
  }

  /// Regenerate from the challenge view. Unconfirmed requests are a no-op.
  pub fn reset_challenge(&mut self, confirmed: bool) -> Result<Option<PendingRequest>, SessionError> {
    self.reject_if_violated()?;
    self.require_phase(Phase::Challenge, "reset the challenge")?;
    if !confirmed {
      return Ok(None);
    }
    Ok(Some(self.enter_generation()))
  }

  /// Any phase → Setup. In-flight requests become stale.
  pub fn restart(&mut self) {
    self.clear_round();
    self.session.token += 1;
    self.session.phase = Phase::Setup;
    info!(target: "session", id = %self.id, "Session restarted");
  }

  fn clear_round(&mut self) {
    self.session.violated = false;
    self.session.retry_count = 0;
    self.timer.reset();
    self.monitor.reset();
    self.content = None;
    self.answers = None;
    self.question_index = 0;
    self.code.clear();
    self.evaluation = None;
    self.time_taken = format_time(0);
    self.resume_timer = false;
    self.notice = None;
  }

  fn enter_generation(&mut self) -> PendingRequest {
    self.clear_round();
    self.session.token += 1;
    self.session.phase = Phase::Loading;
    info!(
      target: "session",
      id = %self.id,
      token = self.session.token,
      mode = self.session.mode.as_str(),
      language = %self.session.language,
      difficulty = self.session.difficulty.as_str(),
      "Generating exercise"
    );
    self.generation_request()
  }

  fn generation_request(&self) -> PendingRequest {
    let s = &self.session;
    let prompt = prompts::generation_prompt(
      &self.config.prompts,
      s.mode,
      &s.language,
      s.difficulty,
      self.config.settings_for(s.difficulty),
    );
    PendingRequest {
      token: s.token,
      kind: RequestKind::Generate { mode: s.mode, language: s.language.clone() },
      prompt,
    }
  }

  pub fn finish_generation(&mut self, token: u64, reply: Result<String, GatewayError>) -> GenerationOutcome {
    if self.is_stale(token) {
      debug!(target: "session", id = %self.id, token, current = self.session.token, "Dropping stale generation result");
      return GenerationOutcome::Stale;
    }

    match reply.and_then(|text| parse_content(self.session.mode, &text)) {
      Ok(content) => {
        let timer_run = self.install(content);
        self.session.phase = Phase::Challenge;
        info!(target: "session", id = %self.id, token, retries = self.session.retry_count, "Exercise ready");
        GenerationOutcome::Ready { timer_run }
      }
      Err(e) if e.is_retryable() && self.session.retry_count < self.config.session.max_generation_retries => {
        self.session.retry_count += 1;
        warn!(target: "session", id = %self.id, token, retry = self.session.retry_count, error = %e, "Malformed exercise; regenerating");
        GenerationOutcome::Retry(self.generation_request())
      }
      Err(e) => {
        let message = if e.is_retryable() { GENERATION_FAILED_MSG.to_string() } else { e.to_string() };
        warn!(target: "session", id = %self.id, token, retries = self.session.retry_count, error = %e, "Generation failed; back to setup");
        self.session.phase = Phase::Setup;
        self.notice = Some(message.clone());
        GenerationOutcome::Failed { message }
      }
    }
  }

  fn install(&mut self, content: Content) -> Option<u64> {
    let mut timer_run = None;
    match &content {
      Content::Problem(p) => {
        // Stopwatch waits for the first real edit.
        self.code = p.starter_code.clone();
      }
      Content::Quiz(questions) => {
        self.answers = Some(UserAnswers::for_quiz(self.session.mode, questions));
        self.question_index = 0;
        let budget_secs = self.config.settings_for(self.session.difficulty).time_budget_secs;
        timer_run = self.timer.start(TimerKind::Countdown { budget_secs });
      }
    }
    self.content = Some(content);
    timer_run
  }

  // ------------------------------------------------------------------
  // Challenge view events
  // ------------------------------------------------------------------

  /// Editor content changed. Starts the stopwatch on the first non-blank edit.
  pub fn on_edit(&mut self, content: &str) -> Result<Option<u64>, SessionError> {
    self.reject_if_violated()?;
    self.require_phase(Phase::Challenge, "edit code")?;
    self.require_mode(&[Mode::Challenge], "edit code")?;
    self.code = content.to_string();
    if !self.timer.is_running() && !content.trim().is_empty() {
      let run = self.timer.start(TimerKind::Stopwatch);
      if run.is_some() {
        debug!(target: "session", id = %self.id, "Timer started on first edit");
      }
      return Ok(run);
    }
    Ok(None)
  }

  pub fn on_paste(&mut self, text: &str) -> Result<PasteOutcome, SessionError> {
    self.reject_if_violated()?;
    if self.session.phase != Phase::Challenge {
      return Ok(PasteOutcome::Ignored);
    }
    let verdict = self.monitor.inspect(text, self.timer.is_running(), self.timer.elapsed_secs());
    if !verdict.is_violation() {
      return Ok(PasteOutcome::Accepted);
    }
    self.session.violated = true;
    self.timer.stop();
    self.notice = Some(VIOLATION_MSG.to_string());
    warn!(
      target: "session",
      id = %self.id,
      violations = ?verdict.violations,
      paste_len = text.chars().count(),
      paste_count = self.monitor.paste_count(),
      elapsed = self.timer.elapsed_secs(),
      "Anti-cheat violation"
    );
    Ok(PasteOutcome::Violation(verdict.violations))
  }

  /// One timer second. `Expired` means the caller must auto-submit.
  pub fn tick(&mut self, run: u64) -> TickOutcome {
    match self.timer.tick(run) {
      TickOutcome::Expired if self.session.phase == Phase::Challenge && !self.session.violated => {
        info!(target: "session", id = %self.id, "Countdown expired");
        TickOutcome::Expired
      }
      TickOutcome::Expired => TickOutcome::Inactive,
      other => other,
    }
  }

  pub fn select_option(&mut self, question: usize, option: usize) -> Result<(), SessionError> {
    self.reject_if_violated()?;
    self.require_phase(Phase::Challenge, "answer")?;
    let option_count = match self.quiz().and_then(|q| q.get(question)) {
      Some(Question::MultipleChoice { options, .. }) => options.len(),
      Some(_) => return Err(SessionError::InvalidAnswer("question does not take an option".into())),
      None => return Err(SessionError::InvalidAnswer(format!("no question {question}"))),
    };
    if option >= option_count {
      return Err(SessionError::InvalidAnswer(format!("option {option} out of range")));
    }
    match &mut self.answers {
      Some(UserAnswers::Choices(v)) if question < v.len() => {
        v[question] = Some(option);
        Ok(())
      }
      _ => Err(SessionError::InvalidAnswer("answer sheet does not match the quiz".into())),
    }
  }

  pub fn fill_blank(&mut self, question: usize, blank: usize, text: &str) -> Result<(), SessionError> {
    self.reject_if_violated()?;
    self.require_phase(Phase::Challenge, "answer")?;
    match self.quiz().and_then(|q| q.get(question)) {
      Some(Question::FillBlank { .. }) => {}
      Some(_) => return Err(SessionError::InvalidAnswer("question has no blanks".into())),
      None => return Err(SessionError::InvalidAnswer(format!("no question {question}"))),
    }
    let slot = match &mut self.answers {
      Some(UserAnswers::Blanks(v)) => v.get_mut(question).and_then(|slots| slots.get_mut(blank)),
      _ => None,
    };
    let Some(slot) = slot else {
      return Err(SessionError::InvalidAnswer(format!("no blank {blank} in question {question}")));
    };
    let trimmed = text.trim();
    *slot = if trimmed.is_empty() { None } else { Some(trimmed.to_string()) };
    Ok(())
  }

  pub fn next_question(&mut self) -> Result<usize, SessionError> {
    self.reject_if_violated()?;
    self.require_phase(Phase::Challenge, "navigate")?;
    let len = self.quiz().map(<[Question]>::len).unwrap_or(0);
    if self.question_index + 1 < len {
      self.question_index += 1;
    }
    Ok(self.question_index)
  }

  pub fn prev_question(&mut self) -> Result<usize, SessionError> {
    self.reject_if_violated()?;
    self.require_phase(Phase::Challenge, "navigate")?;
    self.question_index = self.question_index.saturating_sub(1);
    Ok(self.question_index)
  }

  fn quiz(&self) -> Option<&[Question]> {
    match &self.content {
      Some(Content::Quiz(q)) => Some(q),
      _ => None,
    }
  }

  // ------------------------------------------------------------------
  // Grading
  // ------------------------------------------------------------------

  /// Challenge → Loading. Returns the grading request to send.
  pub fn begin_submit(&mut self) -> Result<PendingRequest, SessionError> {
    self.reject_if_violated()?;
    self.require_phase(Phase::Challenge, "submit")?;

    self.resume_timer = self.timer.is_running();
    self.timer.stop();
    self.time_taken = format_time(self.timer.used_secs());

    let s = &self.session;
    let prompt = match &self.content {
      Some(Content::Problem(problem)) => {
        prompts::challenge_grading_prompt(&self.config.prompts, &s.language, problem, &self.code)
      }
      Some(Content::Quiz(quiz)) => {
        let empty = UserAnswers::for_quiz(s.mode, quiz);
        let answers = self.answers.as_ref().unwrap_or(&empty);
        prompts::quiz_grading_prompt(&self.config.prompts, &s.language, s.difficulty, quiz, answers)
      }
      None => return Err(SessionError::InvalidTransition { action: "submit", phase: s.phase }),
    };

    self.session.token += 1;
    self.session.phase = Phase::Loading;
    self.notice = None;
    info!(
      target: "session",
      id = %self.id,
      token = self.session.token,
      time_taken = %self.time_taken,
      answered = ?self.answers.as_ref().map(UserAnswers::answered_count),
      "Submitting for evaluation"
    );
    Ok(PendingRequest { token: self.session.token, kind: RequestKind::Grade { mode: self.session.mode }, prompt })
  }

  /// Submission forced by countdown expiry. Same as `begin_submit`, but the
  /// user is told why.
  pub fn begin_auto_submit(&mut self) -> Result<PendingRequest, SessionError> {
    let req = self.begin_submit()?;
    self.notice = Some(TIME_UP_MSG.to_string());
    Ok(req)
  }

  pub fn finish_grading(&mut self, token: u64, reply: Result<String, GatewayError>) -> GradingOutcome {
    if self.is_stale(token) {
      debug!(target: "session", id = %self.id, token, current = self.session.token, "Dropping stale grading result");
      return GradingOutcome::Stale;
    }

    match reply.and_then(|text| parse_evaluation(&text, &self.time_taken)) {
      Ok(evaluation) => {
        info!(target: "session", id = %self.id, token, score = evaluation.score, status = ?evaluation.status, "Evaluation received");
        self.evaluation = Some(evaluation);
        self.session.phase = Phase::Results;
        GradingOutcome::Graded
      }
      Err(e) => {
        let message = if e.is_retryable() { GRADING_FAILED_MSG.to_string() } else { e.to_string() };
        warn!(target: "session", id = %self.id, token, error = %e, "Evaluation failed; back to challenge");
        self.session.phase = Phase::Challenge;
        self.notice = Some(message.clone());
        let timer_run = if self.resume_timer { self.timer.resume() } else { None };
        GradingOutcome::Failed { message, timer_run }
      }
    }
  }

  // ------------------------------------------------------------------
  // Helpers
  // ------------------------------------------------------------------

  fn is_stale(&self, token: u64) -> bool {
    token != self.session.token || self.session.phase != Phase::Loading
  }

  fn reject_if_violated(&self) -> Result<(), SessionError> {
    if self.session.violated {
      return Err(SessionError::Violated);
    }
    Ok(())
  }

  fn require_phase(&self, phase: Phase, action: &'static str) -> Result<(), SessionError> {
    if self.session.phase != phase {
      return Err(SessionError::InvalidTransition { action, phase: self.session.phase });
    }
    Ok(())
  }

  fn require_mode(&self, modes: &[Mode], action: &'static str) -> Result<(), SessionError> {
    if !modes.contains(&self.session.mode) {
      return Err(SessionError::InvalidTransition { action, phase: self.session.phase });
    }
    Ok(())
  }

  /// Snapshot for the UI. Never exposes expected answers.
  pub fn view(&self) -> SessionView {
    let quiz = self.quiz().map(|questions| QuizView {
      index: self.question_index,
      total: questions.len(),
      show_submit: self.question_index + 1 >= questions.len(),
      questions: questions.iter().map(QuestionView::from).collect(),
      answers: self.answers.clone(),
    });
    let problem = match &self.content {
      Some(Content::Problem(p)) => Some(p.clone()),
      _ => None,
    };
    SessionView {
      id: self.id.clone(),
      phase: self.session.phase,
      mode: self.session.mode,
      language: self.session.language.clone(),
      difficulty: self.session.difficulty,
      settings: self.config.settings_for(self.session.difficulty),
      violated: self.session.violated,
      paste_count: self.monitor.paste_count(),
      retry_count: self.session.retry_count,
      timer: self.timer.snapshot(),
      problem,
      code: (!self.session.mode.is_quiz() && self.content.is_some()).then(|| self.code.clone()),
      quiz,
      evaluation: self.evaluation.clone(),
      notice: self.notice.clone(),
    }
  }
}

// ----------------------------------------------------------------------
// Reply parsing
// ----------------------------------------------------------------------

#[derive(Deserialize)]
struct QuizWire {
  questions: Vec<ChoiceWire>,
}

#[derive(Deserialize)]
struct ChoiceWire {
  question: String,
  options: Vec<String>,
  #[serde(alias = "correctIndex", alias = "correct_index")]
  answer: usize,
}

#[derive(Deserialize)]
struct SnippetsWire {
  snippets: Vec<SnippetWire>,
}

#[derive(Deserialize)]
struct SnippetWire {
  #[serde(default)]
  title: String,
  code: String,
  answers: Vec<String>,
}

fn schema_error(msg: impl Into<String>) -> GatewayError {
  GatewayError::Parse(msg.into())
}

/// Parse and validate generated content for `mode`. Schema violations are
/// parse failures, so they are retried like malformed JSON.
pub fn parse_content(mode: Mode, text: &str) -> Result<Content, GatewayError> {
  match mode {
    Mode::Challenge => {
      let p: Problem = parse_json(text)?;
      if p.title.trim().is_empty() || p.description.trim().is_empty() {
        return Err(schema_error("problem is missing a title or description"));
      }
      Ok(Content::Problem(p))
    }
    Mode::MultipleChoice => {
      let wire: QuizWire = parse_json(text)?;
      if wire.questions.is_empty() {
        return Err(schema_error("quiz has no questions"));
      }
      let mut out = Vec::with_capacity(wire.questions.len());
      for (i, q) in wire.questions.into_iter().enumerate() {
        if q.options.len() != 4 || q.answer > 3 {
          return Err(schema_error(format!("question {i} needs 4 options and an answer index in 0..=3")));
        }
        out.push(Question::MultipleChoice { question: q.question, options: q.options, correct_index: q.answer });
      }
      Ok(Content::Quiz(out))
    }
    Mode::FillBlanks => {
      let wire: SnippetsWire = parse_json(text)?;
      if wire.snippets.is_empty() {
        return Err(schema_error("exercise has no snippets"));
      }
      let mut out = Vec::with_capacity(wire.snippets.len());
      for (i, s) in wire.snippets.into_iter().enumerate() {
        let blanks = count_blanks(&s.code);
        if blanks == 0 || blanks != s.answers.len() {
          return Err(schema_error(format!(
            "snippet {i} has {blanks} blanks but {} answers",
            s.answers.len()
          )));
        }
        out.push(Question::FillBlank { title: s.title, code_template: s.code, expected_answers: s.answers });
      }
      Ok(Content::Quiz(out))
    }
  }
}

#[derive(Deserialize)]
struct EvaluationWire {
  score: serde_json::Value,
  #[serde(default)]
  rating: String,
  #[serde(default)]
  feedback: String,
  #[serde(default)]
  suggestions: Vec<String>,
}

pub fn parse_evaluation(text: &str, time_taken: &str) -> Result<Evaluation, GatewayError> {
  let wire: EvaluationWire = parse_json(text)?;
  let raw = match &wire.score {
    serde_json::Value::Number(n) => n.as_f64(),
    serde_json::Value::String(s) => s.trim().trim_end_matches("/100").trim().parse::<f64>().ok(),
    _ => None,
  }
  .ok_or_else(|| schema_error("score is not a number"))?;
  if wire.feedback.trim().is_empty() {
    return Err(schema_error("evaluation has no feedback"));
  }
  let score = raw.round().clamp(0.0, 100.0) as u8;
  let rating = if wire.rating.trim().is_empty() { rating_for_score(score) } else { wire.rating };
  Ok(Evaluation {
    score,
    rating,
    feedback: wire.feedback,
    suggestions: wire.suggestions,
    status: CompletionStatus::from_score(score),
    time_taken: time_taken.to_string(),
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::parse_app_config;

  const PROBLEM: &str = r#"Here you go: {"title":"Sum","description":"<p>Add numbers</p>","starterCode":"function sum(a) {\n}"}"#;
  const GRADE: &str = r#"{"score":80,"rating":"★★★★☆","feedback":"<p>Solid</p>","suggestions":["<b>Tip:</b> test more"]}"#;

  fn controller() -> SessionController {
    SessionController::new("s1", Arc::new(AppConfig::default()))
  }

  fn mc_quiz(n: usize) -> String {
    let qs: Vec<serde_json::Value> = (0..n)
      .map(|i| serde_json::json!({ "question": format!("Q{i}"), "options": ["a", "b", "c", "d"], "answer": i % 4 }))
      .collect();
    serde_json::json!({ "questions": qs }).to_string()
  }

  fn in_challenge(mode: Mode, reply: &str) -> SessionController {
    let mut c = controller();
    c.configure(mode, "python", Difficulty::Easy).unwrap();
    let req = c.begin_start().unwrap();
    let out = c.finish_generation(req.token, Ok(reply.to_string()));
    assert!(matches!(out, GenerationOutcome::Ready { .. }), "{out:?}");
    c
  }

  #[test]
  fn start_moves_through_loading_into_challenge() {
    let mut c = controller();
    let req = c.begin_start().unwrap();
    assert_eq!(c.session().phase, Phase::Loading);
    assert!(matches!(req.kind, RequestKind::Generate { mode: Mode::Challenge, .. }));
    assert_eq!(c.finish_generation(req.token, Ok(PROBLEM.into())), GenerationOutcome::Ready { timer_run: None });
    assert_eq!(c.session().phase, Phase::Challenge);
    assert_eq!(c.view().code.as_deref(), Some("function sum(a) {\n}"));
    assert!(!c.timer().is_running());
  }

  #[test]
  fn start_is_rejected_while_loading() {
    let mut c = controller();
    c.begin_start().unwrap();
    assert!(matches!(c.begin_start(), Err(SessionError::InvalidTransition { .. })));
  }

  #[test]
  fn timer_waits_for_first_non_blank_edit() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    assert_eq!(c.on_edit("   \n\t").unwrap(), None);
    assert!(!c.timer().is_running());
    assert!(c.on_edit("x").unwrap().is_some());
    assert!(c.timer().is_running());
    assert_eq!(c.on_edit("xy").unwrap(), None);
  }

  #[test]
  fn generation_retries_three_times_then_returns_to_setup() {
    let mut c = controller();
    let mut req = c.begin_start().unwrap();
    let mut attempts = 1;
    loop {
      match c.finish_generation(req.token, Ok("not json".into())) {
        GenerationOutcome::Retry(next) => {
          attempts += 1;
          req = next;
        }
        GenerationOutcome::Failed { message } => {
          assert_eq!(message, GENERATION_FAILED_MSG);
          break;
        }
        other => panic!("unexpected {other:?}"),
      }
    }
    assert_eq!(attempts, 4);
    assert_eq!(c.session().retry_count, 3);
    assert_eq!(c.session().phase, Phase::Setup);
    assert_eq!(c.view().notice.as_deref(), Some(GENERATION_FAILED_MSG));
  }

  #[test]
  fn transport_failure_is_not_retried() {
    let mut c = controller();
    let req = c.begin_start().unwrap();
    let out = c.finish_generation(req.token, Err(GatewayError::Upstream("quota exceeded".into())));
    assert_eq!(out, GenerationOutcome::Failed { message: "quota exceeded".into() });
    assert_eq!(c.session().phase, Phase::Setup);
  }

  #[test]
  fn restart_makes_in_flight_results_stale() {
    let mut c = controller();
    let req = c.begin_start().unwrap();
    c.restart();
    assert_eq!(c.finish_generation(req.token, Ok(PROBLEM.into())), GenerationOutcome::Stale);
    assert_eq!(c.session().phase, Phase::Setup);

    // A newer start is not confused by the old token either.
    let newer = c.begin_start().unwrap();
    assert_eq!(c.finish_generation(req.token, Ok(PROBLEM.into())), GenerationOutcome::Stale);
    assert!(matches!(c.finish_generation(newer.token, Ok(PROBLEM.into())), GenerationOutcome::Ready { .. }));
  }

  #[test]
  fn restart_drops_late_grading_result() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    c.on_edit("return a;").unwrap();
    let req = c.begin_submit().unwrap();
    c.restart();
    assert_eq!(c.finish_grading(req.token, Ok(GRADE.into())), GradingOutcome::Stale);
    assert_eq!(c.session().phase, Phase::Setup);
    assert!(c.evaluation().is_none());
    assert!(c.view().evaluation.is_none());
  }

  #[test]
  fn grading_result_for_an_older_submit_is_dropped() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    let first = c.begin_submit().unwrap();
    c.finish_grading(first.token, Err(GatewayError::Transport("HTTP 502".into())));
    let second = c.begin_submit().unwrap();
    assert_eq!(c.finish_grading(first.token, Ok(GRADE.into())), GradingOutcome::Stale);
    assert_eq!(c.session().phase, Phase::Loading);
    assert_eq!(c.finish_grading(second.token, Ok(GRADE.into())), GradingOutcome::Graded);
  }

  #[tokio::test]
  async fn published_views_reach_subscribers() {
    let mut c = controller();
    let mut rx = c.subscribe();
    let req = c.begin_start().unwrap();
    c.finish_generation(req.token, Ok(PROBLEM.into()));
    let sent = c.publish();
    let got = rx.recv().await.unwrap();
    assert_eq!(got.phase, Phase::Challenge);
    assert_eq!(got.id, sent.id);
  }

  #[test]
  fn oversized_paste_invalidates_and_blocks_submit() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    c.on_edit("a").unwrap();
    let out = c.on_paste(&"y".repeat(51)).unwrap();
    assert_eq!(out, PasteOutcome::Violation(vec![Violation::OversizedPaste, Violation::EarlyPaste]));
    assert!(c.session().violated);
    assert!(!c.timer().is_running());
    assert_eq!(c.begin_submit(), Err(SessionError::Violated));
    assert_eq!(c.on_edit("b"), Err(SessionError::Violated));
    assert_eq!(c.reset_challenge(true), Err(SessionError::Violated));

    c.restart();
    assert!(!c.session().violated);
    assert_eq!(c.view().paste_count, 0);
  }

  #[test]
  fn small_late_paste_is_fine() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    let run = c.on_edit("a").unwrap().unwrap();
    for _ in 0..15 {
      c.tick(run);
    }
    assert_eq!(c.on_paste("let x = 1;").unwrap(), PasteOutcome::Accepted);
    assert!(!c.session().violated);
  }

  #[test]
  fn fifth_paste_invalidates() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    let run = c.on_edit("a").unwrap().unwrap();
    for _ in 0..20 {
      c.tick(run);
    }
    for _ in 0..4 {
      assert_eq!(c.on_paste("x").unwrap(), PasteOutcome::Accepted);
    }
    assert_eq!(c.on_paste("x").unwrap(), PasteOutcome::Violation(vec![Violation::TooManyPastes]));
  }

  #[test]
  fn paste_count_survives_until_next_start() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    c.on_paste("x").unwrap();
    c.on_paste("x").unwrap();
    let req = c.reset_challenge(true).unwrap().expect("confirmed reset");
    assert_eq!(c.view().paste_count, 0);
    c.finish_generation(req.token, Ok(PROBLEM.into()));
    assert_eq!(c.session().phase, Phase::Challenge);
  }

  #[test]
  fn unconfirmed_reset_keeps_the_challenge() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    c.on_edit("draft").unwrap();
    assert_eq!(c.reset_challenge(false).unwrap(), None);
    assert_eq!(c.session().phase, Phase::Challenge);
    assert_eq!(c.view().code.as_deref(), Some("draft"));
  }

  #[test]
  fn submit_grades_into_results() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    let run = c.on_edit("return a").unwrap().unwrap();
    for _ in 0..125 {
      c.tick(run);
    }
    let req = c.begin_submit().unwrap();
    assert!(req.prompt.contains("return a"));
    assert!(req.prompt.contains("<p>Add numbers</p>"));
    assert!(!c.timer().is_running());
    assert_eq!(c.finish_grading(req.token, Ok(GRADE.into())), GradingOutcome::Graded);
    let eval = c.evaluation().unwrap();
    assert_eq!(eval.score, 80);
    assert_eq!(eval.time_taken, "02:05");
    assert_eq!(eval.status, CompletionStatus::Passed);
    assert_eq!(c.session().phase, Phase::Results);
  }

  #[test]
  fn grading_failure_returns_to_challenge_with_work_intact() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    let run = c.on_edit("draft").unwrap().unwrap();
    c.tick(run);
    let req = c.begin_submit().unwrap();
    let out = c.finish_grading(req.token, Ok("nope".into()));
    let GradingOutcome::Failed { message, timer_run } = out else { panic!("expected failure") };
    assert_eq!(message, GRADING_FAILED_MSG);
    assert!(timer_run.is_some());
    assert_eq!(c.session().phase, Phase::Challenge);
    assert_eq!(c.view().code.as_deref(), Some("draft"));
    assert_eq!(c.timer().elapsed_secs(), 1);
  }

  #[test]
  fn quiz_navigation_stays_in_bounds_and_keeps_answers() {
    let mut c = in_challenge(Mode::MultipleChoice, &mc_quiz(5));
    assert_eq!(c.prev_question().unwrap(), 0);
    c.next_question().unwrap();
    c.next_question().unwrap();
    c.select_option(2, 3).unwrap();
    for _ in 0..10 {
      assert!(c.next_question().unwrap() <= 4);
    }
    assert_eq!(c.question_index(), 4);
    assert!(c.view().quiz.unwrap().show_submit);
    for _ in 0..10 {
      c.prev_question().unwrap();
    }
    assert_eq!(c.question_index(), 0);
    assert!(!c.view().quiz.unwrap().show_submit);
    assert_eq!(c.answers(), Some(&UserAnswers::Choices(vec![None, None, Some(3), None, None])));
  }

  #[test]
  fn invalid_quiz_answers_are_rejected() {
    let mut c = in_challenge(Mode::MultipleChoice, &mc_quiz(2));
    assert!(matches!(c.select_option(5, 0), Err(SessionError::InvalidAnswer(_))));
    assert!(matches!(c.select_option(0, 4), Err(SessionError::InvalidAnswer(_))));
    assert!(matches!(c.fill_blank(0, 0, "x"), Err(SessionError::InvalidAnswer(_))));
  }

  #[test]
  fn quiz_starts_countdown_and_expiry_fires_once() {
    let cfg = parse_app_config("[difficulty.Easy]\ntime_budget_secs = 300\nquestion_count = 5").unwrap();
    let mut c = SessionController::new("s2", Arc::new(cfg));
    c.configure(Mode::MultipleChoice, "rust", Difficulty::Easy).unwrap();
    let req = c.begin_start().unwrap();
    let GenerationOutcome::Ready { timer_run: Some(run) } = c.finish_generation(req.token, Ok(mc_quiz(5))) else {
      panic!("countdown should start with the quiz");
    };
    assert_eq!(c.view().timer.display, "05:00");
    let mut expiries = 0;
    for _ in 0..310 {
      if c.tick(run) == TickOutcome::Expired {
        expiries += 1;
        let grade = c.begin_auto_submit().unwrap();
        assert!(grade.prompt.contains("(no answer)"));
      }
    }
    assert_eq!(expiries, 1);
    assert_eq!(c.timer().remaining_secs(), Some(0));
    assert_eq!(c.session().phase, Phase::Loading);
    assert_eq!(c.view().notice.as_deref(), Some(TIME_UP_MSG));
  }

  #[test]
  fn fill_blanks_answers_align_with_markers() {
    let reply = r#"{"snippets":[{"title":"Loop","code":"for [BLANK] in [BLANK]:","answers":["i","range(3)"]}]}"#;
    let mut c = in_challenge(Mode::FillBlanks, reply);
    c.fill_blank(0, 1, " range(3) ").unwrap();
    assert!(c.fill_blank(0, 2, "x").is_err());
    assert_eq!(c.answers(), Some(&UserAnswers::Blanks(vec![vec![None, Some("range(3)".into())]])));
    let view = c.view();
    let questions = view.quiz.unwrap().questions;
    assert_eq!(questions.len(), 1);
    assert_eq!(view.code, None);
  }

  #[test]
  fn content_schema_violations_are_retryable() {
    let bad_options = r#"{"questions":[{"question":"q","options":["a","b"],"answer":0}]}"#;
    assert!(parse_content(Mode::MultipleChoice, bad_options).unwrap_err().is_retryable());
    let mismatched = r#"{"snippets":[{"title":"t","code":"[BLANK]","answers":["a","b"]}]}"#;
    assert!(parse_content(Mode::FillBlanks, mismatched).unwrap_err().is_retryable());
    assert!(parse_content(Mode::Challenge, r#"{"title":"","description":""}"#).is_err());
  }

  #[test]
  fn evaluation_is_clamped_and_rated() {
    let e = parse_evaluation(r#"{"score":"140","feedback":"ok"}"#, "00:10").unwrap();
    assert_eq!(e.score, 100);
    assert_eq!(e.rating, "★★★★★");
    assert!(parse_evaluation(r#"{"score":50}"#, "00:10").is_err());
    assert!(parse_evaluation(r#"{"score":null,"feedback":"x"}"#, "00:10").is_err());
  }

  #[test]
  fn configure_only_in_setup() {
    let mut c = in_challenge(Mode::Challenge, PROBLEM);
    assert!(c.configure(Mode::FillBlanks, "go", Difficulty::Hard).is_err());
    c.restart();
    c.configure(Mode::FillBlanks, " Go ", Difficulty::Hard).unwrap();
    assert_eq!(c.session().language, "go");
    assert!(matches!(c.configure(Mode::Challenge, "  ", Difficulty::Easy), Err(SessionError::InvalidConfig(_))));
  }
}
