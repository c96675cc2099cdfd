//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{Difficulty, DifficultySettings, Evaluation, Mode, Phase, Problem, Question, UserAnswers};
use crate::timer::TimerSnapshot;

/// Everything the front-end needs to render the current view.
#[derive(Clone, Debug, Serialize)]
pub struct SessionView {
    pub id: String,
    pub phase: Phase,
    pub mode: Mode,
    pub language: String,
    pub difficulty: Difficulty,
    pub settings: DifficultySettings,
    /// Shows the blocking violation overlay.
    pub violated: bool,
    pub paste_count: u32,
    pub retry_count: u32,
    pub timer: TimerSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problem: Option<Problem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quiz: Option<QuizView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    /// Pending alert text (failure, violation, time-up).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct QuizView {
    pub index: usize,
    pub total: usize,
    /// Last question: the "next" button becomes "submit".
    pub show_submit: bool,
    pub questions: Vec<QuestionView>,
    pub answers: Option<UserAnswers>,
}

/// A question as shown to the user: no expected answers.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuestionView {
    MultipleChoice { question: String, options: Vec<String> },
    FillBlank { title: String, code_template: String, blanks: usize },
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        match q {
            Question::MultipleChoice { question, options, .. } => QuestionView::MultipleChoice {
                question: question.clone(),
                options: options.clone(),
            },
            Question::FillBlank { title, code_template, .. } => QuestionView::FillBlank {
                title: title.clone(),
                code_template: code_template.clone(),
                blanks: q.slot_count(),
            },
        }
    }
}

/// Messages the client can send over WebSocket. One per controller event.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    View,
    Configure(ConfigureIn),
    Start,
    Submit,
    Restart,
    Reset {
        #[serde(default)]
        confirm: bool,
    },
    Edit {
        content: String,
    },
    Paste {
        text: String,
    },
    Answer(AnswerIn),
    Next,
    Prev,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session { session: SessionView },
    Error { message: String },
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Deserialize)]
pub struct ConfigureIn {
    pub mode: Mode,
    pub language: String,
    pub difficulty: Difficulty,
}

#[derive(Debug, Deserialize)]
pub struct ResetIn {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct EditIn {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct PasteIn {
    pub text: String,
}

/// Either a multiple-choice pick or a blank fill.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AnswerIn {
    Blank { question: usize, blank: usize, text: String },
    Choice { question: usize, option: usize },
}

#[derive(Serialize)]
pub struct SettingsOut {
    pub modes: Vec<Mode>,
    pub difficulties: Vec<DifficultyOut>,
}

#[derive(Serialize)]
pub struct DifficultyOut {
    pub level: Difficulty,
    pub guideline: String,
    #[serde(flatten)]
    pub settings: DifficultySettings,
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorObj,
}

#[derive(Serialize)]
pub struct ErrorObj {
    pub message: String,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: ErrorObj { message: message.into() } }
    }
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub transport: &'static str,
    pub relay_configured: bool,
}
