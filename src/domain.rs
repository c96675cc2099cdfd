//! Domain models: exercise modes, difficulty levels, session phases, generated
//! content (problem / quiz), the user's answers and the final evaluation.

use serde::{Deserialize, Serialize};

/// Placeholder token inside a fill-in-the-blank code template.
pub const BLANK_MARKER: &str = "[BLANK]";

/// What kind of exercise the session runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
  /// Free-form coding in the editor, graded on the submitted code.
  #[default]
  Challenge,
  #[serde(alias = "multiple-choice")]
  MultipleChoice,
  #[serde(alias = "fill-blanks")]
  FillBlanks,
}

impl Mode {
  /// Quiz modes run on a countdown and auto-submit on expiry.
  pub fn is_quiz(self) -> bool {
    !matches!(self, Mode::Challenge)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Mode::Challenge => "challenge",
      Mode::MultipleChoice => "multiple_choice",
      Mode::FillBlanks => "fill_blanks",
    }
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Difficulty {
  #[default]
  Beginner,
  Easy,
  Medium,
  Hard,
  Expert,
}

impl Difficulty {
  pub const ALL: [Difficulty; 5] = [
    Difficulty::Beginner,
    Difficulty::Easy,
    Difficulty::Medium,
    Difficulty::Hard,
    Difficulty::Expert,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Beginner => "Beginner",
      Difficulty::Easy => "Easy",
      Difficulty::Medium => "Medium",
      Difficulty::Hard => "Hard",
      Difficulty::Expert => "Expert",
    }
  }
}

/// Which view the user is looking at. Exactly one is visible at a time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  #[default]
  Setup,
  Loading,
  Challenge,
  Results,
}

/// Quantity/time settings for a difficulty level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultySettings {
  pub time_budget_secs: u32,
  pub question_count: usize,
}

/// A generated free-form coding problem.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Problem {
  pub title: String,
  /// HTML, rendered as-is by the front-end.
  pub description: String,
  #[serde(rename = "starterCode", alias = "starter_code", default)]
  pub starter_code: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Question {
  MultipleChoice {
    question: String,
    options: Vec<String>,
    correct_index: usize,
  },
  FillBlank {
    title: String,
    code_template: String,
    expected_answers: Vec<String>,
  },
}

impl Question {
  /// Number of answer slots the user fills for this question.
  pub fn slot_count(&self) -> usize {
    match self {
      Question::MultipleChoice { .. } => 1,
      Question::FillBlank { code_template, .. } => count_blanks(code_template),
    }
  }
}

pub fn count_blanks(template: &str) -> usize {
  template.matches(BLANK_MARKER).count()
}

/// The user's answers, aligned by index with the quiz.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "answers", rename_all = "snake_case")]
pub enum UserAnswers {
  Choices(Vec<Option<usize>>),
  Blanks(Vec<Vec<Option<String>>>),
}

impl UserAnswers {
  /// Empty answer sheet sized to the quiz.
  pub fn for_quiz(mode: Mode, quiz: &[Question]) -> Self {
    match mode {
      Mode::FillBlanks => UserAnswers::Blanks(quiz.iter().map(|q| vec![None; q.slot_count()]).collect()),
      _ => UserAnswers::Choices(vec![None; quiz.len()]),
    }
  }

  pub fn answered_count(&self) -> usize {
    match self {
      UserAnswers::Choices(v) => v.iter().filter(|a| a.is_some()).count(),
      UserAnswers::Blanks(v) => v.iter().filter(|slots| slots.iter().all(|s| s.is_some())).count(),
    }
  }
}

/// Generated exercise content for the current session.
#[derive(Clone, Debug, PartialEq)]
pub enum Content {
  Problem(Problem),
  Quiz(Vec<Question>),
}

/// Coarse label derived from the score, shown next to the rating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionStatus {
  Mastered,
  Passed,
  Developing,
  RetryNeeded,
}

impl CompletionStatus {
  pub fn from_score(score: u8) -> Self {
    match score {
      90..=u8::MAX => CompletionStatus::Mastered,
      70..=89 => CompletionStatus::Passed,
      40..=69 => CompletionStatus::Developing,
      _ => CompletionStatus::RetryNeeded,
    }
  }
}

/// Grading result. Produced once per session, never mutated.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Evaluation {
  pub score: u8,
  pub rating: String,
  pub feedback: String,
  pub suggestions: Vec<String>,
  pub status: CompletionStatus,
  pub time_taken: String,
}

/// Star glyphs for a score, 20 points per star.
pub fn rating_for_score(score: u8) -> String {
  let stars = match score {
    0..=20 => 1,
    21..=40 => 2,
    41..=60 => 3,
    61..=80 => 4,
    _ => 5,
  };
  let mut out = "★".repeat(stars);
  out.push_str(&"☆".repeat(5 - stars));
  out
}
