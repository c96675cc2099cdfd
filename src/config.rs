//! Loading application configuration (prompts, anti-cheat rules, difficulty
//! table, session limits) from TOML.
//!
//! Every table is optional; anything missing falls back to the defaults below.
//! See `AppConfig` for the expected schema.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{error, info};

use crate::anticheat::AntiCheatRules;
use crate::domain::{Difficulty, DifficultySettings};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub prompts: Prompts,
  #[serde(default)]
  pub anticheat: AntiCheatRules,
  #[serde(default)]
  pub session: SessionRules,
  /// Per-level overrides, keyed by level name (`[difficulty.Easy]`).
  #[serde(default)]
  pub difficulty: HashMap<Difficulty, DifficultySettings>,
}

impl AppConfig {
  /// Settings for a level, falling back to the built-in table.
  pub fn settings_for(&self, difficulty: Difficulty) -> DifficultySettings {
    self
      .difficulty
      .get(&difficulty)
      .copied()
      .unwrap_or_else(|| default_settings(difficulty))
  }
}

pub fn default_settings(difficulty: Difficulty) -> DifficultySettings {
  let (time_budget_secs, question_count) = match difficulty {
    Difficulty::Beginner => (480, 3),
    Difficulty::Easy => (600, 5),
    Difficulty::Medium => (900, 8),
    Difficulty::Hard => (1200, 10),
    Difficulty::Expert => (1500, 12),
  };
  DifficultySettings { time_budget_secs, question_count }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionRules {
  /// Automatic regeneration attempts after a malformed model response.
  pub max_generation_retries: u32,
  /// Sessions untouched for this long are dropped from the registry.
  pub idle_timeout_secs: u64,
  /// How often the registry is swept for idle sessions.
  pub sweep_interval_secs: u64,
}

impl Default for SessionRules {
  fn default() -> Self {
    Self { max_generation_retries: 3, idle_timeout_secs: 3600, sweep_interval_secs: 60 }
  }
}

/// Prompt templates used by the prompt builder. Defaults target a coding
/// instructor persona; override them in TOML to tune tone/structure.
///
/// Placeholders: `{language}`, `{difficulty}`, `{guideline}`, `{count}`,
/// `{marker}`, `{title}`, `{problem}`, `{code}`, `{quiz}`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub guideline_beginner: String,
  pub guideline_easy: String,
  pub guideline_medium: String,
  pub guideline_hard: String,
  pub guideline_expert: String,

  pub challenge_template: String,
  pub multiple_choice_template: String,
  pub fill_blanks_template: String,

  pub grade_challenge_template: String,
  pub grade_quiz_template: String,
}

impl Prompts {
  pub fn guideline(&self, difficulty: Difficulty) -> &str {
    match difficulty {
      Difficulty::Beginner => &self.guideline_beginner,
      Difficulty::Easy => &self.guideline_easy,
      Difficulty::Medium => &self.guideline_medium,
      Difficulty::Hard => &self.guideline_hard,
      Difficulty::Expert => &self.guideline_expert,
    }
  }
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      guideline_beginner: "Basic syntax, variables, simple arithmetic, and printing output. No complex logic or standard libraries.".into(),
      guideline_easy: "Basic loops, arrays, simple string manipulation, and standard mathematical functions.".into(),
      guideline_medium: "Multidimensional arrays, nested loops, basic data structures (sets, maps), and basic sorting/searching.".into(),
      guideline_hard: "Complex algorithms, custom classes/interfaces, memory management concepts, and performance optimization.".into(),
      guideline_expert: "Advanced system design, design patterns, complex concurrency/asynchrony, deep language-specific optimizations, and intricate algorithmic complexity.".into(),

      challenge_template: "Act as a senior coding instructor. Generate a coding challenge for a {difficulty} level programmer in {language}.\n\n\
Strict Guidelines for {difficulty} difficulty:\n{guideline}\n\n\
Ensure the challenge is strictly appropriate for this level. Not too easy, not too complex.\n\n\
Return the response ONLY as a single valid JSON object with these exact keys:\n\
\"title\": \"A short descriptive title\",\n\
\"description\": \"Clear explanation of the task, requirements, constraints, and 2-3 examples in HTML format.\",\n\
\"starterCode\": \"Initial boilerplate code for the user to start with.\"".into(),

      multiple_choice_template: "Act as a senior coding instructor. Write a multiple-choice quiz about {language} for a {difficulty} level programmer.\n\n\
Strict Guidelines for {difficulty} difficulty:\n{guideline}\n\n\
Write exactly {count} questions. Each question has exactly 4 answer options and exactly one correct option.\n\n\
Return the response ONLY as a single valid JSON object of this shape:\n\
{\"questions\": [{\"question\": \"Question text (HTML allowed)\", \"options\": [\"A\", \"B\", \"C\", \"D\"], \"answer\": 0}]}\n\
where \"answer\" is the zero-based index of the correct option.".into(),

      fill_blanks_template: "Act as a senior coding instructor. Write a fill-in-the-blank exercise about {language} for a {difficulty} level programmer.\n\n\
Strict Guidelines for {difficulty} difficulty:\n{guideline}\n\n\
Write exactly {count} short code snippets. In each snippet replace one to three key tokens with the marker {marker}.\n\n\
Return the response ONLY as a single valid JSON object of this shape:\n\
{\"snippets\": [{\"title\": \"What the snippet does\", \"code\": \"code containing {marker} markers\", \"answers\": [\"token for the first marker\", \"...\"]}]}\n\
The \"answers\" list must have exactly one entry per marker, in order.".into(),

      grade_challenge_template: "Act as a strict technical interviewer. Evaluate the following {language} solution for the problem: \"{title}\".\n\n\
Rigorous Evaluation Criteria:\n\
1. Correctness: Does it solve all aspects of the problem? (40%)\n\
2. Efficiency: Is the time and space complexity optimal? (30%)\n\
3. Readability & Style: Is the code clean and well-structured? (20%)\n\
4. Edge Cases: Does it handle empty input, nulls, or boundary values? (10%)\n\n\
Problem Context: {problem}\n\
User Solution:\n{code}\n\n\
Return the evaluation ONLY as a single valid JSON object with these exact keys:\n\
\"score\": (integer 0-100),\n\
\"rating\": \"Stars representation based on score (0-20=★☆☆☆☆, 21-40=★★☆☆☆, 41-60=★★★☆☆, 61-80=★★★★☆, 81-100=★★★★★)\",\n\
\"feedback\": \"Concise technical summary of performance in HTML format.\",\n\
\"suggestions\": [\"List of 3 specific technical optimization tips or corrections in HTML format (e.g. <b>Tip:</b> ...)\"]".into(),

      grade_quiz_template: "Act as a strict {language} instructor. Grade the following {difficulty} level quiz.\n\
For every question you are given the expected answer and the user's answer (\"(no answer)\" when skipped).\n\
Score is the percentage of fully correct answers. Accept answers for blanks that are semantically equivalent.\n\n\
{quiz}\n\n\
Return the evaluation ONLY as a single valid JSON object with these exact keys:\n\
\"score\": (integer 0-100),\n\
\"rating\": \"Stars representation based on score (0-20=★☆☆☆☆, 21-40=★★☆☆☆, 41-60=★★★☆☆, 61-80=★★★★☆, 81-100=★★★★★)\",\n\
\"feedback\": \"Concise summary of what the user knows and what they missed, in HTML format.\",\n\
\"suggestions\": [\"List of 3 specific topics to review, in HTML format\"]".into(),
    }
  }
}

/// Attempt to load `AppConfig` from PRACTICE_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_app_config_from_env() -> Option<AppConfig> {
  let path = std::env::var("PRACTICE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_app_config(&s) {
      Ok(cfg) => {
        info!(target: "codekata_backend", %path, "Loaded app config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "codekata_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "codekata_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

pub fn parse_app_config(s: &str) -> Result<AppConfig, toml::de::Error> {
  toml::from_str::<AppConfig>(s)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_config_uses_defaults() {
    let cfg = parse_app_config("").expect("empty toml");
    assert_eq!(cfg.session.max_generation_retries, 3);
    assert_eq!(cfg.session.idle_timeout_secs, 3600);
    assert_eq!(cfg.anticheat.max_paste_chars, 50);
    assert_eq!(
      cfg.settings_for(Difficulty::Easy),
      DifficultySettings { time_budget_secs: 600, question_count: 5 }
    );
  }

  #[test]
  fn partial_overrides_keep_other_defaults() {
    let cfg = parse_app_config(
      r#"
        [anticheat]
        max_pastes = 3

        [difficulty.Hard]
        time_budget_secs = 60
        question_count = 2

        [prompts]
        guideline_easy = "Loops only."
      "#,
    )
    .expect("valid toml");
    assert_eq!(cfg.anticheat.max_pastes, 3);
    assert_eq!(cfg.anticheat.grace_period_secs, 15);
    assert_eq!(cfg.settings_for(Difficulty::Hard).time_budget_secs, 60);
    assert_eq!(cfg.settings_for(Difficulty::Medium).question_count, 8);
    assert_eq!(cfg.prompts.guideline(Difficulty::Easy), "Loops only.");
    assert!(cfg.prompts.guideline(Difficulty::Expert).contains("system design"));
  }
}
