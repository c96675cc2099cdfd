//! Prompt builder: turns (mode, language, difficulty) into the instruction
//! text sent to the model, and a finished session into a grading request.
//!
//! Everything here is pure string assembly over `config::Prompts`. The model's
//! reply is validated elsewhere (`session::parse_content`).

use crate::config::Prompts;
use crate::domain::{Difficulty, DifficultySettings, Mode, Problem, Question, UserAnswers, BLANK_MARKER};
use crate::util::fill_template;

pub fn generation_prompt(
  prompts: &Prompts,
  mode: Mode,
  language: &str,
  difficulty: Difficulty,
  settings: DifficultySettings,
) -> String {
  let template = match mode {
    Mode::Challenge => &prompts.challenge_template,
    Mode::MultipleChoice => &prompts.multiple_choice_template,
    Mode::FillBlanks => &prompts.fill_blanks_template,
  };
  let count = settings.question_count.to_string();
  fill_template(
    template,
    &[
      ("language", language),
      ("difficulty", difficulty.as_str()),
      ("guideline", prompts.guideline(difficulty)),
      ("count", &count),
      ("marker", BLANK_MARKER),
    ],
  )
}

pub fn challenge_grading_prompt(prompts: &Prompts, language: &str, problem: &Problem, code: &str) -> String {
  fill_template(
    &prompts.grade_challenge_template,
    &[
      ("language", language),
      ("title", &problem.title),
      ("problem", &problem.description),
      ("code", code),
    ],
  )
}

pub fn quiz_grading_prompt(
  prompts: &Prompts,
  language: &str,
  difficulty: Difficulty,
  quiz: &[Question],
  answers: &UserAnswers,
) -> String {
  let transcript = quiz_transcript(quiz, answers);
  fill_template(
    &prompts.grade_quiz_template,
    &[("language", language), ("difficulty", difficulty.as_str()), ("quiz", &transcript)],
  )
}

const NO_ANSWER: &str = "(no answer)";

/// Plain-text rendering of every question with the expected and given answers.
fn quiz_transcript(quiz: &[Question], answers: &UserAnswers) -> String {
  let mut out = String::new();
  for (i, q) in quiz.iter().enumerate() {
    let n = i + 1;
    match q {
      Question::MultipleChoice { question, options, correct_index } => {
        out.push_str(&format!("Question {n}: {question}\n"));
        for (j, opt) in options.iter().enumerate() {
          out.push_str(&format!("  {}. {}\n", option_letter(j), opt));
        }
        let given = match answers {
          UserAnswers::Choices(v) => v.get(i).copied().flatten(),
          UserAnswers::Blanks(_) => None,
        };
        out.push_str(&format!("  Expected: {}\n", option_letter(*correct_index)));
        out.push_str(&format!(
          "  User answer: {}\n\n",
          given.map(option_letter).unwrap_or_else(|| NO_ANSWER.to_string())
        ));
      }
      Question::FillBlank { title, code_template, expected_answers } => {
        out.push_str(&format!("Snippet {n}: {title}\n{code_template}\n"));
        let given: &[Option<String>] = match answers {
          UserAnswers::Blanks(v) => v.get(i).map(Vec::as_slice).unwrap_or(&[]),
          UserAnswers::Choices(_) => &[],
        };
        for (j, expected) in expected_answers.iter().enumerate() {
          let user = given.get(j).cloned().flatten().unwrap_or_else(|| NO_ANSWER.to_string());
          out.push_str(&format!("  Blank {}: expected `{}`, user answered `{}`\n", j + 1, expected, user));
        }
        out.push('\n');
      }
    }
  }
  out.trim_end().to_string()
}

fn option_letter(index: usize) -> String {
  match index {
    0..=25 => ((b'A' + index as u8) as char).to_string(),
    _ => index.to_string(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::default_settings;

  #[test]
  fn challenge_prompt_carries_language_level_and_schema() {
    let p = Prompts::default();
    let text = generation_prompt(&p, Mode::Challenge, "python", Difficulty::Medium, default_settings(Difficulty::Medium));
    assert!(text.contains("Medium level programmer in python"));
    assert!(text.contains(p.guideline(Difficulty::Medium)));
    assert!(text.contains("\"starterCode\""));
    assert!(!text.contains("{guideline}"));
  }

  #[test]
  fn quiz_prompts_state_the_question_count() {
    let p = Prompts::default();
    let easy = default_settings(Difficulty::Easy);
    let mc = generation_prompt(&p, Mode::MultipleChoice, "rust", Difficulty::Easy, easy);
    assert!(mc.contains("exactly 5 questions"));
    assert!(mc.contains("exactly 4 answer options"));

    let fb = generation_prompt(&p, Mode::FillBlanks, "rust", Difficulty::Easy, easy);
    assert!(fb.contains("exactly 5 short code snippets"));
    assert!(fb.contains(BLANK_MARKER));
  }

  #[test]
  fn quiz_transcript_marks_skipped_answers() {
    let quiz = vec![
      Question::MultipleChoice {
        question: "2 + 2?".into(),
        options: vec!["3".into(), "4".into(), "5".into(), "22".into()],
        correct_index: 1,
      },
      Question::MultipleChoice {
        question: "Keyword for constants?".into(),
        options: vec!["let".into(), "var".into(), "const".into(), "static".into()],
        correct_index: 2,
      },
    ];
    let answers = UserAnswers::Choices(vec![Some(1), None]);
    let text = quiz_grading_prompt(&Prompts::default(), "javascript", Difficulty::Easy, &quiz, &answers);
    assert!(text.contains("Question 1: 2 + 2?"));
    assert!(text.contains("  B. 4"));
    assert!(text.contains("User answer: B"));
    assert!(text.contains("User answer: (no answer)"));
  }

  #[test]
  fn blank_transcript_lists_each_marker() {
    let quiz = vec![Question::FillBlank {
      title: "Loop".into(),
      code_template: "for [BLANK] in [BLANK]:".into(),
      expected_answers: vec!["i".into(), "range(3)".into()],
    }];
    let answers = UserAnswers::Blanks(vec![vec![Some("i".into()), None]]);
    let text = quiz_transcript(&quiz, &answers);
    assert!(text.contains("Blank 1: expected `i`, user answered `i`"));
    assert!(text.contains("Blank 2: expected `range(3)`, user answered `(no answer)`"));
  }
}
