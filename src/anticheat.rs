//! Paste heuristics. Any triggered rule invalidates the session for good
//! (until it is restarted).

use serde::{Deserialize, Serialize};

/// Thresholds for the paste rules. Overridable under `[anticheat]` in TOML.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct AntiCheatRules {
  /// Pastes strictly longer than this many characters are rejected. Length
  /// is counted in UTF-16 units, as the browser editor reports it.
  pub max_paste_chars: usize,
  /// Pastes while the timer shows fewer elapsed seconds than this are rejected.
  pub grace_period_secs: u32,
  /// The paste that brings the session total to this count is rejected.
  pub max_pastes: u32,
}

impl Default for AntiCheatRules {
  fn default() -> Self {
    Self { max_paste_chars: 50, grace_period_secs: 15, max_pastes: 5 }
  }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Violation {
  OversizedPaste,
  EarlyPaste,
  TooManyPastes,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PasteVerdict {
  pub violations: Vec<Violation>,
}

impl PasteVerdict {
  pub fn is_violation(&self) -> bool {
    !self.violations.is_empty()
  }
}

/// Per-session paste bookkeeping.
#[derive(Clone, Debug, Default)]
pub struct Monitor {
  rules: AntiCheatRules,
  paste_count: u32,
}

impl Monitor {
  pub fn new(rules: AntiCheatRules) -> Self {
    Self { rules, paste_count: 0 }
  }

  /// Record a paste and evaluate all rules against it.
  ///
  /// `timer_running` and `elapsed_secs` come from the session timer at the
  /// moment of the paste.
  pub fn inspect(&mut self, pasted: &str, timer_running: bool, elapsed_secs: u32) -> PasteVerdict {
    self.paste_count += 1;
    let mut violations = Vec::new();

    if pasted.encode_utf16().count() > self.rules.max_paste_chars {
      violations.push(Violation::OversizedPaste);
    }
    if timer_running && elapsed_secs < self.rules.grace_period_secs {
      violations.push(Violation::EarlyPaste);
    }
    if self.paste_count >= self.rules.max_pastes {
      violations.push(Violation::TooManyPastes);
    }
    PasteVerdict { violations }
  }

  pub fn paste_count(&self) -> u32 {
    self.paste_count
  }

  pub fn reset(&mut self) {
    self.paste_count = 0;
  }
}
