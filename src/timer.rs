//! Session timer: a stopwatch for free-form challenges and a countdown for
//! quiz modes.
//!
//! The timer itself is a passive, tick-driven value. Something outside calls
//! `tick` once per second (see `state::spawn_ticker`); each `start`/`resume`
//! hands out a new run id so a driver left over from an earlier run stops
//! at its next tick instead of double counting.

use serde::Serialize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimerKind {
  Stopwatch,
  Countdown { budget_secs: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
  Ticked,
  /// Countdown reached zero on this tick. Reported once per run.
  Expired,
  /// Stopped, or the tick came from a stale driver.
  Inactive,
}

#[derive(Clone, Debug)]
pub struct Timer {
  kind: TimerKind,
  running: bool,
  elapsed_secs: u32,
  remaining_secs: u32,
  run: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TimerSnapshot {
  pub running: bool,
  pub elapsed_secs: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub remaining_secs: Option<u32>,
  pub display: String,
}

impl Default for Timer {
  fn default() -> Self {
    Self { kind: TimerKind::Stopwatch, running: false, elapsed_secs: 0, remaining_secs: 0, run: 0 }
  }
}

impl Timer {
  /// Start a fresh run. No-op (returns `None`) when already running.
  pub fn start(&mut self, kind: TimerKind) -> Option<u64> {
    if self.running {
      return None;
    }
    self.kind = kind;
    self.elapsed_secs = 0;
    self.remaining_secs = match kind {
      TimerKind::Countdown { budget_secs } => budget_secs,
      TimerKind::Stopwatch => 0,
    };
    self.begin_run()
  }

  /// Continue counting from the current values after a `stop`.
  /// A countdown that already hit zero stays stopped.
  pub fn resume(&mut self) -> Option<u64> {
    if self.running || self.is_expired() {
      return None;
    }
    self.begin_run()
  }

  fn begin_run(&mut self) -> Option<u64> {
    self.running = true;
    self.run += 1;
    Some(self.run)
  }

  pub fn stop(&mut self) {
    self.running = false;
  }

  /// Back to a stopped, zeroed stopwatch. Outstanding drivers become stale.
  pub fn reset(&mut self) {
    let run = self.run + 1;
    *self = Self { run, ..Self::default() };
  }

  pub fn tick(&mut self, run: u64) -> TickOutcome {
    if !self.running || run != self.run {
      return TickOutcome::Inactive;
    }
    self.elapsed_secs += 1;
    if let TimerKind::Countdown { .. } = self.kind {
      self.remaining_secs = self.remaining_secs.saturating_sub(1);
      if self.remaining_secs == 0 {
        self.running = false;
        return TickOutcome::Expired;
      }
    }
    TickOutcome::Ticked
  }

  pub fn is_running(&self) -> bool {
    self.running
  }

  pub fn elapsed_secs(&self) -> u32 {
    self.elapsed_secs
  }

  pub fn remaining_secs(&self) -> Option<u32> {
    match self.kind {
      TimerKind::Countdown { .. } => Some(self.remaining_secs),
      TimerKind::Stopwatch => None,
    }
  }

  fn is_expired(&self) -> bool {
    matches!(self.kind, TimerKind::Countdown { .. }) && self.remaining_secs == 0
  }

  /// Seconds consumed so far: elapsed for the stopwatch, budget minus
  /// remaining for the countdown.
  pub fn used_secs(&self) -> u32 {
    match self.kind {
      TimerKind::Stopwatch => self.elapsed_secs,
      TimerKind::Countdown { budget_secs } => budget_secs.saturating_sub(self.remaining_secs),
    }
  }

  /// What the timer widget shows: elapsed or remaining, as `mm:ss`.
  pub fn display(&self) -> String {
    format_time(self.remaining_secs().unwrap_or(self.elapsed_secs))
  }

  pub fn snapshot(&self) -> TimerSnapshot {
    TimerSnapshot {
      running: self.running,
      elapsed_secs: self.elapsed_secs,
      remaining_secs: self.remaining_secs(),
      display: self.display(),
    }
  }
}

pub fn format_time(total_secs: u32) -> String {
  format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}
