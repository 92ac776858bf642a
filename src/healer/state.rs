//! Run state threaded through the healing loop.
//!
//! Transition functions never mutate [`RunState`] directly; they return a
//! [`StateUpdate`] that the loop merges with [`RunState::apply`].

use serde::{Deserialize, Serialize};

/// Phase of a healing run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Creating the sandbox.
    Setup,
    /// Installing dependencies.
    Environment,
    /// Running the entry point.
    Runtime,
    /// Healing succeeded.
    Finish,
    /// Healing gave up.
    Fail,
}

impl Phase {
    /// Returns true for `Finish` and `Fail`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finish | Phase::Fail)
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::Setup => "setup",
            Phase::Environment => "environment",
            Phase::Runtime => "runtime",
            Phase::Finish => "finish",
            Phase::Fail => "fail",
        };
        f.write_str(name)
    }
}

/// Mutable context of a healing run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    /// Current phase.
    pub phase: Phase,
    /// Commands attempted so far, across both phases.
    pub iteration: u32,
    /// Iteration budget.
    pub max_iterations: u32,
    /// Output of the most recent command.
    pub log: String,
    /// Whether the last phase succeeded.
    pub success: bool,
    /// Fix attempts in the current phase, oldest first.
    pub history: Vec<String>,
}

impl RunState {
    /// Creates the state for a run with the given budget.
    pub fn new(max_iterations: u32) -> Self {
        Self {
            phase: Phase::Setup,
            iteration: 0,
            max_iterations,
            log: String::new(),
            success: false,
            history: Vec::new(),
        }
    }

    /// Returns true once the iteration budget is used up.
    pub fn budget_exhausted(&self) -> bool {
        self.iteration >= self.max_iterations
    }

    /// Merges an update into the state.
    pub fn apply(&mut self, update: StateUpdate) {
        if let Some(phase) = update.phase {
            self.phase = phase;
        }
        if let Some(iteration) = update.iteration {
            self.iteration = iteration;
        }
        if let Some(log) = update.log {
            self.log = log;
        }
        if let Some(success) = update.success {
            self.success = success;
        }
        match update.history {
            HistoryUpdate::Keep => {}
            HistoryUpdate::Append(entries) => self.history.extend(entries),
            HistoryUpdate::Reset => self.history.clear(),
        }
    }
}

/// Change to the attempt history.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum HistoryUpdate {
    /// Leave history as is.
    #[default]
    Keep,
    /// Append entries.
    Append(Vec<String>),
    /// Clear history.
    Reset,
}

/// Partial update produced by a transition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUpdate {
    pub phase: Option<Phase>,
    pub iteration: Option<u32>,
    pub log: Option<String>,
    pub success: Option<bool>,
    pub history: HistoryUpdate,
}

impl StateUpdate {
    /// Moves to `phase`.
    pub fn to(phase: Phase) -> Self {
        Self {
            phase: Some(phase),
            ..Self::default()
        }
    }

    /// Moves to `Fail`.
    pub fn fail() -> Self {
        Self {
            phase: Some(Phase::Fail),
            success: Some(false),
            ..Self::default()
        }
    }

    pub fn with_iteration(mut self, iteration: u32) -> Self {
        self.iteration = Some(iteration);
        self
    }

    pub fn with_log(mut self, log: impl Into<String>) -> Self {
        self.log = Some(log.into());
        self
    }

    pub fn with_success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn with_history(mut self, history: HistoryUpdate) -> Self {
        self.history = history;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_starts_in_setup() {
        let state = RunState::new(10);
        assert_eq!(state.phase, Phase::Setup);
        assert_eq!(state.iteration, 0);
        assert!(!state.success);
        assert!(state.history.is_empty());
    }

    #[test]
    fn apply_only_touches_set_fields() {
        let mut state = RunState::new(10);
        state.log = "old".to_string();

        state.apply(StateUpdate::to(Phase::Environment).with_iteration(1));

        assert_eq!(state.phase, Phase::Environment);
        assert_eq!(state.iteration, 1);
        assert_eq!(state.log, "old");
        assert_eq!(state.max_iterations, 10);
    }

    #[test]
    fn history_appends_then_resets() {
        let mut state = RunState::new(10);

        state.apply(StateUpdate::default().with_history(HistoryUpdate::Append(vec!["a".into()])));
        state.apply(StateUpdate::default().with_history(HistoryUpdate::Append(vec!["b".into(), "c".into()])));
        assert_eq!(state.history, vec!["a", "b", "c"]);

        state.apply(StateUpdate::default());
        assert_eq!(state.history.len(), 3);

        state.apply(StateUpdate::to(Phase::Runtime).with_history(HistoryUpdate::Reset));
        assert!(state.history.is_empty());
    }

    #[test]
    fn fail_clears_success() {
        let mut state = RunState::new(10);
        state.success = true;
        state.apply(StateUpdate::fail());

        assert_eq!(state.phase, Phase::Fail);
        assert!(!state.success);
    }

    #[test]
    fn budget_exhausted_at_limit() {
        let mut state = RunState::new(2);
        assert!(!state.budget_exhausted());
        state.iteration = 1;
        assert!(!state.budget_exhausted());
        state.iteration = 2;
        assert!(state.budget_exhausted());
    }

    #[test]
    fn terminal_phases() {
        assert!(Phase::Finish.is_terminal());
        assert!(Phase::Fail.is_terminal());
        assert!(!Phase::Environment.is_terminal());
        assert!(!Phase::Runtime.is_terminal());
        assert!(!Phase::Setup.is_terminal());
    }

    #[test]
    fn phase_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Phase::Runtime).unwrap(), "\"runtime\"");
        assert_eq!(Phase::Fail.to_string(), "fail");
    }
}
