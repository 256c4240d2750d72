use serde::Serialize;
use statig::prelude::*;
use std::fmt;

/// Observable phase of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    Created,
    Validated,
    Locked,
    Built,
    Running,
    Succeeded,
    Failed,
    Released,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Created => "CREATED",
            Phase::Validated => "VALIDATED",
            Phase::Locked => "LOCKED",
            Phase::Built => "BUILT",
            Phase::Running => "RUNNING",
            Phase::Succeeded => "SUCCEEDED",
            Phase::Failed => "FAILED",
            Phase::Released => "RELEASED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Validated,
    LockAcquired,
    Built,
    Started,
    Completed,
    Failed,
    Released,
}

/// Submission lifecycle:
/// CREATED → VALIDATED → (LOCKED) → BUILT → RUNNING → {SUCCEEDED, FAILED} → RELEASED.
///
/// A failure before anything is held (validation, lock acquisition) is
/// terminal in FAILED and never reaches RELEASED.
#[derive(Debug)]
pub struct SubmissionLifecycle {
    correlation_id: String,
    phase: Phase,
    history: Vec<Phase>,
    release_pending: bool,
    ignored: usize,
}

impl SubmissionLifecycle {
    pub fn new(correlation_id: &str) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            phase: Phase::Created,
            history: vec![Phase::Created],
            release_pending: false,
            ignored: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Every phase entered so far, in order
    pub fn history(&self) -> &[Phase] {
        &self.history
    }

    /// Events rejected because they were not valid in the phase they arrived in
    pub fn ignored_events(&self) -> usize {
        self.ignored
    }

    pub fn is_terminal(&self) -> bool {
        match self.phase {
            Phase::Released => true,
            Phase::Failed => !self.release_pending,
            _ => false,
        }
    }

    fn enter(&mut self, phase: Phase) {
        tracing::debug!(
            correlation.id = %self.correlation_id,
            from = %self.phase,
            to = %phase,
            "Submission phase change"
        );
        self.phase = phase;
        self.history.push(phase);
    }

    fn reject(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        self.ignored += 1;
        tracing::warn!(
            correlation.id = %self.correlation_id,
            phase = %self.phase,
            event = ?event,
            "Ignoring lifecycle event not valid in current phase"
        );
        Handled
    }
}

#[state_machine(initial = "State::created()")]
impl SubmissionLifecycle {
    #[state]
    fn created(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Validated => {
                self.enter(Phase::Validated);
                Transition(State::validated())
            }
            LifecycleEvent::Failed => {
                self.enter(Phase::Failed);
                Transition(State::failed())
            }
            _ => self.reject(event),
        }
    }

    #[state]
    fn validated(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::LockAcquired => {
                self.release_pending = true;
                self.enter(Phase::Locked);
                Transition(State::locked())
            }
            // No lock required: straight to BUILT
            LifecycleEvent::Built => {
                self.release_pending = true;
                self.enter(Phase::Built);
                Transition(State::built())
            }
            LifecycleEvent::Failed => {
                self.enter(Phase::Failed);
                Transition(State::failed())
            }
            _ => self.reject(event),
        }
    }

    #[state]
    fn locked(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Built => {
                self.enter(Phase::Built);
                Transition(State::built())
            }
            LifecycleEvent::Failed => {
                self.enter(Phase::Failed);
                Transition(State::failed())
            }
            _ => self.reject(event),
        }
    }

    #[state]
    fn built(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Started => {
                self.enter(Phase::Running);
                Transition(State::running())
            }
            LifecycleEvent::Failed => {
                self.enter(Phase::Failed);
                Transition(State::failed())
            }
            _ => self.reject(event),
        }
    }

    #[state]
    fn running(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Completed => {
                self.enter(Phase::Succeeded);
                Transition(State::succeeded())
            }
            LifecycleEvent::Failed => {
                self.enter(Phase::Failed);
                Transition(State::failed())
            }
            _ => self.reject(event),
        }
    }

    #[state]
    fn succeeded(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Released => {
                self.release_pending = false;
                self.enter(Phase::Released);
                Transition(State::released())
            }
            _ => self.reject(event),
        }
    }

    #[state]
    fn failed(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        match event {
            LifecycleEvent::Released if self.release_pending => {
                self.release_pending = false;
                self.enter(Phase::Released);
                Transition(State::released())
            }
            _ => self.reject(event),
        }
    }

    #[state]
    fn released(&mut self, event: &LifecycleEvent) -> Outcome<State> {
        self.reject(event)
    }
}
