//! Build state machine
//!
//! The machine owns the phase plan and hands out one phase at a time. A
//! phase is only handed out after the previous one reported success, and
//! nothing is handed out once a phase has failed.

use crate::build::phase::Phase;
use std::fmt;

/// Where a build is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Pending,
    Running(Phase),
    Succeeded,
    Failed { phase: Phase, status: i32 },
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed { .. })
    }
}

impl fmt::Display for BuildState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running(phase) => write!(f, "running {}", phase),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed { phase, status } => write!(f, "failed in {} ({})", phase, status),
        }
    }
}

/// Sequencer over a fixed list of phases
#[derive(Debug)]
pub struct PhaseMachine {
    plan: Vec<Phase>,
    next: usize,
    state: BuildState,
    completed: Vec<Phase>,
}

impl PhaseMachine {
    pub fn new(plan: &[Phase]) -> Self {
        Self {
            plan: plan.to_vec(),
            next: 0,
            state: BuildState::Pending,
            completed: Vec::new(),
        }
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    /// Phases that exited successfully, in order
    pub fn completed(&self) -> &[Phase] {
        &self.completed
    }

    /// Number of phases in the plan
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }

    /// Start the next phase, if the build may continue.
    ///
    /// Returns `None` while a phase is running, after a failure, and once
    /// the plan is exhausted.
    pub fn next_phase(&mut self) -> Option<Phase> {
        match self.state {
            BuildState::Pending => {}
            BuildState::Running(_) | BuildState::Succeeded | BuildState::Failed { .. } => {
                return None
            }
        }

        match self.plan.get(self.next).copied() {
            Some(phase) => {
                self.next += 1;
                self.state = BuildState::Running(phase);
                Some(phase)
            }
            None => {
                self.state = BuildState::Succeeded;
                None
            }
        }
    }

    /// Record the exit status of the running phase
    pub fn finish(&mut self, status: i32) -> BuildState {
        if let BuildState::Running(phase) = self.state {
            if status == 0 {
                self.completed.push(phase);
                self.state = if self.next >= self.plan.len() {
                    BuildState::Succeeded
                } else {
                    BuildState::Pending
                };
            } else {
                self.state = BuildState::Failed { phase, status };
            }
        }
        self.state
    }

    /// Mark the running phase as aborted (cancelled or runtime error)
    pub fn abort(&mut self, status: i32) -> BuildState {
        if let BuildState::Running(phase) = self.state {
            self.state = BuildState::Failed { phase, status };
        }
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_plan_in_order() {
        let mut m = PhaseMachine::new(&Phase::ISOLATED);
        let mut seen = Vec::new();
        while let Some(phase) = m.next_phase() {
            seen.push(phase);
            m.finish(0);
        }
        assert_eq!(seen, Phase::ISOLATED);
        assert_eq!(m.state(), BuildState::Succeeded);
        assert_eq!(m.completed(), Phase::ISOLATED);
    }

    #[test]
    fn failure_stops_the_plan() {
        let mut m = PhaseMachine::new(&Phase::ISOLATED);
        assert_eq!(m.next_phase(), Some(Phase::Detect));
        m.finish(0);
        assert_eq!(m.next_phase(), Some(Phase::Analyze));
        m.finish(0);
        assert_eq!(m.next_phase(), Some(Phase::Restore));

        let state = m.finish(3);
        assert_eq!(state, BuildState::Failed { phase: Phase::Restore, status: 3 });
        assert!(state.is_terminal());
        for _ in 0..3 {
            assert_eq!(m.next_phase(), None);
        }
        assert_eq!(m.completed(), [Phase::Detect, Phase::Analyze]);
    }

    #[test]
    fn no_phase_while_running() {
        let mut m = PhaseMachine::new(&Phase::COLLAPSED);
        assert_eq!(m.next_phase(), Some(Phase::Create));
        assert_eq!(m.next_phase(), None);
        assert_eq!(m.state(), BuildState::Running(Phase::Create));
        assert_eq!(m.finish(0), BuildState::Succeeded);
        assert_eq!(m.next_phase(), None);
    }

    #[test]
    fn abort_marks_running_phase_failed() {
        let mut m = PhaseMachine::new(&Phase::ISOLATED);
        m.next_phase();
        assert_eq!(
            m.abort(-1),
            BuildState::Failed { phase: Phase::Detect, status: -1 }
        );
        assert_eq!(m.next_phase(), None);
    }

    #[test]
    fn empty_plan_succeeds_immediately() {
        let mut m = PhaseMachine::new(&[]);
        assert!(m.is_empty());
        assert_eq!(m.next_phase(), None);
        assert_eq!(m.state(), BuildState::Succeeded);
    }
}
