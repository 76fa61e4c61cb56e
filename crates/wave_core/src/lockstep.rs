//! Fixed-timestep lockstep driver.
//!
//! The driver buffers incoming [`Event`]s per step and hands a step to its
//! [`StepExecutor`] once the step is closed by a terminator and its time has
//! come. A participant that falls more than one step behind executes the
//! missing steps back to back until it has caught up.
//!
//! Steps are numbered from 1; step 0 is the state before anything ran.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{GameError, Result};
use crate::protocol::{Event, Step};
use crate::tuning::STEP_MS;

/// Something that can run one simulation step.
pub trait StepExecutor {
    /// Run `step` with its events in authority order.
    ///
    /// # Errors
    ///
    /// Implementations return an error when the step could not be executed
    /// consistently; the driver stops at that step.
    fn execute_step(&mut self, step: Step, events: &[Event]) -> Result<()>;
}

/// What the driver would do on its next [`LockstepDriver::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverState {
    /// Waiting for time or for the next step's terminator.
    Accumulating,
    /// The next step is closed and due.
    StepReady,
    /// A step is running.
    Executing,
}

/// Buffers events and decides when steps run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LockstepDriver {
    /// Last executed step.
    step: Step,
    /// Highest step closed by a terminator.
    latest_available: Step,
    /// Milliseconds since the last executed step.
    timer_ms: u32,
    /// Events of steps not executed yet.
    pending: BTreeMap<Step, Vec<Event>>,
    executing: bool,
}

impl LockstepDriver {
    /// A driver before step 1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last executed step.
    #[must_use]
    pub fn step(&self) -> Step {
        self.step
    }

    /// Highest step whose event list is complete.
    #[must_use]
    pub fn latest_available(&self) -> Step {
        self.latest_available
    }

    /// Milliseconds accumulated since the last executed step.
    #[must_use]
    pub fn timer_ms(&self) -> u32 {
        self.timer_ms
    }

    /// Current driver state.
    #[must_use]
    pub fn state(&self) -> DriverState {
        if self.executing {
            DriverState::Executing
        } else if self.latest_available > self.step
            && (self.timer_ms > STEP_MS || self.latest_available > self.step + 1)
        {
            DriverState::StepReady
        } else {
            DriverState::Accumulating
        }
    }

    /// Buffer an event.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Protocol`] for events of steps that already ran
    /// or were already closed, and for terminators that do not close exactly
    /// the next step.
    pub fn receive(&mut self, event: Event) -> Result<()> {
        let step = event.step();
        if step <= self.step {
            return Err(GameError::Protocol(format!(
                "event for step {step}, but step {} already ran",
                self.step
            )));
        }
        match event {
            Event::PlayerAction { .. } => {
                if step <= self.latest_available {
                    return Err(GameError::Protocol(format!(
                        "event for step {step} after it was closed"
                    )));
                }
                self.pending.entry(step).or_default().push(event);
            }
            Event::NoMoreEvents { .. } => {
                if step != self.latest_available + 1 {
                    return Err(GameError::Protocol(format!(
                        "terminator for step {step}, expected step {}",
                        self.latest_available + 1
                    )));
                }
                self.latest_available = step;
            }
        }
        Ok(())
    }

    /// Let `elapsed_ms` pass and run every step that is due.
    ///
    /// A step is due if it is closed and either more than the step duration
    /// has elapsed or the driver is more than one step behind. The timer restarts
    /// with every executed step.
    ///
    /// Returns the number of executed steps.
    ///
    /// # Errors
    ///
    /// Propagates the executor's error; the failing step counts as not run.
    pub fn advance(&mut self, elapsed_ms: u32, executor: &mut impl StepExecutor) -> Result<u32> {
        self.timer_ms = self.timer_ms.saturating_add(elapsed_ms);
        let overdue = self.timer_ms > STEP_MS;
        let mut executed = 0;
        while self.latest_available > self.step + 1
            || (overdue && self.latest_available > self.step)
        {
            self.timer_ms = 0;
            let next = self.step + 1;
            let events = self.pending.remove(&next).unwrap_or_default();
            self.executing = true;
            let outcome = executor.execute_step(next, &events);
            self.executing = false;
            outcome?;
            self.step = next;
            executed += 1;
        }
        Ok(executed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Action;

    #[derive(Default)]
    struct Recorder {
        steps: Vec<(Step, usize)>,
        fail_at: Option<Step>,
    }

    impl StepExecutor for Recorder {
        fn execute_step(&mut self, step: Step, events: &[Event]) -> Result<()> {
            if self.fail_at == Some(step) {
                return Err(GameError::InvalidState("boom".into()));
            }
            self.steps.push((step, events.len()));
            Ok(())
        }
    }

    fn action(step: Step) -> Event {
        Event::PlayerAction {
            step,
            player: 0,
            action: Action::Attack { target: 9 },
        }
    }

    fn close(driver: &mut LockstepDriver, step: Step) {
        driver.receive(Event::NoMoreEvents { step }).unwrap();
    }

    #[test]
    fn test_waits_for_terminator() {
        let mut driver = LockstepDriver::new();
        let mut recorder = Recorder::default();
        driver.receive(action(1)).unwrap();
        assert_eq!(driver.advance(100, &mut recorder).unwrap(), 0);
        assert_eq!(driver.state(), DriverState::Accumulating);

        close(&mut driver, 1);
        assert_eq!(driver.state(), DriverState::StepReady);
        assert_eq!(driver.advance(0, &mut recorder).unwrap(), 1);
        assert_eq!(recorder.steps, vec![(1, 1)]);
        assert_eq!(driver.timer_ms(), 0);
    }

    #[test]
    fn test_waits_for_time() {
        let mut driver = LockstepDriver::new();
        let mut recorder = Recorder::default();
        close(&mut driver, 1);
        assert_eq!(driver.advance(STEP_MS - 1, &mut recorder).unwrap(), 0);
        assert_eq!(driver.advance(1, &mut recorder).unwrap(), 0);
        assert_eq!(driver.state(), DriverState::Accumulating);
        assert_eq!(driver.advance(1, &mut recorder).unwrap(), 1);
    }

    #[test]
    fn test_step_duration_alone_is_not_overdue() {
        let mut driver = LockstepDriver::new();
        let mut recorder = Recorder::default();
        close(&mut driver, 1);
        assert_eq!(driver.advance(STEP_MS, &mut recorder).unwrap(), 0);
        assert_eq!(driver.timer_ms(), STEP_MS);
        assert_eq!(driver.state(), DriverState::Accumulating);

        close(&mut driver, 2);
        assert_eq!(driver.advance(0, &mut recorder).unwrap(), 1);
        assert_eq!(driver.step(), 1);
        assert_eq!(driver.advance(STEP_MS + 1, &mut recorder).unwrap(), 1);
        assert_eq!(driver.step(), 2);
    }

    #[test]
    fn test_catches_up_in_order() {
        let mut driver = LockstepDriver::new();
        let mut recorder = Recorder::default();
        for step in 1..=5 {
            driver.receive(action(step)).unwrap();
            close(&mut driver, step);
        }
        assert_eq!(driver.advance(STEP_MS + 1, &mut recorder).unwrap(), 5);
        let order: Vec<Step> = recorder.steps.iter().map(|&(s, _)| s).collect();
        assert_eq!(order, vec![1, 2, 3, 4, 5]);
        assert_eq!(driver.step(), 5);
    }

    #[test]
    fn test_catch_up_without_time_leaves_last_step() {
        let mut driver = LockstepDriver::new();
        let mut recorder = Recorder::default();
        for step in 1..=5 {
            close(&mut driver, step);
        }
        assert_eq!(driver.advance(0, &mut recorder).unwrap(), 4);
        assert_eq!(driver.advance(STEP_MS, &mut recorder).unwrap(), 0);
        assert_eq!(driver.advance(1, &mut recorder).unwrap(), 1);
    }

    #[test]
    fn test_rejects_stale_and_out_of_order() {
        let mut driver = LockstepDriver::new();
        let mut recorder = Recorder::default();
        close(&mut driver, 1);
        assert_eq!(driver.advance(STEP_MS + 1, &mut recorder).unwrap(), 1);

        assert!(matches!(driver.receive(action(1)), Err(GameError::Protocol(_))));
        assert!(driver.receive(Event::NoMoreEvents { step: 1 }).is_err());
        assert!(driver.receive(Event::NoMoreEvents { step: 3 }).is_err());
        close(&mut driver, 2);
        assert!(driver.receive(action(2)).is_err());
        assert!(driver.receive(action(3)).is_ok());
    }

    #[test]
    fn test_executor_failure_stops_at_step() {
        let mut driver = LockstepDriver::new();
        let mut recorder = Recorder {
            fail_at: Some(2),
            ..Recorder::default()
        };
        for step in 1..=3 {
            close(&mut driver, step);
        }
        assert!(driver.advance(STEP_MS, &mut recorder).is_err());
        assert_eq!(driver.step(), 1);
        assert_eq!(driver.state(), DriverState::StepReady);
    }
}
