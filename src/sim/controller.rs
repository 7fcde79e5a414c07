use crate::sim::error::{SimError, WrongStepModeErr};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StepMode {
    /// Advance with wall-clock time
    #[default]
    Continuous,
    /// Advance only on explicit step requests
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Continuous,
    ManualIdle,
    ManualArmed,
}

/// How a step request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepOutcome {
    Completed { steps: u64 },
    /// The step mode changed before all requested steps ran
    Discarded { executed: u64, requested: u64 },
}

struct StepRequest {
    requested: u64,
    remaining: u64,
    done: oneshot::Sender<StepOutcome>,
}

impl StepRequest {
    fn discard(self) {
        let outcome = StepOutcome::Discarded {
            executed: self.requested - self.remaining,
            requested: self.requested,
        };
        // the caller may have given up waiting
        let _ = self.done.send(outcome);
    }
}

/// Decides whether the pacing loop may advance the simulation.
///
/// Armed requests are served in arrival order. Each one is completed once exactly its own number
/// of steps has run.
pub struct StepController {
    mode: StepMode,
    armed: VecDeque<StepRequest>,
}

impl StepController {
    pub fn new(mode: StepMode) -> Self {
        StepController {
            mode,
            armed: VecDeque::new(),
        }
    }

    pub fn mode(&self) -> StepMode {
        self.mode
    }

    pub fn state(&self) -> ControllerState {
        match self.mode {
            StepMode::Continuous => ControllerState::Continuous,
            StepMode::Manual if self.armed.is_empty() => ControllerState::ManualIdle,
            StepMode::Manual => ControllerState::ManualArmed,
        }
    }

    /// Steps still owed to armed requests
    pub fn remaining_steps(&self) -> u64 {
        self.armed.iter().map(|r| r.remaining).sum()
    }

    /// Switches the mode, discarding every armed request.
    pub fn set_mode(&mut self, mode: StepMode) {
        let discarded = self.armed.len();
        for request in self.armed.drain(..) {
            request.discard();
        }
        if discarded > 0 {
            debug!("Discarded {discarded} armed step requests");
        }

        if self.mode != mode {
            debug!("Step mode {:?} -> {mode:?}", self.mode);
        }
        self.mode = mode;
    }

    /// Arms `steps` steps. The receiver resolves once they all ran or got discarded.
    pub fn request_steps(
        &mut self,
        steps: u64,
    ) -> Result<oneshot::Receiver<StepOutcome>, SimError> {
        ensure!(self.mode == StepMode::Manual, WrongStepModeErr);

        let (done, rx) = oneshot::channel();
        if steps == 0 {
            let _ = done.send(StepOutcome::Completed { steps: 0 });
            return Ok(rx);
        }

        self.armed.push_back(StepRequest {
            requested: steps,
            remaining: steps,
            done,
        });

        Ok(rx)
    }

    /// Whether the loop may run one more step now.
    pub fn should_step(&self) -> bool {
        match self.mode {
            StepMode::Continuous => true,
            StepMode::Manual => self.armed.front().is_some_and(|r| r.remaining > 0),
        }
    }

    /// Counts one step that ran against the front request, completing it on its last step.
    ///
    /// Only steps that actually ran are counted, so a request discarded after a failed step
    /// reports what was executed.
    pub fn complete_step(&mut self) {
        let Some(request) = self.armed.front_mut() else {
            return;
        };
        request.remaining = request.remaining.saturating_sub(1);

        if request.remaining == 0
            && let Some(request) = self.armed.pop_front()
        {
            let _ = request.done.send(StepOutcome::Completed {
                steps: request.requested,
            });
        }
    }
}
