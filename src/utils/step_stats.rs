use serde::Serialize;
use std::collections::VecDeque;

const DEFAULT_RUNNING_SIZE: usize = 60;

/// Rolling window over the number of steps taken per pacing loop iteration.
#[derive(Debug, Clone, Default)]
pub struct StepStats {
    iterations: VecDeque<usize>,
    total_steps: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StepStatsSnapshot {
    pub mean_steps_per_iteration: f64,
    pub max_steps_per_iteration: usize,
    pub total_steps: u64,
}

impl StepStats {
    pub fn record(&mut self, steps: usize) {
        if self.iterations.len() >= DEFAULT_RUNNING_SIZE {
            self.iterations.pop_front();
        }
        self.iterations.push_back(steps);
        self.total_steps += steps as u64;
    }

    pub fn mean_steps(&self) -> f64 {
        if self.iterations.is_empty() {
            return 0.0;
        }
        self.iterations.iter().sum::<usize>() as f64 / self.iterations.len() as f64
    }

    pub fn max_steps(&self) -> usize {
        self.iterations.iter().copied().max().unwrap_or(0)
    }

    /// Steps recorded since creation, not just inside the window
    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    pub fn snapshot(&self) -> StepStatsSnapshot {
        StepStatsSnapshot {
            mean_steps_per_iteration: self.mean_steps(),
            max_steps_per_iteration: self.max_steps(),
            total_steps: self.total_steps,
        }
    }
}
