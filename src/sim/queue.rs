use crate::engine::physics::ActuatorIndex;
use crate::sim::error::{InitError, InvalidDelayRangeErr};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use snafu::ensure;
use std::collections::BTreeMap;

/// A commanded target waiting for its application time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PendingCommand {
    pub target: f64,
    /// Simulation time in seconds from which on the command is due
    pub application_time: f64,
}

/// Bounds of the simulated actuation latency in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DelayRange {
    pub min: f64,
    pub max: f64,
}

impl DelayRange {
    pub fn new(min: f64, max: f64) -> Self {
        DelayRange { min, max }
    }

    pub fn fixed(delay: f64) -> Self {
        DelayRange::new(delay, delay)
    }

    pub fn validate(&self) -> Result<(), InitError> {
        let DelayRange { min, max } = *self;
        ensure!(
            min.is_finite() && max.is_finite() && min >= 0.0 && max >= min,
            InvalidDelayRangeErr { min, max }
        );
        Ok(())
    }
}

/// Draws command delays uniformly from a [`DelayRange`].
#[derive(Debug, Clone)]
pub struct DelaySampler {
    range: DelayRange,
    rng: StdRng,
}

impl DelaySampler {
    pub fn new(range: DelayRange, seed: Option<u64>) -> Result<Self, InitError> {
        range.validate()?;

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(DelaySampler { range, rng })
    }

    pub fn range(&self) -> DelayRange {
        self.range
    }

    pub fn sample(&mut self) -> f64 {
        let DelayRange { min, max } = self.range;
        if min == max {
            return min;
        }
        self.rng.random_range(min..=max)
    }
}

/// Per-actuator buffer of commands that have not been applied yet.
///
/// Holds at most one entry per actuator. A newer command replaces an older one that is still
/// pending, no matter which one would have been due first.
#[derive(Debug, Clone, Default)]
pub struct CommandQueue {
    pending: BTreeMap<ActuatorIndex, PendingCommand>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `target` to become effective `delay` seconds after `now`.
    ///
    /// Returns the pending command that got replaced, if there was one.
    pub fn issue(
        &mut self,
        actuator: ActuatorIndex,
        target: f64,
        now: f64,
        delay: f64,
    ) -> Option<PendingCommand> {
        self.pending.insert(
            actuator,
            PendingCommand {
                target,
                application_time: now + delay,
            },
        )
    }

    /// Removes and returns every command with `application_time <= now`, in actuator order.
    pub fn drain_due(&mut self, now: f64) -> Vec<(ActuatorIndex, PendingCommand)> {
        if self.pending.is_empty() {
            return Vec::new();
        }

        let (due, waiting): (BTreeMap<_, _>, BTreeMap<_, _>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|(_, cmd)| cmd.application_time <= now);
        self.pending = waiting;

        due.into_iter().collect()
    }

    pub fn get(&self, actuator: ActuatorIndex) -> Option<&PendingCommand> {
        self.pending.get(&actuator)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use more_asserts::{assert_ge, assert_le};

    #[test]
    fn newer_command_replaces_pending_one() {
        let mut queue = CommandQueue::new();

        assert!(queue.issue(ActuatorIndex(0), 1.0, 0.0, 0.01).is_none());
        let replaced = queue.issue(ActuatorIndex(0), 2.0, 0.0, 0.01).unwrap();

        assert_eq!(replaced.target, 1.0);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get(ActuatorIndex(0)).unwrap().target, 2.0);
    }

    #[test]
    fn drain_due_leaves_future_commands_untouched() {
        let mut queue = CommandQueue::new();
        queue.issue(ActuatorIndex(2), 0.2, 0.0, 0.002);
        queue.issue(ActuatorIndex(0), 0.0, 0.0, 0.0);
        queue.issue(ActuatorIndex(1), 0.1, 0.0, 0.005);

        let due = queue.drain_due(0.002);

        let actuators: Vec<_> = due.iter().map(|(a, _)| *a).collect();
        assert_eq!(actuators, vec![ActuatorIndex(0), ActuatorIndex(2)]);
        assert_eq!(queue.len(), 1);
        assert_eq!(
            queue.get(ActuatorIndex(1)),
            Some(&PendingCommand {
                target: 0.1,
                application_time: 0.005
            })
        );

        assert!(queue.drain_due(0.004).is_empty());
        assert_eq!(queue.drain_due(0.005).len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn fixed_range_is_deterministic() {
        let mut sampler = DelaySampler::new(DelayRange::fixed(0.02), None).unwrap();

        for _ in 0..10 {
            assert_eq!(sampler.sample(), 0.02);
        }
    }

    #[test]
    fn samples_stay_in_range_and_follow_the_seed() {
        let range = DelayRange::new(0.001, 0.004);
        let mut a = DelaySampler::new(range, Some(7)).unwrap();
        let mut b = DelaySampler::new(range, Some(7)).unwrap();

        for _ in 0..100 {
            let delay = a.sample();
            assert_ge!(delay, 0.001);
            assert_le!(delay, 0.004);
            assert_eq!(delay, b.sample());
        }
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        for range in [
            DelayRange::new(-0.1, 0.0),
            DelayRange::new(0.2, 0.1),
            DelayRange::new(0.0, f64::NAN),
        ] {
            assert!(matches!(
                DelaySampler::new(range, None),
                Err(InitError::InvalidDelayRange { .. })
            ));
        }
    }
}
