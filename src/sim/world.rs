use crate::config::SimConfig;
use crate::engine::physics::{
    ActuatorConfig, ActuatorConfigPatch, FreeBodyState, PhysicsEngine, ResetPose,
};
use crate::engine::rendering::FrameSnapshot;
use crate::model::ModelMetadata;
use crate::sim::error::*;
use crate::sim::mapping::{JointId, JointMap};
use crate::sim::queue::{CommandQueue, DelaySampler};
use itertools::Itertools;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ensure};
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Result of a single entry of a command batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutcome {
    pub actuator_id: JointId,
    pub accepted: bool,
}

/// Position and velocity of one mapped joint.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ActuatorState {
    pub actuator_id: JointId,
    pub position: f64,
    pub velocity: f64,
}

/// Reset target expressed in external joint IDs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InitialPose {
    pub base_position: Option<Vector3<f64>>,
    pub base_orientation: Option<UnitQuaternion<f64>>,
    pub joints: Vec<(JointId, f64)>,
}

/// The simulation state store together with the stepper that advances it.
///
/// A `SimWorld` has no synchronization of its own. [`Simulation`](crate::sim::Simulation) wraps
/// it behind the lock every caller goes through.
pub struct SimWorld {
    engine: Box<dyn PhysicsEngine>,
    joints: JointMap,
    ctrl: Vec<f64>,
    queue: CommandQueue,
    sampler: DelaySampler,
    dt: f64,
    steps: u64,
    decimation: u64,
    /// Free body reference re-applied after every step while suspended
    suspension: Option<FreeBodyState>,
    closed: bool,
}

// whole nanoseconds, so a 1ms timestep is exactly 1ms of wall time
fn wall_timestep(dt: f64) -> Duration {
    Duration::from_nanos((dt * 1e9).round() as u64)
}

impl SimWorld {
    pub fn new(
        engine: Box<dyn PhysicsEngine>,
        metadata: &ModelMetadata,
        config: &SimConfig,
    ) -> Result<SimWorld, InitError> {
        let dt = engine.timestep();
        ensure!(dt.is_finite() && dt > 0.0, InvalidTimestepErr { dt });
        ensure!(
            !wall_timestep(dt).is_zero(),
            TimestepBelowResolutionErr { dt }
        );

        let frequency = metadata
            .control_frequency
            .context(MissingControlFrequencyErr)?;
        ensure!(
            frequency.is_finite() && frequency > 0.0,
            InvalidControlFrequencyErr { frequency }
        );

        let period = 1.0 / frequency;
        // tolerate rounding in the division, 0.02 / 0.001 must give 20
        let decimation = (period / dt + 1e-9).floor();
        ensure!(decimation >= 1.0, DecimationTooSmallErr { period, dt });
        let decimation = decimation as u64;

        let joints = JointMap::build(metadata, engine.as_ref())?;
        let sampler = DelaySampler::new(config.command_delay, config.delay_seed)?;

        let suspension = if config.suspended {
            let reference = engine.free_body().map(|body| body.at_rest());
            if reference.is_none() {
                warn!("Suspension requested, but the model has no free body to hold in place");
            }
            reference
        } else {
            None
        };

        info!(
            "Simulation ready: {} mapped joints, dt {dt}s, control frequency {frequency}Hz, decimation {decimation}",
            joints.len()
        );
        debug!(
            "Joint mapping: {}",
            joints
                .iter()
                .map(|(id, joint)| format!("{id} -> {}", joint.name))
                .join(", ")
        );

        Ok(SimWorld {
            ctrl: vec![0.0; engine.actuator_count()],
            engine,
            joints,
            queue: CommandQueue::new(),
            sampler,
            dt,
            steps: 0,
            decimation,
            suspension,
            closed: false,
        })
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    /// One timestep as wall time, in whole nanoseconds.
    pub fn wall_timestep(&self) -> Duration {
        wall_timestep(self.dt)
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Simulation time in seconds. Derived from the step count so it never drifts.
    pub fn sim_time(&self) -> f64 {
        self.steps as f64 * self.dt
    }

    pub fn decimation(&self) -> u64 {
        self.decimation
    }

    pub fn joints(&self) -> &JointMap {
        &self.joints
    }

    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspension.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current control input vector, indexed by engine actuator
    pub fn ctrl(&self) -> &[f64] {
        &self.ctrl
    }

    fn ensure_open(&self) -> Result<(), SimError> {
        ensure!(!self.closed, ShuttingDownErr);
        Ok(())
    }

    /// Advances the simulation by exactly one timestep.
    pub fn advance(&mut self) -> Result<(), SimError> {
        self.ensure_open()?;

        let next_time = (self.steps + 1) as f64 * self.dt;
        for (actuator, command) in self.queue.drain_due(next_time) {
            if let Some(slot) = self.ctrl.get_mut(actuator.0) {
                *slot = command.target;
            }
        }

        self.engine.step(&self.ctrl)?;

        if let Some(reference) = &self.suspension {
            self.engine.set_free_body(reference);
        }

        self.steps += 1;
        trace!("Stepped to t={:.4}s", self.sim_time());

        Ok(())
    }

    /// Queues position targets for a batch of joints. Unknown IDs and non-finite targets are
    /// skipped, everything else is accepted.
    pub fn command_actuators(&mut self, commands: &[(JointId, f64)]) -> Vec<CommandOutcome> {
        let now = self.sim_time();

        commands
            .iter()
            .map(|&(actuator_id, target)| {
                let Some(joint) = self.joints.get(actuator_id) else {
                    warn!("Joint ID {actuator_id} not found in config mappings, ignoring command");
                    return CommandOutcome {
                        actuator_id,
                        accepted: false,
                    };
                };
                if !target.is_finite() {
                    warn!("Ignoring non-finite target {target} for joint ID {actuator_id}");
                    return CommandOutcome {
                        actuator_id,
                        accepted: false,
                    };
                }

                let delay = self.sampler.sample();
                let replaced = self.queue.issue(joint.actuator, target, now, delay);
                debug!(
                    "Joint {} -> {target:.4} at t={:.4}s{}",
                    joint.name,
                    now + delay,
                    if replaced.is_some() { " (replaced pending)" } else { "" }
                );

                CommandOutcome {
                    actuator_id,
                    accepted: true,
                }
            })
            .collect()
    }

    pub fn configure_actuator(
        &mut self,
        id: JointId,
        patch: &ActuatorConfigPatch,
    ) -> Result<ActuatorConfig, SimError> {
        let joint = self.joints.get(id).context(JointNotFoundErr { id })?;
        if let Some(field) = patch.invalid_field() {
            return InvalidRequestErr {
                reason: format!("'{field}' must be a finite, non-negative number"),
            }
            .fail();
        }

        let mut config = self.engine.actuator_config(joint.actuator);
        patch.apply_to(&mut config);
        self.engine.set_actuator_config(joint.actuator, config);
        debug!("Configured joint {} ({id}): {config:?}", joint.name);

        Ok(config)
    }

    pub fn actuator_position(&self, id: JointId) -> Result<f64, SimError> {
        let joint = self.joints.get(id).context(JointNotFoundErr { id })?;
        Ok(self.engine.joint_position(joint.joint))
    }

    pub fn actuator_velocity(&self, id: JointId) -> Result<f64, SimError> {
        let joint = self.joints.get(id).context(JointNotFoundErr { id })?;
        Ok(self.engine.joint_velocity(joint.joint))
    }

    /// States of the given joints, or of every mapped joint in ID order.
    pub fn actuator_states(&self, ids: Option<&[JointId]>) -> Result<Vec<ActuatorState>, SimError> {
        let ids: Vec<JointId> = match ids {
            Some(ids) => ids.to_vec(),
            None => self.joints.ids().collect(),
        };

        ids.into_iter()
            .map(|actuator_id| {
                Ok(ActuatorState {
                    actuator_id,
                    position: self.actuator_position(actuator_id)?,
                    velocity: self.actuator_velocity(actuator_id)?,
                })
            })
            .collect()
    }

    pub fn actuator_config(&self, id: JointId) -> Result<ActuatorConfig, SimError> {
        let joint = self.joints.get(id).context(JointNotFoundErr { id })?;
        Ok(self.engine.actuator_config(joint.actuator))
    }

    pub fn sensor_data(&self, name: &str) -> Result<Vec<f64>, SimError> {
        let sensor = self
            .engine
            .sensor_index(name)
            .context(SensorNotFoundErr { name })?;
        Ok(self.engine.sensor_data(sensor))
    }

    pub fn sensor_names(&self) -> Vec<String> {
        self.engine.sensor_names()
    }

    pub fn free_body(&self) -> Option<FreeBodyState> {
        self.engine.free_body()
    }

    /// Puts the world back to time zero, dropping every pending command.
    ///
    /// Joints named in `pose` start at the given position and hold it, all others return to zero.
    pub fn reset(&mut self, pose: Option<&InitialPose>) -> Result<(), SimError> {
        self.ensure_open()?;

        let mut ctrl = vec![0.0; self.ctrl.len()];
        let pose = match pose {
            Some(pose) => {
                let mut joints = Vec::with_capacity(pose.joints.len());
                for &(id, position) in &pose.joints {
                    let joint = self.joints.get(id).context(JointNotFoundErr { id })?;
                    ensure!(
                        position.is_finite(),
                        InvalidRequestErr {
                            reason: format!("position of joint ID {id} must be finite")
                        }
                    );
                    joints.push((joint.joint, position));
                    if let Some(slot) = ctrl.get_mut(joint.actuator.0) {
                        *slot = position;
                    }
                }
                Some(ResetPose {
                    base_position: pose.base_position,
                    base_orientation: pose.base_orientation,
                    joints,
                })
            }
            None => None,
        };

        self.engine.reset(pose.as_ref());
        self.ctrl = ctrl;
        self.queue.clear();
        self.steps = 0;

        info!("Simulation reset");
        Ok(())
    }

    /// Snapshot of the current body poses for the renderer.
    pub fn frame(&self) -> FrameSnapshot {
        FrameSnapshot {
            step: self.steps,
            sim_time: self.sim_time(),
            bodies: self.engine.body_poses(),
        }
    }

    /// Releases the engine. Calling this more than once has no effect.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.queue.clear();
        self.engine.close();
        info!("Simulation closed after {} steps", self.steps);
    }
}
