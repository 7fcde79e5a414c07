use crate::engine::physics::{ActuatorConfig, ActuatorConfigPatch, EngineError};
use crate::engine::rendering::FrameSnapshot;
use crate::sim::controller::{ControllerState, StepController, StepMode, StepOutcome};
use crate::sim::error::{ShuttingDownErr, SimError};
use crate::sim::mapping::JointId;
use crate::sim::world::{ActuatorState, CommandOutcome, InitialPose, SimWorld};
use crate::utils::{StepStats, StepStatsSnapshot};
use serde::Serialize;
use snafu::ensure;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, watch};
use tracing::{debug, info};

/// Point-in-time view of the simulation for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimStatus {
    pub mode: StepMode,
    pub state: ControllerState,
    pub sim_time: f64,
    pub steps: u64,
    pub dt: f64,
    pub decimation: u64,
    pub pending_commands: usize,
    pub armed_steps: u64,
    pub suspended: bool,
    pub stats: StepStatsSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuatorInfo {
    pub actuator_id: JointId,
    pub joint: String,
    pub config: ActuatorConfig,
}

pub(crate) struct SimCore {
    pub world: SimWorld,
    pub controller: StepController,
    pub stats: StepStats,
}

impl SimCore {
    fn ensure_open(&self) -> Result<(), SimError> {
        ensure!(!self.world.is_closed(), ShuttingDownErr);
        Ok(())
    }

    /// Runs one step if the controller allows it.
    ///
    /// Returns `Ok(false)` without stepping when the loop should stop catching up.
    pub(crate) fn step_once(&mut self, mode: StepMode) -> Result<bool, EngineError> {
        if self.world.is_closed() || self.controller.mode() != mode {
            return Ok(false);
        }

        if !self.controller.should_step() {
            return Ok(false);
        }

        match self.world.advance() {
            Ok(()) => {}
            Err(SimError::Engine { source }) => return Err(source),
            Err(_) => return Ok(false),
        }

        self.controller.complete_step();
        Ok(true)
    }
}

/// Shared handle to a running simulation.
///
/// Every operation takes the simulation lock for its own duration only. The lock is a FIFO-fair
/// tokio mutex, so remote calls and the pacing loop are served in arrival order, and dropping a
/// pending operation never leaves the lock held.
#[derive(Clone)]
pub struct Simulation {
    core: Arc<Mutex<SimCore>>,
    stop_tx: Arc<watch::Sender<bool>>,
}

impl Simulation {
    pub fn new(world: SimWorld, mode: StepMode) -> Self {
        let (stop_tx, _) = watch::channel(false);
        info!("Starting in {mode:?} step mode");

        Simulation {
            core: Arc::new(Mutex::new(SimCore {
                world,
                controller: StepController::new(mode),
                stats: StepStats::default(),
            })),
            stop_tx: Arc::new(stop_tx),
        }
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, SimCore> {
        self.core.lock().await
    }

    async fn lock_open(&self) -> Result<MutexGuard<'_, SimCore>, SimError> {
        let core = self.core.lock().await;
        core.ensure_open()?;
        Ok(core)
    }

    /// Resolves to `true` once shutdown was requested.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.stop_tx.subscribe()
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    pub async fn command_actuators(
        &self,
        commands: &[(JointId, f64)],
    ) -> Result<Vec<CommandOutcome>, SimError> {
        let mut core = self.lock_open().await?;
        Ok(core.world.command_actuators(commands))
    }

    pub async fn configure_actuator(
        &self,
        id: JointId,
        patch: ActuatorConfigPatch,
    ) -> Result<ActuatorConfig, SimError> {
        let mut core = self.lock_open().await?;
        core.world.configure_actuator(id, &patch)
    }

    pub async fn actuator_position(&self, id: JointId) -> Result<f64, SimError> {
        self.lock_open().await?.world.actuator_position(id)
    }

    pub async fn actuator_velocity(&self, id: JointId) -> Result<f64, SimError> {
        self.lock_open().await?.world.actuator_velocity(id)
    }

    pub async fn actuator_states(
        &self,
        ids: Option<Vec<JointId>>,
    ) -> Result<Vec<ActuatorState>, SimError> {
        self.lock_open()
            .await?
            .world
            .actuator_states(ids.as_deref())
    }

    pub async fn actuators(&self) -> Result<Vec<ActuatorInfo>, SimError> {
        let core = self.lock_open().await?;
        core.world
            .joints()
            .iter()
            .map(|(actuator_id, joint)| {
                Ok(ActuatorInfo {
                    actuator_id,
                    joint: joint.name.clone(),
                    config: core.world.actuator_config(actuator_id)?,
                })
            })
            .collect()
    }

    pub async fn sensor_data(&self, name: &str) -> Result<Vec<f64>, SimError> {
        self.lock_open().await?.world.sensor_data(name)
    }

    pub async fn sensor_names(&self) -> Result<Vec<String>, SimError> {
        Ok(self.lock_open().await?.world.sensor_names())
    }

    pub async fn step_mode(&self) -> StepMode {
        self.core.lock().await.controller.mode()
    }

    pub async fn set_step_mode(&self, mode: StepMode) -> Result<(), SimError> {
        let mut core = self.lock_open().await?;
        core.controller.set_mode(mode);
        Ok(())
    }

    /// Arms `steps` manual steps and waits until the pacing loop ran all of them.
    ///
    /// The lock is released while waiting, so the loop and other callers make progress.
    pub async fn step(&self, steps: u64) -> Result<StepOutcome, SimError> {
        let rx = {
            let mut core = self.lock_open().await?;
            core.controller.request_steps(steps)?
        };
        debug!("Waiting for {steps} manual steps");

        rx.await.map_err(|_| SimError::ShuttingDown)
    }

    pub async fn reset(&self, pose: Option<InitialPose>) -> Result<(), SimError> {
        let mut core = self.lock_open().await?;
        core.world.reset(pose.as_ref())
    }

    pub async fn status(&self) -> SimStatus {
        let core = self.core.lock().await;
        SimStatus {
            mode: core.controller.mode(),
            state: core.controller.state(),
            sim_time: core.world.sim_time(),
            steps: core.world.steps(),
            dt: core.world.dt(),
            decimation: core.world.decimation(),
            pending_commands: core.world.pending_commands(),
            armed_steps: core.controller.remaining_steps(),
            suspended: core.world.is_suspended(),
            stats: core.stats.snapshot(),
        }
    }

    pub async fn frame(&self) -> FrameSnapshot {
        self.core.lock().await.world.frame()
    }

    /// Stops the pacing loop and releases the engine.
    ///
    /// Waits for an in-flight step to finish. Calling this more than once has no effect.
    pub async fn shutdown(&self) {
        self.stop_tx.send_replace(true);

        let mut core = self.core.lock().await;
        if core.world.is_closed() {
            return;
        }
        // wake anybody still waiting on manual steps
        core.controller.set_mode(StepMode::Manual);
        core.world.close();
    }
}
