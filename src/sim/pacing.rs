use crate::engine::physics::EngineError;
use crate::engine::rendering::Renderer;
use crate::sim::controller::StepMode;
use crate::sim::simulation::Simulation;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, trace, warn};
use web_time::Instant;

/// Drives a [`Simulation`] with wall-clock time.
///
/// Each tick converts the wall time that passed since the previous tick into whole timesteps. The
/// part smaller than one timestep is carried over, so no time is lost or gained over a run.
pub struct PacingLoop {
    sim: Simulation,
    renderer: Box<dyn Renderer>,
    sleep_time: Duration,
    dt: Duration,
    owed: Duration,
    stop: watch::Receiver<bool>,
    closed: bool,
}

impl PacingLoop {
    pub async fn new(sim: Simulation, renderer: Box<dyn Renderer>, sleep_time: Duration) -> Self {
        let dt = sim.lock().await.world.wall_timestep();
        let stop = sim.stop_signal();

        PacingLoop {
            sim,
            renderer,
            sleep_time,
            dt,
            owed: Duration::ZERO,
            stop,
            closed: false,
        }
    }

    /// Wall time owed to the simulation that is smaller than one step
    pub fn owed(&self) -> Duration {
        self.owed
    }

    /// Runs one loop iteration for `elapsed` wall time and returns the number of steps taken.
    ///
    /// The simulation lock is taken once per step, so remote calls interleave with catch-up.
    pub async fn tick(&mut self, elapsed: Duration) -> Result<usize, EngineError> {
        let mode = self.sim.step_mode().await;
        let mut steps = 0;

        match mode {
            StepMode::Continuous => {
                self.owed += elapsed;
                while self.owed >= self.dt {
                    if !self.sim.lock().await.step_once(mode)? {
                        break;
                    }
                    self.owed -= self.dt;
                    steps += 1;
                }
            }
            StepMode::Manual => {
                self.owed = Duration::ZERO;
                while self.sim.lock().await.step_once(mode)? {
                    steps += 1;
                }
            }
        }

        {
            let mut core = self.sim.lock().await;
            core.stats.record(steps);
            if steps > 0 {
                trace!(
                    "{steps} steps this iteration, {:.2} on average",
                    core.stats.mean_steps()
                );
            }
        }

        if self.renderer.is_enabled() {
            let frame = self.sim.frame().await;
            if let Err(e) = self.renderer.draw(frame) {
                warn!("Skipped frame: {e}");
            }
        }

        Ok(steps)
    }

    /// Runs until the simulation is shut down or a step fails, then closes everything once.
    pub async fn run(mut self) {
        info!("Pacing loop started");
        let mut last_update = Instant::now();

        loop {
            if *self.stop.borrow_and_update() {
                break;
            }

            let now = Instant::now();
            let elapsed = now.duration_since(last_update);
            last_update = now;

            if let Err(e) = self.tick(elapsed).await {
                error!("Simulation step failed: {e}");
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.sleep_time) => {}
                _ = self.stop.changed() => {}
            }
        }

        self.shutdown().await;
    }

    pub async fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.sim.shutdown().await;
        self.renderer.close();
        info!("Pacing loop stopped");
    }
}
