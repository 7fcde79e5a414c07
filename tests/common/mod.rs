#![allow(dead_code)]

use nalgebra::{UnitQuaternion, Vector3};
use robosim::SimConfig;
use robosim::engine::physics::*;
use robosim::engine::rendering::BodyPose;
use robosim::model::ModelMetadata;
use robosim::sim::{SimWorld, Simulation};
use std::sync::{Arc, Mutex};

pub const DT: f64 = 0.001;

/// What the scripted engine saw, shared with the test after the engine got boxed.
#[derive(Debug, Default)]
pub struct Probe {
    pub ctrl_history: Vec<Vec<f64>>,
    pub steps: u64,
    pub resets: Vec<Option<ResetPose>>,
    pub closes: u32,
    pub free_body: Option<FreeBodyState>,
}

pub type SharedProbe = Arc<Mutex<Probe>>;

/// Engine double with `joints.len()` joints, one `<joint>_ctrl` actuator per joint and a single
/// `imu` sensor reporting the step count. Joints track their control target perfectly. A floating
/// base drifts upwards by one unit per step.
pub struct ScriptedEngine {
    joints: Vec<String>,
    configs: Vec<ActuatorConfig>,
    positions: Vec<f64>,
    probe: SharedProbe,
    dt: f64,
    floating: bool,
    fail_at: Option<u64>,
    without_actuator: Option<String>,
    closed: bool,
}

impl ScriptedEngine {
    pub fn new(joints: &[&str]) -> (Self, SharedProbe) {
        let probe = SharedProbe::default();
        let engine = ScriptedEngine {
            joints: joints.iter().map(|j| j.to_string()).collect(),
            configs: vec![ActuatorConfig::default(); joints.len()],
            positions: vec![0.0; joints.len()],
            probe: probe.clone(),
            dt: DT,
            floating: false,
            fail_at: None,
            without_actuator: None,
            closed: false,
        };
        (engine, probe)
    }

    pub fn floating(mut self) -> Self {
        self.floating = true;
        self.probe.lock().unwrap().free_body = Some(initial_free_body());
        self
    }

    /// Makes the `n`-th step (1-based) fail with a non-finite state.
    pub fn failing_at(mut self, n: u64) -> Self {
        self.fail_at = Some(n);
        self
    }

    /// Leaves `joint` without an actuator.
    pub fn without_actuator(mut self, joint: &str) -> Self {
        self.without_actuator = Some(joint.to_string());
        self
    }

    pub fn with_dt(mut self, dt: f64) -> Self {
        self.dt = dt;
        self
    }
}

pub fn initial_free_body() -> FreeBodyState {
    FreeBodyState {
        position: Vector3::new(0.0, 0.0, 1.0),
        orientation: UnitQuaternion::identity(),
        linvel: Vector3::zeros(),
        angvel: Vector3::zeros(),
    }
}

impl PhysicsEngine for ScriptedEngine {
    fn timestep(&self) -> f64 {
        self.dt
    }

    fn actuator_count(&self) -> usize {
        self.joints.len()
    }

    fn joint_index(&self, name: &str) -> Option<JointIndex> {
        self.joints.iter().position(|j| j == name).map(JointIndex)
    }

    fn actuator_index(&self, name: &str) -> Option<ActuatorIndex> {
        let joint = name.strip_suffix("_ctrl")?;
        if self.without_actuator.as_deref() == Some(joint) {
            return None;
        }
        self.joints.iter().position(|j| j == joint).map(ActuatorIndex)
    }

    fn sensor_index(&self, name: &str) -> Option<SensorIndex> {
        (name == "imu").then_some(SensorIndex(0))
    }

    fn sensor_names(&self) -> Vec<String> {
        vec!["imu".to_string()]
    }

    fn step(&mut self, ctrl: &[f64]) -> Result<(), EngineError> {
        if self.closed {
            return Err(EngineError::Closed);
        }

        let mut probe = self.probe.lock().unwrap();
        if self.fail_at == Some(probe.steps + 1) {
            return Err(EngineError::NonFinite {
                body: "base".to_string(),
            });
        }

        probe.steps += 1;
        probe.ctrl_history.push(ctrl.to_vec());
        for (position, (target, config)) in self.positions.iter_mut().zip(ctrl.iter().zip(&self.configs)) {
            *position = target + config.zero_position;
        }
        if let Some(body) = probe.free_body.as_mut() {
            body.position.z += 1.0;
            body.linvel.z = 1.0;
        }

        Ok(())
    }

    fn joint_position(&self, joint: JointIndex) -> f64 {
        self.positions[joint.0]
    }

    fn joint_velocity(&self, joint: JointIndex) -> f64 {
        joint.0 as f64 * 0.5
    }

    fn sensor_data(&self, _sensor: SensorIndex) -> Vec<f64> {
        vec![self.probe.lock().unwrap().steps as f64]
    }

    fn actuator_config(&self, actuator: ActuatorIndex) -> ActuatorConfig {
        self.configs[actuator.0]
    }

    fn set_actuator_config(&mut self, actuator: ActuatorIndex, config: ActuatorConfig) {
        self.configs[actuator.0] = config;
    }

    fn free_body(&self) -> Option<FreeBodyState> {
        if !self.floating {
            return None;
        }
        self.probe.lock().unwrap().free_body
    }

    fn set_free_body(&mut self, state: &FreeBodyState) {
        if self.floating {
            self.probe.lock().unwrap().free_body = Some(*state);
        }
    }

    fn reset(&mut self, pose: Option<&ResetPose>) {
        self.positions.iter_mut().for_each(|p| *p = 0.0);
        if let Some(pose) = pose {
            for &(joint, position) in &pose.joints {
                self.positions[joint.0] = position;
            }
        }

        let mut probe = self.probe.lock().unwrap();
        probe.resets.push(pose.cloned());
        if self.floating {
            probe.free_body = Some(initial_free_body());
        }
    }

    fn body_poses(&self) -> Vec<BodyPose> {
        Vec::new()
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.probe.lock().unwrap().closes += 1;
        }
    }
}

/// Metadata at 50 Hz mapping `hip` to 1, `knee` to 2 and `ankle` to 3.
pub fn leg_metadata() -> ModelMetadata {
    ModelMetadata::with_joints(50.0, [("hip", 1), ("knee", 2), ("ankle", 3)])
}

pub fn leg_engine() -> (ScriptedEngine, SharedProbe) {
    ScriptedEngine::new(&["hip", "knee", "ankle"])
}

pub fn leg_world(config: &SimConfig) -> (SimWorld, SharedProbe) {
    let (engine, probe) = leg_engine();
    let world = SimWorld::new(Box::new(engine), &leg_metadata(), config).unwrap();
    (world, probe)
}

pub fn leg_simulation(config: &SimConfig) -> (Simulation, SharedProbe) {
    let (world, probe) = leg_world(config);
    (Simulation::new(world, config.step_mode), probe)
}

/// Control vector the engine received on its last step
pub fn last_ctrl(probe: &SharedProbe) -> Vec<f64> {
    probe
        .lock()
        .unwrap()
        .ctrl_history
        .last()
        .cloned()
        .unwrap_or_default()
}
