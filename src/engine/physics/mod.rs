//! Physics stepping primitive, powered by `rapier`.
//!
//! The simulation core only talks to physics through the [`PhysicsEngine`] trait: it asks for
//! name lookups once during initialization, then feeds a control vector into
//! [`PhysicsEngine::step`] once per fixed timestep. The [`RapierEngine`] implements the trait on
//! top of a robot description (see [`crate::model::RobotDescription`]).

pub mod simulator;

pub use simulator::*;

use crate::engine::rendering::BodyPose;
use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Engine-internal joint index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JointIndex(pub usize);

/// Engine-internal actuator index. This is the slot in the control vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActuatorIndex(pub usize);

/// Engine-internal sensor index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SensorIndex(pub usize);

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum EngineError {
    #[snafu(display("Physics state of body '{body}' became non-finite"))]
    NonFinite { body: String },

    #[snafu(display("Control vector has {got} entries, but the model has {expected} actuators"))]
    ControlSize { got: usize, expected: usize },

    #[snafu(display("Invalid robot description: {reason}"))]
    InvalidDescription { reason: String },

    #[snafu(display("The physics engine was already closed"))]
    Closed,
}

/// Gain and limit parameters of a position actuator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActuatorConfig {
    pub torque_enabled: bool,
    /// Offset added to every commanded target
    pub zero_position: f64,
    pub kp: f64,
    pub kd: f64,
    pub max_torque: f64,
}

impl Default for ActuatorConfig {
    fn default() -> Self {
        ActuatorConfig {
            torque_enabled: true,
            zero_position: 0.0,
            kp: 50.0,
            kd: 1.0,
            max_torque: 50.0,
        }
    }
}

/// Partial actuator configuration. Absent fields keep their previous value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ActuatorConfigPatch {
    #[serde(default)]
    pub torque_enabled: Option<bool>,
    #[serde(default)]
    pub zero_position: Option<f64>,
    #[serde(default)]
    pub kp: Option<f64>,
    #[serde(default)]
    pub kd: Option<f64>,
    #[serde(default)]
    pub max_torque: Option<f64>,
}

impl ActuatorConfigPatch {
    pub fn is_empty(&self) -> bool {
        *self == ActuatorConfigPatch::default()
    }

    /// Returns the name of the first field holding an unusable value, if any.
    ///
    /// Gains and the torque limit must be finite and non-negative, the zero position finite.
    pub fn invalid_field(&self) -> Option<&'static str> {
        let non_negative = |v: Option<f64>| v.is_some_and(|v| !v.is_finite() || v < 0.0);

        if self.zero_position.is_some_and(|v| !v.is_finite()) {
            Some("zero_position")
        } else if non_negative(self.kp) {
            Some("kp")
        } else if non_negative(self.kd) {
            Some("kd")
        } else if non_negative(self.max_torque) {
            Some("max_torque")
        } else {
            None
        }
    }

    pub fn apply_to(&self, config: &mut ActuatorConfig) {
        if let Some(torque_enabled) = self.torque_enabled {
            config.torque_enabled = torque_enabled;
        }
        if let Some(zero_position) = self.zero_position {
            config.zero_position = zero_position;
        }
        if let Some(kp) = self.kp {
            config.kp = kp;
        }
        if let Some(kd) = self.kd {
            config.kd = kd;
        }
        if let Some(max_torque) = self.max_torque {
            config.max_torque = max_torque;
        }
    }
}

/// Pose and velocity of the free-floating base body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FreeBodyState {
    pub position: Vector3<f64>,
    pub orientation: UnitQuaternion<f64>,
    pub linvel: Vector3<f64>,
    pub angvel: Vector3<f64>,
}

impl FreeBodyState {
    /// Same pose, zero velocity
    pub fn at_rest(&self) -> FreeBodyState {
        FreeBodyState {
            linvel: Vector3::zeros(),
            angvel: Vector3::zeros(),
            ..*self
        }
    }
}

/// Pose the engine is put into on reset. Joints not listed return to zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResetPose {
    pub base_position: Option<Vector3<f64>>,
    pub base_orientation: Option<UnitQuaternion<f64>>,
    pub joints: Vec<(JointIndex, f64)>,
}

/// The external stepping primitive.
///
/// Implementations are only ever driven from behind the simulation lock, so they don't need any
/// interior synchronization. Indices passed in were handed out by the lookup functions of the same
/// engine.
pub trait PhysicsEngine: Send + 'static {
    /// Fixed timestep in seconds
    fn timestep(&self) -> f64;

    fn actuator_count(&self) -> usize;

    fn joint_index(&self, name: &str) -> Option<JointIndex>;
    fn actuator_index(&self, name: &str) -> Option<ActuatorIndex>;
    fn sensor_index(&self, name: &str) -> Option<SensorIndex>;
    fn sensor_names(&self) -> Vec<String>;

    /// Advances the physics state by exactly one timestep using `ctrl` as actuator targets.
    fn step(&mut self, ctrl: &[f64]) -> Result<(), EngineError>;

    fn joint_position(&self, joint: JointIndex) -> f64;
    fn joint_velocity(&self, joint: JointIndex) -> f64;
    fn sensor_data(&self, sensor: SensorIndex) -> Vec<f64>;

    fn actuator_config(&self, actuator: ActuatorIndex) -> ActuatorConfig;
    fn set_actuator_config(&mut self, actuator: ActuatorIndex, config: ActuatorConfig);

    /// State of the free-floating base, `None` if the model has no such body.
    fn free_body(&self) -> Option<FreeBodyState>;
    fn set_free_body(&mut self, state: &FreeBodyState);

    fn reset(&mut self, pose: Option<&ResetPose>);

    fn body_poses(&self) -> Vec<BodyPose>;

    /// Releases engine resources. Calling this more than once has no effect.
    fn close(&mut self) {}
}
