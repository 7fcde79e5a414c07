use crate::engine::physics::ActuatorConfig;
use serde::{Deserialize, Serialize};

/// Robot description the [`RapierEngine`](crate::engine::RapierEngine) is built from.
///
/// A robot is a tree of box-shaped links rooted at the `base`. Every other link hangs off its
/// parent through a revolute joint. Links must be listed after their parent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotDescription {
    pub name: String,
    pub base: BaseDescription,
    #[serde(default)]
    pub links: Vec<LinkDescription>,
    #[serde(default)]
    pub actuators: Vec<ActuatorDescription>,
    #[serde(default)]
    pub sensors: Vec<SensorDescription>,
    /// Adds a static ground plane at z = 0
    #[serde(default = "default_true")]
    pub ground: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseDescription {
    pub name: String,
    pub half_extents: [f32; 3],
    pub mass: f32,
    #[serde(default)]
    pub position: [f32; 3],
    /// `[w, x, y, z]`
    #[serde(default = "identity_quat")]
    pub orientation: [f32; 4],
    /// A floating base is a free body, otherwise the base is welded to the world.
    #[serde(default = "default_true")]
    pub floating: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkDescription {
    pub name: String,
    pub parent: String,
    pub half_extents: [f32; 3],
    pub mass: f32,
    pub joint: JointDescription,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JointDescription {
    pub name: String,
    /// Rotation axis in the parent link frame
    pub axis: [f32; 3],
    /// Joint location in the parent link frame
    #[serde(default)]
    pub anchor_parent: [f32; 3],
    /// Joint location in the child link frame
    #[serde(default)]
    pub anchor_child: [f32; 3],
    #[serde(default)]
    pub limits: Option<[f32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActuatorDescription {
    pub name: String,
    pub joint: String,
    #[serde(default = "default_kp")]
    pub kp: f64,
    #[serde(default = "default_kd")]
    pub kd: f64,
    #[serde(default = "default_max_torque")]
    pub max_torque: f64,
}

impl ActuatorDescription {
    pub fn config(&self) -> ActuatorConfig {
        ActuatorConfig {
            kp: self.kp,
            kd: self.kd,
            max_torque: self.max_torque,
            ..ActuatorConfig::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// World position of a link
    FramePos,
    /// World orientation of a link, `[w, x, y, z]`
    FrameQuat,
    FrameLinVel,
    /// Angular velocity of a link, what a gyro would read in world coordinates
    FrameAngVel,
    JointPos,
    JointVel,
}

impl SensorKind {
    pub fn targets_joint(&self) -> bool {
        matches!(self, SensorKind::JointPos | SensorKind::JointVel)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorDescription {
    pub name: String,
    pub kind: SensorKind,
    /// Link name for frame sensors, joint name for joint sensors
    pub target: String,
}

impl RobotDescription {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

fn default_true() -> bool {
    true
}

fn identity_quat() -> [f32; 4] {
    [1.0, 0.0, 0.0, 0.0]
}

fn default_kp() -> f64 {
    ActuatorConfig::default().kp
}

fn default_kd() -> f64 {
    ActuatorConfig::default().kd
}

fn default_max_torque() -> f64 {
    ActuatorConfig::default().max_torque
}
