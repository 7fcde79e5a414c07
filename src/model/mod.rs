//! Model metadata and robot descriptions, and the on-disk artifact cache they are read from.

pub mod artifacts;
pub mod description;

pub use artifacts::*;
pub use description::*;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-joint metadata. Only the externally-visible ID is consumed, other fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointMetadata {
    #[serde(default)]
    pub id: Option<u32>,
}

/// Model metadata describing how the robot is exposed to remote callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub control_frequency: Option<f64>,
    #[serde(default)]
    pub joint_name_to_metadata: Option<BTreeMap<String, JointMetadata>>,
}

impl ModelMetadata {
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Convenience constructor mapping joint names to IDs
    pub fn with_joints<'a, I>(control_frequency: f64, joints: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, u32)>,
    {
        let joints = joints
            .into_iter()
            .map(|(name, id)| (name.to_string(), JointMetadata { id: Some(id) }))
            .collect();

        ModelMetadata {
            control_frequency: Some(control_frequency),
            joint_name_to_metadata: Some(joints),
        }
    }
}
