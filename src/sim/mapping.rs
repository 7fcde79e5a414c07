use crate::engine::physics::{ActuatorIndex, JointIndex, PhysicsEngine};
use crate::model::ModelMetadata;
use crate::sim::error::*;
use snafu::{OptionExt, ensure};
use std::collections::{BTreeMap, HashSet};

/// Externally-visible joint identifier, as listed in the model metadata.
pub type JointId = u32;

/// Actuators are named after the joint they drive, plus this suffix.
pub const ACTUATOR_SUFFIX: &str = "_ctrl";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedJoint {
    pub name: String,
    pub joint: JointIndex,
    pub actuator: ActuatorIndex,
}

/// Bijection between external joint IDs and engine joint/actuator handles.
///
/// Built once from model metadata and immutable afterwards.
#[derive(Debug, Clone, Default)]
pub struct JointMap {
    joints: BTreeMap<JointId, MappedJoint>,
}

impl JointMap {
    pub fn build(metadata: &ModelMetadata, engine: &dyn PhysicsEngine) -> Result<Self, InitError> {
        let table = metadata
            .joint_name_to_metadata
            .as_ref()
            .context(MissingJointTableErr)?;

        let mut joints: BTreeMap<JointId, MappedJoint> = BTreeMap::new();
        let mut seen_joints = HashSet::new();
        let mut seen_actuators = HashSet::new();

        for (name, meta) in table {
            let id = meta.id.context(MissingJointIdErr { joint: name })?;

            if let Some(existing) = joints.get(&id) {
                return DuplicateJointIdErr {
                    id,
                    first: &existing.name,
                    second: name,
                }
                .fail();
            }

            let joint = engine
                .joint_index(name)
                .context(UnknownJointErr { joint: name })?;
            let actuator_name = format!("{name}{ACTUATOR_SUFFIX}");
            let actuator = engine
                .actuator_index(&actuator_name)
                .context(UnresolvedActuatorErr {
                    joint: name,
                    actuator: &actuator_name,
                })?;

            ensure!(
                seen_joints.insert(joint) && seen_actuators.insert(actuator),
                SharedHandleErr { joint: name }
            );

            joints.insert(
                id,
                MappedJoint {
                    name: name.clone(),
                    joint,
                    actuator,
                },
            );
        }

        Ok(JointMap { joints })
    }

    pub fn get(&self, id: JointId) -> Option<&MappedJoint> {
        self.joints.get(&id)
    }

    /// IDs in ascending order
    pub fn ids(&self) -> impl Iterator<Item = JointId> + '_ {
        self.joints.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (JointId, &MappedJoint)> {
        self.joints.iter().map(|(&id, joint)| (id, joint))
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }
}
