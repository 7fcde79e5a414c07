use crate::engine::physics::{
    ActuatorConfig, ActuatorIndex, ClosedErr, ControlSizeErr, EngineError, FreeBodyState,
    InvalidDescriptionErr, JointIndex, NonFiniteErr, PhysicsEngine, ResetPose, SensorIndex,
};
use crate::engine::rendering::BodyPose;
use crate::model::{RobotDescription, SensorKind};
use bon::Builder;
use rapier3d::na::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use rapier3d::prelude::*;
use snafu::ensure;
use std::collections::HashMap;
use tracing::{debug, info};

const EARTH_GRAVITY: f32 = 9.81;
const GROUND_HALF_EXTENT: f32 = 50.0;
const GROUND_THICKNESS: f32 = 0.5;

#[derive(Debug, Clone, Copy, Builder)]
pub struct EngineSettings {
    #[builder(default = 0.001)]
    pub dt: f64,
    #[builder(default = true)]
    pub gravity: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings::builder().build()
    }
}

struct Link {
    name: String,
    body: RigidBodyHandle,
    parent: Option<usize>,
    joint: Option<usize>,
}

struct Joint {
    name: String,
    handle: ImpulseJointHandle,
    parent: RigidBodyHandle,
    child: RigidBodyHandle,
    /// Unit axis in the parent frame
    axis: Vector3<f32>,
    anchor_parent: Vector3<f32>,
    anchor_child: Vector3<f32>,
}

struct Actuator {
    name: String,
    joint: usize,
    config: ActuatorConfig,
}

enum SensorTarget {
    Link(usize),
    Joint(usize),
}

struct Sensor {
    name: String,
    kind: SensorKind,
    target: SensorTarget,
}

/// [`PhysicsEngine`] implementation on top of rapier impulse joints.
///
/// Every actuator drives its joint motor as a PD position controller: the commanded target plus
/// the configured zero position is the motor target, `kp` and `kd` are the motor stiffness and
/// damping, and `max_torque` bounds the motor force.
pub struct RapierEngine {
    gravity: Vector3<f32>,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: BroadPhaseBvh,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,

    dt: f64,
    base_pose: Isometry3<f32>,
    floating_base: bool,
    links: Vec<Link>,
    joints: Vec<Joint>,
    actuators: Vec<Actuator>,
    sensors: Vec<Sensor>,
    joint_lookup: HashMap<String, usize>,
    actuator_lookup: HashMap<String, usize>,
    sensor_lookup: HashMap<String, usize>,
    closed: bool,
}

fn invalid(reason: impl Into<String>) -> EngineError {
    EngineError::InvalidDescription {
        reason: reason.into(),
    }
}

fn vec3(v: [f32; 3]) -> Vector3<f32> {
    Vector3::new(v[0], v[1], v[2])
}

fn is_finite_vec(v: &Vector3<f32>) -> bool {
    v.iter().all(|c| c.is_finite())
}

impl RapierEngine {
    pub fn new(
        description: &RobotDescription,
        settings: EngineSettings,
    ) -> Result<RapierEngine, EngineError> {
        ensure!(
            settings.dt.is_finite() && settings.dt > 0.0,
            InvalidDescriptionErr {
                reason: format!("timestep must be positive, got {}", settings.dt)
            }
        );

        let gravity = if settings.gravity {
            Vector3::new(0.0, 0.0, -EARTH_GRAVITY)
        } else {
            Vector3::zeros()
        };

        let mut integration_parameters = IntegrationParameters::default();
        integration_parameters.dt = settings.dt as f32;

        let mut engine = RapierEngine {
            gravity,
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: BroadPhaseBvh::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            dt: settings.dt,
            base_pose: Isometry3::identity(),
            floating_base: description.base.floating,
            links: Vec::new(),
            joints: Vec::new(),
            actuators: Vec::new(),
            sensors: Vec::new(),
            joint_lookup: HashMap::new(),
            actuator_lookup: HashMap::new(),
            sensor_lookup: HashMap::new(),
            closed: false,
        };

        if description.ground {
            engine.insert_ground();
        }
        engine.insert_links(description)?;
        engine.insert_actuators(description)?;
        engine.insert_sensors(description)?;

        info!(
            "Built '{}' with {} links, {} actuators and {} sensors",
            description.name,
            engine.links.len(),
            engine.actuators.len(),
            engine.sensors.len()
        );

        Ok(engine)
    }

    fn insert_ground(&mut self) {
        let ground = self.rigid_body_set.insert(RigidBodyBuilder::fixed().build());
        let collider = ColliderBuilder::cuboid(GROUND_HALF_EXTENT, GROUND_HALF_EXTENT, GROUND_THICKNESS)
            .translation(Vector3::new(0.0, 0.0, -GROUND_THICKNESS))
            .friction(1.0)
            .build();
        self.collider_set
            .insert_with_parent(collider, ground, &mut self.rigid_body_set);
    }

    fn insert_box(&mut self, half_extents: [f32; 3], mass: f32, pose: Isometry3<f32>, fixed: bool) -> RigidBodyHandle {
        let builder = if fixed {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic()
        };
        let handle = self
            .rigid_body_set
            .insert(builder.translation(pose.translation.vector).build());
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_rotation(pose.rotation, false);
        }

        let collider = ColliderBuilder::cuboid(half_extents[0], half_extents[1], half_extents[2])
            .mass(mass)
            .friction(1.0)
            .build();
        self.collider_set
            .insert_with_parent(collider, handle, &mut self.rigid_body_set);

        handle
    }

    fn insert_links(&mut self, description: &RobotDescription) -> Result<(), EngineError> {
        let base = &description.base;
        let [w, x, y, z] = base.orientation;
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z));
        self.base_pose = Isometry3::from_parts(Translation3::from(vec3(base.position)), rotation);

        let base_body = self.insert_box(base.half_extents, base.mass, self.base_pose, !base.floating);
        let mut link_lookup = HashMap::from([(base.name.clone(), 0usize)]);
        let mut poses = vec![self.base_pose];
        self.links.push(Link {
            name: base.name.clone(),
            body: base_body,
            parent: None,
            joint: None,
        });

        for link in &description.links {
            ensure!(
                !link_lookup.contains_key(&link.name),
                InvalidDescriptionErr {
                    reason: format!("link '{}' is defined twice", link.name)
                }
            );
            let parent = *link_lookup.get(&link.parent).ok_or_else(|| {
                invalid(format!(
                    "link '{}' references unknown parent '{}' (parents must be listed first)",
                    link.name, link.parent
                ))
            })?;
            ensure!(
                !self.joint_lookup.contains_key(&link.joint.name),
                InvalidDescriptionErr {
                    reason: format!("joint '{}' is defined twice", link.joint.name)
                }
            );

            let axis = vec3(link.joint.axis);
            let axis_norm = axis.norm();
            ensure!(
                axis_norm.is_finite() && axis_norm > 0.0,
                InvalidDescriptionErr {
                    reason: format!("joint '{}' has a degenerate axis", link.joint.name)
                }
            );
            let axis = axis / axis_norm;
            let anchor_parent = vec3(link.joint.anchor_parent);
            let anchor_child = vec3(link.joint.anchor_child);

            let parent_pose = poses[parent];
            let pose = child_pose(&parent_pose, &axis, &anchor_parent, &anchor_child, 0.0);
            let parent_body = self.links[parent].body;
            let body = self.insert_box(link.half_extents, link.mass, pose, false);

            let mut joint = RevoluteJointBuilder::new(UnitVector::new_normalize(axis))
                .local_anchor1(Point::from(anchor_parent))
                .local_anchor2(Point::from(anchor_child))
                .contacts_enabled(false);
            if let Some(limits) = link.joint.limits {
                joint = joint.limits(limits);
            }
            let handle = self.impulse_joint_set.insert(parent_body, body, joint, true);
            if let Some(joint) = self.impulse_joint_set.get_mut(handle, false) {
                joint
                    .data
                    .set_motor_model(JointAxis::AngX, MotorModel::ForceBased);
                joint.data.set_motor_max_force(JointAxis::AngX, 0.0);
            }

            let joint_index = self.joints.len();
            self.joints.push(Joint {
                name: link.joint.name.clone(),
                handle,
                parent: parent_body,
                child: body,
                axis,
                anchor_parent,
                anchor_child,
            });
            self.joint_lookup.insert(link.joint.name.clone(), joint_index);

            link_lookup.insert(link.name.clone(), self.links.len());
            poses.push(pose);
            self.links.push(Link {
                name: link.name.clone(),
                body,
                parent: Some(parent),
                joint: Some(joint_index),
            });
        }

        Ok(())
    }

    fn insert_actuators(&mut self, description: &RobotDescription) -> Result<(), EngineError> {
        for actuator in &description.actuators {
            ensure!(
                !self.actuator_lookup.contains_key(&actuator.name),
                InvalidDescriptionErr {
                    reason: format!("actuator '{}' is defined twice", actuator.name)
                }
            );
            let joint = *self.joint_lookup.get(&actuator.joint).ok_or_else(|| {
                invalid(format!(
                    "actuator '{}' drives unknown joint '{}'",
                    actuator.name, actuator.joint
                ))
            })?;

            self.actuator_lookup
                .insert(actuator.name.clone(), self.actuators.len());
            self.actuators.push(Actuator {
                name: actuator.name.clone(),
                joint,
                config: actuator.config(),
            });
        }

        Ok(())
    }

    fn insert_sensors(&mut self, description: &RobotDescription) -> Result<(), EngineError> {
        let link_lookup: HashMap<&str, usize> = self
            .links
            .iter()
            .enumerate()
            .map(|(i, link)| (link.name.as_str(), i))
            .collect();

        for sensor in &description.sensors {
            ensure!(
                !self.sensor_lookup.contains_key(&sensor.name),
                InvalidDescriptionErr {
                    reason: format!("sensor '{}' is defined twice", sensor.name)
                }
            );

            let target = if sensor.kind.targets_joint() {
                self.joint_lookup
                    .get(&sensor.target)
                    .map(|&j| SensorTarget::Joint(j))
            } else {
                link_lookup
                    .get(sensor.target.as_str())
                    .map(|&l| SensorTarget::Link(l))
            };
            let target = target.ok_or_else(|| {
                invalid(format!(
                    "sensor '{}' targets unknown {} '{}'",
                    sensor.name,
                    if sensor.kind.targets_joint() { "joint" } else { "link" },
                    sensor.target
                ))
            })?;

            self.sensor_lookup
                .insert(sensor.name.clone(), self.sensors.len());
            self.sensors.push(Sensor {
                name: sensor.name.clone(),
                kind: sensor.kind,
                target,
            });
        }

        Ok(())
    }

    fn drive_motors(&mut self, ctrl: &[f64]) {
        for (actuator, &target) in self.actuators.iter().zip(ctrl) {
            let Some(joint) = self.joints.get(actuator.joint) else {
                continue;
            };
            let Some(joint) = self.impulse_joint_set.get_mut(joint.handle, true) else {
                continue;
            };

            let config = &actuator.config;
            let max_force = if config.torque_enabled {
                config.max_torque as f32
            } else {
                0.0
            };
            joint.data.set_motor_position(
                JointAxis::AngX,
                (target + config.zero_position) as f32,
                config.kp as f32,
                config.kd as f32,
            );
            joint.data.set_motor_max_force(JointAxis::AngX, max_force);
        }
    }

    fn check_finite(&self) -> Result<(), EngineError> {
        for link in &self.links {
            let Some(body) = self.rigid_body_set.get(link.body) else {
                continue;
            };
            let finite = is_finite_vec(body.translation())
                && body.rotation().coords.iter().all(|c| c.is_finite())
                && is_finite_vec(body.linvel())
                && is_finite_vec(body.angvel());
            ensure!(finite, NonFiniteErr { body: &link.name });
        }
        Ok(())
    }

    /// Angle and angular rate of a joint, measured about its axis
    fn joint_state(&self, joint: &Joint) -> (f32, f32) {
        let (Some(parent), Some(child)) = (
            self.rigid_body_set.get(joint.parent),
            self.rigid_body_set.get(joint.child),
        ) else {
            return (0.0, 0.0);
        };

        let relative = parent.rotation().inverse() * child.rotation();
        let angle = relative.scaled_axis().dot(&joint.axis);
        let world_axis = parent.rotation() * joint.axis;
        let rate = (child.angvel() - parent.angvel()).dot(&world_axis);

        (angle, rate)
    }

    fn base_body(&self) -> Option<&RigidBody> {
        self.rigid_body_set.get(self.links.first()?.body)
    }
}

/// Pose of a child link hanging off `parent` with the joint rotated by `angle`.
fn child_pose(
    parent: &Isometry3<f32>,
    axis: &Vector3<f32>,
    anchor_parent: &Vector3<f32>,
    anchor_child: &Vector3<f32>,
    angle: f32,
) -> Isometry3<f32> {
    let rotation = parent.rotation * UnitQuaternion::from_scaled_axis(axis * angle);
    let translation =
        parent.translation.vector + parent.rotation * anchor_parent - rotation * anchor_child;
    Isometry3::from_parts(Translation3::from(translation), rotation)
}

impl PhysicsEngine for RapierEngine {
    fn timestep(&self) -> f64 {
        self.dt
    }

    fn actuator_count(&self) -> usize {
        self.actuators.len()
    }

    fn joint_index(&self, name: &str) -> Option<JointIndex> {
        self.joint_lookup.get(name).copied().map(JointIndex)
    }

    fn actuator_index(&self, name: &str) -> Option<ActuatorIndex> {
        self.actuator_lookup.get(name).copied().map(ActuatorIndex)
    }

    fn sensor_index(&self, name: &str) -> Option<SensorIndex> {
        self.sensor_lookup.get(name).copied().map(SensorIndex)
    }

    fn sensor_names(&self) -> Vec<String> {
        self.sensors.iter().map(|s| s.name.clone()).collect()
    }

    fn step(&mut self, ctrl: &[f64]) -> Result<(), EngineError> {
        ensure!(!self.closed, ClosedErr);
        ensure!(
            ctrl.len() == self.actuators.len(),
            ControlSizeErr {
                got: ctrl.len(),
                expected: self.actuators.len()
            }
        );

        self.drive_motors(ctrl);

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(), // no hooks
            &(), // no events
        );

        self.check_finite()
    }

    fn joint_position(&self, joint: JointIndex) -> f64 {
        self.joints
            .get(joint.0)
            .map_or(0.0, |j| self.joint_state(j).0 as f64)
    }

    fn joint_velocity(&self, joint: JointIndex) -> f64 {
        self.joints
            .get(joint.0)
            .map_or(0.0, |j| self.joint_state(j).1 as f64)
    }

    fn sensor_data(&self, sensor: SensorIndex) -> Vec<f64> {
        let Some(sensor) = self.sensors.get(sensor.0) else {
            return Vec::new();
        };

        match sensor.target {
            SensorTarget::Joint(j) => {
                let (angle, rate) = self.joint_state(&self.joints[j]);
                match sensor.kind {
                    SensorKind::JointVel => vec![rate as f64],
                    _ => vec![angle as f64],
                }
            }
            SensorTarget::Link(l) => {
                let Some(body) = self.rigid_body_set.get(self.links[l].body) else {
                    return Vec::new();
                };
                let v = match sensor.kind {
                    SensorKind::FramePos => *body.translation(),
                    SensorKind::FrameLinVel => *body.linvel(),
                    SensorKind::FrameAngVel => *body.angvel(),
                    _ => {
                        let q = body.rotation();
                        return vec![q.w as f64, q.i as f64, q.j as f64, q.k as f64];
                    }
                };
                v.iter().map(|&c| c as f64).collect()
            }
        }
    }

    fn actuator_config(&self, actuator: ActuatorIndex) -> ActuatorConfig {
        self.actuators
            .get(actuator.0)
            .map(|a| a.config)
            .unwrap_or_default()
    }

    fn set_actuator_config(&mut self, actuator: ActuatorIndex, config: ActuatorConfig) {
        if let Some(actuator) = self.actuators.get_mut(actuator.0) {
            let joint = self
                .joints
                .get(actuator.joint)
                .map_or("<none>", |j| j.name.as_str());
            debug!(
                "Actuator {} (joint {joint}) set to kp {} kd {} max torque {} (torque enabled: {})",
                actuator.name, config.kp, config.kd, config.max_torque, config.torque_enabled
            );
            actuator.config = config;
        }
    }

    fn free_body(&self) -> Option<FreeBodyState> {
        if !self.floating_base {
            return None;
        }

        let body = self.base_body()?;
        let t = body.translation();
        let q = body.rotation();
        let linvel = body.linvel();
        let angvel = body.angvel();

        Some(FreeBodyState {
            position: nalgebra::Vector3::new(t.x as f64, t.y as f64, t.z as f64),
            orientation: nalgebra::UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
                q.w as f64, q.i as f64, q.j as f64, q.k as f64,
            )),
            linvel: nalgebra::Vector3::new(linvel.x as f64, linvel.y as f64, linvel.z as f64),
            angvel: nalgebra::Vector3::new(angvel.x as f64, angvel.y as f64, angvel.z as f64),
        })
    }

    fn set_free_body(&mut self, state: &FreeBodyState) {
        if !self.floating_base {
            return;
        }
        let Some(handle) = self.links.first().map(|l| l.body) else {
            return;
        };
        let Some(body) = self.rigid_body_set.get_mut(handle) else {
            return;
        };

        let p = &state.position;
        let q = state.orientation.quaternion();
        let rotation = UnitQuaternion::from_quaternion(Quaternion::new(
            q.w as f32, q.i as f32, q.j as f32, q.k as f32,
        ));
        let translation = Translation3::new(p.x as f32, p.y as f32, p.z as f32);
        let v = &state.linvel;
        let w = &state.angvel;

        body.set_position(Isometry3::from_parts(translation, rotation), true);
        body.set_linvel(Vector3::new(v.x as f32, v.y as f32, v.z as f32), true);
        body.set_angvel(Vector3::new(w.x as f32, w.y as f32, w.z as f32), true);
    }

    fn reset(&mut self, pose: Option<&ResetPose>) {
        let mut base = self.base_pose;
        let mut angles = vec![0.0f32; self.joints.len()];

        if let Some(pose) = pose {
            if let Some(p) = pose.base_position {
                base.translation = Translation3::new(p.x as f32, p.y as f32, p.z as f32);
            }
            if let Some(q) = pose.base_orientation {
                let q = q.quaternion();
                base.rotation = UnitQuaternion::from_quaternion(Quaternion::new(
                    q.w as f32, q.i as f32, q.j as f32, q.k as f32,
                ));
            }
            for &(joint, angle) in &pose.joints {
                if let Some(slot) = angles.get_mut(joint.0) {
                    *slot = angle as f32;
                }
            }
        }

        let mut poses: Vec<Isometry3<f32>> = Vec::with_capacity(self.links.len());
        for link in &self.links {
            let pose = match (link.parent, link.joint) {
                (Some(parent), Some(j)) => {
                    let joint = &self.joints[j];
                    child_pose(
                        &poses[parent],
                        &joint.axis,
                        &joint.anchor_parent,
                        &joint.anchor_child,
                        angles[j],
                    )
                }
                _ => base,
            };
            poses.push(pose);

            if let Some(body) = self.rigid_body_set.get_mut(link.body) {
                body.set_position(pose, true);
                body.set_linvel(Vector3::zeros(), true);
                body.set_angvel(Vector3::zeros(), true);
                body.reset_forces(true);
                body.reset_torques(true);
            }
        }

        debug!("Reset {} links to initial pose", self.links.len());
    }

    fn body_poses(&self) -> Vec<BodyPose> {
        self.links
            .iter()
            .filter_map(|link| {
                let body = self.rigid_body_set.get(link.body)?;
                let t = body.translation();
                let q = body.rotation();
                Some(BodyPose {
                    name: link.name.clone(),
                    position: [t.x, t.y, t.z],
                    orientation: [q.w, q.i, q.j, q.k],
                })
            })
            .collect()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.impulse_joint_set = ImpulseJointSet::new();
        self.collider_set = ColliderSet::new();
        self.rigid_body_set = RigidBodySet::new();
        debug!("Released physics resources");
    }
}
