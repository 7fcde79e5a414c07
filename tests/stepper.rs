mod common;

use common::*;
use robosim::SimConfig;
use robosim::engine::physics::{ActuatorConfigPatch, JointIndex};
use robosim::model::{JointMetadata, ModelMetadata};
use robosim::sim::{DelayRange, InitError, InitialPose, SimError, SimWorld};

fn init_error(engine: ScriptedEngine, metadata: &ModelMetadata, config: &SimConfig) -> InitError {
    match SimWorld::new(Box::new(engine), metadata, config) {
        Ok(_) => panic!("initialization should have failed"),
        Err(e) => e,
    }
}

#[test]
fn clock_is_exactly_steps_times_dt() {
    let (mut world, probe) = leg_world(&SimConfig::default());

    for _ in 0..1234 {
        world.advance().unwrap();
    }

    assert_eq!(world.steps(), 1234);
    assert_eq!(world.sim_time(), 1234.0 * DT);
    assert_eq!(probe.lock().unwrap().steps, 1234);
}

#[test]
fn command_is_visible_to_the_next_step() {
    let (mut world, probe) = leg_world(&SimConfig::default());

    world.command_actuators(&[(2, 0.4)]);
    world.advance().unwrap();

    assert_eq!(last_ctrl(&probe), vec![0.0, 0.4, 0.0]);
    assert_eq!(world.actuator_position(2).unwrap(), 0.4);
    assert_eq!(world.pending_commands(), 0);
}

#[test]
fn last_write_wins_for_one_actuator() {
    let config = SimConfig::builder()
        .command_delay(DelayRange::fixed(0.005))
        .build();
    let (mut world, probe) = leg_world(&config);

    world.command_actuators(&[(1, 1.0)]);
    world.command_actuators(&[(1, 2.0)]);
    assert_eq!(world.pending_commands(), 1);

    for _ in 0..8 {
        world.advance().unwrap();
    }

    let history = probe.lock().unwrap().ctrl_history.clone();
    assert!(history.iter().all(|ctrl| ctrl[0] != 1.0));
    assert_eq!(history[3][0], 0.0);
    assert_eq!(history[7][0], 2.0);
}

#[test]
fn delayed_commands_apply_independently() {
    let config = SimConfig::builder()
        .command_delay(DelayRange::fixed(0.003))
        .build();
    let (mut world, probe) = leg_world(&config);

    world.command_actuators(&[(1, 1.0)]);
    world.advance().unwrap();
    world.advance().unwrap();
    world.command_actuators(&[(2, 2.0)]);

    for _ in 0..6 {
        world.advance().unwrap();
    }

    let history = probe.lock().unwrap().ctrl_history.clone();
    // hip is due at 3ms, knee at 5ms
    assert_eq!(history[1], vec![0.0, 0.0, 0.0]);
    assert_eq!(history[3], vec![1.0, 0.0, 0.0]);
    assert_eq!(history[5], vec![1.0, 2.0, 0.0]);
    assert_eq!(world.pending_commands(), 0);
}

#[test]
fn unknown_ids_in_a_batch_are_ignored() {
    let (mut world, probe) = leg_world(&SimConfig::default());

    let outcomes = world.command_actuators(&[(99, 1.0), (3, 2.0), (1, f64::NAN)]);

    let accepted: Vec<_> = outcomes.iter().map(|o| (o.actuator_id, o.accepted)).collect();
    assert_eq!(accepted, vec![(99, false), (3, true), (1, false)]);

    world.advance().unwrap();
    assert_eq!(last_ctrl(&probe), vec![0.0, 0.0, 2.0]);
}

#[test]
fn suspension_restores_the_free_body_after_every_step() {
    let (engine, probe) = leg_engine();
    let config = SimConfig::builder().suspended(true).build();
    let mut world = SimWorld::new(Box::new(engine.floating()), &leg_metadata(), &config).unwrap();
    assert!(world.is_suspended());

    for _ in 0..10 {
        world.advance().unwrap();
        assert_eq!(world.free_body(), Some(initial_free_body()));
    }
    assert_eq!(probe.lock().unwrap().steps, 10);
}

#[test]
fn free_body_moves_without_suspension() {
    let (engine, _probe) = leg_engine();
    let config = SimConfig::default();
    let mut world = SimWorld::new(Box::new(engine.floating()), &leg_metadata(), &config).unwrap();

    for _ in 0..3 {
        world.advance().unwrap();
    }

    assert_eq!(world.free_body().unwrap().position.z, 4.0);
}

#[test]
fn configure_changes_only_given_fields() {
    let (mut world, _probe) = leg_world(&SimConfig::default());
    let before = world.actuator_config(2).unwrap();

    let patch = ActuatorConfigPatch {
        kp: Some(120.0),
        torque_enabled: Some(false),
        ..ActuatorConfigPatch::default()
    };
    let after = world.configure_actuator(2, &patch).unwrap();

    assert_eq!(after.kp, 120.0);
    assert!(!after.torque_enabled);
    assert_eq!(after.kd, before.kd);
    assert_eq!(after.max_torque, before.max_torque);
    assert_eq!(after.zero_position, before.zero_position);
    assert_eq!(world.actuator_config(2).unwrap(), after);
    assert_eq!(world.actuator_config(1).unwrap(), before);
}

#[test]
fn configure_rejects_unknown_ids_and_bad_values() {
    let (mut world, _probe) = leg_world(&SimConfig::default());

    let err = world
        .configure_actuator(7, &ActuatorConfigPatch::default())
        .unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Joint ID 7 not found in config mappings");

    let patch = ActuatorConfigPatch {
        kd: Some(-1.0),
        ..ActuatorConfigPatch::default()
    };
    assert!(matches!(
        world.configure_actuator(1, &patch),
        Err(SimError::InvalidRequest { .. })
    ));
}

#[test]
fn reads_resolve_ids_and_names() {
    let (mut world, _probe) = leg_world(&SimConfig::default());
    world.advance().unwrap();
    world.advance().unwrap();

    assert_eq!(world.actuator_velocity(2).unwrap(), 0.5);
    assert_eq!(world.sensor_data("imu").unwrap(), vec![2.0]);
    assert!(world.actuator_position(42).unwrap_err().is_not_found());
    assert!(matches!(
        world.sensor_data("lidar"),
        Err(SimError::SensorNotFound { .. })
    ));

    let ids: Vec<_> = world
        .actuator_states(None)
        .unwrap()
        .iter()
        .map(|s| s.actuator_id)
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(world.actuator_states(Some(&[3, 8][..])).is_err());
}

#[test]
fn reset_rewinds_clock_and_drops_pending_commands() {
    let config = SimConfig::builder()
        .command_delay(DelayRange::fixed(1.0))
        .build();
    let (mut world, probe) = leg_world(&config);

    world.command_actuators(&[(1, 0.5)]);
    for _ in 0..3 {
        world.advance().unwrap();
    }

    let pose = InitialPose {
        joints: vec![(2, 0.3)],
        ..InitialPose::default()
    };
    world.reset(Some(&pose)).unwrap();

    assert_eq!(world.steps(), 0);
    assert_eq!(world.sim_time(), 0.0);
    assert_eq!(world.pending_commands(), 0);
    assert_eq!(world.ctrl(), &[0.0, 0.3, 0.0]);
    assert_eq!(world.actuator_position(2).unwrap(), 0.3);

    let resets = probe.lock().unwrap().resets.clone();
    assert_eq!(resets.len(), 1);
    assert_eq!(resets[0].as_ref().unwrap().joints, vec![(JointIndex(1), 0.3)]);
}

#[test]
fn reset_with_unknown_joint_changes_nothing() {
    let (mut world, probe) = leg_world(&SimConfig::default());
    world.advance().unwrap();

    let pose = InitialPose {
        joints: vec![(9, 0.1)],
        ..InitialPose::default()
    };
    assert!(world.reset(Some(&pose)).unwrap_err().is_not_found());
    assert_eq!(world.steps(), 1);
    assert!(probe.lock().unwrap().resets.is_empty());
}

#[test]
fn close_is_idempotent() {
    let (mut world, probe) = leg_world(&SimConfig::default());

    world.close();
    world.close();

    assert_eq!(probe.lock().unwrap().closes, 1);
    assert!(matches!(world.advance(), Err(SimError::ShuttingDown)));
}

#[test]
fn duplicate_joint_ids_fail_initialization() {
    let (engine, _) = leg_engine();
    let metadata = ModelMetadata::with_joints(50.0, [("hip", 1), ("knee", 1)]);

    let err = init_error(engine, &metadata, &SimConfig::default());
    assert!(matches!(
        err,
        InitError::DuplicateJointId { id: 1, ref first, ref second } if first == "hip" && second == "knee"
    ));
}

#[test]
fn incomplete_metadata_fails_initialization() {
    let config = SimConfig::default();

    let metadata = ModelMetadata {
        control_frequency: None,
        ..leg_metadata()
    };
    assert!(matches!(
        init_error(leg_engine().0, &metadata, &config),
        InitError::MissingControlFrequency
    ));

    let metadata = ModelMetadata {
        joint_name_to_metadata: None,
        ..leg_metadata()
    };
    assert!(matches!(
        init_error(leg_engine().0, &metadata, &config),
        InitError::MissingJointTable
    ));

    let mut metadata = leg_metadata();
    if let Some(table) = metadata.joint_name_to_metadata.as_mut() {
        table.insert("knee".to_string(), JointMetadata { id: None });
    }
    assert!(matches!(
        init_error(leg_engine().0, &metadata, &config),
        InitError::MissingJointId { .. }
    ));

    let metadata = ModelMetadata::with_joints(50.0, [("hip", 1), ("elbow", 2)]);
    assert!(matches!(
        init_error(leg_engine().0, &metadata, &config),
        InitError::UnknownJoint { .. }
    ));
}

#[test]
fn missing_actuator_fails_initialization() {
    let engine = leg_engine().0.without_actuator("knee");

    let err = init_error(engine, &leg_metadata(), &SimConfig::default());
    assert!(matches!(
        err,
        InitError::UnresolvedActuator { ref actuator, .. } if actuator == "knee_ctrl"
    ));
}

#[test]
fn control_period_must_cover_a_step() {
    let metadata = ModelMetadata::with_joints(2000.0, [("hip", 1)]);

    assert!(matches!(
        init_error(leg_engine().0, &metadata, &SimConfig::default()),
        InitError::DecimationTooSmall { .. }
    ));

    let engine = leg_engine().0.with_dt(0.0078125);
    let metadata = ModelMetadata::with_joints(16.0, [("hip", 1)]);
    let world = SimWorld::new(Box::new(engine), &metadata, &SimConfig::default()).unwrap();
    assert_eq!(world.decimation(), 8);
}

#[test]
fn invalid_delay_range_fails_initialization() {
    let config = SimConfig::builder()
        .command_delay(DelayRange::new(0.01, 0.001))
        .build();

    assert!(matches!(
        init_error(leg_engine().0, &leg_metadata(), &config),
        InitError::InvalidDelayRange { .. }
    ));
}

#[test]
fn timestep_below_a_nanosecond_fails_initialization() {
    let engine = leg_engine().0.with_dt(1e-10);

    assert!(matches!(
        init_error(engine, &leg_metadata(), &SimConfig::default()),
        InitError::TimestepBelowResolution { .. }
    ));

    let engine = leg_engine().0.with_dt(1e-9);
    let world = SimWorld::new(Box::new(engine), &leg_metadata(), &SimConfig::default()).unwrap();
    assert_eq!(world.wall_timestep(), std::time::Duration::from_nanos(1));
}
