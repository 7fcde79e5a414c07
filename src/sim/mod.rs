//! The simulation core: state store and stepper, command queue, step controller and the pacing
//! loop, plus the shared [`Simulation`] handle every caller goes through.

pub mod controller;
pub mod error;
pub mod mapping;
pub mod pacing;
pub mod queue;
pub mod simulation;
pub mod world;

pub use controller::{ControllerState, StepController, StepMode, StepOutcome};
pub use error::{InitError, SimError};
pub use mapping::{ACTUATOR_SUFFIX, JointId, JointMap, MappedJoint};
pub use pacing::PacingLoop;
pub use queue::{CommandQueue, DelayRange, DelaySampler, PendingCommand};
pub use simulation::{ActuatorInfo, SimStatus, Simulation};
pub use world::{ActuatorState, CommandOutcome, InitialPose, SimWorld};
