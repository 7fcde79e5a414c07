use crate::engine::physics::EngineError;
use crate::sim::JointId;
use snafu::Snafu;

/// Problems found while building a simulation. Nothing is partially constructed on failure.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum InitError {
    #[snafu(display("Model metadata has no control frequency"))]
    MissingControlFrequency,

    #[snafu(display("Control frequency must be a positive number, got {frequency}"))]
    InvalidControlFrequency { frequency: f64 },

    #[snafu(display("Model metadata has no joint name mapping"))]
    MissingJointTable,

    #[snafu(display("Joint '{joint}' has no ID in the model metadata"))]
    MissingJointId { joint: String },

    #[snafu(display("Joint ID {id} is used by both '{first}' and '{second}'"))]
    DuplicateJointId {
        id: JointId,
        first: String,
        second: String,
    },

    #[snafu(display("Joint '{joint}' does not exist in the physics model"))]
    UnknownJoint { joint: String },

    #[snafu(display("Joint '{joint}' has no actuator named '{actuator}'"))]
    UnresolvedActuator { joint: String, actuator: String },

    #[snafu(display("Joint '{joint}' resolves to an engine handle claimed by another joint"))]
    SharedHandle { joint: String },

    #[snafu(display("Physics timestep must be positive, got {dt}"))]
    InvalidTimestep { dt: f64 },

    #[snafu(display("Physics timestep of {dt}s is shorter than one nanosecond of wall time"))]
    TimestepBelowResolution { dt: f64 },

    #[snafu(display("Command delay range [{min}, {max}] is invalid"))]
    InvalidDelayRange { min: f64, max: f64 },

    #[snafu(display(
        "Control period of {period}s is shorter than the physics timestep of {dt}s"
    ))]
    DecimationTooSmall { period: f64, dt: f64 },

    #[snafu(context(false), display("Couldn't set up the physics engine: {source}"))]
    EngineSetup { source: EngineError },
}

/// Errors reported to callers of a running simulation.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)), visibility(pub(crate)))]
pub enum SimError {
    #[snafu(display("Joint ID {id} not found in config mappings"))]
    JointNotFound { id: JointId },

    #[snafu(display("Sensor '{name}' not found in model"))]
    SensorNotFound { name: String },

    #[snafu(display("Stepping on request is only possible in manual step mode"))]
    WrongStepMode,

    #[snafu(display("Invalid request: {reason}"))]
    InvalidRequest { reason: String },

    #[snafu(display("The simulation is shutting down"))]
    ShuttingDown,

    #[snafu(display("Physics engine failure: {source}"))]
    Engine { source: EngineError },
}

impl SimError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SimError::JointNotFound { .. } | SimError::SensorNotFound { .. }
        )
    }
}

impl From<EngineError> for SimError {
    fn from(source: EngineError) -> Self {
        match source {
            EngineError::Closed => SimError::ShuttingDown,
            source => SimError::Engine { source },
        }
    }
}
