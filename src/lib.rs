#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
pub mod config;
pub mod engine;
pub mod model;
pub mod server;
pub mod sim;
pub mod utils;

pub use config::*;
pub use sim::{Simulation, SimWorld, StepMode};

pub use ::rapier3d;
pub use ::tokio;
pub use ::tracing;
