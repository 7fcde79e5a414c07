use crate::sim::{DelayRange, StepMode};
use bon::Builder;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 50051;
pub const DEFAULT_HOST: &str = "localhost";

/// Construction parameters of a simulation.
#[derive(Debug, Clone, PartialEq, Builder, Serialize, Deserialize)]
pub struct SimConfig {
    /// Physics timestep in seconds
    #[builder(default = 0.001)]
    pub dt: f64,
    #[builder(default = true)]
    pub gravity: bool,
    #[builder(default = true)]
    pub render: bool,
    /// Pins the floating base in place after every step
    #[builder(default = false)]
    pub suspended: bool,
    /// Bounds of the random delay applied to every actuator command
    #[builder(default)]
    pub command_delay: DelayRange,
    /// Fixes the delay sampler seed, mostly for reproducible test runs
    pub delay_seed: Option<u64>,
    /// Pause between pacing loop iterations
    #[builder(default = Duration::from_micros(100))]
    pub sleep_time: Duration,
    #[builder(default)]
    pub step_mode: StepMode,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig::builder().build()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
pub struct ServerConfig {
    #[builder(default = DEFAULT_HOST.to_string(), into)]
    pub host: String,
    #[builder(default = DEFAULT_PORT)]
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig::builder().build()
    }
}
