//! Collaborators driven by the simulation core.
//!
//! [`physics`] defines the stepping primitive the core advances once per fixed timestep, together
//! with a rapier-backed implementation. [`rendering`] defines the fire-and-forget frame sink the
//! pacing loop feeds after stepping.

pub mod physics;
pub mod rendering;

pub use physics::{PhysicsEngine, RapierEngine};
pub use rendering::{FrameSnapshot, Renderer};
