//! Frame delivery to an optional viewer.
//!
//! The pacing loop hands a [`FrameSnapshot`] to its [`Renderer`] after every tick that advanced
//! the simulation. Rendering never runs while the simulation lock is held.

pub mod render_thread;

pub use render_thread::*;

use serde::Serialize;
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(context(suffix(Err)))]
pub enum RenderError {
    #[snafu(display("The render thread is no longer receiving frames"))]
    Disconnected,

    #[snafu(display("Couldn't spawn the render thread: {source}"))]
    Spawn { source: std::io::Error },

    #[snafu(display("The render thread panicked"))]
    ThreadPanicked,
}

/// World pose of a single body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BodyPose {
    pub name: String,
    pub position: [f32; 3],
    /// `[w, x, y, z]`
    pub orientation: [f32; 4],
}

/// Everything a viewer needs to draw one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameSnapshot {
    pub step: u64,
    pub sim_time: f64,
    pub bodies: Vec<BodyPose>,
}

pub trait Renderer: Send {
    /// Disabled renderers are never handed a frame, so no snapshot is taken for them.
    fn is_enabled(&self) -> bool {
        true
    }

    fn draw(&mut self, frame: FrameSnapshot) -> Result<(), RenderError>;

    /// Stops rendering. Calling this more than once has no effect.
    fn close(&mut self);
}

/// Renderer used when rendering is turned off.
#[derive(Debug, Default)]
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn is_enabled(&self) -> bool {
        false
    }

    fn draw(&mut self, _frame: FrameSnapshot) -> Result<(), RenderError> {
        Ok(())
    }

    fn close(&mut self) {}
}
