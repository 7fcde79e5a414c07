use crate::engine::rendering::{FrameSnapshot, RenderError, Renderer, SpawnErr};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use snafu::ResultExt;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use web_time::Instant;

/// Frames buffered between the simulation and the render thread before new ones get dropped.
pub const FRAME_BUFFER: usize = 4;

/// Consumer of frames, living on the render thread.
pub trait FrameSink: Send + 'static {
    fn present(&mut self, frame: &FrameSnapshot);

    fn finish(&mut self) {}
}

/// Sink that reports the latest frame through the log at a bounded rate.
pub struct LogSink {
    interval: Duration,
    last_report: Option<Instant>,
    frames: u64,
}

impl LogSink {
    pub fn new(interval: Duration) -> Self {
        LogSink {
            interval,
            last_report: None,
            frames: 0,
        }
    }
}

impl Default for LogSink {
    fn default() -> Self {
        LogSink::new(Duration::from_secs(1))
    }
}

impl FrameSink for LogSink {
    fn present(&mut self, frame: &FrameSnapshot) {
        self.frames += 1;

        let now = Instant::now();
        if self
            .last_report
            .is_some_and(|last| now.duration_since(last) < self.interval)
        {
            return;
        }
        self.last_report = Some(now);

        let base = frame.bodies.first();
        info!(
            "Frame {} at t={:.3}s, base at {:?} ({} bodies)",
            frame.step,
            frame.sim_time,
            base.map(|b| b.position),
            frame.bodies.len()
        );
    }

    fn finish(&mut self) {
        debug!("Render sink presented {} frames", self.frames);
    }
}

/// Renderer handing frames to a dedicated render thread.
///
/// Frames are offered without blocking. When the thread falls behind, new frames are dropped
/// instead of stalling the simulation.
pub struct ChannelRenderer {
    frame_tx: Option<Sender<FrameSnapshot>>,
    thread: Option<JoinHandle<()>>,
    dropped: u64,
}

impl ChannelRenderer {
    pub fn spawn<S: FrameSink>(sink: S) -> Result<Self, RenderError> {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_BUFFER);

        let thread = std::thread::Builder::new()
            .name("render".to_string())
            .spawn(move || render_loop(sink, frame_rx))
            .context(SpawnErr)?;

        Ok(ChannelRenderer {
            frame_tx: Some(frame_tx),
            thread: Some(thread),
            dropped: 0,
        })
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped
    }
}

fn render_loop<S: FrameSink>(mut sink: S, frame_rx: Receiver<FrameSnapshot>) {
    // ends once the sending side is gone
    for frame in frame_rx.iter() {
        sink.present(&frame);
    }

    sink.finish();
    debug!("Render thread exited");
}

impl Renderer for ChannelRenderer {
    fn draw(&mut self, frame: FrameSnapshot) -> Result<(), RenderError> {
        let Some(frame_tx) = &self.frame_tx else {
            return Err(RenderError::Disconnected);
        };

        match frame_tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                Ok(())
            }
            Err(TrySendError::Disconnected(_)) => Err(RenderError::Disconnected),
        }
    }

    fn close(&mut self) {
        // dropping the sender ends the render loop
        self.frame_tx = None;

        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("{}", RenderError::ThreadPanicked);
            }
            if self.dropped_frames() > 0 {
                debug!(
                    "Dropped {} frames while the render thread was busy",
                    self.dropped_frames()
                );
            }
        }
    }
}

impl Drop for ChannelRenderer {
    fn drop(&mut self) {
        self.close();
    }
}
