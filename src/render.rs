//! The per-refresh scheduler: camera → mask → composite → overlay → present.

use crate::capture::{CameraError, CameraSession, CameraState};
use crate::compositing::CompositingPipeline;
use crate::output::{Canvas, DisplaySurface, SurfaceError};
use crate::overlay::OverlayController;
use crate::segmentation::{Inference, MaskSlot, SegmentationEngine, Submission};
use image::Rgba;
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Offer a frame to the segmentation engine every this many ticks.
    pub infer_every: u32,
    /// Pacing for surfaces that do not sync to a display refresh.
    pub target_fps: u32,
    /// Shown wherever the composited frame is transparent.
    pub backdrop: Rgba<u8>,
    /// Log timing averages every this many presented frames.
    pub stats_interval: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            infer_every: 2,
            target_fps: 30,
            backdrop: Rgba([0, 0, 0, 255]),
            stats_interval: 30,
        }
    }
}

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No frame was available; nothing drawn.
    Skipped,
    /// A frame was drawn, masked with the given inference result if any.
    Drawn { mask: Option<u64> },
    /// The loop has been stopped.
    Stopped,
}

#[derive(Debug, Default)]
struct FrameStats {
    frames: u64,
    capture: Duration,
    composite: Duration,
    present: Duration,
    /// Capture to present, summed over frames.
    latency: Duration,
    inferences: u64,
    inference: Duration,
}

impl FrameStats {
    fn log(&self) {
        let per_frame = |total: Duration| total.as_secs_f64() * 1000.0 / self.frames.max(1) as f64;
        let capture_ms = per_frame(self.capture);
        let composite_ms = per_frame(self.composite);
        let present_ms = per_frame(self.present);
        let total_ms = capture_ms + composite_ms + present_ms;
        let latency_ms = per_frame(self.latency);
        let infer_ms = self.inference.as_secs_f64() * 1000.0 / self.inferences.max(1) as f64;

        tracing::info!(
            "Frame {}: capture={:.1}ms, composite={:.1}ms, present={:.1}ms, total={:.1}ms, fps={:.1}, latency={:.1}ms, inference={:.1}ms ({} masks)",
            self.frames,
            capture_ms,
            composite_ms,
            present_ms,
            total_ms,
            1000.0 / total_ms.max(f64::EPSILON),
            latency_ms,
            infer_ms,
            self.inferences
        );
    }
}

/// Drives one try-on session. Owns the camera session and the display
/// surface; tearing the loop down releases both.
pub struct RenderLoop<S: DisplaySurface> {
    camera: CameraSession,
    engine: Option<SegmentationEngine>,
    masks: MaskSlot,
    pipeline: CompositingPipeline,
    overlay: OverlayController,
    surface: S,
    canvas: Canvas,
    config: RenderConfig,
    ticks: u64,
    stats: FrameStats,
    running: bool,
}

impl<S: DisplaySurface> RenderLoop<S> {
    /// `engine` is `None` for passthrough mode (live frame, no cutout).
    pub fn new(
        camera: CameraSession,
        engine: Option<SegmentationEngine>,
        overlay: OverlayController,
        surface: S,
        config: RenderConfig,
    ) -> Self {
        let (width, height) = surface.resolution();
        Self {
            camera,
            engine,
            masks: MaskSlot::new(),
            pipeline: CompositingPipeline::new(),
            overlay,
            surface,
            canvas: Canvas::new(width, height),
            config,
            ticks: 0,
            stats: FrameStats::default(),
            running: true,
        }
    }

    pub fn camera(&self) -> &CameraSession {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraSession {
        &mut self.camera
    }

    pub fn overlay(&self) -> &OverlayController {
        &self.overlay
    }

    pub fn overlay_mut(&mut self) -> &mut OverlayController {
        &mut self.overlay
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn pipeline(&self) -> &CompositingPipeline {
        &self.pipeline
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    /// Sequence number of the mask currently applied.
    pub fn mask_generation(&self) -> Option<u64> {
        self.masks.generation()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Open the camera (if needed) and tick until the surface closes, the
    /// camera is lost, or `stop` is called. Always tears down on return.
    pub fn run(&mut self) -> Result<(), RenderError> {
        if self.camera.state() != CameraState::Active {
            if let Err(err) = self.camera.open() {
                self.stop();
                return Err(err.into());
            }
        }
        tracing::info!("Starting render loop");

        let frame_duration = Duration::from_secs_f32(1.0 / self.config.target_fps.max(1) as f32);
        let result = loop {
            if !self.running || !self.surface.is_open() {
                break Ok(());
            }
            if self.camera.state() != CameraState::Active {
                let err = self
                    .camera
                    .denial()
                    .cloned()
                    .unwrap_or_else(|| CameraError::DeviceUnavailable("camera closed".to_string()));
                break Err(RenderError::from(err));
            }

            let tick_start = Instant::now();
            if let Err(err) = self.tick() {
                break Err(err);
            }

            // Frame rate limiting
            if !self.surface.paces_refresh() {
                let elapsed = tick_start.elapsed();
                if elapsed < frame_duration {
                    std::thread::sleep(frame_duration - elapsed);
                }
            }
        };

        if let Err(err) = &result {
            tracing::error!("Render loop aborted: {}", err);
        }
        self.stop();
        result
    }

    /// Run a single refresh.
    pub fn tick(&mut self) -> Result<TickOutcome, RenderError> {
        if !self.running {
            return Ok(TickOutcome::Stopped);
        }

        for event in self.surface.pointer_events() {
            self.overlay.handle(event);
        }

        self.install_finished_inference();

        let capture_start = Instant::now();
        let Some(frame) = self.camera.current_frame() else {
            return Ok(TickOutcome::Skipped);
        };
        self.stats.capture += capture_start.elapsed();

        let tick = self.ticks;
        self.ticks += 1;
        if tick % u64::from(self.config.infer_every.max(1)) == 0 {
            if let Some(engine) = self.engine.as_mut() {
                if let Submission::Busy = engine.infer(&frame) {
                    tracing::trace!("Inference busy, skipping tick {}", tick);
                }
            }
        }

        let composite_start = Instant::now();
        let composited = self.pipeline.composite(frame.image(), self.masks.current());
        self.canvas.clear(self.config.backdrop);
        self.canvas.draw_image(composited.pixels(), 0, 0);
        let (x, y) = self.overlay.draw_origin();
        self.canvas.draw_image(&self.overlay.product().image, x, y);
        self.stats.composite += composite_start.elapsed();

        let present_start = Instant::now();
        match self.surface.present(&self.canvas) {
            Ok(()) => {}
            Err(SurfaceError::Present(msg)) => {
                tracing::warn!("Dropped frame {}: {}", frame.sequence(), msg);
            }
            Err(err) => {
                // Nothing can be shown any more; release everything now.
                self.stop();
                return Err(err.into());
            }
        }
        self.stats.present += present_start.elapsed();
        self.stats.latency += frame.captured_at().elapsed();

        self.stats.frames += 1;
        if self.config.stats_interval > 0 && self.stats.frames % self.config.stats_interval == 0 {
            self.stats.log();
        }

        Ok(TickOutcome::Drawn {
            mask: self.masks.generation(),
        })
    }

    /// Block until any in-flight inference (or model load) resolves, then
    /// install its mask. Returns true if a new mask was installed.
    pub fn await_inference(&mut self, timeout: Duration) -> bool {
        if !self.running {
            return false;
        }
        let Some(engine) = self.engine.as_mut() else {
            return false;
        };
        match engine.wait(timeout) {
            Some(done) => self.install(done),
            None => false,
        }
    }

    /// Stop ticking and release the camera. In-flight inference is left to
    /// finish on its own; its result is discarded.
    pub fn stop(&mut self) {
        if self.running {
            tracing::info!("Stopping render loop after {} ticks", self.ticks);
        }
        self.running = false;
        if let Some(engine) = self.engine.as_mut() {
            engine.shutdown();
        }
        self.masks.clear();
        self.camera.close();
    }

    fn install_finished_inference(&mut self) {
        let finished = self.engine.as_mut().and_then(|engine| engine.poll());
        if let Some(done) = finished {
            self.install(done);
        }
    }

    fn install(&mut self, done: Inference) -> bool {
        self.stats.inferences += 1;
        self.stats.inference += done.elapsed;
        self.masks.publish(done.sequence, done.mask)
    }
}

impl<S: DisplaySurface> Drop for RenderLoop<S> {
    fn drop(&mut self) {
        self.stop();
    }
}
