mod webcam;

pub use webcam::{WebcamBackend, WebcamStream};

use image::RgbaImage;
use std::collections::BTreeSet;
use std::fmt;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// After this many consecutive failed reads an active stream is considered lost.
pub const MAX_CONSECUTIVE_READ_FAILURES: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("failed to read camera frame: {0}")]
    Frame(String),
}

/// Which way the camera faces the visitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Selfie camera; frames are mirrored so the view behaves like a mirror.
    User,
    Environment,
}

/// What the caller asks of the device when opening a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub facing: FacingMode,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            facing: FacingMode::User,
        }
    }
}

/// Camera device collaborator: grants (or refuses) a live stream.
pub trait CameraBackend {
    /// Stable identifier of the physical device, used for exclusive access.
    fn device_id(&self) -> String;

    fn open(&mut self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError>;
}

/// A granted stream producing frames until stopped.
pub trait VideoStream {
    /// Block until the next frame is available and return it as RGBA.
    fn read_frame(&mut self) -> Result<RgbaImage, CameraError>;

    /// Stop all device tracks. Called at most once per stream.
    fn stop(&mut self) -> Result<(), CameraError>;

    /// Negotiated (width, height), which may differ from the request.
    fn resolution(&self) -> (u32, u32);
}

/// Immutable snapshot of one camera frame.
#[derive(Clone)]
pub struct Frame {
    image: Arc<RgbaImage>,
    sequence: u64,
    captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbaImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            sequence,
            captured_at: Instant::now(),
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Position of this frame within its stream, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Descriptor of the stream granted by [`CameraSession::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamHandle {
    /// Increments on every successful open of a session.
    pub generation: u64,
    pub width: u32,
    pub height: u32,
}

/// Observable camera readiness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraState {
    Idle,
    Requesting,
    Active,
    Denied,
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraState::Idle => "idle",
            CameraState::Requesting => "requesting",
            CameraState::Active => "active",
            CameraState::Denied => "denied",
        };
        f.write_str(name)
    }
}

static HELD_DEVICES: Mutex<BTreeSet<String>> = parking_lot::const_mutex(BTreeSet::new());

/// Exclusive claim on a device; released on drop.
struct DeviceLease {
    device_id: String,
}

impl DeviceLease {
    fn acquire(device_id: String) -> Result<Self, CameraError> {
        let mut held = HELD_DEVICES.lock();
        if !held.insert(device_id.clone()) {
            return Err(CameraError::DeviceUnavailable(format!(
                "{} is held by another session",
                device_id
            )));
        }
        Ok(Self { device_id })
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        let mut held = HELD_DEVICES.lock();
        held.remove(&self.device_id);
    }
}

// The stream lives inside `Active`, so a stream exists iff the state is active.
enum Slot {
    Idle,
    Requesting,
    Active {
        stream: Box<dyn VideoStream>,
        handle: StreamHandle,
        _lease: DeviceLease,
    },
    Denied(CameraError),
}

impl Slot {
    fn state(&self) -> CameraState {
        match self {
            Slot::Idle => CameraState::Idle,
            Slot::Requesting => CameraState::Requesting,
            Slot::Active { .. } => CameraState::Active,
            Slot::Denied(_) => CameraState::Denied,
        }
    }
}

type TransitionObserver = Box<dyn FnMut(CameraState, CameraState)>;

/// Owns the camera device lifecycle: idle → requesting → active | denied.
///
/// The stream is released on every exit path: `close`, a lost device, or drop.
pub struct CameraSession {
    backend: Box<dyn CameraBackend>,
    constraints: StreamConstraints,
    slot: Slot,
    generation: u64,
    frames_read: u64,
    read_failures: u32,
    observer: Option<TransitionObserver>,
}

impl CameraSession {
    pub fn new(backend: Box<dyn CameraBackend>, constraints: StreamConstraints) -> Self {
        Self {
            backend,
            constraints,
            slot: Slot::Idle,
            generation: 0,
            frames_read: 0,
            read_failures: 0,
            observer: None,
        }
    }

    /// Register a callback receiving every `(from, to)` state transition.
    pub fn with_observer(mut self, observer: impl FnMut(CameraState, CameraState) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    pub fn state(&self) -> CameraState {
        self.slot.state()
    }

    /// The error that put the session into `denied`, if any.
    pub fn denial(&self) -> Option<&CameraError> {
        match &self.slot {
            Slot::Denied(err) => Some(err),
            _ => None,
        }
    }

    pub fn handle(&self) -> Option<StreamHandle> {
        match &self.slot {
            Slot::Active { handle, .. } => Some(*handle),
            _ => None,
        }
    }

    /// Request the device. Re-attempts from scratch after a denial; an
    /// already active session returns its current handle.
    pub fn open(&mut self) -> Result<StreamHandle, CameraError> {
        if let Slot::Active { handle, .. } = &self.slot {
            return Ok(*handle);
        }

        self.transition(Slot::Requesting);
        tracing::info!(
            "Requesting camera {} at {}x{} ({:?} facing)",
            self.backend.device_id(),
            self.constraints.width,
            self.constraints.height,
            self.constraints.facing
        );

        let lease = match DeviceLease::acquire(self.backend.device_id()) {
            Ok(lease) => lease,
            Err(err) => return Err(self.deny(err)),
        };

        let stream = match self.backend.open(&self.constraints) {
            Ok(stream) => stream,
            Err(err) => return Err(self.deny(err)),
        };

        self.generation += 1;
        self.frames_read = 0;
        self.read_failures = 0;

        let (width, height) = stream.resolution();
        let handle = StreamHandle {
            generation: self.generation,
            width,
            height,
        };
        tracing::info!("Camera stream active at {}x{}", width, height);

        self.transition(Slot::Active {
            stream,
            handle,
            _lease: lease,
        });
        Ok(handle)
    }

    /// Stop the stream and return to idle. Safe to call in any state.
    pub fn close(&mut self) {
        if matches!(self.slot, Slot::Idle) {
            return;
        }
        self.release();
        self.transition(Slot::Idle);
    }

    /// Read the newest frame from the active stream, or `None` when not active
    /// or when the device had nothing to give this time.
    pub fn current_frame(&mut self) -> Option<Frame> {
        let facing = self.constraints.facing;
        let Slot::Active { stream, .. } = &mut self.slot else {
            return None;
        };

        match stream.read_frame() {
            Ok(mut image) => {
                self.read_failures = 0;
                if facing == FacingMode::User {
                    image::imageops::flip_horizontal_in_place(&mut image);
                }
                let frame = Frame::new(image, self.frames_read);
                self.frames_read += 1;
                Some(frame)
            }
            Err(err) => {
                self.read_failures += 1;
                tracing::warn!("Camera read failed ({}): {}", self.read_failures, err);
                if self.read_failures >= MAX_CONSECUTIVE_READ_FAILURES {
                    tracing::error!("Camera stream lost after {} failed reads", self.read_failures);
                    self.release();
                    self.transition(Slot::Denied(CameraError::DeviceUnavailable(
                        "stream stopped delivering frames".to_string(),
                    )));
                }
                None
            }
        }
    }

    fn deny(&mut self, err: CameraError) -> CameraError {
        tracing::error!("Camera unavailable: {}", err);
        self.transition(Slot::Denied(err.clone()));
        err
    }

    /// Stop the stream if one is held; stop errors are benign here.
    fn release(&mut self) {
        if let Slot::Active { stream, .. } = &mut self.slot {
            if let Err(err) = stream.stop() {
                tracing::debug!("Ignoring error while stopping camera stream: {}", err);
            }
        }
    }

    fn transition(&mut self, next: Slot) {
        let from = self.slot.state();
        let to = next.state();
        self.slot = next;
        if from != to {
            tracing::debug!("Camera state {} -> {}", from, to);
            if let Some(observer) = self.observer.as_mut() {
                observer(from, to);
            }
        }
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}
