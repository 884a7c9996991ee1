#![allow(dead_code)]

use image::{Rgba, RgbaImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use tryon::capture::{CameraBackend, CameraError, FacingMode, StreamConstraints, VideoStream};
use tryon::output::{Canvas, DisplaySurface, SurfaceError};
use tryon::overlay::PointerEvent;
use tryon::segmentation::{InferOptions, SegmentationError, SegmentationMask, SegmentationModel};

static NEXT_DEVICE: AtomicU64 = AtomicU64::new(0);

/// Deterministic test frame: R = 10x, G = 10y, B = 7, opaque.
pub fn pattern(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| Rgba([(x * 10) as u8, (y * 10) as u8, 7, 255]))
}

pub fn constraints(width: u32, height: u32) -> StreamConstraints {
    StreamConstraints {
        width,
        height,
        fps: 30,
        facing: FacingMode::Environment,
    }
}

/// Shared view into what a [`ScriptedBackend`] has been asked to do.
#[derive(Default)]
pub struct CameraLog {
    pub opens: usize,
    pub stops: usize,
    pub live_streams: usize,
    /// Outcomes for upcoming `open` calls; empty means grant.
    pub script: VecDeque<CameraError>,
    /// Number of upcoming reads that fail.
    pub failing_reads: usize,
}

pub struct ScriptedBackend {
    device_id: String,
    log: Arc<Mutex<CameraLog>>,
}

impl ScriptedBackend {
    pub fn new() -> (Self, Arc<Mutex<CameraLog>>) {
        let id = NEXT_DEVICE.fetch_add(1, Ordering::SeqCst);
        Self::with_device(format!("scripted:{}", id))
    }

    /// Two backends sharing a device id contend for the same camera.
    pub fn with_device(device_id: String) -> (Self, Arc<Mutex<CameraLog>>) {
        let log = Arc::new(Mutex::new(CameraLog::default()));
        (
            Self {
                device_id,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl CameraBackend for ScriptedBackend {
    fn device_id(&self) -> String {
        self.device_id.clone()
    }

    fn open(&mut self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        let mut log = self.log.lock().unwrap();
        log.opens += 1;
        if let Some(err) = log.script.pop_front() {
            return Err(err);
        }
        log.live_streams += 1;
        Ok(Box::new(ScriptedStream {
            log: Arc::clone(&self.log),
            width: constraints.width,
            height: constraints.height,
        }))
    }
}

struct ScriptedStream {
    log: Arc<Mutex<CameraLog>>,
    width: u32,
    height: u32,
}

impl VideoStream for ScriptedStream {
    fn read_frame(&mut self) -> Result<RgbaImage, CameraError> {
        let mut log = self.log.lock().unwrap();
        if log.failing_reads > 0 {
            log.failing_reads -= 1;
            return Err(CameraError::Frame("no frame".to_string()));
        }
        Ok(pattern(self.width, self.height))
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        let mut log = self.log.lock().unwrap();
        log.stops += 1;
        log.live_streams -= 1;
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Segmentation model whose every inference waits for the test to hand it
/// a result.
pub struct GatedModel {
    gate: Receiver<Result<SegmentationMask, SegmentationError>>,
    calls: Arc<AtomicUsize>,
    resets: Arc<AtomicUsize>,
}

pub struct Gate {
    pub release: Sender<Result<SegmentationMask, SegmentationError>>,
    pub calls: Arc<AtomicUsize>,
    pub resets: Arc<AtomicUsize>,
}

impl Gate {
    pub fn send(&self, mask: SegmentationMask) {
        self.release.send(Ok(mask)).unwrap();
    }

    pub fn fail(&self, message: &str) {
        self.release
            .send(Err(SegmentationError::InferenceFailed(message.to_string())))
            .unwrap();
    }
}

pub fn gated_model() -> (GatedModel, Gate) {
    let (release, gate) = mpsc::channel();
    let calls = Arc::new(AtomicUsize::new(0));
    let resets = Arc::new(AtomicUsize::new(0));
    (
        GatedModel {
            gate,
            calls: Arc::clone(&calls),
            resets: Arc::clone(&resets),
        },
        Gate {
            release,
            calls,
            resets,
        },
    )
}

impl SegmentationModel for GatedModel {
    fn segment(
        &mut self,
        _frame: &RgbaImage,
        _options: &InferOptions,
    ) -> Result<SegmentationMask, SegmentationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate
            .recv()
            .unwrap_or_else(|_| Err(SegmentationError::InferenceFailed("gate closed".to_string())))
    }

    fn reset_state(&mut self) {
        self.resets.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Mask from rows of '#' (person) and '.' (background).
pub fn mask_from_rows(rows: &[&str]) -> SegmentationMask {
    let height = rows.len() as u32;
    let width = rows[0].len() as u32;
    let data = rows
        .iter()
        .flat_map(|row| row.bytes().map(|b| u8::from(b == b'#')))
        .collect();
    SegmentationMask::from_raw(width, height, data).unwrap()
}

#[derive(Default)]
pub struct SurfaceLog {
    pub presented: Vec<RgbaImage>,
    pub pointer: VecDeque<PointerEvent>,
    pub closed: bool,
    pub unavailable: bool,
}

pub struct RecordingSurface {
    width: u32,
    height: u32,
    log: Arc<Mutex<SurfaceLog>>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> (Self, Arc<Mutex<SurfaceLog>>) {
        let log = Arc::new(Mutex::new(SurfaceLog::default()));
        (
            Self {
                width,
                height,
                log: Arc::clone(&log),
            },
            log,
        )
    }
}

impl DisplaySurface for RecordingSurface {
    fn present(&mut self, canvas: &Canvas) -> Result<(), SurfaceError> {
        let mut log = self.log.lock().unwrap();
        if log.unavailable {
            return Err(SurfaceError::Unavailable("context lost".to_string()));
        }
        log.presented.push(canvas.pixels().clone());
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_open(&self) -> bool {
        !self.log.lock().unwrap().closed
    }

    fn pointer_events(&mut self) -> Vec<PointerEvent> {
        self.log.lock().unwrap().pointer.drain(..).collect()
    }

    // Keeps run() from sleeping between ticks.
    fn paces_refresh(&self) -> bool {
        true
    }
}
