use image::RgbaImage;
use std::path::PathBuf;
use thiserror::Error;

/// Ways the segmentation side can become unavailable. None of these are
/// fatal to the try-on view: the compositor falls back to the unmasked frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SegmentationError {
    #[error("segmentation model failed to load: {0}")]
    ModelLoadFailed(String),

    #[error("segmentation inference failed: {0}")]
    InferenceFailed(String),

    #[error("invalid segmentation config: {0}")]
    InvalidConfig(String),

    #[error("segmentation worker is not running")]
    WorkerUnavailable,
}

/// Per-position person/background classification, row-major.
///
/// Its resolution may be lower than the frame it was computed from; the
/// compositor maps frame pixels onto mask cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentationMask {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl SegmentationMask {
    /// Build a mask from raw cells, nonzero = foreground.
    /// Returns `None` if the buffer does not hold `width * height` cells or
    /// either dimension is zero.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || data.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self { width, height, data })
    }

    /// Classify a probability matte: a cell is foreground iff its value
    /// exceeds `threshold`.
    pub fn from_probabilities(
        width: u32,
        height: u32,
        probabilities: &[f32],
        threshold: f32,
    ) -> Option<Self> {
        let data = probabilities
            .iter()
            .map(|&p| u8::from(p > threshold))
            .collect();
        Self::from_raw(width, height, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_foreground(&self, x: u32, y: u32) -> bool {
        self.data[(y as usize) * (self.width as usize) + x as usize] != 0
    }

    pub fn as_raw(&self) -> &[u8] {
        &self.data
    }

    pub fn foreground_count(&self) -> usize {
        self.data.iter().filter(|&&cell| cell != 0).count()
    }
}

/// Model family, trading speed for quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// Single-pass portrait graph: one image in, one probability map out.
    Fast,
    /// Recurrent matting graph carrying hidden state across frames.
    Accurate,
}

/// How much of the frame resolution the model sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalResolution {
    Low,
    Medium,
    High,
    Full,
}

impl InternalResolution {
    pub fn scale(self) -> f32 {
        match self {
            InternalResolution::Low => 0.25,
            InternalResolution::Medium => 0.5,
            InternalResolution::High => 0.75,
            InternalResolution::Full => 1.0,
        }
    }
}

/// One-time model load options.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub path: PathBuf,
    pub architecture: Architecture,
    /// Model input sides are rounded up to a multiple of this.
    pub output_stride: u32,
    /// Backbone scale; the recurrent graph uses it as its downsample ratio.
    pub model_scale: f32,
    /// Bytes per weight the exported graph was quantised to.
    pub precision_bytes: u8,
}

impl ModelConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            architecture: Architecture::Fast,
            output_stride: 16,
            model_scale: 0.75,
            precision_bytes: 2,
        }
    }

    pub fn validate(&self) -> Result<(), SegmentationError> {
        if ![8, 16, 32].contains(&self.output_stride) {
            return Err(SegmentationError::InvalidConfig(format!(
                "output stride must be 8, 16 or 32, got {}",
                self.output_stride
            )));
        }
        if ![0.5, 0.75, 1.0].contains(&self.model_scale) {
            return Err(SegmentationError::InvalidConfig(format!(
                "model scale must be 0.5, 0.75 or 1.0, got {}",
                self.model_scale
            )));
        }
        if ![1, 2, 4].contains(&self.precision_bytes) {
            return Err(SegmentationError::InvalidConfig(format!(
                "precision must be 1, 2 or 4 bytes, got {}",
                self.precision_bytes
            )));
        }
        Ok(())
    }
}

/// Per-call inference options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferOptions {
    pub resolution: InternalResolution,
    /// Probability above which a cell counts as person.
    pub threshold: f32,
}

impl Default for InferOptions {
    fn default() -> Self {
        Self {
            resolution: InternalResolution::Medium,
            threshold: 0.7,
        }
    }
}

/// Trait for segmentation models
/// Allows swapping between different backends (RVM, MODNet, MediaPipe, etc.)
pub trait SegmentationModel: Send {
    /// Classify every position of `frame` as person or background.
    fn segment(
        &mut self,
        frame: &RgbaImage,
        options: &InferOptions,
    ) -> Result<SegmentationMask, SegmentationError>;

    /// Reset internal state (for models with temporal/recurrent components)
    ///
    /// Call this when:
    /// - Switching cameras
    /// - Starting a new try-on session
    fn reset_state(&mut self) {}

    fn name(&self) -> &str;
}
