use super::preprocess::{model_input_size, Preprocessor};
use super::types::{InferOptions, ModelConfig, SegmentationError, SegmentationMask, SegmentationModel};
use image::RgbaImage;
use ndarray::Ix4;
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

/// Stateless single-pass portrait segmentation (MODNet-style graphs).
///
/// Expects one NCHW image input and produces a `[1, 1, H, W]` person
/// probability map as its first output.
pub struct PortraitSegmenter {
    session: Session,
    stride: u32,
}

impl PortraitSegmenter {
    pub fn new(config: &ModelConfig) -> Result<Self, SegmentationError> {
        let path = &config.path;
        tracing::info!("Loading portrait model from {}", path.display());

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(2))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                SegmentationError::ModelLoadFailed(format!("{}: {}", path.display(), e))
            })?;

        tracing::info!(
            "Portrait model loaded (stride {}, {}-byte weights)",
            config.output_stride,
            config.precision_bytes
        );

        Ok(Self {
            session,
            stride: config.output_stride,
        })
    }
}

impl SegmentationModel for PortraitSegmenter {
    fn segment(
        &mut self,
        frame: &RgbaImage,
        options: &InferOptions,
    ) -> Result<SegmentationMask, SegmentationError> {
        let _span = tracing::debug_span!("portrait_segment").entered();

        let (width, height) = model_input_size(
            frame.width(),
            frame.height(),
            options.resolution.scale(),
            self.stride,
        );
        let input = Preprocessor::new(width, height).preprocess(frame);
        let input = TensorRef::from_array_view(input.view())
            .map_err(|e| SegmentationError::InferenceFailed(e.to_string()))?;

        let outputs = self
            .session
            .run(inputs![input])
            .map_err(|e| SegmentationError::InferenceFailed(e.to_string()))?;

        let matte = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| SegmentationError::InferenceFailed(e.to_string()))?
            .to_owned()
            .into_dimensionality::<Ix4>()
            .map_err(|e| SegmentationError::InferenceFailed(e.to_string()))?;

        let shape = matte.shape();
        let (matte_height, matte_width) = (shape[2] as u32, shape[3] as u32);
        let values: Vec<f32> = matte.iter().copied().collect();

        SegmentationMask::from_probabilities(matte_width, matte_height, &values, options.threshold)
            .ok_or_else(|| {
                SegmentationError::InferenceFailed(format!(
                    "probability map has unexpected shape {:?}",
                    shape
                ))
            })
    }

    fn name(&self) -> &str {
        "portrait"
    }
}
