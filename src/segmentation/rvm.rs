use super::preprocess::{model_input_size, Preprocessor};
use super::types::{InferOptions, ModelConfig, SegmentationError, SegmentationMask, SegmentationModel};
use image::RgbaImage;
use ndarray::{Array1, Array4, Ix4};
use ort::inputs;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::TensorRef;

/// RobustVideoMatting segmentation model
///
/// This model uses recurrent connections to maintain temporal consistency.
/// Hidden states (r1-r4) are carried between frames for smooth results and
/// start from 1x1x1x1 zeros, which the graph broadcasts on the first frame.
pub struct RobustVideoMatting {
    session: Session,
    stride: u32,
    downsample_ratio: f32,
    input_size: Option<(u32, u32)>,

    // Recurrent hidden states
    r1: Array4<f32>,
    r2: Array4<f32>,
    r3: Array4<f32>,
    r4: Array4<f32>,
}

impl RobustVideoMatting {
    /// Load an RVM graph (inputs `src, r1i..r4i, downsample_ratio`; outputs
    /// `fgr, pha, r1o..r4o`).
    pub fn new(config: &ModelConfig) -> Result<Self, SegmentationError> {
        let path = &config.path;
        tracing::info!("Loading RVM model from {}", path.display());

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.with_intra_threads(4))
            .and_then(|b| b.commit_from_file(path))
            .map_err(|e| {
                SegmentationError::ModelLoadFailed(format!("{}: {}", path.display(), e))
            })?;

        tracing::info!(
            "RVM model loaded (stride {}, downsample ratio {}, {}-byte weights)",
            config.output_stride,
            config.model_scale,
            config.precision_bytes
        );

        Ok(Self {
            session,
            stride: config.output_stride,
            downsample_ratio: config.model_scale,
            input_size: None,
            r1: zero_state(),
            r2: zero_state(),
            r3: zero_state(),
            r4: zero_state(),
        })
    }
}

fn zero_state() -> Array4<f32> {
    Array4::zeros((1, 1, 1, 1))
}

fn extract_state(value: &ort::value::DynValue, name: &str) -> Result<Array4<f32>, SegmentationError> {
    value
        .try_extract_array::<f32>()
        .map_err(|e| SegmentationError::InferenceFailed(format!("{}: {}", name, e)))?
        .to_owned()
        .into_dimensionality::<Ix4>()
        .map_err(|e| SegmentationError::InferenceFailed(format!("{}: {}", name, e)))
}

fn tensor_ref<'a, D: ndarray::Dimension + 'static>(
    array: &'a ndarray::Array<f32, D>,
) -> Result<TensorRef<'a, f32>, SegmentationError> {
    TensorRef::from_array_view(array.view())
        .map_err(|e| SegmentationError::InferenceFailed(e.to_string()))
}

impl SegmentationModel for RobustVideoMatting {
    fn segment(
        &mut self,
        frame: &RgbaImage,
        options: &InferOptions,
    ) -> Result<SegmentationMask, SegmentationError> {
        let _span = tracing::debug_span!("rvm_segment").entered();

        let (width, height) = model_input_size(
            frame.width(),
            frame.height(),
            options.resolution.scale(),
            self.stride,
        );
        // Hidden states are only valid for the input size they were computed at.
        if self.input_size != Some((width, height)) {
            if self.input_size.is_some() {
                tracing::debug!("RVM input size changed to {}x{}", width, height);
            }
            self.reset_state();
            self.input_size = Some((width, height));
        }

        let input = Preprocessor::new(width, height).preprocess(frame);
        let ratio = Array1::from_elem(1, self.downsample_ratio);

        let _infer_span = tracing::debug_span!("inference").entered();
        let outputs = self
            .session
            .run(inputs![
                "src" => tensor_ref(&input)?,
                "r1i" => tensor_ref(&self.r1)?,
                "r2i" => tensor_ref(&self.r2)?,
                "r3i" => tensor_ref(&self.r3)?,
                "r4i" => tensor_ref(&self.r4)?,
                "downsample_ratio" => tensor_ref(&ratio)?,
            ])
            .map_err(|e| SegmentationError::InferenceFailed(e.to_string()))?;
        drop(_infer_span);

        let pha = extract_state(&outputs["pha"], "pha")?;
        let r1 = extract_state(&outputs["r1o"], "r1o")?;
        let r2 = extract_state(&outputs["r2o"], "r2o")?;
        let r3 = extract_state(&outputs["r3o"], "r3o")?;
        let r4 = extract_state(&outputs["r4o"], "r4o")?;
        drop(outputs);

        self.r1 = r1;
        self.r2 = r2;
        self.r3 = r3;
        self.r4 = r4;

        // Alpha matte has shape [1, 1, H, W]
        let shape = pha.shape();
        let (matte_height, matte_width) = (shape[2] as u32, shape[3] as u32);
        let values: Vec<f32> = pha.iter().copied().collect();

        SegmentationMask::from_probabilities(matte_width, matte_height, &values, options.threshold)
            .ok_or_else(|| {
                SegmentationError::InferenceFailed(format!(
                    "matte has unexpected shape {:?}",
                    shape
                ))
            })
    }

    fn reset_state(&mut self) {
        tracing::debug!("Resetting RVM hidden states");
        self.r1 = zero_state();
        self.r2 = zero_state();
        self.r3 = zero_state();
        self.r4 = zero_state();
    }

    fn name(&self) -> &str {
        "robust-video-matting"
    }
}
