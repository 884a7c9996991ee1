mod engine;
mod portrait;
mod preprocess;
mod rvm;
pub mod types;

pub use engine::{EngineStatus, Inference, MaskSlot, ModelLoader, SegmentationEngine, Submission};
pub use portrait::PortraitSegmenter;
pub use preprocess::{model_input_size, Preprocessor};
pub use rvm::RobustVideoMatting;
pub use types::{
    Architecture, InferOptions, InternalResolution, ModelConfig, SegmentationError,
    SegmentationMask, SegmentationModel,
};

/// Load the model family named by `config.architecture`.
pub fn load_model(config: &ModelConfig) -> Result<Box<dyn SegmentationModel>, SegmentationError> {
    config.validate()?;
    let model: Box<dyn SegmentationModel> = match config.architecture {
        Architecture::Fast => Box::new(PortraitSegmenter::new(config)?),
        Architecture::Accurate => Box::new(RobustVideoMatting::new(config)?),
    };
    Ok(model)
}

/// Spawn an engine that loads `config` on its worker thread.
pub fn spawn_engine(
    config: ModelConfig,
    options: InferOptions,
) -> Result<SegmentationEngine, SegmentationError> {
    config.validate()?;
    SegmentationEngine::spawn(Box::new(move || load_model(&config)), options)
}
