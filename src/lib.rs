//! Live virtual try-on compositor: camera frames with the background cut out
//! by a person-segmentation model, and a draggable product image on top.

pub mod capture;
pub mod compositing;
pub mod output;
pub mod overlay;
pub mod render;
pub mod segmentation;

pub use capture::{CameraError, CameraSession, CameraState, Frame, StreamConstraints};
pub use compositing::{apply_mask, CompositedBuffer, CompositingPipeline};
pub use overlay::{OverlayController, Point, PointerEvent, ProductReference};
pub use render::{RenderConfig, RenderError, RenderLoop, TickOutcome};
pub use segmentation::{SegmentationEngine, SegmentationMask};
