use super::{CameraBackend, CameraError, StreamConstraints, VideoStream};
use image::RgbaImage;
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType, Resolution,
};
use nokhwa::{Camera, NokhwaError};

/// Local webcam opened through nokhwa's V4L input.
pub struct WebcamBackend {
    device_index: u32,
}

impl WebcamBackend {
    pub fn new(device_index: u32) -> Self {
        Self { device_index }
    }
}

impl CameraBackend for WebcamBackend {
    fn device_id(&self) -> String {
        format!("webcam:{}", self.device_index)
    }

    fn open(&mut self, constraints: &StreamConstraints) -> Result<Box<dyn VideoStream>, CameraError> {
        tracing::info!(
            "Initializing webcam {} at {}x{}@{}",
            self.device_index,
            constraints.width,
            constraints.height,
            constraints.fps
        );

        let index = CameraIndex::Index(self.device_index);
        let format = CameraFormat::new(
            Resolution::new(constraints.width, constraints.height),
            FrameFormat::YUYV,
            constraints.fps,
        );
        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(format));

        let mut camera = Camera::new(index, requested).map_err(classify_open_error)?;
        camera.open_stream().map_err(classify_open_error)?;

        let actual = camera.resolution();
        tracing::info!(
            "Webcam initialized at {}x{}",
            actual.width(),
            actual.height()
        );

        Ok(Box::new(WebcamStream {
            camera,
            width: actual.width(),
            height: actual.height(),
        }))
    }
}

pub struct WebcamStream {
    camera: Camera,
    width: u32,
    height: u32,
}

impl VideoStream for WebcamStream {
    fn read_frame(&mut self) -> Result<RgbaImage, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::Frame(e.to_string()))?;

        buffer
            .decode_image::<RgbAFormat>()
            .map_err(|e| CameraError::Frame(format!("decode: {}", e)))
    }

    fn stop(&mut self) -> Result<(), CameraError> {
        self.camera
            .stop_stream()
            .map_err(|e| CameraError::DeviceUnavailable(e.to_string()))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Split open failures into "the user said no" and "there is no usable device".
fn classify_open_error(err: NokhwaError) -> CameraError {
    let message = err.to_string();
    if is_permission_failure(&message) {
        CameraError::PermissionDenied(message)
    } else {
        CameraError::DeviceUnavailable(message)
    }
}

fn is_permission_failure(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["permission", "denied", "not authorized", "eacces"]
        .iter()
        .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::is_permission_failure;

    #[test]
    fn permission_messages_are_recognised() {
        assert!(is_permission_failure("Could not open device: Permission denied (os error 13)"));
        assert!(is_permission_failure("AVFoundation: Not Authorized"));
        assert!(!is_permission_failure("No such file or directory (os error 2)"));
    }
}
