mod canvas;
mod loopback;
mod window;

pub use canvas::Canvas;
pub use loopback::V4L2Output;
pub use window::WindowSurface;

use crate::overlay::PointerEvent;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// Nothing can be shown; the render loop stops.
    #[error("display surface unavailable: {0}")]
    Unavailable(String),

    #[error("failed to present frame: {0}")]
    Present(String),
}

/// Trait for display destinations
pub trait DisplaySurface {
    /// Push a finished canvas to the display.
    fn present(&mut self, canvas: &Canvas) -> Result<(), SurfaceError>;

    /// Get the expected output resolution
    fn resolution(&self) -> (u32, u32);

    /// False once the viewer has closed the surface.
    fn is_open(&self) -> bool {
        true
    }

    /// Pointer input gathered since the last call.
    fn pointer_events(&mut self) -> Vec<PointerEvent> {
        Vec::new()
    }

    /// Whether `present` already paces to the display refresh.
    fn paces_refresh(&self) -> bool {
        false
    }
}

impl<S: DisplaySurface + ?Sized> DisplaySurface for Box<S> {
    fn present(&mut self, canvas: &Canvas) -> Result<(), SurfaceError> {
        (**self).present(canvas)
    }

    fn resolution(&self) -> (u32, u32) {
        (**self).resolution()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }

    fn pointer_events(&mut self) -> Vec<PointerEvent> {
        (**self).pointer_events()
    }

    fn paces_refresh(&self) -> bool {
        (**self).paces_refresh()
    }
}
