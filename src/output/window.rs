use super::{Canvas, DisplaySurface, SurfaceError};
use crate::overlay::{Point, PointerEvent};
use minifb::{Key, MouseButton, MouseMode, Window, WindowOptions};

/// Kiosk window showing the try-on canvas; also the source of pointer input.
pub struct WindowSurface {
    window: Window,
    width: u32,
    height: u32,
    framebuffer: Vec<u32>,
    pointer_down: bool,
    last_pointer: Option<Point>,
}

impl WindowSurface {
    pub fn new(title: &str, width: u32, height: u32, refresh_hz: usize) -> Result<Self, SurfaceError> {
        tracing::info!("Opening window '{}' ({}x{})", title, width, height);

        let mut window = Window::new(title, width as usize, height as usize, WindowOptions::default())
            .map_err(|e| SurfaceError::Unavailable(e.to_string()))?;
        window.set_target_fps(refresh_hz);

        Ok(Self {
            window,
            width,
            height,
            framebuffer: Vec::with_capacity((width as usize) * (height as usize)),
            pointer_down: false,
            last_pointer: None,
        })
    }
}

impl DisplaySurface for WindowSurface {
    fn present(&mut self, canvas: &Canvas) -> Result<(), SurfaceError> {
        let (width, height) = canvas.dimensions();
        canvas.write_0rgb(&mut self.framebuffer);
        self.window
            .update_with_buffer(&self.framebuffer, width as usize, height as usize)
            .map_err(|e| SurfaceError::Present(e.to_string()))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn is_open(&self) -> bool {
        self.window.is_open() && !self.window.is_key_down(Key::Escape)
    }

    fn pointer_events(&mut self) -> Vec<PointerEvent> {
        let mut events = Vec::new();
        let position = self
            .window
            .get_mouse_pos(MouseMode::Pass)
            .map(|(x, y)| Point::new(x, y));
        let down = self.window.get_mouse_down(MouseButton::Left);

        match (self.pointer_down, down, position) {
            (false, true, Some(point)) => events.push(PointerEvent::Down(point)),
            (true, false, _) => events.push(PointerEvent::Up),
            (true, true, Some(point)) if Some(point) != self.last_pointer => {
                events.push(PointerEvent::Move(point))
            }
            _ => {}
        }

        self.pointer_down = down;
        self.last_pointer = position;
        events
    }

    fn paces_refresh(&self) -> bool {
        true
    }
}
