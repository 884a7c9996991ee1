//! Draggable product overlay.

use image::RgbaImage;
use std::ops::Sub;
use std::sync::Arc;

/// A point in screen (canvas) space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Image asset supplied by the caller for the length of a try-on session.
#[derive(Debug)]
pub struct ProductReference {
    pub id: u32,
    pub name: String,
    pub source: String,
    pub image: RgbaImage,
}

impl ProductReference {
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Down(Point),
    Move(Point),
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragState {
    Idle,
    /// `offset` is pointer minus overlay position at pointer-down.
    Dragging { offset: Point },
}

/// Where the overlay is and whether it is being dragged. The position is the
/// centre of the product image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayState {
    pub position: Point,
    pub drag: DragState,
}

impl OverlayState {
    pub fn new(position: Point) -> Self {
        Self {
            position,
            drag: DragState::Idle,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.drag, DragState::Dragging { .. })
    }

    /// Pure transition for one pointer event. `size` is the overlay's
    /// on-screen size, which defines its hit region.
    pub fn apply(self, event: PointerEvent, size: (u32, u32)) -> OverlayState {
        match (self.drag, event) {
            (DragState::Idle, PointerEvent::Down(pointer)) if hit(self.position, size, pointer) => {
                OverlayState {
                    position: self.position,
                    drag: DragState::Dragging {
                        offset: pointer - self.position,
                    },
                }
            }
            (DragState::Dragging { offset }, PointerEvent::Move(pointer)) => OverlayState {
                position: pointer - offset,
                drag: self.drag,
            },
            (_, PointerEvent::Up) => OverlayState {
                position: self.position,
                drag: DragState::Idle,
            },
            _ => self,
        }
    }
}

fn hit(centre: Point, (width, height): (u32, u32), pointer: Point) -> bool {
    let half_w = width as f32 / 2.0;
    let half_h = height as f32 / 2.0;
    (pointer.x - centre.x).abs() <= half_w && (pointer.y - centre.y).abs() <= half_h
}

/// Tracks the product overlay's position under pointer input.
///
/// No clamping: the overlay may be dragged partly or fully off the canvas.
#[derive(Debug)]
pub struct OverlayController {
    product: Arc<ProductReference>,
    state: OverlayState,
    /// Grabbable area, centred on the position.
    hit_size: (u32, u32),
}

impl OverlayController {
    pub fn new(product: Arc<ProductReference>, position: Point) -> Self {
        let hit_size = product.size();
        Self {
            product,
            state: OverlayState::new(position),
            hit_size,
        }
    }

    /// Make the whole box the product was fitted into grabbable, not just
    /// the fitted image.
    pub fn with_hit_size(mut self, width: u32, height: u32) -> Self {
        self.hit_size = (width, height);
        self
    }

    pub fn hit_size(&self) -> (u32, u32) {
        self.hit_size
    }

    pub fn product(&self) -> &ProductReference {
        &self.product
    }

    pub fn handle(&mut self, event: PointerEvent) {
        let before = self.state.is_dragging();
        self.state = self.state.apply(event, self.hit_size);
        let after = self.state.is_dragging();
        if before != after {
            tracing::debug!(
                "Overlay {} at ({:.0}, {:.0})",
                if after { "grabbed" } else { "released" },
                self.state.position.x,
                self.state.position.y
            );
        }
    }

    pub fn on_pointer_down(&mut self, point: Point) {
        self.handle(PointerEvent::Down(point));
    }

    pub fn on_pointer_move(&mut self, point: Point) {
        self.handle(PointerEvent::Move(point));
    }

    pub fn on_pointer_up(&mut self) {
        self.handle(PointerEvent::Up);
    }

    pub fn current_position(&self) -> Point {
        self.state.position
    }

    pub fn is_dragging(&self) -> bool {
        self.state.is_dragging()
    }

    /// Top-left pixel at which the product image is drawn.
    pub fn draw_origin(&self) -> (i64, i64) {
        let (width, height) = self.product.size();
        let position = self.state.position;
        (
            (position.x - width as f32 / 2.0).round() as i64,
            (position.y - height as f32 / 2.0).round() as i64,
        )
    }
}
