use image::{Rgba, RgbaImage};
use std::sync::Arc;
use tryon::overlay::{
    DragState, OverlayController, OverlayState, Point, PointerEvent, ProductReference,
};

fn product(width: u32, height: u32) -> Arc<ProductReference> {
    Arc::new(ProductReference {
        id: 7,
        name: "Aviator".to_string(),
        source: "aviator.png".to_string(),
        image: RgbaImage::from_pixel(width, height, Rgba([255, 0, 0, 255])),
    })
}

#[test]
fn drag_keeps_the_grab_offset_at_every_step() {
    let mut overlay = OverlayController::new(product(100, 100), Point::new(300.0, 200.0));

    overlay.on_pointer_down(Point::new(320.0, 190.0));
    assert!(overlay.is_dragging());
    assert_eq!(overlay.current_position(), Point::new(300.0, 200.0));

    let moves = [
        Point::new(321.0, 191.0),
        Point::new(600.0, 50.0),
        Point::new(10.0, 700.0),
        Point::new(10.5, 700.25),
    ];
    for pointer in moves {
        overlay.on_pointer_move(pointer);
        assert_eq!(overlay.current_position(), Point::new(pointer.x - 20.0, pointer.y + 10.0));
    }

    overlay.on_pointer_up();
    assert!(!overlay.is_dragging());
    assert_eq!(overlay.current_position(), Point::new(-9.5, 710.25));
}

#[test]
fn pointer_down_outside_the_overlay_does_not_grab() {
    let mut overlay = OverlayController::new(product(100, 50), Point::new(300.0, 200.0));

    overlay.on_pointer_down(Point::new(300.0, 230.0));
    assert!(!overlay.is_dragging());

    overlay.on_pointer_move(Point::new(0.0, 0.0));
    assert_eq!(overlay.current_position(), Point::new(300.0, 200.0));
}

#[test]
fn hit_region_edges_are_inclusive() {
    let mut overlay = OverlayController::new(product(100, 50), Point::new(300.0, 200.0));
    overlay.on_pointer_down(Point::new(350.0, 225.0));
    assert!(overlay.is_dragging());
}

#[test]
fn pointer_up_without_down_is_harmless() {
    let mut overlay = OverlayController::new(product(10, 10), Point::new(5.0, 5.0));

    overlay.on_pointer_up();
    overlay.on_pointer_up();

    assert!(!overlay.is_dragging());
    assert_eq!(overlay.current_position(), Point::new(5.0, 5.0));
}

#[test]
fn moves_after_release_are_ignored() {
    let mut overlay = OverlayController::new(product(10, 10), Point::new(5.0, 5.0));

    overlay.on_pointer_down(Point::new(5.0, 5.0));
    overlay.on_pointer_move(Point::new(50.0, 50.0));
    overlay.on_pointer_up();
    overlay.on_pointer_move(Point::new(90.0, 90.0));

    assert_eq!(overlay.current_position(), Point::new(50.0, 50.0));
}

#[test]
fn overlay_can_leave_the_visible_area() {
    let mut overlay = OverlayController::new(product(10, 10), Point::new(5.0, 5.0));

    overlay.on_pointer_down(Point::new(5.0, 5.0));
    overlay.on_pointer_move(Point::new(-400.0, -300.0));

    assert_eq!(overlay.current_position(), Point::new(-400.0, -300.0));
    assert_eq!(overlay.draw_origin(), (-405, -305));
}

#[test]
fn transitions_are_pure() {
    let start = OverlayState::new(Point::new(0.0, 0.0));

    let grabbed = start.apply(PointerEvent::Down(Point::new(2.0, -1.0)), (10, 10));
    assert_eq!(
        grabbed.drag,
        DragState::Dragging {
            offset: Point::new(2.0, -1.0)
        }
    );
    assert_eq!(start.drag, DragState::Idle);

    let moved = grabbed.apply(PointerEvent::Move(Point::new(12.0, 9.0)), (10, 10));
    assert_eq!(moved.position, Point::new(10.0, 10.0));

    let released = moved.apply(PointerEvent::Up, (10, 10));
    assert_eq!(released, OverlayState::new(Point::new(10.0, 10.0)));
}

#[test]
fn draw_origin_centres_the_product() {
    let overlay = OverlayController::new(product(192, 96), Point::new(300.0, 200.0));
    assert_eq!(overlay.draw_origin(), (204, 152));
    assert_eq!(overlay.product().name, "Aviator");
}

#[test]
fn the_whole_fitted_box_is_grabbable() {
    // A wide product fitted into a 192x192 box is only 96 pixels tall.
    let mut bare = OverlayController::new(product(192, 96), Point::new(300.0, 200.0));
    bare.on_pointer_down(Point::new(300.0, 280.0));
    assert!(!bare.is_dragging());

    let mut boxed = OverlayController::new(product(192, 96), Point::new(300.0, 200.0))
        .with_hit_size(192, 192);
    assert_eq!(boxed.hit_size(), (192, 192));

    boxed.on_pointer_down(Point::new(300.0, 280.0));
    assert!(boxed.is_dragging());
    boxed.on_pointer_move(Point::new(310.0, 290.0));
    assert_eq!(boxed.current_position(), Point::new(310.0, 210.0));

    // Drawing still follows the image, not the box.
    assert_eq!(boxed.draw_origin(), (214, 162));
}
