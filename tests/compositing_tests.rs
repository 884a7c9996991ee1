mod common;

use common::{mask_from_rows, pattern};
use image::{Rgba, RgbaImage};
use tryon::compositing::{apply_mask, CompositingPipeline};

#[test]
fn without_a_mask_the_frame_passes_through_opaque() {
    let frame = pattern(5, 3);
    let mut pipeline = CompositingPipeline::new();

    let out = pipeline.composite(&frame, None);

    assert!(!out.is_masked());
    assert_eq!(out.pixels().as_raw(), frame.as_raw());
}

#[test]
fn unmasked_output_is_forced_opaque() {
    let frame = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 40]));
    let mut pipeline = CompositingPipeline::new();

    let out = pipeline.composite(&frame, None);

    assert!(out.pixels().pixels().all(|p| *p == Rgba([1, 2, 3, 255])));
}

#[test]
fn background_becomes_transparent_and_foreground_is_untouched() {
    let frame = pattern(4, 3);
    let mask = mask_from_rows(&["#..#", ".##.", "...."]);
    let mut pipeline = CompositingPipeline::new();

    let out = pipeline.composite(&frame, Some(&mask));
    assert!(out.is_masked());

    for (x, y, pixel) in out.pixels().enumerate_pixels() {
        let original = frame.get_pixel(x, y);
        if mask.is_foreground(x, y) {
            assert_eq!(pixel, original, "foreground ({}, {})", x, y);
        } else {
            assert_eq!(pixel[3], 0, "background ({}, {})", x, y);
            assert_eq!(pixel.0[..3], original.0[..3]);
        }
    }
}

#[test]
fn a_coarser_mask_maps_each_pixel_to_its_nearest_cell() {
    let frame = pattern(4, 4);
    let mask = mask_from_rows(&["#.", ".#"]);

    let out = apply_mask(&frame, &mask);

    let alpha: Vec<Vec<u8>> = (0..4)
        .map(|y| (0..4).map(|x| out.get_pixel(x, y)[3]).collect())
        .collect();
    assert_eq!(
        alpha,
        vec![
            vec![255, 255, 0, 0],
            vec![255, 255, 0, 0],
            vec![0, 0, 255, 255],
            vec![0, 0, 255, 255],
        ]
    );
}

#[test]
fn odd_sizes_stay_in_bounds() {
    let frame = pattern(7, 5);
    let mask = mask_from_rows(&["#.#", "...", "#.#"]);

    let out = apply_mask(&frame, &mask);

    assert_eq!(out.dimensions(), (7, 5));
    assert_eq!(out.get_pixel(0, 0)[3], 255);
    assert_eq!(out.get_pixel(6, 4)[3], 255);
    assert_eq!(out.get_pixel(3, 2)[3], 0);
}

#[test]
fn pipeline_matches_the_pure_transform_across_ticks() {
    let frame = pattern(6, 4);
    let first = mask_from_rows(&["##.", "..#"]);
    let second = mask_from_rows(&["....", "####", "#..#"]);
    let mut pipeline = CompositingPipeline::new();

    for _ in 0..3 {
        let out = pipeline.composite(&frame, Some(&first));
        assert_eq!(out.pixels(), &apply_mask(&frame, &first));
    }
    let out = pipeline.composite(&frame, Some(&second));
    assert_eq!(out.pixels(), &apply_mask(&frame, &second));

    let out = pipeline.composite(&frame, None);
    assert_eq!(out.pixels(), &frame);
}

#[test]
fn frame_size_changes_are_followed() {
    let mask = mask_from_rows(&["#"]);
    let mut pipeline = CompositingPipeline::new();

    pipeline.composite(&pattern(4, 4), Some(&mask));
    let out = pipeline.composite(&pattern(2, 3), Some(&mask));

    assert_eq!(out.pixels().dimensions(), (2, 3));
    assert_eq!(pipeline.buffer().pixels(), &pattern(2, 3));
}

#[test]
fn all_background_mask_clears_every_alpha() {
    let frame = pattern(3, 3);
    let mask = mask_from_rows(&["..", ".."]);

    let out = apply_mask(&frame, &mask);

    assert!(out.pixels().all(|p| p[3] == 0));
}
