use image::{Rgba, RgbaImage};

/// RGBA drawing target presented to a display surface each tick.
pub struct Canvas {
    pixels: RgbaImage,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: RgbaImage::new(width, height),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn clear(&mut self, color: Rgba<u8>) {
        for pixel in self.pixels.pixels_mut() {
            *pixel = color;
        }
    }

    /// Source-over draw of `image` with its top-left at `(x, y)`; parts
    /// outside the canvas are clipped.
    pub fn draw_image(&mut self, image: &RgbaImage, x: i64, y: i64) {
        let (canvas_w, canvas_h) = (self.pixels.width() as i64, self.pixels.height() as i64);
        let (image_w, image_h) = (image.width() as i64, image.height() as i64);

        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + image_w).min(canvas_w);
        let y1 = (y + image_h).min(canvas_h);
        if x0 >= x1 || y0 >= y1 {
            return;
        }

        for cy in y0..y1 {
            for cx in x0..x1 {
                let src = image.get_pixel((cx - x) as u32, (cy - y) as u32);
                let dst = self.pixels.get_pixel_mut(cx as u32, cy as u32);
                *dst = source_over(*src, *dst);
            }
        }
    }

    /// Pack into 0x00RRGGBB words for a window framebuffer.
    pub fn write_0rgb(&self, out: &mut Vec<u32>) {
        out.clear();
        out.extend(self.pixels.pixels().map(|p| {
            ((p[0] as u32) << 16) | ((p[1] as u32) << 8) | p[2] as u32
        }));
    }
}

fn source_over(src: Rgba<u8>, dst: Rgba<u8>) -> Rgba<u8> {
    let alpha = src[3] as u32;
    match alpha {
        0 => dst,
        255 => src,
        _ => {
            let inverse = 255 - alpha;
            let mix = |s: u8, d: u8| ((s as u32 * alpha + d as u32 * inverse + 127) / 255) as u8;
            let out_alpha = alpha + (dst[3] as u32 * inverse + 127) / 255;
            Rgba([
                mix(src[0], dst[0]),
                mix(src[1], dst[1]),
                mix(src[2], dst[2]),
                out_alpha.min(255) as u8,
            ])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transparent_pixels_leave_backdrop_visible() {
        let mut canvas = Canvas::new(2, 1);
        canvas.clear(Rgba([10, 20, 30, 255]));

        let mut image = RgbaImage::from_pixel(2, 1, Rgba([200, 100, 50, 255]));
        image.put_pixel(1, 0, Rgba([200, 100, 50, 0]));
        canvas.draw_image(&image, 0, 0);

        assert_eq!(*canvas.pixels().get_pixel(0, 0), Rgba([200, 100, 50, 255]));
        assert_eq!(*canvas.pixels().get_pixel(1, 0), Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn half_alpha_blends() {
        let blended = source_over(Rgba([255, 0, 0, 128]), Rgba([0, 0, 255, 255]));
        assert_eq!(blended[3], 255);
        assert!(blended[0] > 120 && blended[0] < 136);
        assert!(blended[2] > 120 && blended[2] < 136);
    }

    #[test]
    fn draw_clips_at_every_edge() {
        let mut canvas = Canvas::new(3, 3);
        canvas.clear(Rgba([0, 0, 0, 255]));
        let image = RgbaImage::from_pixel(2, 2, Rgba([255, 255, 255, 255]));

        canvas.draw_image(&image, -1, -1);
        canvas.draw_image(&image, 2, 2);
        canvas.draw_image(&image, 10, 0);

        let white: Vec<(u32, u32)> = canvas
            .pixels()
            .enumerate_pixels()
            .filter(|(_, _, p)| p[0] == 255)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(white, vec![(0, 0), (2, 2)]);
    }

    #[test]
    fn packs_0rgb_words() {
        let mut canvas = Canvas::new(1, 1);
        canvas.clear(Rgba([0x12, 0x34, 0x56, 0xff]));
        let mut out = Vec::new();
        canvas.write_0rgb(&mut out);
        assert_eq!(out, vec![0x0012_3456]);
    }
}
