use super::{Canvas, DisplaySurface, SurfaceError};
use image::RgbaImage;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use v4l::video::Output;
use v4l::{Device, Format, FourCC};

/// Mirrors the try-on canvas into a v4l2loopback virtual camera.
pub struct V4L2Output {
    file: File,
    width: u32,
    height: u32,
    yuyv: Vec<u8>,
}

impl V4L2Output {
    pub fn new<P: AsRef<Path>>(device_path: P, width: u32, height: u32) -> Result<Self, SurfaceError> {
        let path = device_path.as_ref();
        tracing::info!(
            "Opening v4l2loopback device at {} ({}x{})",
            path.display(),
            width,
            height
        );

        let device = Device::with_path(path).map_err(|e| {
            SurfaceError::Unavailable(format!("{}: {}", path.display(), e))
        })?;
        let format = Format::new(width, height, FourCC::new(b"YUYV"));
        Output::set_format(&device, &format).map_err(|e| {
            SurfaceError::Unavailable(format!("set YUYV format on {}: {}", path.display(), e))
        })?;

        // v4l2loopback accepts raw frame data written to the device file
        let file = File::options().write(true).open(path).map_err(|e| {
            SurfaceError::Unavailable(format!("{}: {}", path.display(), e))
        })?;

        tracing::info!("v4l2loopback device opened successfully");

        Ok(Self {
            file,
            width,
            height,
            yuyv: Vec::with_capacity((width * height * 2) as usize),
        })
    }
}

/// Pack RGBA into YUYV (4:2:2), sharing chroma between horizontal pixel
/// pairs. Alpha is ignored; an odd last column pairs with itself.
fn rgba_to_yuyv(image: &RgbaImage, out: &mut Vec<u8>) {
    let width = image.width() as usize;
    out.clear();
    if width == 0 {
        return;
    }

    for row in image.as_raw().chunks_exact(width * 4) {
        for pair in row.chunks(8) {
            let left = &pair[..4];
            let right = if pair.len() == 8 { &pair[4..] } else { left };

            let (y0, u0, v0) = rgb_to_yuv(left[0], left[1], left[2]);
            let (y1, u1, v1) = rgb_to_yuv(right[0], right[1], right[2]);
            let u = ((u16::from(u0) + u16::from(u1)) / 2) as u8;
            let v = ((u16::from(v0) + u16::from(v1)) / 2) as u8;

            out.extend_from_slice(&[y0, u, y1, v]);
        }
    }
}

/// Full-range BT.601 in 8.8 fixed point.
fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (i32::from(r), i32::from(g), i32::from(b));

    let y = (77 * r + 150 * g + 29 * b) >> 8;
    let u = ((-43 * r - 85 * g + 128 * b) >> 8) + 128;
    let v = ((128 * r - 107 * g - 21 * b) >> 8) + 128;

    (
        y.clamp(0, 255) as u8,
        u.clamp(0, 255) as u8,
        v.clamp(0, 255) as u8,
    )
}

impl DisplaySurface for V4L2Output {
    fn present(&mut self, canvas: &Canvas) -> Result<(), SurfaceError> {
        let resized;
        let frame = if canvas.dimensions() != (self.width, self.height) {
            resized = image::imageops::resize(
                canvas.pixels(),
                self.width,
                self.height,
                image::imageops::FilterType::Triangle,
            );
            &resized
        } else {
            canvas.pixels()
        };

        rgba_to_yuyv(frame, &mut self.yuyv);

        self.file
            .write_all(&self.yuyv)
            .map_err(|e| SurfaceError::Present(e.to_string()))
    }

    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
