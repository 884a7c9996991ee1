//! Background removal: turn a camera frame plus the latest mask into the
//! buffer that gets painted.

use crate::segmentation::SegmentationMask;
use image::RgbaImage;

/// The buffer drawn to the display this tick.
#[derive(Debug, Clone)]
pub struct CompositedBuffer {
    pixels: RgbaImage,
    masked: bool,
}

impl CompositedBuffer {
    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Whether a mask was applied; false means the raw frame, fully opaque.
    pub fn is_masked(&self) -> bool {
        self.masked
    }
}

/// Nearest-cell lookup from frame columns/rows to mask columns/rows.
#[derive(Debug, Default)]
struct CellMap {
    key: (u32, u32, u32, u32),
    columns: Vec<u32>,
    rows: Vec<u32>,
}

impl CellMap {
    fn refresh(&mut self, frame: (u32, u32), mask: (u32, u32)) {
        let key = (frame.0, frame.1, mask.0, mask.1);
        if key == self.key && !self.columns.is_empty() {
            return;
        }
        self.key = key;
        self.columns = axis_map(frame.0, mask.0);
        self.rows = axis_map(frame.1, mask.1);
    }
}

/// Map each of `frame_len` positions to the mask cell covering it.
fn axis_map(frame_len: u32, mask_len: u32) -> Vec<u32> {
    (0..frame_len)
        .map(|i| ((i as u64 * mask_len as u64) / frame_len as u64) as u32)
        .collect()
}

fn mask_into(frame: &RgbaImage, mask: &SegmentationMask, map: &CellMap, out: &mut RgbaImage) {
    let width = frame.width() as usize;
    let raw = mask.as_raw();
    let mask_width = mask.width() as usize;

    out.copy_from_slice(frame.as_raw());
    for (y, row) in out.chunks_exact_mut(width * 4).enumerate() {
        let mask_row = &raw[map.rows[y] as usize * mask_width..][..mask_width];
        for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
            if mask_row[map.columns[x] as usize] == 0 {
                pixel[3] = 0;
            }
        }
    }
}

/// Copy `frame` with every background-classified pixel made fully
/// transparent. Foreground pixels are left untouched; the edge is a hard cut.
pub fn apply_mask(frame: &RgbaImage, mask: &SegmentationMask) -> RgbaImage {
    let mut map = CellMap::default();
    map.refresh(frame.dimensions(), mask.dimensions());
    let mut out = RgbaImage::new(frame.width(), frame.height());
    mask_into(frame, mask, &map, &mut out);
    out
}

/// Reusable compositor: keeps its output buffer and cell lookup tables across
/// ticks so steady-state compositing does not allocate.
#[derive(Debug)]
pub struct CompositingPipeline {
    buffer: CompositedBuffer,
    map: CellMap,
}

impl Default for CompositingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl CompositingPipeline {
    pub fn new() -> Self {
        Self {
            buffer: CompositedBuffer {
                pixels: RgbaImage::new(0, 0),
                masked: false,
            },
            map: CellMap::default(),
        }
    }

    /// Composite `frame` with the current mask, or pass it through opaque
    /// when there is no mask yet.
    pub fn composite(
        &mut self,
        frame: &RgbaImage,
        mask: Option<&SegmentationMask>,
    ) -> &CompositedBuffer {
        let _span = tracing::debug_span!("composite").entered();

        if self.buffer.pixels.dimensions() != frame.dimensions() {
            tracing::debug!(
                "Compositing buffer resized to {}x{}",
                frame.width(),
                frame.height()
            );
            self.buffer.pixels = RgbaImage::new(frame.width(), frame.height());
        }

        match mask {
            Some(mask) if frame.width() > 0 && frame.height() > 0 => {
                self.map.refresh(frame.dimensions(), mask.dimensions());
                mask_into(frame, mask, &self.map, &mut self.buffer.pixels);
                self.buffer.masked = true;
            }
            _ => {
                self.buffer.pixels.copy_from_slice(frame.as_raw());
                for pixel in self.buffer.pixels.pixels_mut() {
                    pixel[3] = u8::MAX;
                }
                self.buffer.masked = false;
            }
        }

        &self.buffer
    }

    /// Output of the most recent `composite` call.
    pub fn buffer(&self) -> &CompositedBuffer {
        &self.buffer
    }
}
