//! Turns decoded video frames into 1-bit panel bitmaps.

use anyhow::{Result, ensure};
use image::imageops::{self, BiLevel, FilterType};
use image::{DynamicImage, GrayImage, Luma};

use crate::config::PanelGeometry;

/// Packed monochrome frame buffer.
///
/// Rows are padded to whole bytes, pixels are stored MSB first and a set bit
/// is white, which is the layout e-paper drivers expect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Bitmap {
    /// Pack a bi-level image; any value at or above mid-grey is white.
    pub fn from_luma(image: &GrayImage) -> Self {
        let (width, height) = image.dimensions();
        let stride = Self::stride_for(width);
        let mut data = vec![0u8; stride * height as usize];
        for (x, y, Luma([v])) in image.enumerate_pixels() {
            if *v >= 128 {
                data[y as usize * stride + x as usize / 8] |= 0x80 >> (x % 8);
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    fn stride_for(width: u32) -> usize {
        (width as usize).div_ceil(8)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row.
    pub fn stride(&self) -> usize {
        Self::stride_for(self.width)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn is_white(&self, x: u32, y: u32) -> bool {
        let byte = self.data[y as usize * self.stride() + x as usize / 8];
        byte & (0x80 >> (x % 8)) != 0
    }

    /// Expand back into an 8-bit image, e.g. for a PNG preview.
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width, self.height, |x, y| {
            if self.is_white(x, y) {
                Luma([255])
            } else {
                Luma([0])
            }
        })
    }
}

/// Letterbox `frame` onto a black panel-sized canvas, then Floyd–Steinberg
/// dither it down to one bit per pixel.
pub fn dither_frame(frame: &DynamicImage, panel: PanelGeometry) -> Result<Bitmap> {
    ensure!(
        frame.width() > 0 && frame.height() > 0,
        "cannot dither an empty {}x{} frame",
        frame.width(),
        frame.height()
    );
    ensure!(
        panel.width > 0 && panel.height > 0,
        "panel must have a non-zero size"
    );

    let mut gray = fit_to_panel(frame, panel);
    imageops::dither(&mut gray, &BiLevel);
    Ok(Bitmap::from_luma(&gray))
}

fn fit_to_panel(frame: &DynamicImage, panel: PanelGeometry) -> GrayImage {
    let luma = frame.to_luma8();
    if luma.dimensions() == (panel.width, panel.height) {
        return luma;
    }
    let (w, h) = letterbox_size(luma.dimensions(), panel);
    let scaled = imageops::resize(&luma, w, h, FilterType::Triangle);
    let x = (panel.width - w) / 2;
    let y = (panel.height - h) / 2;
    let mut canvas = GrayImage::from_pixel(panel.width, panel.height, Luma([0]));
    imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));
    canvas
}

/// Size of a `(width, height)` frame scaled to touch the panel on one axis
/// without overflowing the other.
fn letterbox_size((src_w, src_h): (u32, u32), panel: PanelGeometry) -> (u32, u32) {
    let (sw, sh) = (u64::from(src_w), u64::from(src_h));
    let (pw, ph) = (u64::from(panel.width), u64::from(panel.height));
    let div_round = |num: u64, den: u64| (num + den / 2) / den;
    let (w, h) = if sw * ph >= sh * pw {
        (pw, div_round(sh * pw, sw))
    } else {
        (div_round(sw * ph, sh), ph)
    };
    (w.clamp(1, pw) as u32, h.clamp(1, ph) as u32)
}
