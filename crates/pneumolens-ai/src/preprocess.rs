//! Upload bytes → normalized `[1, 1, S, S]` tensor.

use image::imageops::{self, FilterType};
use ndarray::Array4;
use tracing::debug;

use crate::error::PipelineError;

const MEAN: f32 = 0.5;
const STD: f32 = 0.5;

/// Decode, resize to `size`×`size`, convert to luminance and scale to `[-1, 1]`.
pub fn preprocess(bytes: &[u8], size: u32) -> Result<Array4<f32>, PipelineError> {
    let decoded = image::load_from_memory(bytes).map_err(|e| PipelineError::Decode(e.to_string()))?;
    let rgb = decoded.to_rgb8();
    debug!(width = rgb.width(), height = rgb.height(), "decoded image");

    let resized = imageops::resize(&rgb, size, size, FilterType::Triangle);

    let side = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 1, side, side));
    for (x, y, pixel) in resized.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let scaled = f32::from(luminance(r, g, b)) / 255.0;
        tensor[[0, 0, y as usize, x as usize]] = (scaled - MEAN) / STD;
    }
    debug!(shape = ?tensor.shape(), "transformed image");
    Ok(tensor)
}

/// ITU-R 601-2 luma in 16.16 fixed point, rounded.
fn luminance(r: u8, g: u8, b: u8) -> u8 {
    let l = u32::from(r) * 19595 + u32::from(g) * 38470 + u32::from(b) * 7471 + 0x8000;
    (l >> 16) as u8
}
