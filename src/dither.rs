//! Floyd–Steinberg error diffusion for low-bit-depth greyscale output.

use image::{GrayImage, Luma};

use crate::convert::BitDepth;

/// Quantize a greyscale image to `depth`, diffusing quantization error.
///
/// Pixels are visited in raster order. Each pixel's error is pushed to the
/// unprocessed neighbours with the classic weights:
///
/// ```text
///         .    X   7/16
///       3/16 5/16  1/16
/// ```
///
/// The returned image only contains palette values (`0`/`255` at 1 bit,
/// `0`/`85`/`170`/`255` at 2 bits).
pub fn floyd_steinberg(luma: &GrayImage, depth: BitDepth) -> GrayImage {
    let (width, height) = luma.dimensions();
    let (w, h) = (width as usize, height as usize);

    let mut levels: Vec<f32> = luma.as_raw().iter().map(|&p| p as f32).collect();
    let mut out = GrayImage::new(width, height);

    for y in 0..h {
        for x in 0..w {
            let i = y * w + x;
            let old = levels[i];
            let new = depth.quantize(old);
            out.put_pixel(x as u32, y as u32, Luma([new]));

            let err = old - new as f32;
            if err == 0.0 {
                continue;
            }
            if x + 1 < w {
                levels[i + 1] += err * 7.0 / 16.0;
            }
            if y + 1 < h {
                let below = i + w;
                if x > 0 {
                    levels[below - 1] += err * 3.0 / 16.0;
                }
                levels[below] += err * 5.0 / 16.0;
                if x + 1 < w {
                    levels[below + 1] += err * 1.0 / 16.0;
                }
            }
        }
    }

    out
}
