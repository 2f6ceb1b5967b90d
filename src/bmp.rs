//! Palette BMP v3 writer.
//!
//! `image` only emits 8 bpp and wider BMPs; e-ink firmware wants 1 bpp, so
//! the file is assembled by hand: BITMAPFILEHEADER, BITMAPINFOHEADER,
//! palette, then bottom-up rows padded to 4 bytes.

use image::GrayImage;

use crate::convert::BitDepth;

const FILE_HEADER_LEN: u32 = 14;
const INFO_HEADER_LEN: u32 = 40;
/// 72 DPI
const PIXELS_PER_METER: u32 = 2835;

/// Encode an already-quantized greyscale image as a palette BMP.
///
/// 1-bit depth writes 1 bpp with a black/white palette; 2-bit depth writes
/// 4 bpp (BMP has no 2 bpp mode) with a four-entry grey palette.
pub fn encode_palette_bmp(image: &GrayImage, depth: BitDepth) -> Vec<u8> {
    let (width, height) = image.dimensions();
    let palette = depth.palette();
    let bpp: u32 = match depth {
        BitDepth::One => 1,
        BitDepth::Two => 4,
    };

    let row_len = (width * bpp).div_ceil(32) * 4;
    let pixel_offset = FILE_HEADER_LEN + INFO_HEADER_LEN + palette.len() as u32 * 4;
    let image_len = row_len * height;
    let file_len = pixel_offset + image_len;

    let mut out = Vec::with_capacity(file_len as usize);

    // BITMAPFILEHEADER
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&file_len.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&pixel_offset.to_le_bytes());

    // BITMAPINFOHEADER
    out.extend_from_slice(&INFO_HEADER_LEN.to_le_bytes());
    out.extend_from_slice(&(width as i32).to_le_bytes());
    out.extend_from_slice(&(height as i32).to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&(bpp as u16).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // BI_RGB
    out.extend_from_slice(&image_len.to_le_bytes());
    out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
    out.extend_from_slice(&PIXELS_PER_METER.to_le_bytes());
    out.extend_from_slice(&(palette.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());

    // Palette entries are BGRX
    for &level in palette {
        out.extend_from_slice(&[level, level, level, 0]);
    }

    let per_byte = (8 / bpp) as usize;
    for y in (0..height).rev() {
        let mut row = vec![0u8; row_len as usize];
        for x in 0..width {
            let index = depth.palette_index(image.get_pixel(x, y).0[0]);
            let byte = x as usize / per_byte;
            let shift = 8 - bpp as usize * (x as usize % per_byte + 1);
            row[byte] |= index << shift;
        }
        out.extend_from_slice(&row);
    }

    out
}
