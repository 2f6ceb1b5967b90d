//! Raster to output-format conversion.
//!
//! - `png`: encoded losslessly, pixels untouched
//! - `jpeg`: re-encoded at the configured quality
//! - `bmp3` / `bmp`: greyscale, Floyd–Steinberg dithered to 1 or 2 bits,
//!   written as a palette BMP

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use serde::Deserialize;

use crate::bmp::encode_palette_bmp;
use crate::dither::floyd_steinberg;
use crate::{Error, OutputFormat};

/// Bit depth for dithered BMP output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum BitDepth {
    /// Black and white
    #[default]
    One,
    /// Four grey levels
    Two,
}

impl BitDepth {
    /// Palette levels, darkest first.
    pub fn palette(&self) -> &'static [u8] {
        match self {
            BitDepth::One => &[0, 255],
            BitDepth::Two => &[0, 85, 170, 255],
        }
    }

    /// Snap a (possibly error-shifted) grey level to the palette.
    ///
    /// 1 bit thresholds at the midpoint 128; 2 bits rounds to the nearest
    /// of the four levels.
    pub fn quantize(&self, level: f32) -> u8 {
        match self {
            BitDepth::One => {
                if level >= 128.0 {
                    255
                } else {
                    0
                }
            }
            BitDepth::Two => ((level / 85.0).round().clamp(0.0, 3.0) as u8) * 85,
        }
    }

    /// Palette index of a quantized level.
    pub fn palette_index(&self, level: u8) -> u8 {
        match self {
            BitDepth::One => u8::from(level >= 128),
            BitDepth::Two => (level as u16 * 3 / 255) as u8,
        }
    }
}

impl TryFrom<u8> for BitDepth {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(BitDepth::One),
            2 => Ok(BitDepth::Two),
            other => Err(format!("bit depth must be 1 or 2 (got {})", other)),
        }
    }
}

/// Encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertOptions {
    /// JPEG quality 1-100 (default: 90)
    pub jpeg_quality: u8,
    /// BMP bit depth (default: 1)
    pub bit_depth: BitDepth,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 90,
            bit_depth: BitDepth::One,
        }
    }
}

/// Encode a raster in the requested format.
///
/// # Example
///
/// ```
/// use image::{DynamicImage, RgbImage};
/// use inkshot::{convert, ConvertOptions, OutputFormat};
///
/// let raster = DynamicImage::ImageRgb8(RgbImage::new(800, 480));
/// let bmp = convert(&raster, OutputFormat::Bmp3, &ConvertOptions::default()).unwrap();
/// assert_eq!(&bmp[..2], b"BM");
/// ```
pub fn convert(
    image: &DynamicImage,
    format: OutputFormat,
    options: &ConvertOptions,
) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    match format {
        OutputFormat::Png => {
            image.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
        }
        OutputFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, options.jpeg_quality).encode_image(&rgb)?;
        }
        OutputFormat::Bmp3 | OutputFormat::Bmp => {
            let dithered = floyd_steinberg(&image.to_luma8(), options.bit_depth);
            buf = encode_palette_bmp(&dithered, options.bit_depth);
        }
    }
    Ok(buf)
}

/// Like [`convert`], with the format given by name.
///
/// Unknown names fail with [`Error::UnsupportedFormat`].
pub fn convert_named(
    image: &DynamicImage,
    format: &str,
    options: &ConvertOptions,
) -> Result<Vec<u8>, Error> {
    convert(image, format.parse()?, options)
}
