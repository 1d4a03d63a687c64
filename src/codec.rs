//! In-process codec service.
//!
//! Every backend, local or not, implements [`Compressor`]: read the source
//! file, return the compressed bytes. Backends never write to disk; staging
//! and committing the bytes belongs to [`crate::staging`].

use crate::constants::{LIBDEFLATER_MAX_LEVEL, PNG_OPTIMIZATION_PRESET};
use crate::error::{Result, SqueezeError};
use crate::formats::ImageKind;
use crate::processing::{decode_image, read_source};
use crate::router::Codec;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use imagequant::RGBA;
use oxipng::{Deflaters, Options};
use std::borrow::Cow;
use std::io::Cursor;
use std::path::Path;

/// A service that turns one source file into compressed bytes.
pub trait Compressor: Send + Sync {
    /// Short name used in status lines and outcomes.
    fn name(&self) -> &'static str;

    fn compress(&self, source: &Path, codec: &Codec) -> Result<Vec<u8>>;
}

/// Pure-Rust encoders for every supported format.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalCodecs;

impl Compressor for LocalCodecs {
    fn name(&self) -> &'static str {
        "local"
    }

    fn compress(&self, source: &Path, codec: &Codec) -> Result<Vec<u8>> {
        let bytes = read_source(source)?;
        tracing::debug!(path = %source.display(), ?codec, "encoding locally");

        match *codec {
            Codec::Png => optimize_png(&bytes),
            Codec::Jpeg { quality } => {
                encode_jpeg(&decode_image(&bytes, ImageKind::Jpeg)?, quality)
            }
            Codec::WebP { quality } => {
                encode_webp(&decode_image(&bytes, ImageKind::WebP)?, quality)
            }
            Codec::Bmp => encode_with_format(&decode_image(&bytes, ImageKind::Bmp)?, ImageFormat::Bmp),
            // The TIFF writer is lossless; quality has no effect on it.
            Codec::Tiff { .. } => {
                encode_with_format(&decode_image(&bytes, ImageKind::Tiff)?, ImageFormat::Tiff)
            }
            Codec::GifPalette { colors } | Codec::GifOptimized { colors, .. } => {
                encode_gif(&bytes, colors)
            }
        }
    }
}

/// Lossless PNG recompression at the strongest oxipng preset.
pub fn optimize_png(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut options = Options::from_preset(PNG_OPTIMIZATION_PRESET);
    options.deflate = Deflaters::Libdeflater {
        compression: LIBDEFLATER_MAX_LEVEL,
    };

    oxipng::optimize_from_memory(bytes, &options)
        .map_err(|e| SqueezeError::PngOptimization(e.to_string()))
}

pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    // JPEG has no alpha channel.
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)?;
    Ok(buffer)
}

pub fn encode_webp(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgba = img.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
    let encoded = encoder
        .encode_simple(false, quality as f32)
        .map_err(|e| SqueezeError::WebpEncoding(format!("{:?}", e)))?;
    Ok(encoded.to_vec())
}

fn encode_with_format(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    img.write_to(&mut cursor, format)?;
    Ok(cursor.into_inner())
}

/// Re-encodes every frame of a (possibly animated) GIF with a quantized
/// palette of at most `colors` entries. Frame geometry, delays, disposal
/// and the loop count are preserved.
pub fn encode_gif(bytes: &[u8], colors: u16) -> Result<Vec<u8>> {
    let gif_err = |e: &dyn std::fmt::Display| SqueezeError::GifEncoding(e.to_string());

    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(Cursor::new(bytes)).map_err(|e| gif_err(&e))?;

    let (width, height) = (decoder.width(), decoder.height());
    let repeat = decoder.repeat();

    let mut output = Vec::new();
    {
        let mut encoder =
            gif::Encoder::new(&mut output, width, height, &[]).map_err(|e| gif_err(&e))?;
        encoder.set_repeat(repeat).map_err(|e| gif_err(&e))?;

        let mut frame_count = 0usize;
        while let Some(frame) = decoder.read_next_frame().map_err(|e| gif_err(&e))? {
            let (palette, indices, transparent) = quantize_frame(
                &frame.buffer,
                frame.width as usize,
                frame.height as usize,
                colors,
            )?;

            let mut out = gif::Frame::default();
            out.delay = frame.delay;
            out.dispose = frame.dispose;
            out.transparent = transparent;
            out.needs_user_input = frame.needs_user_input;
            out.top = frame.top;
            out.left = frame.left;
            out.width = frame.width;
            out.height = frame.height;
            out.palette = Some(palette);
            out.buffer = Cow::Owned(indices);
            encoder.write_frame(&out).map_err(|e| gif_err(&e))?;
            frame_count += 1;
        }

        if frame_count == 0 {
            return Err(SqueezeError::GifEncoding("GIF contains no frames".to_string()));
        }
    }

    Ok(output)
}

/// Returns `(rgb palette, per-pixel indices, transparent index)`.
fn quantize_frame(
    rgba: &[u8],
    width: usize,
    height: usize,
    colors: u16,
) -> Result<(Vec<u8>, Vec<u8>, Option<u8>)> {
    let liq_err = |e: imagequant::Error| SqueezeError::GifEncoding(e.to_string());

    let pixels: Vec<RGBA> = rgba
        .chunks_exact(4)
        .map(|px| RGBA::new(px[0], px[1], px[2], px[3]))
        .collect();

    let mut attr = imagequant::new();
    attr.set_max_colors(colors as u32).map_err(liq_err)?;

    let mut img = attr
        .new_image(pixels, width, height, 0.0)
        .map_err(liq_err)?;
    let mut quantized = attr.quantize(&mut img).map_err(liq_err)?;
    quantized.set_dithering_level(1.0).map_err(liq_err)?;
    let (palette, indices) = quantized.remapped(&mut img).map_err(liq_err)?;

    let transparent = palette.iter().position(|c| c.a == 0).map(|i| i as u8);
    let rgb = palette.iter().flat_map(|c| [c.r, c.g, c.b]).collect();

    Ok((rgb, indices, transparent))
}
