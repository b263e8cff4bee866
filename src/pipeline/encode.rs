//! Image encoding: raw image bytes → base64 inline data for the API.
//!
//! Phone photos of lecture slides routinely arrive at 4000+ px per edge and
//! several megabytes. Gemini downsamples large images anyway, so shrinking
//! the longest edge to `max_dimension` before upload costs no legibility and
//! keeps the request body small. PNG inputs stay PNG (lossless text); JPEG
//! inputs stay JPEG.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use tracing::debug;

/// Base64 image payload ready for an `inlineData` part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: String,
}

/// Decode `bytes`, downscale if needed, and re-encode as base64.
pub fn encode_image(bytes: &[u8], max_dimension: u32) -> Result<InlineImage, image::ImageError> {
    let format = image::guess_format(bytes)?;
    let img = image::load_from_memory_with_format(bytes, format)?;
    let img = downscale(img, max_dimension);

    let (out_format, mime) = match format {
        ImageFormat::Jpeg => (ImageFormat::Jpeg, "image/jpeg"),
        _ => (ImageFormat::Png, "image/png"),
    };

    let img = if out_format == ImageFormat::Jpeg {
        // The JPEG encoder rejects alpha channels.
        DynamicImage::ImageRgb8(img.to_rgb8())
    } else {
        img
    };

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), out_format)?;

    let data = STANDARD.encode(&buf);
    debug!(
        "Encoded {}x{} image → {} bytes base64",
        img.width(),
        img.height(),
        data.len()
    );

    Ok(InlineImage {
        mime_type: mime.to_string(),
        data,
    })
}

fn downscale(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    if img.width().max(img.height()) <= max_dimension {
        img
    } else {
        img.resize(max_dimension, max_dimension, FilterType::Triangle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn encode_small_png() {
        let data = encode_image(&png_bytes(10, 10), 2048).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        let back = image::load_from_memory(&decoded).unwrap();
        assert_eq!((back.width(), back.height()), (10, 10));
    }

    #[test]
    fn large_image_is_downscaled_keeping_aspect() {
        let data = encode_image(&png_bytes(400, 200), 100).unwrap();
        let decoded = STANDARD.decode(&data.data).unwrap();
        let back = image::load_from_memory(&decoded).unwrap();
        assert_eq!((back.width(), back.height()), (100, 50));
    }

    #[test]
    fn jpeg_stays_jpeg() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 255, 255])));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img.to_rgb8())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)
            .unwrap();
        let data = encode_image(&buf, 2048).unwrap();
        assert_eq!(data.mime_type, "image/jpeg");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(encode_image(b"definitely not an image", 2048).is_err());
    }
}
