//! A single captured frame and its metadata.

use base64::Engine;
use chrono::{DateTime, Utc};
use image::{DynamicImage, ImageEncoder};
use std::io::Cursor;
use std::sync::Arc;

/// An immutable, shareable captured frame.
///
/// Produced by a `CameraSource`, pushed into a `FrameBuffer`, and read by
/// every downstream consumer (change detector, analyzer, HTTP handlers).
/// Frames are reference-counted rather than cloned pixel-for-pixel: every
/// consumer reads only, so cheap `Arc` sharing is sufficient.
#[derive(Clone)]
pub struct Frame {
    pub image: Arc<DynamicImage>,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub sequence_number: u64,
    pub resolution: (u32, u32),
}

impl Frame {
    pub fn new(image: DynamicImage, source_id: impl Into<String>, sequence_number: u64) -> Self {
        let resolution = (image.width(), image.height());
        Frame {
            image: Arc::new(image),
            timestamp: Utc::now(),
            source_id: source_id.into(),
            sequence_number,
            resolution,
        }
    }

    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, image::ImageError> {
        let mut buf = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
        let rgb = self.image.to_rgb8();
        encoder.write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(buf)
    }

    pub fn to_base64(&self, quality: u8) -> Result<String, image::ImageError> {
        let bytes = self.to_jpeg_bytes(quality)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    /// Downscale (if needed) and encode — saves tokens/bandwidth for VLM calls.
    pub fn to_thumbnail(&self, max_dim: u32, quality: u8) -> Result<String, image::ImageError> {
        let (w, h) = self.resolution;
        let resized = if w.max(h) > max_dim {
            self.image
                .resize(max_dim, max_dim, image::imageops::FilterType::Triangle)
        } else {
            (*self.image).clone()
        };
        let mut buf = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
        let rgb = resized.to_rgb8();
        encoder.write_image(
            rgb.as_raw(),
            rgb.width(),
            rgb.height(),
            image::ExtendedColorType::Rgb8,
        )?;
        Ok(base64::engine::general_purpose::STANDARD.encode(buf))
    }

    pub fn decode_jpeg(
        bytes: &[u8],
        source_id: impl Into<String>,
        sequence_number: u64,
    ) -> Result<Frame, image::ImageError> {
        let img = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()?
            .decode()?;
        Ok(Frame::new(img, source_id, sequence_number))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(w: u32, h: u32, seq: u64) -> Frame {
        let img = DynamicImage::new_rgb8(w, h);
        Frame::new(img, "test:0", seq)
    }

    #[test]
    fn resolution_matches_image_dimensions() {
        let f = solid_frame(64, 48, 1);
        assert_eq!(f.resolution, (64, 48));
    }

    #[test]
    fn jpeg_roundtrip_decodes() {
        let f = solid_frame(32, 32, 1);
        let bytes = f.to_jpeg_bytes(85).unwrap();
        let decoded = Frame::decode_jpeg(&bytes, "test:0", 2).unwrap();
        assert_eq!(decoded.resolution, (32, 32));
        assert_eq!(decoded.sequence_number, 2);
    }

    #[test]
    fn decode_jpeg_rejects_garbage() {
        let err = Frame::decode_jpeg(b"not a jpeg", "test:0", 1);
        assert!(err.is_err());
    }

    #[test]
    fn thumbnail_respects_max_dim() {
        let f = solid_frame(1000, 500, 1);
        let b64 = f.to_thumbnail(640, 60).unwrap();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(b64)
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(decoded.width() <= 640 && decoded.height() <= 640);
    }
}
