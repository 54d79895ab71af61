//! Stateful perceptual-hash + pixel-diff change detection.
//!
//! No ML models: a greyscale 64x64 downscale feeds both an 8x8 average
//! hash (64 bits, Hamming-comparable against the previous frame) and a
//! pixel-diff percentage. Must stay cheap — a handful of downscales and a
//! popcount, nothing heavier.

use image::{imageops::FilterType, DynamicImage, GrayImage};

use crate::camera::Frame;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeLevel {
    None,
    Minor,
    Moderate,
    Major,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ChangeResult {
    pub level: ChangeLevel,
    pub hash_distance: u32,
    pub pixel_diff_pct: f64,
    pub description: String,
}

impl ChangeResult {
    pub fn initial() -> Self {
        ChangeResult {
            level: ChangeLevel::Major,
            hash_distance: 64,
            pixel_diff_pct: 1.0,
            description: "Initial frame".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ChangeThresholds {
    pub minor: u32,
    pub moderate: u32,
    pub major: u32,
}

impl Default for ChangeThresholds {
    fn default() -> Self {
        ChangeThresholds {
            minor: 5,
            moderate: 12,
            major: 25,
        }
    }
}

const DOWNSCALE_DIM: u32 = 64;
const HASH_DIM: u32 = 8;
const PIXEL_DIFF_THRESHOLD: i16 = 25;

fn to_grayscale_64(image: &DynamicImage) -> GrayImage {
    image
        .resize_exact(DOWNSCALE_DIM, DOWNSCALE_DIM, FilterType::Triangle)
        .to_luma8()
}

/// 8x8 average hash over the 64x64 greyscale downscale: bit `i` is 1 if
/// pixel `i` is at or above the mean of the 8x8-pooled image.
fn average_hash(gray64: &GrayImage) -> u64 {
    let pooled = image::imageops::resize(gray64, HASH_DIM, HASH_DIM, FilterType::Triangle);
    let mean: u32 = pooled.pixels().map(|p| p.0[0] as u32).sum::<u32>() / (HASH_DIM * HASH_DIM);
    let mut hash: u64 = 0;
    for (i, p) in pooled.pixels().enumerate() {
        if p.0[0] as u32 >= mean {
            hash |= 1 << i;
        }
    }
    hash
}

fn pixel_diff_pct(prev: &GrayImage, cur: &GrayImage) -> f64 {
    let total = (DOWNSCALE_DIM * DOWNSCALE_DIM) as f64;
    let changed = prev
        .pixels()
        .zip(cur.pixels())
        .filter(|(a, b)| (a.0[0] as i16 - b.0[0] as i16).abs() > PIXEL_DIFF_THRESHOLD)
        .count() as f64;
    changed / total
}

fn describe(level: ChangeLevel, distance: u32) -> String {
    match level {
        ChangeLevel::None => "No significant change".to_string(),
        ChangeLevel::Minor => format!("Minor change detected (distance {distance})"),
        ChangeLevel::Moderate => format!("Moderate change detected (distance {distance})"),
        ChangeLevel::Major => format!("Major change detected (distance {distance})"),
    }
}

/// Stateful, per-camera change detector.
pub struct ChangeDetector {
    thresholds: ChangeThresholds,
    prev_hash: Option<u64>,
    prev_gray: Option<GrayImage>,
}

impl ChangeDetector {
    pub fn new(thresholds: ChangeThresholds) -> Self {
        ChangeDetector {
            thresholds,
            prev_hash: None,
            prev_gray: None,
        }
    }

    pub fn detect(&mut self, frame: &Frame) -> ChangeResult {
        let gray = to_grayscale_64(&frame.image);
        let hash = average_hash(&gray);

        let result = match (&self.prev_hash, &self.prev_gray) {
            (None, _) | (_, None) => ChangeResult::initial(),
            (Some(prev_hash), Some(prev_gray)) => {
                let distance = (prev_hash ^ hash).count_ones();
                let diff_pct = pixel_diff_pct(prev_gray, &gray);
                let level = if distance >= self.thresholds.major {
                    ChangeLevel::Major
                } else if distance >= self.thresholds.moderate {
                    ChangeLevel::Moderate
                } else if distance >= self.thresholds.minor || diff_pct > 0.05 {
                    ChangeLevel::Minor
                } else {
                    ChangeLevel::None
                };
                ChangeResult {
                    level,
                    hash_distance: distance,
                    pixel_diff_pct: diff_pct,
                    description: describe(level, distance),
                }
            }
        };

        self.prev_hash = Some(hash);
        self.prev_gray = Some(gray);
        result
    }

    /// Clears state so the next frame is reported as the initial frame again.
    pub fn reset(&mut self) {
        self.prev_hash = None;
        self.prev_gray = None;
    }
}

impl Default for ChangeDetector {
    fn default() -> Self {
        ChangeDetector::new(ChangeThresholds::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn solid_frame(value: u8, seq: u64) -> Frame {
        let mut img = RgbImage::new(64, 64);
        for p in img.pixels_mut() {
            *p = Rgb([value, value, value]);
        }
        Frame::new(DynamicImage::ImageRgb8(img), "test:0", seq)
    }

    #[test]
    fn first_frame_is_always_major() {
        let mut detector = ChangeDetector::default();
        let result = detector.detect(&solid_frame(100, 1));
        assert_eq!(result.level, ChangeLevel::Major);
        assert_eq!(result.hash_distance, 64);
        assert_eq!(result.description, "Initial frame");
    }

    #[test]
    fn identical_subsequent_frame_is_none() {
        let mut detector = ChangeDetector::default();
        detector.detect(&solid_frame(100, 1));
        let result = detector.detect(&solid_frame(100, 2));
        assert_eq!(result.level, ChangeLevel::None);
        assert_eq!(result.hash_distance, 0);
    }

    #[test]
    fn drastic_change_is_major() {
        let mut detector = ChangeDetector::default();
        detector.detect(&solid_frame(0, 1));
        let result = detector.detect(&solid_frame(255, 2));
        assert_eq!(result.level, ChangeLevel::Major);
    }

    #[test]
    fn reset_treats_next_frame_as_initial() {
        let mut detector = ChangeDetector::default();
        detector.detect(&solid_frame(100, 1));
        detector.reset();
        let result = detector.detect(&solid_frame(100, 2));
        assert_eq!(result.level, ChangeLevel::Major);
        assert_eq!(result.description, "Initial frame");
    }

    #[test]
    fn runs_fast_enough_for_real_time_use() {
        let mut detector = ChangeDetector::default();
        detector.detect(&solid_frame(10, 1));
        let start = std::time::Instant::now();
        for i in 0..20 {
            detector.detect(&solid_frame((i * 7) as u8, i as u64 + 2));
        }
        // Generous upper bound for CI hardware; the real budget is ~5ms/frame.
        assert!(start.elapsed() < std::time::Duration::from_millis(200));
    }
}
