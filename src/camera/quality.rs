use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::error::QualityIssue;

/// Limits a frame must satisfy to count as proof of presence.
///
/// Brightness is mean luminance on a 0-255 scale. Focus is the variance of the
/// 4-neighbour Laplacian over the luminance image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QualityThresholds {
    pub min_brightness: f64,
    pub max_brightness: f64,
    pub min_focus: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_brightness: 25.0,
            max_brightness: 150.0,
            min_focus: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameStats {
    pub mean_brightness: f64,
    pub focus: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ImageQualityGate {
    thresholds: QualityThresholds,
}

impl ImageQualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &QualityThresholds {
        &self.thresholds
    }

    /// Decodes an encoded frame (PNG, JPEG, ...) and checks it.
    pub fn validate(&self, frame: &[u8]) -> Result<FrameStats, QualityIssue> {
        let luma = image::load_from_memory(frame)
            .map_err(|_| QualityIssue::Undecodable)?
            .to_luma8();
        self.validate_luma(&luma)
    }

    pub fn validate_luma(&self, luma: &GrayImage) -> Result<FrameStats, QualityIssue> {
        let mean_brightness = mean_brightness(luma);
        if mean_brightness < self.thresholds.min_brightness {
            return Err(QualityIssue::TooDark);
        }
        if mean_brightness > self.thresholds.max_brightness {
            return Err(QualityIssue::Overexposed);
        }

        let focus = laplacian_variance(luma);
        if focus < self.thresholds.min_focus {
            return Err(QualityIssue::OutOfFocus);
        }

        Ok(FrameStats {
            mean_brightness,
            focus,
        })
    }
}

pub fn mean_brightness(luma: &GrayImage) -> f64 {
    let count = u64::from(luma.width()) * u64::from(luma.height());
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = luma.pixels().map(|p| u64::from(p.0[0])).sum();
    sum as f64 / count as f64
}

/// Variance of the second-derivative response over interior pixels.
/// Frames smaller than 3x3 have no interior and score zero.
pub fn laplacian_variance(luma: &GrayImage) -> f64 {
    let (width, height) = luma.dimensions();
    if width < 3 || height < 3 {
        return 0.0;
    }

    let at = |x: u32, y: u32| f64::from(luma.get_pixel(x, y).0[0]);
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    let mut count = 0.0;

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let response =
                at(x, y - 1) + at(x, y + 1) + at(x - 1, y) + at(x + 1, y) - 4.0 * at(x, y);
            sum += response;
            sum_sq += response * response;
            count += 1.0;
        }
    }

    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}
