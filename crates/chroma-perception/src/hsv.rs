//! [`ColorThresholdSegmenter`] – reference HSV threshold segmenter.
//!
//! A deliberately simple stand-in for a tuned vision pipeline:
//!
//! 1. Convert each RGB pixel to HSV on the OpenCV scale (H 0–180, S and V
//!    0–255).
//! 2. Mark the pixel when it falls inside *any* band configured for the
//!    color. Red usually needs two bands because its hue wraps around 0.
//! 3. Label 4-connected regions of marked pixels.
//! 4. Keep regions of at least `min_area` pixels and report their centroid
//!    (first-order moments over zeroth-order moment).

use std::collections::HashMap;

use chroma_hal::CameraFrame;
use chroma_types::{HsvRange, RobotConfig, RobotError};
use tracing::trace;

use crate::segmenter::{Blob, Segmenter};

/// Regions smaller than this are treated as noise.
pub const DEFAULT_MIN_AREA: u32 = 100;

/// RGB to HSV on the OpenCV 8-bit scale.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(f64::from);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let s = if max == 0.0 { 0.0 } else { 255.0 * delta / max };
    let mut h = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if h < 0.0 {
        h += 360.0;
    }

    let h = ((h / 2.0).round() as u16 % 180) as u8;
    [h, s.round() as u8, max as u8]
}

/// Threshold segmenter driven by per-color HSV bands.
pub struct ColorThresholdSegmenter {
    bands: HashMap<String, Vec<HsvRange>>,
    min_area: u32,
}

impl ColorThresholdSegmenter {
    pub fn new(min_area: u32) -> Self {
        Self {
            bands: HashMap::new(),
            min_area,
        }
    }

    /// Bands for every configured color, default minimum area.
    pub fn from_config(cfg: &RobotConfig) -> Self {
        let mut seg = Self::new(DEFAULT_MIN_AREA);
        for color in &cfg.colors {
            seg = seg.with_color(&color.name, color.ranges.clone());
        }
        seg
    }

    pub fn with_color(mut self, name: &str, ranges: Vec<HsvRange>) -> Self {
        self.bands.insert(name.to_string(), ranges);
        self
    }

    fn mask(&self, frame: &CameraFrame, ranges: &[HsvRange]) -> Vec<bool> {
        frame
            .data
            .chunks_exact(3)
            .map(|px| {
                let hsv = rgb_to_hsv([px[0], px[1], px[2]]);
                ranges.iter().any(|r| r.contains(hsv))
            })
            .collect()
    }
}

impl Segmenter for ColorThresholdSegmenter {
    fn segment(&mut self, frame: &CameraFrame, color: &str) -> Result<Vec<Blob>, RobotError> {
        let ranges = self
            .bands
            .get(color)
            .ok_or_else(|| RobotError::UnknownColor(color.to_string()))?;
        if ranges.is_empty() {
            return Err(RobotError::Segmentation(format!(
                "no HSV bands configured for '{color}'"
            )));
        }

        let w = frame.width as usize;
        let h = frame.height as usize;
        let mut mask = self.mask(frame, ranges);
        let mut blobs = Vec::new();
        let mut stack = Vec::new();

        for start in 0..mask.len() {
            if !mask[start] {
                continue;
            }
            mask[start] = false;
            stack.push(start);

            let (mut area, mut sum_x, mut sum_y) = (0u64, 0u64, 0u64);
            while let Some(i) = stack.pop() {
                let (x, y) = (i % w, i / w);
                area += 1;
                sum_x += x as u64;
                sum_y += y as u64;

                let mut visit = |j: usize| {
                    if mask[j] {
                        mask[j] = false;
                        stack.push(j);
                    }
                };
                if x > 0 {
                    visit(i - 1);
                }
                if x + 1 < w {
                    visit(i + 1);
                }
                if y > 0 {
                    visit(i - w);
                }
                if y + 1 < h {
                    visit(i + w);
                }
            }

            if area >= u64::from(self.min_area) {
                blobs.push(Blob::new(
                    sum_x as f64 / area as f64,
                    sum_y as f64 / area as f64,
                    u32::try_from(area).unwrap_or(u32::MAX),
                ));
            }
        }

        trace!(color, blobs = blobs.len(), "segmented");
        Ok(blobs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paint_square(frame: &mut CameraFrame, x0: u32, y0: u32, side: u32, rgb: [u8; 3]) {
        for y in y0..y0 + side {
            for x in x0..x0 + side {
                frame.set_pixel(x, y, rgb);
            }
        }
    }

    #[test]
    fn hsv_of_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([90, 90, 90]), [0, 0, 90]);
        // Magenta-ish red sits near the top of the hue circle.
        assert_eq!(rgb_to_hsv([255, 0, 40])[0], 175);
    }

    #[test]
    fn finds_square_and_its_centroid() {
        let mut frame = CameraFrame::filled(64, 48, [90, 90, 90]);
        paint_square(&mut frame, 10, 20, 12, [30, 60, 220]);

        let mut seg = ColorThresholdSegmenter::from_config(&RobotConfig::default());
        let blobs = seg.segment(&frame, "blue").unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].area, 144);
        assert!((blobs[0].x - 15.5).abs() < 1e-9);
        assert!((blobs[0].y - 25.5).abs() < 1e-9);

        assert!(seg.segment(&frame, "red").unwrap().is_empty());
    }

    #[test]
    fn red_matches_both_hue_bands() {
        let mut frame = CameraFrame::filled(64, 48, [90, 90, 90]);
        paint_square(&mut frame, 0, 0, 11, [220, 30, 30]);
        paint_square(&mut frame, 40, 30, 11, [255, 0, 40]);

        let mut seg = ColorThresholdSegmenter::from_config(&RobotConfig::default());
        assert_eq!(seg.segment(&frame, "red").unwrap().len(), 2);
    }

    #[test]
    fn small_regions_are_noise() {
        let mut frame = CameraFrame::filled(32, 32, [90, 90, 90]);
        paint_square(&mut frame, 2, 2, 9, [40, 200, 60]); // 81 px
        let mut seg = ColorThresholdSegmenter::from_config(&RobotConfig::default());
        assert!(seg.segment(&frame, "green").unwrap().is_empty());
    }

    #[test]
    fn diagonal_neighbours_are_separate_regions() {
        let mut frame = CameraFrame::filled(4, 4, [0, 0, 0]);
        frame.set_pixel(0, 0, [255, 0, 0]);
        frame.set_pixel(1, 1, [255, 0, 0]);
        let mut seg = ColorThresholdSegmenter::new(1)
            .with_color("red", vec![HsvRange::new([0, 100, 100], [10, 255, 255])]);
        assert_eq!(seg.segment(&frame, "red").unwrap().len(), 2);
    }

    #[test]
    fn unknown_color_is_an_error() {
        let frame = CameraFrame::filled(2, 2, [0, 0, 0]);
        let mut seg = ColorThresholdSegmenter::from_config(&RobotConfig::default());
        assert!(matches!(
            seg.segment(&frame, "purple"),
            Err(RobotError::UnknownColor(_))
        ));
    }
}
