//! [`DetectionAdapter`] – wraps a [`Segmenter`] into ranked [`Detection`]s.
//!
//! Output is ordered by descending pixel area. Ties keep the order the
//! segmenter reported them in, so the ranking is deterministic for a given
//! frame.

use chroma_hal::CameraFrame;
use chroma_types::{Detection, RobotError};
use tracing::debug;

use crate::segmenter::Segmenter;

pub struct DetectionAdapter {
    segmenter: Box<dyn Segmenter>,
}

impl DetectionAdapter {
    pub fn new(segmenter: Box<dyn Segmenter>) -> Self {
        Self { segmenter }
    }

    /// Candidates for `color` in `frame`, largest first.
    ///
    /// # Errors
    ///
    /// Whatever the underlying segmenter reports.
    pub fn detect(&mut self, frame: &CameraFrame, color: &str) -> Result<Vec<Detection>, RobotError> {
        let mut detections: Vec<Detection> = self
            .segmenter
            .segment(frame, color)?
            .into_iter()
            .map(|b| Detection {
                color: color.to_string(),
                pixel_x: b.x,
                pixel_y: b.y,
                pixel_area: b.area,
            })
            .collect();
        // `sort_by` is stable.
        detections.sort_by(|a, b| b.pixel_area.cmp(&a.pixel_area));
        debug!(color, count = detections.len(), "detections");
        Ok(detections)
    }
}
