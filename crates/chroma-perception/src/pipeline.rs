//! [`CandidatePipeline`] – frame in, pickable candidates out.
//!
//! Detection followed by drop-zone filtering. The first element of the
//! result is the candidate every higher layer acts on.

use chroma_hal::CameraFrame;
use chroma_types::{Detection, Position, RobotConfig, RobotError};

use crate::detection::DetectionAdapter;
use crate::drop_zone::DropZoneFilter;
use crate::projection::PixelProjector;
use crate::segmenter::Segmenter;

pub struct CandidatePipeline {
    adapter: DetectionAdapter,
    filter: DropZoneFilter,
    projector: PixelProjector,
}

impl CandidatePipeline {
    pub fn new(adapter: DetectionAdapter, filter: DropZoneFilter, projector: PixelProjector) -> Self {
        Self {
            adapter,
            filter,
            projector,
        }
    }

    /// Pipeline over `segmenter` using the zones and camera model in `cfg`.
    pub fn from_config(segmenter: Box<dyn Segmenter>, cfg: &RobotConfig) -> Self {
        let projector = PixelProjector::from_servo(&cfg.servo);
        Self::new(
            DetectionAdapter::new(segmenter),
            DropZoneFilter::new(cfg.drop_zones.clone(), projector),
            projector,
        )
    }

    pub fn projector(&self) -> &PixelProjector {
        &self.projector
    }

    /// Candidates for `color` seen from `robot`, largest first, with objects
    /// resting in drop zones removed.
    ///
    /// # Errors
    ///
    /// Propagates segmentation failures.
    pub fn candidates(
        &mut self,
        frame: &CameraFrame,
        color: &str,
        robot: Position,
    ) -> Result<Vec<Detection>, RobotError> {
        let detections = self.adapter.detect(frame, color)?;
        Ok(self
            .filter
            .filter(detections, robot, (frame.width, frame.height)))
    }

    /// Best candidate, if any.
    pub fn best(
        &mut self,
        frame: &CameraFrame,
        color: &str,
        robot: Position,
    ) -> Result<Option<Detection>, RobotError> {
        Ok(self.candidates(frame, color, robot)?.into_iter().next())
    }
}
