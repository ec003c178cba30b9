//! [`DropZoneFilter`] – hides objects that already sit in a drop zone.
//!
//! Each detection is projected to world XY from the position the frame was
//! taken at. If the projected point lies within `radius` (inclusive) of
//! *any* zone centre, the detection is discarded regardless of its color.
//! Without this the search would immediately rediscover the objects the
//! robot just placed.

use chroma_types::{Detection, DropZone, Position};
use tracing::debug;

use crate::projection::PixelProjector;

pub struct DropZoneFilter {
    zones: Vec<DropZone>,
    projector: PixelProjector,
}

impl DropZoneFilter {
    pub fn new(zones: Vec<DropZone>, projector: PixelProjector) -> Self {
        Self { zones, projector }
    }

    pub fn zones(&self) -> &[DropZone] {
        &self.zones
    }

    /// The first zone containing world point `(x, y)`, if any.
    pub fn zone_at(&self, x: f64, y: f64) -> Option<&DropZone> {
        self.zones.iter().find(|z| z.contains_xy(x, y))
    }

    /// Keep only detections that project outside every zone, preserving
    /// their order.
    pub fn filter(
        &self,
        detections: Vec<Detection>,
        robot: Position,
        frame_size: (u32, u32),
    ) -> Vec<Detection> {
        let (w, h) = frame_size;
        detections
            .into_iter()
            .filter(|d| {
                let (x, y) = self.projector.project(d, w, h, robot);
                match self.zone_at(x, y) {
                    Some(zone) => {
                        debug!(
                            color = %d.color,
                            x,
                            y,
                            zone = %zone.color,
                            "ignoring object inside drop zone"
                        );
                        false
                    }
                    None => true,
                }
            })
            .collect()
    }
}
