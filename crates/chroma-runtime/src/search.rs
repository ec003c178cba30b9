//! Boustrophedon search over the configured region.
//!
//! [`sweep`] lays out the sample stops; [`Searcher`] visits them at the
//! search height with the gripper open and captures one frame per stop until
//! a candidate survives the drop-zone filter.
//!
//! ```text
//!  y_max  →  →  →
//!         ←  ←  ←
//!  y_min  →  →  →
//!       x_min    x_max
//! ```

use chroma_kernel::MotionGate;
use chroma_perception::CandidatePipeline;
use chroma_types::{Detection, GripperState, Position, RobotConfig, RobotError, SearchRegion};
use tracing::{debug, info, instrument};

/// Sample stops, row by row from `y_min`, reversing direction on every row.
///
/// Stops are placed at integer multiples of `step` from the region's lower
/// corner, so `x_min..=x_max` with step 1.5 over `[1.5, 4.5]` yields 1.5,
/// 3.0 and 4.5. A degenerate region yields its corner only.
///
/// ```
/// use chroma_runtime::search::sweep;
/// use chroma_types::SearchRegion;
///
/// let region = SearchRegion { x_min: 0.0, x_max: 1.0, y_min: 0.0, y_max: 1.0, step: 1.0 };
/// assert_eq!(sweep(&region), vec![(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
/// ```
pub fn sweep(region: &SearchRegion) -> Vec<(f64, f64)> {
    let stops = |min: f64, max: f64| -> usize {
        if !(region.step > 0.0) || !(max > min) {
            return 1;
        }
        // Tolerate accumulated rounding on an exact multiple.
        ((max - min) / region.step + 1e-9).floor() as usize + 1
    };
    let nx = stops(region.x_min, region.x_max);
    let ny = stops(region.y_min, region.y_max);

    let mut points = Vec::with_capacity(nx * ny);
    for row in 0..ny {
        let y = region.y_min + row as f64 * region.step.max(0.0);
        for col in 0..nx {
            let col = if row % 2 == 0 { col } else { nx - 1 - col };
            let x = region.x_min + col as f64 * region.step.max(0.0);
            points.push((x, y));
        }
    }
    points
}

/// Result of a search. Not finding anything is a normal outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// `detection` was seen from `position`.
    Found {
        position: Position,
        detection: Detection,
    },
    NotFound,
}

pub struct Searcher {
    region: SearchRegion,
    height: f64,
}

impl Searcher {
    pub fn new(region: SearchRegion, height: f64) -> Self {
        Self { region, height }
    }

    pub fn from_config(cfg: &RobotConfig) -> Self {
        Self::new(cfg.search, cfg.heights.search)
    }

    /// Stops visited by [`search`][Self::search].
    pub fn stops(&self) -> Vec<Position> {
        sweep(&self.region)
            .into_iter()
            .map(|(x, y)| Position::new(x, y, self.height))
            .collect()
    }

    /// Sweep until a `color` candidate appears.
    ///
    /// # Errors
    ///
    /// Motion or segmentation errors abort the sweep and are returned as is.
    #[instrument(skip(self, gate, pipeline))]
    pub fn search(
        &self,
        gate: &mut MotionGate,
        pipeline: &mut CandidatePipeline,
        color: &str,
    ) -> Result<SearchOutcome, RobotError> {
        for stop in self.stops() {
            let here = gate.move_to(stop, GripperState::Open)?;
            let frame = gate.capture()?;
            if let Some(detection) = pipeline.best(&frame, color, here)? {
                info!(
                    position = %here,
                    pixel_x = detection.pixel_x,
                    pixel_y = detection.pixel_y,
                    area = detection.pixel_area,
                    "candidate found"
                );
                return Ok(SearchOutcome::Found {
                    position: here,
                    detection,
                });
            }
            debug!(position = %here, "nothing here");
        }
        info!("region exhausted");
        Ok(SearchOutcome::NotFound)
    }
}
