//! [`VisualServo`] – closed-loop XY alignment over an object.
//!
//! Each iteration captures one frame, picks the best surviving candidate and
//! compares its centroid with the target pixel. Inside the tolerance box the
//! current position is returned; otherwise a damped, clamped correction is
//! commanded and the loop repeats.
//!
//! ```text
//! step  = error_px / pixels_per_unit * damping     (Y negated)
//! step  = clamp(step, -max_step, max_step)          per axis
//! target = workspace.clamp(current + step)
//! ```
//!
//! The iteration count is a hard ceiling: at most `max_iterations` frames
//! and at most `max_iterations` corrections per [`VisualServo::align`] call.
//! Nothing carries over between calls.

use chroma_kernel::MotionGate;
use chroma_perception::{CandidatePipeline, PixelProjector};
use chroma_types::{GripperState, Position, RobotConfig, RobotError, ServoConfig, Workspace};
use tracing::{debug, info, instrument, warn};

/// Result of one alignment attempt. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlignOutcome {
    /// The object sits under the gripper at this position.
    Converged(Position),
    /// The most recent frame held no candidate.
    NoObject,
    /// Still outside tolerance after the iteration ceiling.
    Failed { iterations: u32 },
}

/// Working state of one alignment attempt. It lives only for the duration of
/// [`VisualServo::align`]; the servo keeps a copy of the final value for
/// diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct ServoState {
    pub target_color: String,
    pub iteration_count: u32,
    pub last_pixel_error: Option<(f64, f64)>,
    pub current_position: Position,
}

pub struct VisualServo {
    config: ServoConfig,
    workspace: Workspace,
    projector: PixelProjector,
    last: Option<ServoState>,
}

impl VisualServo {
    /// `workspace` is only used to clamp corrections; an unvalidated one
    /// never panics but may pin the tool to an axis limit.
    pub fn new(config: ServoConfig, workspace: Workspace) -> Self {
        Self {
            projector: PixelProjector::from_servo(&config),
            config,
            workspace,
            last: None,
        }
    }

    pub fn from_config(cfg: &RobotConfig) -> Self {
        Self::new(cfg.servo, cfg.workspace)
    }

    /// Snapshot of how the most recent finished attempt ended. Not consulted
    /// by later attempts, which always start from scratch.
    pub fn last_state(&self) -> Option<&ServoState> {
        self.last.as_ref()
    }

    /// `true` when both errors are within tolerance (inclusive).
    pub fn within_tolerance(&self, error_x: f64, error_y: f64) -> bool {
        error_x.abs() <= self.config.tolerance_x_px && error_y.abs() <= self.config.tolerance_y_px
    }

    /// World-frame correction for a pixel error, damped and clamped.
    pub fn correction(&self, error_x: f64, error_y: f64) -> (f64, f64) {
        let (dx, dy) = self.projector.error_to_world(error_x, error_y);
        let limit = self.config.max_step;
        let shape = |d: f64| (d * self.config.damping).max(-limit).min(limit);
        (shape(dx), shape(dy))
    }

    /// Center the gripper over the best `color` candidate.
    ///
    /// The robot stays at its current height; every correction is sent with
    /// the gripper open.
    ///
    /// # Errors
    ///
    /// [`RobotError::PositionUnknown`] before the robot has been homed or
    /// moved, otherwise whatever the gate or the segmenter report.
    #[instrument(skip(self, gate, pipeline))]
    pub fn align(
        &mut self,
        gate: &mut MotionGate,
        pipeline: &mut CandidatePipeline,
        color: &str,
    ) -> Result<AlignOutcome, RobotError> {
        self.last = None;
        let mut state = ServoState {
            target_color: color.to_string(),
            iteration_count: 0,
            last_pixel_error: None,
            current_position: gate.require_position()?,
        };
        let outcome = self.iterate(&mut state, gate, pipeline, color);
        self.last = Some(state);
        outcome
    }

    fn iterate(
        &self,
        state: &mut ServoState,
        gate: &mut MotionGate,
        pipeline: &mut CandidatePipeline,
        color: &str,
    ) -> Result<AlignOutcome, RobotError> {
        for iteration in 1..=self.config.max_iterations {
            state.iteration_count = iteration;
            let frame = gate.capture()?;
            let here = gate.require_position()?;
            state.current_position = here;

            let Some(best) = pipeline.best(&frame, color, here)? else {
                debug!(iteration, "target lost");
                return Ok(AlignOutcome::NoObject);
            };

            let (error_x, error_y) = self.projector.pixel_error(&best, frame.width, frame.height);
            state.last_pixel_error = Some((error_x, error_y));
            debug!(iteration, error_x, error_y, "pixel error");

            if self.within_tolerance(error_x, error_y) {
                info!(iteration, position = %here, "aligned");
                return Ok(AlignOutcome::Converged(here));
            }

            let (dx, dy) = self.correction(error_x, error_y);
            let target = self
                .workspace
                .clamp(&Position::new(here.x + dx, here.y + dy, here.z));
            gate.move_to(target, GripperState::Open)?;
        }

        warn!(iterations = self.config.max_iterations, "alignment did not converge");
        Ok(AlignOutcome::Failed {
            iterations: self.config.max_iterations,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chroma_hal::SimExecutor;
    use chroma_perception::{Blob, ScriptedSegmenter};

    struct Rig {
        gate: MotionGate,
        pipeline: CandidatePipeline,
        sim: SimExecutor,
        script: ScriptedSegmenter,
    }

    fn rig(cfg: &RobotConfig, start: Position) -> Rig {
        let sim = SimExecutor::from_config(cfg);
        let script = ScriptedSegmenter::new();
        let mut gate = MotionGate::from_config(Box::new(sim.clone()), cfg);
        gate.home().unwrap();
        gate.move_to(start, GripperState::Open).unwrap();
        sim.clear_log();
        let pipeline = CandidatePipeline::from_config(Box::new(script.clone()), cfg);
        Rig {
            gate,
            pipeline,
            sim,
            script,
        }
    }

    #[test]
    fn converges_on_decreasing_error() {
        let cfg = RobotConfig::default();
        let mut r = rig(&cfg, Position::new(2.0, 3.0, 0.0));
        for x in [520.0, 420.0, 340.0] {
            r.script.push("red", vec![Blob::new(x, 360.0, 500)]);
        }
        let mut servo = VisualServo::from_config(&cfg);

        let out = servo.align(&mut r.gate, &mut r.pipeline, "red").unwrap();

        // Two corrections of one max_step each.
        assert_eq!(out, AlignOutcome::Converged(Position::new(4.0, 3.0, 0.0)));
        assert_eq!(r.sim.moves().len(), 2);
        assert_eq!(servo.last_state().unwrap().iteration_count, 3);
    }

    #[test]
    fn frozen_error_fails_after_exactly_max_iterations() {
        let cfg = RobotConfig::default();
        let mut r = rig(&cfg, Position::new(3.0, 5.0, 0.0));
        r.script.repeat("blue", vec![Blob::new(320.0, 300.0, 500)]);
        let mut servo = VisualServo::from_config(&cfg);

        let out = servo.align(&mut r.gate, &mut r.pipeline, "blue").unwrap();

        assert_eq!(out, AlignOutcome::Failed { iterations: 15 });
        assert_eq!(r.script.calls("blue"), 15);
        assert_eq!(r.sim.moves().len(), 15);
    }

    #[test]
    fn large_error_is_clamped_to_max_step() {
        let cfg = RobotConfig::default();
        let start = Position::new(2.0, 4.0, 0.0);
        let mut r = rig(&cfg, start);
        r.script.push("green", vec![Blob::new(820.0, -140.0, 500)]);
        let mut servo = VisualServo::from_config(&cfg);

        let out = servo.align(&mut r.gate, &mut r.pipeline, "green").unwrap();
        assert_eq!(out, AlignOutcome::NoObject);

        let (first, _) = r.sim.moves()[0];
        assert!((first.x - start.x).abs() <= cfg.servo.max_step + 1e-12);
        assert!((first.y - start.y).abs() <= cfg.servo.max_step + 1e-12);
        assert_eq!(first, Position::new(3.0, 5.0, 0.0));
    }

    #[test]
    fn within_tolerance_needs_no_correction() {
        let mut cfg = RobotConfig::default();
        cfg.servo.tolerance_x_px = 100.0;
        cfg.servo.tolerance_y_px = 60.0;
        let start = Position::new(3.0, 3.0, 0.0);
        let mut r = rig(&cfg, start);
        // Errors (50, -60): exactly on the Y tolerance.
        r.script.push("red", vec![Blob::new(370.0, 300.0, 800)]);
        let mut servo = VisualServo::from_config(&cfg);

        let out = servo.align(&mut r.gate, &mut r.pipeline, "red").unwrap();

        assert_eq!(out, AlignOutcome::Converged(start));
        assert!(r.sim.moves().is_empty());
        assert_eq!(servo.last_state().unwrap().last_pixel_error, Some((50.0, -60.0)));
    }

    #[test]
    fn nothing_in_view_is_no_object() {
        let cfg = RobotConfig::default();
        let mut r = rig(&cfg, Position::new(3.0, 3.0, 0.0));
        let mut servo = VisualServo::from_config(&cfg);
        let out = servo.align(&mut r.gate, &mut r.pipeline, "red").unwrap();
        assert_eq!(out, AlignOutcome::NoObject);
        assert!(r.sim.moves().is_empty());
    }

    #[test]
    fn corrections_stay_inside_the_workspace() {
        let cfg = RobotConfig::default();
        let mut r = rig(&cfg, Position::new(6.8, 3.0, 0.0));
        r.script.repeat("red", vec![Blob::new(600.0, 360.0, 500)]);
        let mut servo = VisualServo::from_config(&cfg);

        let out = servo.align(&mut r.gate, &mut r.pipeline, "red").unwrap();

        assert!(matches!(out, AlignOutcome::Failed { .. }));
        assert!(r.sim.moves().iter().all(|(p, _)| p.x <= cfg.workspace.x.max));
    }

    #[test]
    fn requires_known_position() {
        let cfg = RobotConfig::default();
        let sim = SimExecutor::from_config(&cfg);
        let mut gate = MotionGate::from_config(Box::new(sim), &cfg);
        let mut pipeline =
            CandidatePipeline::from_config(Box::new(ScriptedSegmenter::new()), &cfg);
        let mut servo = VisualServo::from_config(&cfg);
        assert_eq!(
            servo.align(&mut gate, &mut pipeline, "red"),
            Err(RobotError::PositionUnknown)
        );
    }

    #[test]
    fn each_attempt_starts_fresh_and_leaves_a_snapshot() {
        let cfg = RobotConfig::default();
        let mut r = rig(&cfg, Position::new(3.0, 3.0, 0.0));
        r.script.push("red", vec![Blob::new(340.0, 360.0, 500)]);
        let mut servo = VisualServo::from_config(&cfg);

        servo.align(&mut r.gate, &mut r.pipeline, "red").unwrap();
        assert_eq!(servo.last_state().unwrap().last_pixel_error, Some((20.0, 0.0)));

        let out = servo.align(&mut r.gate, &mut r.pipeline, "green").unwrap();
        assert_eq!(out, AlignOutcome::NoObject);
        let snapshot = servo.last_state().unwrap();
        assert_eq!(snapshot.target_color, "green");
        assert_eq!(snapshot.iteration_count, 1);
        assert_eq!(snapshot.last_pixel_error, None);
    }

    #[test]
    fn correction_shape() {
        let servo = VisualServo::from_config(&RobotConfig::default());
        assert_eq!(servo.correction(50.0, -50.0), (0.5, 0.5));
        assert_eq!(servo.correction(500.0, 500.0), (1.0, -1.0));
        assert!(servo.within_tolerance(-50.0, 30.0));
        assert!(!servo.within_tolerance(50.5, 0.0));
    }
}
