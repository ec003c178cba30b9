//! [`PickAndPlace`] – one search → align → pick → place cycle.
//!
//! ```text
//! Idle ─► Searching ─► Servoing ─► Picking ─► Transit ─► Placing ─► Homing ─► Idle
//!             │            │           │          │          │
//!             └─ not found └─ aborted  └──────────┴──────────┴─ rejected → retreat → Idle
//! ```
//!
//! Every motion is an absolute move with an explicit gripper state. When the
//! executor refuses a command (or a target falls outside the workspace) the
//! cycle is abandoned: the robot retreats straight up to the safe height,
//! keeping whatever it holds, and the state machine returns to `Idle`. Link
//! failures are not recoverable and propagate to the caller.

use chroma_kernel::MotionGate;
use chroma_perception::CandidatePipeline;
use chroma_types::{CycleResult, DropZone, GripperState, Position, RobotConfig, RobotError};
use tracing::{error, info, instrument, warn};

use crate::search::{SearchOutcome, Searcher};
use crate::servo::{AlignOutcome, VisualServo};

/// Where the cycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    #[default]
    Idle,
    Searching,
    Servoing,
    Picking,
    Transit,
    Placing,
    Homing,
}

/// The controller: gate, perception and the cycle state machine.
pub struct PickAndPlace {
    gate: MotionGate,
    pipeline: CandidatePipeline,
    searcher: Searcher,
    servo: VisualServo,
    config: RobotConfig,
    state: CycleState,
}

impl PickAndPlace {
    pub fn new(gate: MotionGate, pipeline: CandidatePipeline, config: RobotConfig) -> Self {
        Self {
            searcher: Searcher::from_config(&config),
            servo: VisualServo::from_config(&config),
            gate,
            pipeline,
            config,
            state: CycleState::Idle,
        }
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    pub fn gate(&self) -> &MotionGate {
        &self.gate
    }

    /// Direct access for manual jogging.
    pub fn gate_mut(&mut self) -> &mut MotionGate {
        &mut self.gate
    }

    pub fn servo(&self) -> &VisualServo {
        &self.servo
    }

    /// Run only the search phase.
    ///
    /// # Errors
    ///
    /// Motion, link or segmentation errors.
    pub fn search(&mut self, color: &str) -> Result<SearchOutcome, RobotError> {
        self.state = CycleState::Searching;
        let out = self.searcher.search(&mut self.gate, &mut self.pipeline, color);
        self.state = CycleState::Idle;
        out
    }

    /// Run one full cycle for `color`.
    ///
    /// Negative results come back as `Ok` with
    /// [`CycleOutcome::NotFound`][chroma_types::CycleOutcome::NotFound] or
    /// [`CycleOutcome::Aborted`][chroma_types::CycleOutcome::Aborted].
    ///
    /// # Errors
    ///
    /// [`RobotError::NoDropZone`] before any motion when `color` has no zone.
    /// Any error that is not [recoverable][RobotError::is_recoverable], link
    /// failures in particular, is returned as is; after a link failure the
    /// gate refuses further motion.
    #[instrument(skip(self))]
    pub fn run_cycle(&mut self, color: &str) -> Result<CycleResult, RobotError> {
        let zone = self
            .config
            .drop_zone(color)
            .cloned()
            .ok_or_else(|| RobotError::NoDropZone(color.to_string()))?;

        let result = self.cycle(color, &zone);
        self.state = CycleState::Idle;
        match result {
            Ok(done) => Ok(done),
            Err(Interrupt::Abort { picked, reason }) => {
                warn!(color, %reason, "cycle aborted");
                self.retreat()?;
                Ok(CycleResult::aborted(
                    picked.then(|| color.to_string()),
                    self.gate.position(),
                    reason,
                ))
            }
            Err(Interrupt::Propagate(e)) => {
                error!(color, error = %e, "cycle failed");
                Err(e)
            }
        }
    }

    fn cycle(&mut self, color: &str, zone: &DropZone) -> Result<CycleResult, Interrupt> {
        self.state = CycleState::Searching;
        let found = self
            .searcher
            .search(&mut self.gate, &mut self.pipeline, color)
            .map_err(Interrupt::empty_handed)?;
        let SearchOutcome::Found { position, .. } = found else {
            info!(color, "nothing to sort");
            return Ok(CycleResult::not_found(self.gate.position()));
        };

        self.state = CycleState::Servoing;
        info!(color, at = %position, "aligning");
        let outcome = self
            .servo
            .align(&mut self.gate, &mut self.pipeline, color)
            .map_err(Interrupt::empty_handed)?;
        let aligned = match outcome {
            AlignOutcome::Converged(p) => p,
            AlignOutcome::NoObject => {
                return Err(Interrupt::abort("object lost during alignment"));
            }
            AlignOutcome::Failed { iterations } => {
                return Err(Interrupt::abort(format!(
                    "alignment did not converge after {iterations} iterations"
                )));
            }
        };

        self.state = CycleState::Picking;
        if let Err(e) = self.pick(aligned) {
            // The jaws may already be shut when the ascent fails.
            let holding = self.gate.gripper() == Some(GripperState::Closed);
            return Err(Interrupt::from_error(e, holding));
        }

        self.state = CycleState::Transit;
        let safe = self.config.heights.safe;
        self.gate
            .move_to(Position::new(zone.x, zone.y, safe), GripperState::Closed)
            .map_err(Interrupt::holding)?;

        self.state = CycleState::Placing;
        self.place(zone).map_err(Interrupt::holding)?;

        self.state = CycleState::Homing;
        self.gate.reset_gripper().map_err(Interrupt::holding)?;
        if self.config.autosort.return_home {
            self.gate.home().map_err(Interrupt::holding)?;
        }

        info!(color, zone_x = zone.x, zone_y = zone.y, "sorted");
        Ok(CycleResult::sorted(color, self.gate.position()))
    }

    /// Safe height, approach, grip, close, back to safe height.
    fn pick(&mut self, over: Position) -> Result<(), RobotError> {
        let h = self.config.heights;
        let offset = self.config.camera_offset;
        let (gx, gy) = (over.x + offset.dx, over.y + offset.dy);

        self.gate.move_to(over.with_z(h.safe), GripperState::Open)?;
        self.gate.move_to(Position::new(gx, gy, h.approach), GripperState::Open)?;
        self.gate.move_to(Position::new(gx, gy, h.grip), GripperState::Open)?;
        self.gate.set_gripper(GripperState::Closed)?;
        self.gate.move_to(Position::new(gx, gy, h.safe), GripperState::Closed)?;
        Ok(())
    }

    /// Descend over the zone, release, climb back.
    fn place(&mut self, zone: &DropZone) -> Result<(), RobotError> {
        let h = self.config.heights;
        self.gate.move_to(
            Position::new(zone.x, zone.y, h.place + zone.z),
            GripperState::Closed,
        )?;
        self.gate.set_gripper(GripperState::Open)?;
        self.gate
            .move_to(Position::new(zone.x, zone.y, h.safe), GripperState::Open)?;
        Ok(())
    }

    /// Straight up to the safe height, gripper unchanged.
    fn retreat(&mut self) -> Result<(), RobotError> {
        let Some(here) = self.gate.position() else {
            return Ok(());
        };
        if here.z == self.config.heights.safe {
            return Ok(());
        }
        match self.gate.move_keep_gripper(here.with_z(self.config.heights.safe)) {
            Ok(_) => Ok(()),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!(error = %e, "retreat to safe height refused");
                Ok(())
            }
        }
    }
}

/// Why a cycle stopped early.
enum Interrupt {
    /// Abandon the cycle and report it. `picked` is set once the gripper has
    /// closed on the object.
    Abort { picked: bool, reason: String },
    /// Hand the error to the caller.
    Propagate(RobotError),
}

impl Interrupt {
    fn from_error(error: RobotError, picked: bool) -> Self {
        if error.is_recoverable() {
            Interrupt::Abort {
                picked,
                reason: error.to_string(),
            }
        } else {
            Interrupt::Propagate(error)
        }
    }

    fn empty_handed(error: RobotError) -> Self {
        Self::from_error(error, false)
    }

    fn holding(error: RobotError) -> Self {
        Self::from_error(error, true)
    }

    fn abort(reason: impl Into<String>) -> Self {
        Interrupt::Abort {
            picked: false,
            reason: reason.into(),
        }
    }
}
