//! [`MotionGate`] – single interception point between the controller and the
//! executor link.
//!
//! Every command the controller issues goes through the gate, which enforces
//! in order:
//!
//! 1. **Link state**: once the link has been lost no further command is
//!    attempted; every call fails fast with [`RobotError::ConnectionLost`].
//! 2. **Physical invariants** ([`StateVerifier`]): move targets must satisfy
//!    every registered [`Rule`][crate::state_verifier::Rule]. A violation is
//!    returned without transmitting anything.
//! 3. **Reply validation**: `ERROR` becomes [`RobotError::Rejected`]; any
//!    other token that does not match the command becomes
//!    [`RobotError::Protocol`].
//!
//! The gate is also the controller's only source of truth for where the
//! robot is. The position stays unknown until the executor acknowledges a
//! `HOME` or an absolute move, and the gripper state is whatever was last
//! explicitly commanded.
//!
//! # Example
//!
//! ```
//! use chroma_hal::SimExecutor;
//! use chroma_kernel::MotionGate;
//! use chroma_types::{GripperState, Position, RobotConfig, RobotError};
//!
//! let cfg = RobotConfig::default();
//! let sim = SimExecutor::from_config(&cfg);
//! let mut gate = MotionGate::from_config(Box::new(sim.clone()), &cfg);
//!
//! assert!(gate.position().is_none());
//! gate.home().unwrap();
//! gate.move_to(Position::new(2.0, 3.0, 0.0), GripperState::Open).unwrap();
//!
//! // Outside the workspace: refused before anything is sent.
//! let err = gate.move_to(Position::new(2.0, 3.0, 8.0), GripperState::Open).unwrap_err();
//! assert!(matches!(err, RobotError::OutOfBounds { axis: 'z', .. }));
//! assert_eq!(sim.moves().len(), 1);
//! ```

use chroma_hal::{Ack, CameraFrame, Command, MotionExecutor, Response};
use chroma_types::{GripperState, Position, RobotConfig, RobotError};
use tracing::{debug, error, info, instrument, warn};

use crate::state_verifier::StateVerifier;

/// The gateway every controller command must pass through.
pub struct MotionGate {
    executor: Box<dyn MotionExecutor>,
    verifier: StateVerifier,
    home: Position,
    position: Option<Position>,
    gripper: Option<GripperState>,
    link_lost: bool,
    commands_sent: u64,
}

impl MotionGate {
    /// Wrap `executor` with an already configured [`StateVerifier`].
    ///
    /// `home` is the position the robot is assumed to occupy after `HOMED`.
    pub fn new(executor: Box<dyn MotionExecutor>, verifier: StateVerifier, home: Position) -> Self {
        Self {
            executor,
            verifier,
            home,
            position: None,
            gripper: None,
            link_lost: false,
            commands_sent: 0,
        }
    }

    /// Gate with the configured workspace bounds and home position.
    pub fn from_config(executor: Box<dyn MotionExecutor>, cfg: &RobotConfig) -> Self {
        Self::new(executor, StateVerifier::for_workspace(cfg.workspace), cfg.home)
    }

    /// Last position acknowledged by the executor.
    pub fn position(&self) -> Option<Position> {
        self.position
    }

    /// Like [`position`][Self::position] but an error when unknown.
    pub fn require_position(&self) -> Result<Position, RobotError> {
        self.position.ok_or(RobotError::PositionUnknown)
    }

    /// Last explicitly commanded gripper state.
    pub fn gripper(&self) -> Option<GripperState> {
        self.gripper
    }

    pub fn home_position(&self) -> Position {
        self.home
    }

    /// `false` once the link has been lost or closed.
    pub fn is_usable(&self) -> bool {
        !self.link_lost
    }

    pub fn commands_sent(&self) -> u64 {
        self.commands_sent
    }

    pub fn executor_label(&self) -> String {
        self.executor.describe()
    }

    /// Run the verifier alone without transmitting.
    pub fn verify(&self, command: &Command) -> Result<(), RobotError> {
        self.verifier.verify(command)
    }

    fn exchange(&mut self, command: &Command) -> Result<Response, RobotError> {
        if self.link_lost {
            return Err(RobotError::ConnectionLost(
                "executor link is down; reconnect before commanding motion".into(),
            ));
        }
        self.verifier.verify(command)?;

        self.commands_sent += 1;
        let response = match self.executor.send(command) {
            Ok(r) => r,
            Err(e) => {
                if matches!(e, RobotError::ConnectionLost(_)) {
                    error!(command = %command, error = %e, "executor link lost");
                    self.link_lost = true;
                }
                return Err(e);
            }
        };

        let got = response.ack();
        if got == Ack::Error {
            warn!(command = %command, "executor rejected command");
            return Err(RobotError::Rejected {
                command: command.encode(),
            });
        }
        if Some(got) != command.expected_ack() {
            return Err(RobotError::Protocol(format!(
                "'{command}' answered with {got:?}"
            )));
        }
        Ok(response)
    }

    /// Absolute move with an explicit gripper state.
    ///
    /// # Errors
    ///
    /// [`RobotError::OutOfBounds`] before transmission,
    /// [`RobotError::Rejected`] on `ERROR`, link errors as returned.
    #[instrument(level = "debug", skip(self), fields(x = target.x, y = target.y, z = target.z))]
    pub fn move_to(&mut self, target: Position, gripper: GripperState) -> Result<Position, RobotError> {
        self.exchange(&Command::move_to(target, gripper))?;
        self.position = Some(target);
        self.gripper = Some(gripper);
        debug!(%gripper, "move acknowledged");
        Ok(target)
    }

    /// Move to `target` keeping the last commanded gripper state (open when
    /// none has been commanded yet).
    pub fn move_keep_gripper(&mut self, target: Position) -> Result<Position, RobotError> {
        let gripper = self.gripper.unwrap_or(GripperState::Open);
        self.move_to(target, gripper)
    }

    /// Open or close the gripper in place.
    ///
    /// # Errors
    ///
    /// [`RobotError::PositionUnknown`] when no position has been established.
    pub fn set_gripper(&mut self, gripper: GripperState) -> Result<Position, RobotError> {
        let here = self.require_position()?;
        self.move_to(here, gripper)
    }

    /// Run the executor's homing routine.
    pub fn home(&mut self) -> Result<Position, RobotError> {
        self.exchange(&Command::Home)?;
        self.position = Some(self.home);
        info!(home = %self.home, "homed");
        Ok(self.home)
    }

    /// Store the current position as home on both ends.
    pub fn set_home(&mut self) -> Result<Position, RobotError> {
        let here = self.require_position()?;
        self.exchange(&Command::SetHome)?;
        self.home = here;
        info!(home = %here, "home updated");
        Ok(here)
    }

    /// Return the gripper motor to its zero/open reference.
    pub fn reset_gripper(&mut self) -> Result<(), RobotError> {
        self.exchange(&Command::ResetGripper)?;
        self.gripper = Some(GripperState::Open);
        Ok(())
    }

    /// Request one camera frame.
    pub fn capture(&mut self) -> Result<CameraFrame, RobotError> {
        match self.exchange(&Command::GetCamera)? {
            Response::Frame(frame) => Ok(frame),
            other => Err(RobotError::Protocol(format!(
                "expected a frame, got {:?}",
                other.ack()
            ))),
        }
    }

    /// Toggle the executor-side bounds check.
    pub fn set_safety(&mut self, enabled: bool) -> Result<(), RobotError> {
        let command = if enabled {
            Command::EnableSafety
        } else {
            Command::DisableSafety
        };
        self.exchange(&command)?;
        info!(enabled, "executor safety toggled");
        Ok(())
    }

    /// Send `TERMINATE` and mark the link unusable.
    pub fn shutdown(&mut self) -> Result<(), RobotError> {
        if self.link_lost {
            return Ok(());
        }
        self.link_lost = true;
        self.executor.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chroma_hal::SimExecutor;

    fn gate() -> (MotionGate, SimExecutor) {
        let cfg = RobotConfig::default();
        let sim = SimExecutor::from_config(&cfg);
        (MotionGate::from_config(Box::new(sim.clone()), &cfg), sim)
    }

    #[test]
    fn position_unknown_until_homed() {
        let (mut g, _) = gate();
        assert!(g.position().is_none());
        assert!(matches!(g.set_gripper(GripperState::Closed), Err(RobotError::PositionUnknown)));
        g.home().unwrap();
        assert_eq!(g.position(), Some(Position::default()));
    }

    #[test]
    fn out_of_bounds_is_never_transmitted() {
        let (mut g, sim) = gate();
        g.home().unwrap();
        for target in [
            Position::new(-1.5, 0.0, 0.0),
            Position::new(0.0, 7.2, 0.0),
            Position::new(0.0, 0.0, -3.1),
        ] {
            assert!(matches!(
                g.move_to(target, GripperState::Open),
                Err(RobotError::OutOfBounds { .. })
            ));
        }
        assert!(sim.moves().is_empty());
        assert_eq!(g.position(), Some(Position::default()));
    }

    #[test]
    fn rejected_move_keeps_last_position() {
        let (mut g, sim) = gate();
        g.home().unwrap();
        sim.reject_move(0);
        let err = g
            .move_to(Position::new(1.0, 1.0, 0.0), GripperState::Open)
            .unwrap_err();
        assert!(matches!(err, RobotError::Rejected { .. }));
        assert!(err.is_recoverable());
        assert_eq!(g.position(), Some(Position::default()));
        assert!(g.is_usable());
    }

    #[test]
    fn mismatched_token_is_protocol_error() {
        let (mut g, sim) = gate();
        sim.reply_at(0, Response::Ok);
        assert!(matches!(g.home(), Err(RobotError::Protocol(_))));
        assert!(g.position().is_none());
    }

    #[test]
    fn connection_loss_latches() {
        let (mut g, sim) = gate();
        g.home().unwrap();
        sim.disconnect_at(1);
        assert!(matches!(g.capture(), Err(RobotError::ConnectionLost(_))));
        assert!(!g.is_usable());
        assert!(matches!(
            g.move_to(Position::new(1.0, 1.0, 0.0), GripperState::Open),
            Err(RobotError::ConnectionLost(_))
        ));
        // Nothing further reached the executor.
        assert_eq!(sim.commands().len(), 2);
    }

    #[test]
    fn gripper_state_tracks_commands() {
        let (mut g, _) = gate();
        assert_eq!(g.gripper(), None);
        g.home().unwrap();
        g.set_gripper(GripperState::Closed).unwrap();
        assert_eq!(g.gripper(), Some(GripperState::Closed));
        g.move_keep_gripper(Position::new(1.0, 0.0, 0.0)).unwrap();
        assert_eq!(g.gripper(), Some(GripperState::Closed));
        g.reset_gripper().unwrap();
        assert_eq!(g.gripper(), Some(GripperState::Open));
    }

    #[test]
    fn set_home_moves_the_reference() {
        let (mut g, sim) = gate();
        g.home().unwrap();
        g.move_to(Position::new(2.0, 2.0, 0.0), GripperState::Open).unwrap();
        g.set_home().unwrap();
        g.move_to(Position::new(5.0, 5.0, 0.0), GripperState::Open).unwrap();
        assert_eq!(g.home().unwrap(), Position::new(2.0, 2.0, 0.0));
        assert_eq!(sim.with_backend(|arm| arm.position()), Position::new(2.0, 2.0, 0.0));
    }

    #[test]
    fn capture_and_safety() {
        let (mut g, sim) = gate();
        let frame = g.capture().unwrap();
        assert_eq!((frame.width, frame.height), (640, 480));
        g.set_safety(false).unwrap();
        assert!(!sim.with_backend(|arm| arm.safety_enabled()));
        g.set_safety(true).unwrap();
        assert!(sim.with_backend(|arm| arm.safety_enabled()));
    }

    #[test]
    fn shutdown_terminates_once() {
        let (mut g, sim) = gate();
        g.shutdown().unwrap();
        g.shutdown().unwrap();
        assert_eq!(sim.count(&Command::Terminate), 1);
        assert!(!g.is_usable());
    }
}
