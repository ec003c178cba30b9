//! [`MotionBackend`] – the executor side of the link.
//!
//! A backend owns the physical (or simulated) gantry, gripper and camera.
//! [`dispatch`] maps each decoded [`Command`] onto the backend and produces
//! the [`Response`] that goes back on the wire; both the TCP
//! [`ExecutorServer`][crate::server::ExecutorServer] and the in-memory
//! [`SimExecutor`][crate::sim::SimExecutor] route through it, so the two
//! can never disagree about the protocol.

use chroma_types::{GripperState, Position, RobotError};
use tracing::{debug, warn};

use crate::camera::CameraFrame;
use crate::protocol::{Command, Response};

/// Motion, gripper and camera hardware driven by an executor.
///
/// Every `Err` becomes an `ERROR` token on the wire.
pub trait MotionBackend: Send {
    /// Move to an absolute position with the given gripper state.
    fn move_to(&mut self, target: Position, gripper: GripperState) -> Result<(), RobotError>;

    /// Run the homing routine.
    fn home(&mut self) -> Result<(), RobotError>;

    /// Record the current position as home.
    fn set_home(&mut self) -> Result<(), RobotError>;

    /// Return the gripper motor to its zero/open reference.
    fn reset_gripper(&mut self) -> Result<(), RobotError>;

    /// Grab the next camera frame.
    fn capture(&mut self) -> Result<CameraFrame, RobotError>;

    /// Toggle the executor-side workspace bounds check.
    fn set_safety(&mut self, enabled: bool) -> Result<(), RobotError>;
}

/// Execute `command` on `backend`.
///
/// Returns `None` for [`Command::Terminate`], which is never answered.
pub fn dispatch<B: MotionBackend + ?Sized>(backend: &mut B, command: &Command) -> Option<Response> {
    let result = match command {
        Command::Move { position, gripper } => {
            backend.move_to(*position, *gripper).map(|()| Response::Ok)
        }
        Command::Home => backend.home().map(|()| Response::Homed),
        Command::SetHome => backend.set_home().map(|()| Response::Done),
        Command::ResetGripper => backend.reset_gripper().map(|()| Response::Done),
        Command::GetCamera => backend.capture().map(Response::Frame),
        Command::EnableSafety => backend.set_safety(true).map(|()| Response::SafetyEnabled),
        Command::DisableSafety => backend.set_safety(false).map(|()| Response::SafetyDisabled),
        Command::Terminate => return None,
    };

    Some(match result {
        Ok(response) => {
            debug!(command = %command, "executed");
            response
        }
        Err(e) => {
            warn!(command = %command, error = %e, "command refused");
            Response::Error
        }
    })
}
