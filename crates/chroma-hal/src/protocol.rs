//! Line-oriented wire codec shared by the controller and the executor.
//!
//! Every message is one ASCII line terminated by `\n`.
//!
//! | Command | Line | Response |
//! |---|---|---|
//! | [`Command::Move`] | `x,y,z,gripper` (gripper `0`/`1`) | `OK` or `ERROR` |
//! | [`Command::Home`] | `HOME` | `HOMED` |
//! | [`Command::SetHome`] | `SET_HOME` | `DONE` |
//! | [`Command::ResetGripper`] | `RESET_GRIPPER` | `DONE` |
//! | [`Command::GetCamera`] | `GET_CAMERA` | `FRAME rgb24 <w> <h> <base64>` |
//! | [`Command::EnableSafety`] | `ENABLE_SAFETY` | `SAFETY_ENABLED` |
//! | [`Command::DisableSafety`] | `DISABLE_SAFETY` | `SAFETY_DISABLED` |
//! | [`Command::Terminate`] | `TERMINATE` | none, the peer closes |
//!
//! Any command may also be answered with `ERROR`.

use chroma_types::{GripperState, Position, RobotError};

use crate::camera::CameraFrame;

// ────────────────────────────────────────────────────────────────────────────
// Command
// ────────────────────────────────────────────────────────────────────────────

/// A request from the controller to the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Absolute move; the gripper state rides along with every move.
    Move {
        position: Position,
        gripper: GripperState,
    },
    Home,
    /// Record the current position as the executor's home.
    SetHome,
    /// Drive the gripper motor back to its zero/open reference.
    ResetGripper,
    GetCamera,
    EnableSafety,
    DisableSafety,
    Terminate,
}

impl Command {
    pub fn move_to(position: Position, gripper: GripperState) -> Self {
        Command::Move { position, gripper }
    }

    /// Wire form without the trailing newline.
    pub fn encode(&self) -> String {
        match self {
            Command::Move { position, gripper } => format!(
                "{:.3},{:.3},{:.3},{}",
                position.x,
                position.y,
                position.z,
                gripper.wire_value()
            ),
            Command::Home => "HOME".into(),
            Command::SetHome => "SET_HOME".into(),
            Command::ResetGripper => "RESET_GRIPPER".into(),
            Command::GetCamera => "GET_CAMERA".into(),
            Command::EnableSafety => "ENABLE_SAFETY".into(),
            Command::DisableSafety => "DISABLE_SAFETY".into(),
            Command::Terminate => "TERMINATE".into(),
        }
    }

    /// Parse one received line (surrounding whitespace ignored).
    ///
    /// # Errors
    ///
    /// [`RobotError::Protocol`] for unknown keywords or malformed moves.
    pub fn parse(line: &str) -> Result<Self, RobotError> {
        let line = line.trim();
        match line {
            "HOME" => return Ok(Command::Home),
            "SET_HOME" => return Ok(Command::SetHome),
            "RESET_GRIPPER" => return Ok(Command::ResetGripper),
            "GET_CAMERA" => return Ok(Command::GetCamera),
            "ENABLE_SAFETY" => return Ok(Command::EnableSafety),
            "DISABLE_SAFETY" => return Ok(Command::DisableSafety),
            "TERMINATE" => return Ok(Command::Terminate),
            _ => {}
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let &[x, y, z, g] = fields.as_slice() else {
            return Err(RobotError::Protocol(format!("unknown command '{line}'")));
        };
        let coord = |s: &str| {
            s.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| RobotError::Protocol(format!("bad coordinate '{s}' in '{line}'")))
        };
        let gripper = g
            .parse::<u8>()
            .ok()
            .and_then(GripperState::from_wire)
            .ok_or_else(|| RobotError::Protocol(format!("bad gripper value '{g}' in '{line}'")))?;

        Ok(Command::Move {
            position: Position::new(coord(x)?, coord(y)?, coord(z)?),
            gripper,
        })
    }

    /// `false` only for [`Command::Terminate`].
    pub fn expects_response(&self) -> bool {
        !matches!(self, Command::Terminate)
    }

    /// The success token this command must be answered with.
    pub fn expected_ack(&self) -> Option<Ack> {
        match self {
            Command::Move { .. } => Some(Ack::Ok),
            Command::Home => Some(Ack::Homed),
            Command::SetHome | Command::ResetGripper => Some(Ack::Done),
            Command::GetCamera => Some(Ack::Frame),
            Command::EnableSafety => Some(Ack::SafetyEnabled),
            Command::DisableSafety => Some(Ack::SafetyDisabled),
            Command::Terminate => None,
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Response
// ────────────────────────────────────────────────────────────────────────────

/// A reply from the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Ok,
    /// The executor refused the command (out of bounds, mechanically invalid).
    Error,
    Homed,
    Done,
    SafetyEnabled,
    SafetyDisabled,
    Frame(CameraFrame),
}

/// Payload-free discriminant of [`Response`], used to match replies against
/// the command that produced them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Error,
    Homed,
    Done,
    SafetyEnabled,
    SafetyDisabled,
    Frame,
}

impl Response {
    pub fn ack(&self) -> Ack {
        match self {
            Response::Ok => Ack::Ok,
            Response::Error => Ack::Error,
            Response::Homed => Ack::Homed,
            Response::Done => Ack::Done,
            Response::SafetyEnabled => Ack::SafetyEnabled,
            Response::SafetyDisabled => Ack::SafetyDisabled,
            Response::Frame(_) => Ack::Frame,
        }
    }

    /// Wire form without the trailing newline.
    pub fn encode(&self) -> String {
        match self {
            Response::Ok => "OK".into(),
            Response::Error => "ERROR".into(),
            Response::Homed => "HOMED".into(),
            Response::Done => "DONE".into(),
            Response::SafetyEnabled => "SAFETY_ENABLED".into(),
            Response::SafetyDisabled => "SAFETY_DISABLED".into(),
            Response::Frame(frame) => format!("FRAME {}", frame.encode_payload()),
        }
    }

    /// Parse one received line.
    ///
    /// # Errors
    ///
    /// [`RobotError::Protocol`] for anything that is not a known token or a
    /// well-formed frame.
    pub fn parse(line: &str) -> Result<Self, RobotError> {
        let line = line.trim();
        match line {
            "OK" => Ok(Response::Ok),
            "ERROR" => Ok(Response::Error),
            "HOMED" => Ok(Response::Homed),
            "DONE" => Ok(Response::Done),
            "SAFETY_ENABLED" => Ok(Response::SafetyEnabled),
            "SAFETY_DISABLED" => Ok(Response::SafetyDisabled),
            "" => Err(RobotError::Protocol("empty response".into())),
            other => match other.strip_prefix("FRAME ") {
                Some(payload) => Ok(Response::Frame(CameraFrame::decode_payload(payload)?)),
                None => {
                    let shown: String = other.chars().take(40).collect();
                    Err(RobotError::Protocol(format!("unexpected response '{shown}'")))
                }
            },
        }
    }
}
