//! [`MotionExecutor`] – the controller's view of the motion unit.
//!
//! The controller never talks to sockets or simulators directly; it holds a
//! `Box<dyn MotionExecutor>` and exchanges [`Command`]s for [`Response`]s.
//! Two implementations ship with the crate:
//!
//! - [`TcpTransport`][crate::tcp::TcpTransport] for a real executor on the
//!   other end of a stream socket.
//! - [`SimExecutor`][crate::sim::SimExecutor] for an in-memory executor with
//!   scripted failures and a command log.

use chroma_types::RobotError;

use crate::protocol::{Command, Response};

/// A strictly synchronous request/response link to an executor.
///
/// Implementations must never pipeline: `send` returns only after the reply
/// to `command` has been received (or the link has failed).
pub trait MotionExecutor: Send {
    /// Transmit `command` and block for its reply.
    ///
    /// `Response::Error` is a normal return value, not an `Err`.
    ///
    /// # Errors
    ///
    /// - [`RobotError::ConnectionLost`] – the link failed or was closed.
    /// - [`RobotError::Protocol`] – the reply could not be parsed, or
    ///   `command` was [`Command::Terminate`] (use [`close`][Self::close]).
    fn send(&mut self, command: &Command) -> Result<Response, RobotError>;

    /// Send `TERMINATE` and release the link. Calling it twice is a no-op.
    fn close(&mut self) -> Result<(), RobotError>;

    /// Short label for logs, e.g. `tcp://192.168.1.20:5005`.
    fn describe(&self) -> String;
}

impl<T: MotionExecutor + ?Sized> MotionExecutor for Box<T> {
    fn send(&mut self, command: &Command) -> Result<Response, RobotError> {
        (**self).send(command)
    }

    fn close(&mut self) -> Result<(), RobotError> {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

pub(crate) fn terminate_via_send() -> RobotError {
    RobotError::Protocol("TERMINATE has no response; call close() instead".into())
}
