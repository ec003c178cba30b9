//! [`SimExecutor`] – in-memory [`MotionExecutor`] for tests and demos.
//!
//! Commands are dispatched straight into a [`MotionBackend`] (a [`SimArm`] by
//! default) with no socket in between. On top of that the executor can be
//! scripted to misbehave, and it records every command it receives so tests
//! can assert on exactly what went over the "wire".
//!
//! The handle is cheaply cloneable: give one clone to the controller and keep
//! another to inspect the log and the backend.
//!
//! # Example
//!
//! ```rust
//! use chroma_hal::executor::MotionExecutor;
//! use chroma_hal::protocol::{Command, Response};
//! use chroma_hal::sim::SimExecutor;
//! use chroma_types::{GripperState, Position, RobotConfig};
//!
//! let sim = SimExecutor::from_config(&RobotConfig::default());
//! let mut link: Box<dyn MotionExecutor> = Box::new(sim.clone());
//!
//! sim.reject_move(0);
//! let first = Command::move_to(Position::new(1.0, 1.0, 0.0), GripperState::Open);
//! assert_eq!(link.send(&first).unwrap(), Response::Error);
//! assert_eq!(sim.moves().len(), 1);
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chroma_types::{GripperState, Position, RobotConfig, RobotError};

use crate::backend::{MotionBackend, dispatch};
use crate::executor::{MotionExecutor, terminate_via_send};
use crate::protocol::{Command, Response};
use crate::sim_arm::SimArm;

/// Scripted misbehaviour keyed by command index.
enum Fault {
    /// Answer with this response instead of dispatching.
    Reply(Response),
    /// Fail with this error and mark the link dead.
    Disconnect,
}

struct SimInner<B> {
    backend: B,
    log: Vec<Command>,
    /// Keyed by the index of the command in `log`.
    faults: BTreeMap<usize, Fault>,
    /// Indices into the subsequence of move commands.
    rejected_moves: BTreeSet<usize>,
    moves_seen: usize,
    closed: bool,
}

/// Cloneable in-memory executor.
pub struct SimExecutor<B = SimArm> {
    inner: Arc<Mutex<SimInner<B>>>,
}

impl<B> Clone for SimExecutor<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl SimExecutor<SimArm> {
    /// A [`SimArm`] calibrated from `cfg` with an empty scene.
    pub fn from_config(cfg: &RobotConfig) -> Self {
        Self::new(SimArm::from_config(cfg))
    }
}

impl<B: MotionBackend> SimExecutor<B> {
    pub fn new(backend: B) -> Self {
        Self {
            inner: Arc::new(Mutex::new(SimInner {
                backend,
                log: Vec::new(),
                faults: BTreeMap::new(),
                rejected_moves: BTreeSet::new(),
                moves_seen: 0,
                closed: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimInner<B>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Answer the `n`-th move command (0-based, counting moves only) with
    /// `ERROR` without executing it.
    pub fn reject_move(&self, n: usize) {
        self.lock().rejected_moves.insert(n);
    }

    /// Answer the command at log index `n` with `response` instead of
    /// dispatching it.
    pub fn reply_at(&self, n: usize, response: Response) {
        self.lock().faults.insert(n, Fault::Reply(response));
    }

    /// Drop the link when the command at log index `n` arrives.
    pub fn disconnect_at(&self, n: usize) {
        self.lock().faults.insert(n, Fault::Disconnect);
    }

    /// Every command received so far, in order.
    pub fn commands(&self) -> Vec<Command> {
        self.lock().log.clone()
    }

    /// Only the move commands, as `(position, gripper)`.
    pub fn moves(&self) -> Vec<(Position, GripperState)> {
        self.lock()
            .log
            .iter()
            .filter_map(|c| match c {
                Command::Move { position, gripper } => Some((*position, *gripper)),
                _ => None,
            })
            .collect()
    }

    /// Number of received commands equal to `command`.
    pub fn count(&self, command: &Command) -> usize {
        self.lock().log.iter().filter(|c| *c == command).count()
    }

    pub fn clear_log(&self) {
        let mut inner = self.lock();
        inner.log.clear();
        inner.faults.clear();
        inner.rejected_moves.clear();
        inner.moves_seen = 0;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Run `f` against the backend, e.g. to inspect or edit a scene.
    pub fn with_backend<R>(&self, f: impl FnOnce(&mut B) -> R) -> R {
        f(&mut self.lock().backend)
    }
}

impl<B: MotionBackend> MotionExecutor for SimExecutor<B> {
    fn send(&mut self, command: &Command) -> Result<Response, RobotError> {
        if matches!(command, Command::Terminate) {
            return Err(terminate_via_send());
        }
        let mut inner = self.lock();
        if inner.closed {
            return Err(RobotError::ConnectionLost("sim link is closed".into()));
        }

        let index = inner.log.len();
        inner.log.push(command.clone());

        let move_index = if matches!(command, Command::Move { .. }) {
            inner.moves_seen += 1;
            Some(inner.moves_seen - 1)
        } else {
            None
        };

        match inner.faults.remove(&index) {
            Some(Fault::Reply(response)) => return Ok(response),
            Some(Fault::Disconnect) => {
                inner.closed = true;
                return Err(RobotError::ConnectionLost(format!(
                    "sim link dropped at command {index}"
                )));
            }
            None => {}
        }
        if move_index.is_some_and(|m| inner.rejected_moves.contains(&m)) {
            return Ok(Response::Error);
        }

        dispatch(&mut inner.backend, command)
            .ok_or_else(|| RobotError::Protocol("backend produced no reply".into()))
    }

    fn close(&mut self) -> Result<(), RobotError> {
        let mut inner = self.lock();
        if !inner.closed {
            inner.log.push(Command::Terminate);
            inner.closed = true;
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "sim://in-memory".into()
    }
}
