//! [`ExecutorServer`] – serves the wire protocol from a [`MotionBackend`].
//!
//! This is the program that runs next to the motors. It accepts one
//! controller at a time and processes its commands strictly in order:
//!
//! ```text
//! 1. Controller connects
//! 2. Read one line, decode, dispatch to the backend, write one reply
//! 3. Repeat until TERMINATE, EOF or shutdown
//! 4. Go back to accepting
//! ```
//!
//! Lines that cannot be decoded are answered with `ERROR` so a confused
//! controller never blocks waiting for a reply.
//!
//! # Safety features
//!
//! - **Read timeout**: 500 ms, so the shutdown flag is polled even while a
//!   controller sits idle.
//! - **Line limit**: a line longer than 64 KiB ends the session with a
//!   protocol error; at most that much is ever buffered.

use std::io::{BufRead, BufReader, ErrorKind, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chroma_types::RobotError;
use tracing::{debug, info, warn};

use crate::backend::{MotionBackend, dispatch};
use crate::protocol::{Command, Response};

const POLL_INTERVAL: Duration = Duration::from_millis(500);
const MAX_LINE_BYTES: usize = 64 * 1024;

/// How a single controller session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The controller sent `TERMINATE`.
    Terminated,
    /// The controller closed the stream without `TERMINATE`.
    Disconnected,
    /// The shutdown flag was raised.
    Shutdown,
}

/// Executor-side protocol server.
pub struct ExecutorServer<B> {
    backend: B,
    commands_served: u64,
}

impl<B: MotionBackend> ExecutorServer<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            commands_served: 0,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn commands_served(&self) -> u64 {
        self.commands_served
    }

    /// Accept controllers on `listener` one after another until `shutdown`
    /// is raised.
    ///
    /// # Errors
    ///
    /// [`RobotError::ConnectionLost`] when the listener itself fails.
    pub fn serve(&mut self, listener: &TcpListener, shutdown: &AtomicBool) -> Result<(), RobotError> {
        listener.set_nonblocking(true)?;
        info!(addr = ?listener.local_addr().ok(), "executor listening");

        while !shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, peer)) => {
                    stream.set_nonblocking(false)?;
                    info!(%peer, "controller connected");
                    match self.serve_connection(stream, shutdown) {
                        Ok(end) => info!(%peer, ?end, "controller session ended"),
                        Err(e) => warn!(%peer, error = %e, "controller session failed"),
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => return Err(e.into()),
            }
        }
        info!("executor shutting down");
        Ok(())
    }

    /// Serve a single controller until it terminates, disconnects, or
    /// `shutdown` is raised.
    ///
    /// # Errors
    ///
    /// [`RobotError::ConnectionLost`] on socket failures,
    /// [`RobotError::Protocol`] for a line over the length limit.
    pub fn serve_connection(
        &mut self,
        stream: TcpStream,
        shutdown: &AtomicBool,
    ) -> Result<SessionEnd, RobotError> {
        stream.set_read_timeout(Some(POLL_INTERVAL))?;
        stream.set_nodelay(true)?;
        let mut writer = stream.try_clone()?;
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();

        loop {
            if shutdown.load(Ordering::SeqCst) {
                return Ok(SessionEnd::Shutdown);
            }

            // One byte past the limit tells an overlong line from EOF.
            let room = (MAX_LINE_BYTES + 1).saturating_sub(line.len()) as u64;
            match (&mut reader).take(room).read_until(b'\n', &mut line) {
                Ok(_) if line.ends_with(b"\n") => {}
                Ok(_) if line.len() > MAX_LINE_BYTES => {
                    warn!(bytes = line.len(), "command line too long");
                    return Err(RobotError::Protocol("command line too long".into()));
                }
                // EOF, possibly in the middle of a line.
                Ok(_) => return Ok(SessionEnd::Disconnected),
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    // Keep any partial line and poll the shutdown flag.
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            let parsed = std::str::from_utf8(&line)
                .map_err(|e| RobotError::Protocol(format!("command is not UTF-8: {e}")))
                .and_then(Command::parse);
            let reply = match parsed {
                Ok(command) => {
                    self.commands_served += 1;
                    match dispatch(&mut self.backend, &command) {
                        Some(reply) => reply,
                        None => return Ok(SessionEnd::Terminated),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "undecodable command");
                    Response::Error
                }
            };
            line.clear();

            let mut out = reply.encode();
            out.push('\n');
            writer.write_all(out.as_bytes())?;
            writer.flush()?;
            debug!(reply = ?reply.ack(), "replied");
        }
    }
}
