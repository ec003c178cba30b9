//! [`TcpTransport`] – the real link to a remote executor.
//!
//! One long-lived TCP stream carries newline-terminated commands and
//! replies. The transport owns the socket for its whole life: dropping it
//! sends a best-effort `TERMINATE` and shuts the stream down, so the executor
//! is released on every exit path, including early returns and panics that
//! unwind through the owner.
//!
//! Either side may listen. [`TcpTransport::connect`] dials an executor that
//! is listening; [`TcpTransport::accept`] waits for an executor that dials
//! in.
//!
//! Any I/O failure, EOF or read timeout marks the transport dead. Every
//! later [`send`][MotionExecutor::send] fails fast with
//! [`RobotError::ConnectionLost`] without touching the socket.

use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use chroma_types::RobotError;
use tracing::{debug, info, warn};

use crate::executor::{MotionExecutor, terminate_via_send};
use crate::protocol::{Command, Response};

/// Blocking line-oriented TCP link to an executor.
pub struct TcpTransport {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer: SocketAddr,
    alive: bool,
}

impl TcpTransport {
    /// Dial an executor listening on `addr`.
    ///
    /// `response_timeout` bounds each blocking read; `None` waits forever.
    ///
    /// # Errors
    ///
    /// [`RobotError::ConnectionLost`] when the connection cannot be made.
    pub fn connect(
        addr: impl ToSocketAddrs,
        response_timeout: Option<Duration>,
    ) -> Result<Self, RobotError> {
        let stream = TcpStream::connect(addr)?;
        Self::from_stream(stream, response_timeout)
    }

    /// Block until an executor dials in on `listener`.
    ///
    /// # Errors
    ///
    /// [`RobotError::ConnectionLost`] when `accept` fails.
    pub fn accept(
        listener: &TcpListener,
        response_timeout: Option<Duration>,
    ) -> Result<Self, RobotError> {
        let (stream, _) = listener.accept()?;
        Self::from_stream(stream, response_timeout)
    }

    /// Take ownership of an already connected stream.
    ///
    /// # Errors
    ///
    /// [`RobotError::ConnectionLost`] when the socket cannot be configured.
    pub fn from_stream(
        stream: TcpStream,
        response_timeout: Option<Duration>,
    ) -> Result<Self, RobotError> {
        stream.set_nodelay(true)?;
        stream.set_read_timeout(response_timeout)?;
        let peer = stream.peer_addr()?;
        let writer = stream.try_clone()?;
        info!(%peer, "executor link established");
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
            peer,
            alive: true,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    fn fail(&mut self, reason: String) -> RobotError {
        if self.alive {
            warn!(peer = %self.peer, %reason, "executor link lost");
        }
        self.alive = false;
        let _ = self.writer.shutdown(Shutdown::Both);
        RobotError::ConnectionLost(reason)
    }

    fn write_line(&mut self, line: &str) -> Result<(), RobotError> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        self.writer
            .write_all(buf.as_bytes())
            .and_then(|()| self.writer.flush())
            .map_err(|e| self.fail(format!("write failed: {e}")))
    }

    /// Read one reply line. A line that is not UTF-8 was still read whole,
    /// so the stream stays in step and the link stays up.
    fn read_line(&mut self) -> Result<String, RobotError> {
        let mut raw = Vec::new();
        match self.reader.read_until(b'\n', &mut raw) {
            Ok(0) => Err(self.fail("executor closed the connection".into())),
            Ok(_) => String::from_utf8(raw)
                .map_err(|e| RobotError::Protocol(format!("reply is not UTF-8: {e}"))),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(self.fail("no response before the read timeout".into()))
            }
            Err(e) => Err(self.fail(format!("read failed: {e}"))),
        }
    }
}

impl MotionExecutor for TcpTransport {
    fn send(&mut self, command: &Command) -> Result<Response, RobotError> {
        if matches!(command, Command::Terminate) {
            return Err(terminate_via_send());
        }
        if !self.alive {
            return Err(RobotError::ConnectionLost(format!(
                "link to {} is closed",
                self.peer
            )));
        }

        let line = command.encode();
        self.write_line(&line)?;
        let reply = self.read_line()?;
        let response = Response::parse(&reply)?;
        debug!(command = %line, reply = ?response.ack(), "exchange");
        Ok(response)
    }

    fn close(&mut self) -> Result<(), RobotError> {
        if !self.alive {
            return Ok(());
        }
        let result = self.write_line(&Command::Terminate.encode());
        self.alive = false;
        let _ = self.writer.shutdown(Shutdown::Both);
        info!(peer = %self.peer, "executor link closed");
        result
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.peer)
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!(error = %e, "TERMINATE on drop failed");
        }
    }
}
