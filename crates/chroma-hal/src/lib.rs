//! `chroma-hal` – Hardware Abstraction Layer
//!
//! Everything that touches the motion unit, on both ends of the link.
//!
//! # Modules
//!
//! - [`protocol`] – [`Command`] / [`Response`]: the newline-terminated wire
//!   codec.
//! - [`camera`] – [`CameraFrame`]: RGB24 frames and their one-line payload.
//! - [`executor`] – [`MotionExecutor`]: the capability trait the controller
//!   depends on.
//! - [`tcp`] – [`TcpTransport`]: the real link over a TCP stream.
//! - [`sim`] – [`SimExecutor`]: in-memory executor with a command log and
//!   scripted faults.
//! - [`backend`] – [`MotionBackend`] and [`dispatch`][backend::dispatch]:
//!   the executor side of the protocol.
//! - [`server`] – [`ExecutorServer`]: serves the protocol over TCP from a
//!   backend.
//! - [`sim_arm`] – [`SimArm`]: a simulated gantry with an eye-in-hand camera.

pub mod backend;
pub mod camera;
pub mod executor;
pub mod protocol;
pub mod server;
pub mod sim;
pub mod sim_arm;
pub mod tcp;

pub use backend::MotionBackend;
pub use camera::CameraFrame;
pub use executor::MotionExecutor;
pub use protocol::{Ack, Command, Response};
pub use server::{ExecutorServer, SessionEnd};
pub use sim::SimExecutor;
pub use sim_arm::{SceneObject, SimArm, SimCamera};
pub use tcp::TcpTransport;
