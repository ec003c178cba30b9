//! `chroma-kernel` – Safety & Command Gating
//!
//! Sits between the controller logic and the executor link. It does not
//! plan; it enforces rules and keeps the authoritative record of what the
//! robot has acknowledged.
//!
//! # Modules
//!
//! - [`state_verifier`] – [`StateVerifier`][state_verifier::StateVerifier]:
//!   a rule engine that validates every outgoing
//!   [`Command`][chroma_hal::Command] against registered physical invariants
//!   (workspace bounds, rig-specific limits) and refuses it before
//!   transmission if any is violated.
//! - [`motion_gate`] – [`MotionGate`][motion_gate::MotionGate]:
//!   the single interception point the runtime must pass through to reach
//!   the executor. Combines invariant checking, reply validation, link-loss
//!   latching and position/gripper bookkeeping.

pub mod motion_gate;
pub mod state_verifier;

pub use motion_gate::MotionGate;
pub use state_verifier::{Rule, StateVerifier, WorkspaceBoundsRule};
