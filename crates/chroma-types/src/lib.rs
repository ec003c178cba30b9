//! `chroma-types` – shared value types for the Chroma sorting controller.
//!
//! Every other crate in the workspace speaks in terms of these types: robot
//! [`Position`]s and [`GripperState`], per-frame [`Detection`]s, configured
//! [`DropZone`]s, the per-cycle [`CycleResult`], the auto-sort
//! [`SortReport`], the immutable [`RobotConfig`] and the global
//! [`RobotError`].

pub mod config;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use config::{
    AutoSortConfig, AxisRange, CameraOffset, ColorSpec, Heights, HsvRange, RobotConfig,
    SearchRegion, ServoConfig, Workspace,
};

// ────────────────────────────────────────────────────────────────────────────
// Geometry
// ────────────────────────────────────────────────────────────────────────────

/// A robot-frame coordinate triple.
///
/// All three axes share one linear unit (centimetres with the default
/// configuration). The Z axis grows toward the work surface, so a *larger*
/// `z` means the tool is *lower*.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Same XY, different height.
    pub fn with_z(self, z: f64) -> Self {
        Self { z, ..self }
    }

    /// Euclidean distance in the XY plane only.
    pub fn distance_xy(&self, x: f64, y: f64) -> f64 {
        ((self.x - x).powi(2) + (self.y - y).powi(2)).sqrt()
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Binary gripper state. Sent as `0` (open) or `1` (closed) on the wire as
/// the fourth field of every move command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GripperState {
    #[default]
    Open,
    Closed,
}

impl GripperState {
    /// Wire encoding of this state.
    pub fn wire_value(self) -> u8 {
        match self {
            GripperState::Open => 0,
            GripperState::Closed => 1,
        }
    }

    /// Decode a wire value; anything other than `0` or `1` is `None`.
    pub fn from_wire(value: u8) -> Option<Self> {
        match value {
            0 => Some(GripperState::Open),
            1 => Some(GripperState::Closed),
            _ => None,
        }
    }
}

impl std::fmt::Display for GripperState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GripperState::Open => write!(f, "open"),
            GripperState::Closed => write!(f, "closed"),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Perception
// ────────────────────────────────────────────────────────────────────────────

/// A single candidate object observed in one camera frame.
///
/// Produced fresh for every frame and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Color label the detection was produced for, e.g. `"red"`.
    pub color: String,
    /// Centroid column in pixels.
    pub pixel_x: f64,
    /// Centroid row in pixels (grows downward in the image).
    pub pixel_y: f64,
    /// Blob extent in pixels.
    pub pixel_area: u32,
}

/// A circular world-frame region associated with one color.
///
/// Acts both as the placement target for that color and as an exclusion
/// area for detections of *any* color.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropZone {
    pub color: String,
    pub x: f64,
    pub y: f64,
    /// Added to the configured place height when releasing into this zone.
    #[serde(default)]
    pub z: f64,
    pub radius: f64,
}

impl DropZone {
    /// `true` when `(x, y)` lies inside or on the boundary of this zone.
    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        ((x - self.x).powi(2) + (y - self.y).powi(2)).sqrt() <= self.radius
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cycle and session results
// ────────────────────────────────────────────────────────────────────────────

/// How a single pick-and-place cycle ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum CycleOutcome {
    /// The object was picked and released in its drop zone.
    Sorted,
    /// The search sweep finished without a candidate. Not an error.
    NotFound,
    /// The cycle was abandoned and the tool retreated to safe height.
    Aborted { reason: String },
}

/// Result of one pick-and-place cycle, consumed by the auto-sort loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleResult {
    pub success: bool,
    /// The color that was picked, when an object was actually gripped.
    pub picked_color: Option<String>,
    /// Last position acknowledged by the executor, if known.
    pub final_position: Option<Position>,
    pub outcome: CycleOutcome,
}

impl CycleResult {
    pub fn sorted(color: impl Into<String>, final_position: Option<Position>) -> Self {
        Self {
            success: true,
            picked_color: Some(color.into()),
            final_position,
            outcome: CycleOutcome::Sorted,
        }
    }

    pub fn not_found(final_position: Option<Position>) -> Self {
        Self {
            success: false,
            picked_color: None,
            final_position,
            outcome: CycleOutcome::NotFound,
        }
    }

    pub fn aborted(
        picked_color: Option<String>,
        final_position: Option<Position>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            picked_color,
            final_position,
            outcome: CycleOutcome::Aborted {
                reason: reason.into(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.outcome, CycleOutcome::NotFound)
    }
}

/// Why an auto-sort session stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A full pass over every color sorted nothing.
    Exhausted,
    /// The operator interrupted the session between cycles.
    Cancelled,
    /// The configured cycle cap was reached.
    CycleCap,
    /// The same color was picked too many times in a row.
    RepeatedPick { color: String },
}

/// Summary of one auto-sort session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Number of cycles attempted, successful or not.
    pub attempts: usize,
    pub total_sorted: usize,
    pub stop_reason: StopReason,
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Global error type spanning the link, the executor and configuration.
///
/// Negative results that drive normal state transitions ("nothing found",
/// "did not converge") are *not* errors and travel in outcome enums instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RobotError {
    /// Malformed, unexpected or missing response on the link.
    #[error("Protocol Error: {0}")]
    Protocol(String),

    /// The stream failed or was closed by the peer.
    #[error("Connection Lost: {0}")]
    ConnectionLost(String),

    /// The executor answered `ERROR`.
    #[error("Command Rejected by executor: {command}")]
    Rejected { command: String },

    /// A target violated the configured workspace before transmission.
    #[error("Out Of Bounds: {axis} = {value} outside [{min}, {max}]")]
    OutOfBounds {
        axis: char,
        value: f64,
        min: f64,
        max: f64,
    },

    /// A relative motion was requested before any home or acknowledged move.
    #[error("Position Unknown: home the robot before moving")]
    PositionUnknown,

    #[error("No drop zone configured for color '{0}'")]
    NoDropZone(String),

    #[error("Unknown color '{0}'")]
    UnknownColor(String),

    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),

    #[error("Segmentation Error: {0}")]
    Segmentation(String),
}

impl RobotError {
    /// Errors after which no further motion command may be sent.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RobotError::Protocol(_) | RobotError::ConnectionLost(_)
        )
    }

    /// Errors that abort the current cycle but leave the link usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            RobotError::Rejected { .. } | RobotError::OutOfBounds { .. }
        )
    }
}

impl From<std::io::Error> for RobotError {
    fn from(e: std::io::Error) -> Self {
        RobotError::ConnectionLost(e.to_string())
    }
}
