//! Immutable robot configuration.
//!
//! A [`RobotConfig`] is built once (from TOML or [`Default`]), checked with
//! [`RobotConfig::validate`], and then handed by reference to every component
//! at construction time. Nothing mutates it afterwards.
//!
//! Every field carries a serde default, so a config file only needs to list
//! the values it changes:
//!
//! ```toml
//! [servo]
//! tolerance_x_px = 80.0
//!
//! [[drop_zones]]
//! color = "red"
//! x = 0.5
//! y = 0.0
//! radius = 1.0
//! ```

use serde::{Deserialize, Serialize};

use crate::{DropZone, Position, RobotError};

// ────────────────────────────────────────────────────────────────────────────
// Workspace
// ────────────────────────────────────────────────────────────────────────────

/// Inclusive `[min, max]` travel range of one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisRange {
    pub min: f64,
    pub max: f64,
}

impl AxisRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Pull `value` into the range. An inverted range (rejected by
    /// [`RobotConfig::validate`]) pins every value to `max` instead of
    /// panicking.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }
}

/// Per-axis travel limits of the gantry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
    pub x: AxisRange,
    pub y: AxisRange,
    pub z: AxisRange,
}

impl Default for Workspace {
    fn default() -> Self {
        Self {
            x: AxisRange::new(-1.0, 7.0),
            y: AxisRange::new(-1.0, 7.0),
            z: AxisRange::new(-3.0, 5.0),
        }
    }
}

impl Workspace {
    /// Return [`RobotError::OutOfBounds`] for the first axis of `p` that lies
    /// outside its range. NaN is never inside a range.
    pub fn check(&self, p: &Position) -> Result<(), RobotError> {
        for (axis, value, range) in [('x', p.x, self.x), ('y', p.y, self.y), ('z', p.z, self.z)] {
            if !range.contains(value) {
                return Err(RobotError::OutOfBounds {
                    axis,
                    value,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }

    pub fn contains(&self, p: &Position) -> bool {
        self.check(p).is_ok()
    }

    /// Pull every axis of `p` back inside the workspace.
    pub fn clamp(&self, p: &Position) -> Position {
        Position::new(self.x.clamp(p.x), self.y.clamp(p.y), self.z.clamp(p.z))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Motion heights
// ────────────────────────────────────────────────────────────────────────────

/// Fixed Z levels used by the search and pick/place sequences.
///
/// Z grows toward the work surface: `safe` is the highest (smallest) value
/// and `grip` the lowest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Heights {
    /// Travel height for every lateral move while carrying or searching.
    pub safe: f64,
    /// Intermediate stop before the final descent.
    pub approach: f64,
    /// Height at which the gripper closes on an object.
    pub grip: f64,
    /// Release height above a drop zone (before the zone's own `z`).
    pub place: f64,
    /// Height of the boustrophedon search sweep.
    pub search: f64,
}

impl Default for Heights {
    fn default() -> Self {
        Self {
            safe: 0.0,
            approach: 3.0,
            grip: 4.5,
            place: 4.0,
            search: 0.0,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Visual servoing
// ────────────────────────────────────────────────────────────────────────────

/// Tuning of the alignment loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoConfig {
    /// Horizontal target point as a fraction of the frame width.
    pub target_x_fraction: f64,
    /// Vertical target point as a fraction of the frame height. Sits below
    /// centre because the gripper is not on the optical axis.
    pub target_y_fraction: f64,
    /// Accepted absolute X pixel error (inclusive).
    pub tolerance_x_px: f64,
    /// Accepted absolute Y pixel error (inclusive).
    pub tolerance_y_px: f64,
    /// Pixels per unit of robot travel at the servo height.
    pub pixels_per_unit: f64,
    /// Fraction of the raw correction applied per iteration, in `(0, 1]`.
    pub damping: f64,
    /// Largest per-axis displacement of one correction.
    pub max_step: f64,
    /// Hard ceiling on frames captured per `align` call.
    pub max_iterations: u32,
}

impl Default for ServoConfig {
    fn default() -> Self {
        Self {
            target_x_fraction: 0.5,
            target_y_fraction: 0.75,
            tolerance_x_px: 50.0,
            tolerance_y_px: 30.0,
            pixels_per_unit: 50.0,
            damping: 0.5,
            max_step: 1.0,
            max_iterations: 15,
        }
    }
}

/// Lateral correction from the camera's aligned point to the gripper jaws,
/// applied from the approach height onward.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraOffset {
    pub dx: f64,
    pub dy: f64,
}

// ────────────────────────────────────────────────────────────────────────────
// Search
// ────────────────────────────────────────────────────────────────────────────

/// Rectangular sub-region swept while looking for an object.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
    /// Spacing between sample stops on both axes.
    pub step: f64,
}

impl Default for SearchRegion {
    fn default() -> Self {
        Self {
            x_min: 1.5,
            x_max: 4.5,
            y_min: 2.0,
            y_max: 5.0,
            step: 1.5,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Colors
// ────────────────────────────────────────────────────────────────────────────

/// One HSV threshold band on the OpenCV scale (H 0–180, S and V 0–255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

/// A sortable color. The ranges are only read by the reference segmenter;
/// the control core treats them as opaque.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorSpec {
    pub name: String,
    #[serde(default)]
    pub ranges: Vec<HsvRange>,
}

fn default_colors() -> Vec<ColorSpec> {
    vec![
        ColorSpec {
            name: "red".into(),
            ranges: vec![
                HsvRange::new([0, 100, 100], [10, 255, 255]),
                HsvRange::new([170, 100, 100], [180, 255, 255]),
            ],
        },
        ColorSpec {
            name: "green".into(),
            ranges: vec![HsvRange::new([40, 50, 50], [80, 255, 255])],
        },
        ColorSpec {
            name: "blue".into(),
            ranges: vec![HsvRange::new([100, 100, 100], [130, 255, 255])],
        },
    ]
}

fn default_drop_zones() -> Vec<DropZone> {
    [("blue", 6.0), ("green", 4.0), ("red", 0.5)]
        .into_iter()
        .map(|(color, x)| DropZone {
            color: color.into(),
            x,
            y: 0.0,
            z: 0.0,
            radius: 1.0,
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Auto-sort
// ────────────────────────────────────────────────────────────────────────────

/// Limits and behaviour of the continuous sorting loop.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoSortConfig {
    /// Stop after this many cycle attempts. `None` runs until a full pass
    /// finds nothing.
    pub max_cycles: Option<usize>,
    /// Stop when the same color is successfully picked this many times in a
    /// row, which usually means a phantom detection. `None` disables it.
    pub repeat_pick_limit: Option<usize>,
    /// Issue `HOME` after every completed cycle.
    pub return_home: bool,
}

impl Default for AutoSortConfig {
    fn default() -> Self {
        Self {
            max_cycles: None,
            repeat_pick_limit: None,
            return_home: true,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RobotConfig
// ────────────────────────────────────────────────────────────────────────────

/// Complete, immutable controller configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub workspace: Workspace,
    /// Position the executor reports after `HOMED`.
    pub home: Position,
    pub heights: Heights,
    pub servo: ServoConfig,
    pub camera_offset: CameraOffset,
    pub search: SearchRegion,
    pub drop_zones: Vec<DropZone>,
    /// Sort order. Auto-sort visits colors in this sequence.
    pub colors: Vec<ColorSpec>,
    pub autosort: AutoSortConfig,
}

impl Default for RobotConfig {
    fn default() -> Self {
        Self {
            workspace: Workspace::default(),
            home: Position::default(),
            heights: Heights::default(),
            servo: ServoConfig::default(),
            camera_offset: CameraOffset::default(),
            search: SearchRegion::default(),
            drop_zones: default_drop_zones(),
            colors: default_colors(),
            autosort: AutoSortConfig::default(),
        }
    }
}

impl RobotConfig {
    /// Drop zone registered for `color`.
    pub fn drop_zone(&self, color: &str) -> Option<&DropZone> {
        self.drop_zones.iter().find(|z| z.color == color)
    }

    pub fn color(&self, name: &str) -> Option<&ColorSpec> {
        self.colors.iter().find(|c| c.name == name)
    }

    /// Color names in sort order.
    pub fn sort_order(&self) -> Vec<String> {
        self.colors.iter().map(|c| c.name.clone()).collect()
    }

    /// Reject configurations the controller cannot run safely.
    ///
    /// # Errors
    ///
    /// Returns [`RobotError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> Result<(), RobotError> {
        let invalid = |msg: String| Err(RobotError::InvalidConfig(msg));

        for (axis, range) in [
            ('x', self.workspace.x),
            ('y', self.workspace.y),
            ('z', self.workspace.z),
        ] {
            if !(range.min < range.max) {
                return invalid(format!(
                    "workspace {axis} range [{}, {}] is empty",
                    range.min, range.max
                ));
            }
        }

        let s = &self.servo;
        if !(s.damping > 0.0 && s.damping <= 1.0) {
            return invalid(format!("servo.damping {} must be in (0, 1]", s.damping));
        }
        if !(s.max_step > 0.0) {
            return invalid(format!("servo.max_step {} must be positive", s.max_step));
        }
        if !(s.pixels_per_unit > 0.0) {
            return invalid(format!(
                "servo.pixels_per_unit {} must be positive",
                s.pixels_per_unit
            ));
        }
        if s.max_iterations == 0 {
            return invalid("servo.max_iterations must be at least 1".into());
        }
        if !(s.tolerance_x_px >= 0.0 && s.tolerance_y_px >= 0.0) {
            return invalid("servo tolerances must not be negative".into());
        }
        for (name, f) in [
            ("target_x_fraction", s.target_x_fraction),
            ("target_y_fraction", s.target_y_fraction),
        ] {
            if !(0.0..=1.0).contains(&f) {
                return invalid(format!("servo.{name} {f} must be in [0, 1]"));
            }
        }

        let r = &self.search;
        if !(r.step > 0.0) {
            return invalid(format!("search.step {} must be positive", r.step));
        }
        if r.x_min > r.x_max || r.y_min > r.y_max {
            return invalid("search region bounds are inverted".into());
        }
        for corner in [
            Position::new(r.x_min, r.y_min, self.heights.search),
            Position::new(r.x_max, r.y_max, self.heights.search),
        ] {
            if let Err(e) = self.workspace.check(&corner) {
                return invalid(format!("search region leaves the workspace: {e}"));
            }
        }

        let h = &self.heights;
        for (name, z) in [
            ("safe", h.safe),
            ("approach", h.approach),
            ("grip", h.grip),
            ("place", h.place),
            ("search", h.search),
        ] {
            if !self.workspace.z.contains(z) {
                return invalid(format!("heights.{name} {z} is outside the z range"));
            }
        }

        if let Err(e) = self.workspace.check(&self.home) {
            return invalid(format!("home position leaves the workspace: {e}"));
        }

        if self.colors.is_empty() {
            return invalid("at least one sort color is required".into());
        }
        for color in &self.colors {
            let Some(zone) = self.drop_zone(&color.name) else {
                return invalid(format!("color '{}' has no drop zone", color.name));
            };
            if !(zone.radius >= 0.0) {
                return invalid(format!("drop zone '{}' has a negative radius", zone.color));
            }
            let release = Position::new(zone.x, zone.y, h.place + zone.z);
            if let Err(e) = self.workspace.check(&release) {
                return invalid(format!("drop zone '{}' is unreachable: {e}", zone.color));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        RobotConfig::default().validate().unwrap();
    }

    #[test]
    fn workspace_check_reports_offending_axis() {
        let ws = Workspace::default();
        assert!(ws.check(&Position::new(7.0, -1.0, 5.0)).is_ok());
        match ws.check(&Position::new(3.0, 7.5, 0.0)) {
            Err(RobotError::OutOfBounds { axis, value, .. }) => {
                assert_eq!(axis, 'y');
                assert!((value - 7.5).abs() < 1e-12);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(ws.check(&Position::new(f64::NAN, 0.0, 0.0)).is_err());
    }

    #[test]
    fn workspace_clamp() {
        let ws = Workspace::default();
        let p = ws.clamp(&Position::new(-4.0, 9.0, 2.0));
        assert_eq!(p, Position::new(-1.0, 7.0, 2.0));
    }

    #[test]
    fn inverted_range_clamps_without_panicking() {
        let mut ws = Workspace::default();
        ws.x = AxisRange::new(5.0, 1.0);
        let p = ws.clamp(&Position::new(3.0, 2.0, 0.0));
        assert_eq!(p, Position::new(1.0, 2.0, 0.0));
        assert!(!ws.x.contains(3.0));
    }

    #[test]
    fn hsv_range_is_inclusive() {
        let r = HsvRange::new([0, 100, 100], [10, 255, 255]);
        assert!(r.contains([10, 100, 255]));
        assert!(!r.contains([11, 200, 200]));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let raw = r#"
            [servo]
            tolerance_x_px = 100.0
            tolerance_y_px = 60.0

            [autosort]
            max_cycles = 25
        "#;
        let cfg: RobotConfig = toml::from_str(raw).unwrap();
        assert!((cfg.servo.tolerance_x_px - 100.0).abs() < 1e-12);
        assert!((cfg.servo.damping - 0.5).abs() < 1e-12);
        assert_eq!(cfg.autosort.max_cycles, Some(25));
        assert!(cfg.autosort.return_home);
        assert_eq!(cfg.sort_order(), vec!["red", "green", "blue"]);
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_bad_damping() {
        let mut cfg = RobotConfig::default();
        cfg.servo.damping = 1.5;
        assert!(matches!(cfg.validate(), Err(RobotError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_color_without_zone() {
        let mut cfg = RobotConfig::default();
        cfg.colors.push(ColorSpec {
            name: "yellow".into(),
            ranges: vec![],
        });
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("yellow"));
    }

    #[test]
    fn rejects_search_region_outside_workspace() {
        let mut cfg = RobotConfig::default();
        cfg.search.x_max = 9.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_zero_iterations() {
        let mut cfg = RobotConfig::default();
        cfg.servo.max_iterations = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn drop_zone_lookup() {
        let cfg = RobotConfig::default();
        let zone = cfg.drop_zone("green").unwrap();
        assert!((zone.x - 4.0).abs() < 1e-12);
        assert!(cfg.drop_zone("purple").is_none());
    }
}
