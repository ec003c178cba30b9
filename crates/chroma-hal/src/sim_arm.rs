//! [`SimArm`] – a simulated Cartesian gantry with an eye-in-hand camera.
//!
//! Lets the full controller (segmentation included) run headless. The arm
//! holds a flat scene of colored discs lying on the work surface.
//!
//! # Stub behaviour
//!
//! | Operation | Behaviour |
//! |---|---|
//! | move | Updates the pose. Refused outside the workspace while safety is on. Closing the gripper at or below `grab_height` picks up the nearest disc within `grab_radius`; opening it drops the held disc at the current XY. |
//! | home | Pose returns to the stored home; the gripper keeps its state. |
//! | set_home | Stores the current pose as home. |
//! | reset_gripper | Opens the gripper, dropping anything held. |
//! | capture | Renders the discs as seen from the current XY. |
//!
//! The camera model is linear and height-independent: a world point `(wx,
//! wy)` appears at
//!
//! ```text
//! px = target_x + (wx - x) * pixels_per_unit
//! py = target_y - (wy - y) * pixels_per_unit
//! ```
//!
//! where `(target_x, target_y)` is the pixel the gripper sits over.
//!
//! # Example
//!
//! ```rust
//! use chroma_hal::backend::MotionBackend;
//! use chroma_hal::sim_arm::{SceneObject, SimArm};
//! use chroma_types::{GripperState, Position, RobotConfig};
//!
//! let cfg = RobotConfig::default();
//! let mut arm = SimArm::from_config(&cfg).with_object(SceneObject::new("red", 3.0, 3.5));
//!
//! arm.move_to(Position::new(3.0, 3.5, cfg.heights.grip), GripperState::Closed).unwrap();
//! assert_eq!(arm.held().map(|o| o.color.as_str()), Some("red"));
//! ```

use chroma_types::{GripperState, Position, RobotConfig, RobotError, Workspace};
use tracing::{debug, info};

use crate::backend::MotionBackend;
use crate::camera::CameraFrame;

const BACKGROUND: [u8; 3] = [90, 90, 90];

/// Display color used for well-known color names.
pub fn palette(color: &str) -> [u8; 3] {
    match color {
        "red" => [220, 30, 30],
        "green" => [40, 200, 60],
        "blue" => [30, 60, 220],
        "yellow" => [230, 210, 40],
        _ => [255, 255, 255],
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scene
// ────────────────────────────────────────────────────────────────────────────

/// A colored disc lying on the work surface.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneObject {
    pub color: String,
    pub x: f64,
    pub y: f64,
    /// Disc radius in workspace units.
    pub radius: f64,
    pub rgb: [u8; 3],
}

impl SceneObject {
    /// A disc of radius 0.4 drawn in the [`palette`] color for `color`.
    pub fn new(color: impl Into<String>, x: f64, y: f64) -> Self {
        let color = color.into();
        let rgb = palette(&color);
        Self {
            color,
            x,
            y,
            radius: 0.4,
            rgb,
        }
    }
}

/// Intrinsics of the simulated camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimCamera {
    pub width: u32,
    pub height: u32,
    pub pixels_per_unit: f64,
    /// Pixel the gripper sits over, as fractions of the frame size.
    pub target_x_fraction: f64,
    pub target_y_fraction: f64,
}

impl Default for SimCamera {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            pixels_per_unit: 50.0,
            target_x_fraction: 0.5,
            target_y_fraction: 0.75,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimArm
// ────────────────────────────────────────────────────────────────────────────

/// Simulated gantry, gripper and camera.
pub struct SimArm {
    workspace: Workspace,
    camera: SimCamera,
    position: Position,
    home: Position,
    gripper: GripperState,
    safety: bool,
    grab_height: f64,
    grab_radius: f64,
    objects: Vec<SceneObject>,
    held: Option<SceneObject>,
}

impl SimArm {
    /// An empty scene at the origin with safety enabled.
    pub fn new(workspace: Workspace, camera: SimCamera, grab_height: f64) -> Self {
        Self {
            workspace,
            camera,
            position: Position::default(),
            home: Position::default(),
            gripper: GripperState::Open,
            safety: true,
            grab_height,
            grab_radius: 0.6,
            objects: Vec::new(),
            held: None,
        }
    }

    /// Match the camera to the servo calibration so the controller's pixel
    /// math is exact in simulation.
    pub fn from_config(cfg: &RobotConfig) -> Self {
        let camera = SimCamera {
            pixels_per_unit: cfg.servo.pixels_per_unit,
            target_x_fraction: cfg.servo.target_x_fraction,
            target_y_fraction: cfg.servo.target_y_fraction,
            ..SimCamera::default()
        };
        let mut arm = Self::new(cfg.workspace, camera, cfg.heights.grip - 0.5);
        arm.home = cfg.home;
        arm.position = cfg.home;
        arm
    }

    pub fn with_object(mut self, object: SceneObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn with_grab_radius(mut self, radius: f64) -> Self {
        self.grab_radius = radius;
        self
    }

    pub fn add_object(&mut self, object: SceneObject) {
        self.objects.push(object);
    }

    pub fn objects(&self) -> &[SceneObject] {
        &self.objects
    }

    pub fn held(&self) -> Option<&SceneObject> {
        self.held.as_ref()
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn gripper(&self) -> GripperState {
        self.gripper
    }

    pub fn safety_enabled(&self) -> bool {
        self.safety
    }

    fn grab(&mut self) {
        if self.position.z < self.grab_height {
            debug!(z = self.position.z, "gripper closed in the air");
            return;
        }
        let nearest = self
            .objects
            .iter()
            .enumerate()
            .map(|(i, o)| (i, self.position.distance_xy(o.x, o.y)))
            .filter(|&(_, d)| d <= self.grab_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));
        if let Some((i, _)) = nearest {
            let object = self.objects.remove(i);
            info!(color = %object.color, x = object.x, y = object.y, "sim: object gripped");
            self.held = Some(object);
        }
    }

    fn release(&mut self) {
        if let Some(mut object) = self.held.take() {
            object.x = self.position.x;
            object.y = self.position.y;
            info!(color = %object.color, x = object.x, y = object.y, "sim: object released");
            self.objects.push(object);
        }
    }

    fn set_gripper(&mut self, gripper: GripperState) {
        match (self.gripper, gripper) {
            (GripperState::Open, GripperState::Closed) => {
                self.gripper = gripper;
                self.grab();
            }
            (GripperState::Closed, GripperState::Open) => {
                self.gripper = gripper;
                self.release();
            }
            _ => {}
        }
    }

    /// Render the scene as seen from the current pose.
    pub fn render(&self) -> CameraFrame {
        let cam = &self.camera;
        let mut frame = CameraFrame::filled(cam.width, cam.height, BACKGROUND);
        let tx = cam.target_x_fraction * f64::from(cam.width);
        let ty = cam.target_y_fraction * f64::from(cam.height);
        let ppu = cam.pixels_per_unit;

        for object in &self.objects {
            let cx = tx + (object.x - self.position.x) * ppu;
            let cy = ty - (object.y - self.position.y) * ppu;
            let r = object.radius * ppu;

            let x0 = (cx - r).floor().max(0.0);
            let x1 = (cx + r).ceil().min(f64::from(cam.width) - 1.0);
            let y0 = (cy - r).floor().max(0.0);
            let y1 = (cy + r).ceil().min(f64::from(cam.height) - 1.0);
            if x0 > x1 || y0 > y1 {
                continue;
            }

            for py in y0 as u32..=y1 as u32 {
                for px in x0 as u32..=x1 as u32 {
                    let dx = f64::from(px) - cx;
                    let dy = f64::from(py) - cy;
                    if dx * dx + dy * dy <= r * r {
                        frame.set_pixel(px, py, object.rgb);
                    }
                }
            }
        }
        frame
    }
}

impl MotionBackend for SimArm {
    fn move_to(&mut self, target: Position, gripper: GripperState) -> Result<(), RobotError> {
        if self.safety {
            self.workspace.check(&target)?;
        }
        self.position = target;
        self.set_gripper(gripper);
        Ok(())
    }

    fn home(&mut self) -> Result<(), RobotError> {
        self.position = self.home;
        Ok(())
    }

    fn set_home(&mut self) -> Result<(), RobotError> {
        self.home = self.position;
        Ok(())
    }

    fn reset_gripper(&mut self) -> Result<(), RobotError> {
        self.set_gripper(GripperState::Open);
        Ok(())
    }

    fn capture(&mut self) -> Result<CameraFrame, RobotError> {
        Ok(self.render())
    }

    fn set_safety(&mut self, enabled: bool) -> Result<(), RobotError> {
        self.safety = enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arm() -> SimArm {
        SimArm::from_config(&RobotConfig::default())
    }

    #[test]
    fn safety_refuses_out_of_bounds_moves() {
        let mut a = arm();
        let outside = Position::new(8.0, 0.0, 0.0);
        assert!(a.move_to(outside, GripperState::Open).is_err());
        assert_eq!(a.position(), Position::default());

        a.set_safety(false).unwrap();
        a.move_to(outside, GripperState::Open).unwrap();
        assert_eq!(a.position(), outside);
    }

    #[test]
    fn object_under_target_pixel_renders_there() {
        let mut a = arm().with_object(SceneObject::new("blue", 2.0, 3.0));
        a.move_to(Position::new(2.0, 3.0, 0.0), GripperState::Open).unwrap();
        let frame = a.render();
        assert_eq!(frame.pixel(320, 360), palette("blue"));
        assert_eq!(frame.pixel(10, 10), BACKGROUND);
    }

    #[test]
    fn world_offset_maps_to_pixel_offset() {
        // Object one unit to +x and one unit to +y of the pose: 50 px right
        // and 50 px up from the target pixel.
        let mut a = arm().with_object(SceneObject::new("red", 3.0, 4.0));
        a.move_to(Position::new(2.0, 3.0, 0.0), GripperState::Open).unwrap();
        let frame = a.render();
        assert_eq!(frame.pixel(370, 310), palette("red"));
        assert_eq!(frame.pixel(320, 360), BACKGROUND);
    }

    #[test]
    fn grip_and_release_move_the_object() {
        let cfg = RobotConfig::default();
        let mut a = arm().with_object(SceneObject::new("green", 3.0, 3.0));

        // Closing high above does nothing.
        a.move_to(Position::new(3.0, 3.0, cfg.heights.safe), GripperState::Closed).unwrap();
        assert!(a.held().is_none());
        a.move_to(Position::new(3.0, 3.0, cfg.heights.safe), GripperState::Open).unwrap();

        a.move_to(Position::new(3.2, 3.1, cfg.heights.grip), GripperState::Open).unwrap();
        a.move_to(Position::new(3.2, 3.1, cfg.heights.grip), GripperState::Closed).unwrap();
        assert_eq!(a.held().map(|o| o.color.as_str()), Some("green"));
        assert!(a.objects().is_empty());

        a.move_to(Position::new(4.0, 0.0, cfg.heights.place), GripperState::Closed).unwrap();
        a.move_to(Position::new(4.0, 0.0, cfg.heights.place), GripperState::Open).unwrap();
        assert!(a.held().is_none());
        assert_eq!(a.objects().len(), 1);
        assert!((a.objects()[0].x - 4.0).abs() < 1e-12);
    }

    #[test]
    fn home_and_set_home() {
        let mut a = arm();
        a.move_to(Position::new(1.0, 1.0, 0.0), GripperState::Open).unwrap();
        a.set_home().unwrap();
        a.move_to(Position::new(5.0, 5.0, 0.0), GripperState::Open).unwrap();
        a.home().unwrap();
        assert_eq!(a.position(), Position::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn reset_gripper_opens() {
        let mut a = arm();
        a.move_to(Position::new(1.0, 1.0, 0.0), GripperState::Closed).unwrap();
        a.reset_gripper().unwrap();
        assert_eq!(a.gripper(), GripperState::Open);
    }
}
