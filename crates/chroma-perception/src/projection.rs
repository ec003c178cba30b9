//! [`PixelProjector`] – pixel ↔ world conversion for the eye-in-hand camera.
//!
//! The camera rides on the gantry, so image coordinates are always relative
//! to the current tool position. The *target pixel* is where an object must
//! appear for the gripper to sit directly above it; it is expressed as
//! fractions of the frame size so the same calibration works at any
//! resolution.
//!
//! ```text
//! error_x = pixel_x - target_x_fraction * width
//! error_y = pixel_y - target_y_fraction * height
//!
//! world_x = robot_x + error_x / pixels_per_unit
//! world_y = robot_y - error_y / pixels_per_unit   (image rows grow downward)
//! ```
//!
//! # Example
//!
//! ```rust
//! use chroma_perception::projection::PixelProjector;
//! use chroma_types::{Detection, Position, ServoConfig};
//!
//! let p = PixelProjector::from_servo(&ServoConfig::default());
//! let d = Detection { color: "red".into(), pixel_x: 370.0, pixel_y: 310.0, pixel_area: 900 };
//!
//! assert_eq!(p.pixel_error(&d, 640, 480), (50.0, -50.0));
//! let (x, y) = p.project(&d, 640, 480, Position::new(2.0, 3.0, 0.0));
//! assert!((x - 3.0).abs() < 1e-12 && (y - 4.0).abs() < 1e-12);
//! ```

use chroma_types::{Detection, Position, ServoConfig};

/// Linear camera model around a fixed target pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelProjector {
    pub target_x_fraction: f64,
    pub target_y_fraction: f64,
    pub pixels_per_unit: f64,
}

impl PixelProjector {
    pub fn new(target_x_fraction: f64, target_y_fraction: f64, pixels_per_unit: f64) -> Self {
        Self {
            target_x_fraction,
            target_y_fraction,
            pixels_per_unit,
        }
    }

    pub fn from_servo(servo: &ServoConfig) -> Self {
        Self::new(
            servo.target_x_fraction,
            servo.target_y_fraction,
            servo.pixels_per_unit,
        )
    }

    /// Target pixel for a `width × height` frame.
    pub fn target_pixel(&self, width: u32, height: u32) -> (f64, f64) {
        (
            self.target_x_fraction * f64::from(width),
            self.target_y_fraction * f64::from(height),
        )
    }

    /// Signed pixel error of `d` from the target pixel.
    pub fn pixel_error(&self, d: &Detection, width: u32, height: u32) -> (f64, f64) {
        let (tx, ty) = self.target_pixel(width, height);
        (d.pixel_x - tx, d.pixel_y - ty)
    }

    /// World-frame displacement that would cancel a pixel error.
    pub fn error_to_world(&self, error_x: f64, error_y: f64) -> (f64, f64) {
        (
            error_x / self.pixels_per_unit,
            -error_y / self.pixels_per_unit,
        )
    }

    /// World XY of `d` when the frame was taken at `robot`.
    pub fn project(&self, d: &Detection, width: u32, height: u32, robot: Position) -> (f64, f64) {
        let (ex, ey) = self.pixel_error(d, width, height);
        let (dx, dy) = self.error_to_world(ex, ey);
        (robot.x + dx, robot.y + dy)
    }
}
