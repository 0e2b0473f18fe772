//! Source-to-machine coordinate mapping.
//!
//! Source space is pixel space with Y growing downward; machine space is
//! millimeters with Y growing upward. Mapping a point applies, in order:
//! vertical flip, uniform scale, a centering offset per axis, and a
//! saturating clamp into the work area.

use plotkit_core::{MachineConfig, Point};

/// Pure source-to-machine point mapper for one job.
#[derive(Debug, Clone)]
pub struct CoordinateMapper {
    scale: f64,
    source_height: f64,
    offset_x: f64,
    offset_y: f64,
    work_width: f64,
    work_height: f64,
}

impl CoordinateMapper {
    /// Build a mapper for a source image of the given pixel dimensions.
    ///
    /// The centering offset places the scaled content in the middle of the
    /// work area; it goes negative when the content overhangs, in which case
    /// the clamp truncates at the edges.
    pub fn new(config: &MachineConfig, source_width: f64, source_height: f64) -> Self {
        let scale = config.scale_factor();
        let (work_width, work_height) = config.work_area();
        Self {
            scale,
            source_height,
            offset_x: (work_width - source_width * scale) / 2.0,
            offset_y: (work_height - source_height * scale) / 2.0,
            work_width,
            work_height,
        }
    }

    /// Map one source point into the work area.
    pub fn map(&self, point: Point) -> Point {
        // Source Y grows downward, machine Y grows upward.
        let flipped_y = self.source_height - point.y;
        let x = point.x * self.scale + self.offset_x;
        let y = flipped_y * self.scale + self.offset_y;
        Point::new(clamp_axis(x, self.work_width), clamp_axis(y, self.work_height))
    }

    /// The uniform scale applied to both axes.
    pub fn scale(&self) -> f64 {
        self.scale
    }
}

/// Saturating clamp onto `[0, max]`. NaN maps to 0 so finite input can never
/// produce non-finite output.
fn clamp_axis(value: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, max)
}
