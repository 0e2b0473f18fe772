//! Validated machine configuration.
//!
//! [`MachineConfig`] is an immutable option table constructed once per
//! request from a plain [`MachineOptions`] value. Every numeric field is
//! clamped to a fixed admissible range at construction time; out-of-range
//! values are never rejected.

use crate::stroke::StrokeKind;
use serde::{Deserialize, Serialize};

/// Lowest Z the machine may ever be commanded to. Absolute safety bound,
/// independent of the configured pen depths.
pub const Z_FLOOR: f64 = -10.0;

/// Highest Z the machine may ever be commanded to.
pub const Z_CEILING: f64 = 50.0;

/// Raw, unvalidated machine options as collected by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineOptions {
    /// Uniform source-to-machine scale (machine units per source pixel).
    pub scale_factor: f64,
    /// Z height for pen-up travel (mm).
    pub pen_up_z: f64,
    /// Z depth for contour and text drawing (mm, typically negative).
    pub pen_down_z: f64,
    /// Z depth for hatching strokes (mm); shallower than contours for a
    /// lighter shading touch.
    pub hatch_depth: f64,
    /// Drawing feed rate (mm/min).
    pub feed_rate: f64,
    /// Rapid/travel feed rate (mm/min).
    pub rapid_feed_rate: f64,
    /// Drawable rectangle of the target machine: (width, height) in mm.
    pub work_area: (f64, f64),
    /// Minimum emitted segment length for contours (machine units).
    pub contour_min_segment: f64,
    /// Minimum emitted segment length for hatching (machine units).
    pub hatch_min_segment: f64,
    /// Minimum emitted segment length for text strokes (machine units).
    pub text_min_segment: f64,
}

impl Default for MachineOptions {
    fn default() -> Self {
        Self {
            scale_factor: 0.3,
            pen_up_z: 5.0,
            pen_down_z: -0.5,
            hatch_depth: -0.35,
            feed_rate: 800.0,
            rapid_feed_rate: 2000.0,
            work_area: (200.0, 200.0),
            contour_min_segment: 0.3,
            hatch_min_segment: 0.2,
            text_min_segment: 0.3,
        }
    }
}

/// Validated, immutable machine configuration.
///
/// Fields are private; use the accessors. Obtain one via
/// [`MachineConfig::new`], which clamps every numeric option into its
/// admissible range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineConfig {
    scale_factor: f64,
    pen_up_z: f64,
    pen_down_z: f64,
    hatch_depth: f64,
    feed_rate: f64,
    rapid_feed_rate: f64,
    work_area: (f64, f64),
    contour_min_segment: f64,
    hatch_min_segment: f64,
    text_min_segment: f64,
}

impl MachineConfig {
    /// Build a validated configuration, clamping each field into range.
    pub fn new(options: MachineOptions) -> Self {
        let defaults = MachineOptions::default();
        let config = Self {
            scale_factor: clamped(
                "scale_factor",
                options.scale_factor,
                0.01,
                10.0,
                defaults.scale_factor,
            ),
            pen_up_z: clamped("pen_up_z", options.pen_up_z, 0.0, Z_CEILING, defaults.pen_up_z),
            pen_down_z: clamped(
                "pen_down_z",
                options.pen_down_z,
                Z_FLOOR,
                0.0,
                defaults.pen_down_z,
            ),
            hatch_depth: clamped(
                "hatch_depth",
                options.hatch_depth,
                Z_FLOOR,
                0.0,
                defaults.hatch_depth,
            ),
            feed_rate: clamped("feed_rate", options.feed_rate, 50.0, 6000.0, defaults.feed_rate),
            rapid_feed_rate: clamped(
                "rapid_feed_rate",
                options.rapid_feed_rate,
                100.0,
                10000.0,
                defaults.rapid_feed_rate,
            ),
            work_area: (
                clamped("work_area.0", options.work_area.0, 10.0, 2000.0, defaults.work_area.0),
                clamped("work_area.1", options.work_area.1, 10.0, 2000.0, defaults.work_area.1),
            ),
            contour_min_segment: clamped(
                "contour_min_segment",
                options.contour_min_segment,
                0.01,
                5.0,
                defaults.contour_min_segment,
            ),
            hatch_min_segment: clamped(
                "hatch_min_segment",
                options.hatch_min_segment,
                0.01,
                5.0,
                defaults.hatch_min_segment,
            ),
            text_min_segment: clamped(
                "text_min_segment",
                options.text_min_segment,
                0.01,
                5.0,
                defaults.text_min_segment,
            ),
        };

        // Caller-level sanity check: flagged, not corrected.
        if config.pen_down_z >= config.pen_up_z {
            tracing::warn!(
                pen_down_z = config.pen_down_z,
                pen_up_z = config.pen_up_z,
                "pen_down_z is not below pen_up_z; the pen will not lift between strokes"
            );
        }

        config
    }

    /// Uniform source-to-machine scale.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    /// Pen-up travel height (mm).
    pub fn pen_up_z(&self) -> f64 {
        self.pen_up_z
    }

    /// Contour/text drawing depth (mm).
    pub fn pen_down_z(&self) -> f64 {
        self.pen_down_z
    }

    /// Hatching drawing depth (mm).
    pub fn hatch_depth(&self) -> f64 {
        self.hatch_depth
    }

    /// Drawing feed rate (mm/min).
    pub fn feed_rate(&self) -> f64 {
        self.feed_rate
    }

    /// Rapid/travel feed rate (mm/min).
    pub fn rapid_feed_rate(&self) -> f64 {
        self.rapid_feed_rate
    }

    /// Drawable rectangle (width, height) in mm.
    pub fn work_area(&self) -> (f64, f64) {
        self.work_area
    }

    /// Drawing depth for a stroke category.
    pub fn depth_for(&self, kind: StrokeKind) -> f64 {
        match kind {
            StrokeKind::Contour | StrokeKind::Text => self.pen_down_z,
            StrokeKind::Hatch => self.hatch_depth,
        }
    }

    /// Decimation threshold for a stroke category (machine units).
    pub fn min_segment(&self, kind: StrokeKind) -> f64 {
        match kind {
            StrokeKind::Contour => self.contour_min_segment,
            StrokeKind::Hatch => self.hatch_min_segment,
            StrokeKind::Text => self.text_min_segment,
        }
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self::new(MachineOptions::default())
    }
}

/// Clamp a numeric option into its admissible range. Non-finite values fall
/// back to the field default.
fn clamped(name: &str, value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if !value.is_finite() {
        tracing::warn!(option = name, %value, fallback, "non-finite option value replaced");
        return fallback;
    }
    let result = value.clamp(min, max);
    if result != value {
        tracing::debug!(option = name, value, clamped = result, "option value clamped into range");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_pass_through() {
        let config = MachineConfig::default();
        assert_eq!(config.scale_factor(), 0.3);
        assert_eq!(config.pen_up_z(), 5.0);
        assert_eq!(config.pen_down_z(), -0.5);
        assert_eq!(config.work_area(), (200.0, 200.0));
    }

    #[test]
    fn test_out_of_range_values_are_clamped_not_rejected() {
        let config = MachineConfig::new(MachineOptions {
            scale_factor: 100.0,
            pen_up_z: -3.0,
            pen_down_z: -99.0,
            feed_rate: 1.0,
            rapid_feed_rate: 1_000_000.0,
            work_area: (0.0, 5000.0),
            ..MachineOptions::default()
        });
        assert_eq!(config.scale_factor(), 10.0);
        assert_eq!(config.pen_up_z(), 0.0);
        assert_eq!(config.pen_down_z(), Z_FLOOR);
        assert_eq!(config.feed_rate(), 50.0);
        assert_eq!(config.rapid_feed_rate(), 10000.0);
        assert_eq!(config.work_area(), (10.0, 2000.0));
    }

    #[test]
    fn test_non_finite_falls_back_to_default() {
        let config = MachineConfig::new(MachineOptions {
            scale_factor: f64::NAN,
            feed_rate: f64::INFINITY,
            ..MachineOptions::default()
        });
        assert_eq!(config.scale_factor(), 0.3);
        assert_eq!(config.feed_rate(), 800.0);
    }

    #[test]
    fn test_category_policies() {
        let config = MachineConfig::default();
        assert_eq!(config.depth_for(StrokeKind::Contour), -0.5);
        assert_eq!(config.depth_for(StrokeKind::Text), -0.5);
        assert_eq!(config.depth_for(StrokeKind::Hatch), -0.35);
        assert_eq!(config.min_segment(StrokeKind::Contour), 0.3);
        assert_eq!(config.min_segment(StrokeKind::Hatch), 0.2);
    }
}
