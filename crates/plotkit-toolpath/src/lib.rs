//! # Plotkit Toolpath
//!
//! The synchronous, pure computation pipeline that turns a categorized
//! [`StrokeSet`] into a G-code document:
//!
//! 1. [`optimizer`]: greedy reordering of disjoint strokes to shorten
//!    pen-up travel, run independently per category.
//! 2. [`mapper`]: source (pixel) space to machine (mm) space conversion
//!    with vertical flip, uniform scale, centering, and saturating clamp.
//! 3. [`emitter`]: command emission with per-category pen depth, feed
//!    rates, and point decimation.
//!
//! The pipeline performs no I/O; callers that need it off the UI thread can
//! run [`generate`] on a background execution context.

pub mod emitter;
pub mod mapper;
pub mod optimizer;

pub use emitter::GCodeEmitter;
pub use mapper::CoordinateMapper;
pub use optimizer::{optimize_strokes, order_by_travel};

use plotkit_core::{MachineConfig, Result, StrokeKind, StrokeSet};

/// Run the full pipeline: optimize each category, then map and emit.
///
/// Returns the newline-joined ASCII G-code document.
pub fn generate(strokes: &StrokeSet, config: &MachineConfig) -> Result<String> {
    let mut ordered = strokes.clone();
    for kind in StrokeKind::ALL {
        ordered.set_category(kind, optimize_strokes(ordered.category(kind)));
    }
    GCodeEmitter::new(config.clone()).emit_document(&ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plotkit_core::{Point, Polyline};

    #[test]
    fn test_generate_orders_and_emits() {
        let mut strokes = StrokeSet::new(200.0, 200.0);
        // Two far-apart hatch strokes inserted in travel-unfriendly order.
        strokes.push(
            StrokeKind::Hatch,
            Polyline::open(vec![Point::new(150.0, 150.0), Point::new(160.0, 150.0)]).unwrap(),
        );
        strokes.push(
            StrokeKind::Hatch,
            Polyline::open(vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0)]).unwrap(),
        );

        let config = MachineConfig::default();
        let doc = generate(&strokes, &config).unwrap();
        assert!(doc.contains("G21 G90 G94"));
        assert!(doc.ends_with("M30"));
    }
}
