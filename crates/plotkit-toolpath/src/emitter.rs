//! G-code emission.
//!
//! Turns an ordered, categorized stroke set into a motion-command document.
//! The emitter performs no I/O; its only output is the command list.
//!
//! Structure of the emitted program:
//! - header: units (G21), absolute positioning (G90), feed-per-minute (G94),
//!   pen lift, home;
//! - per stroke: rapid to the mapped start, plunge at half feed, decimated
//!   drawing moves, closing move for closed contours, retract;
//! - trailer: return to origin, pen lift, M5, M30.

use crate::mapper::CoordinateMapper;
use plotkit_core::{
    CommandLine, MachineConfig, Point, Polyline, Result, StrokeKind, StrokeSet, Z_CEILING, Z_FLOOR,
};

/// Emits G-code for one machine configuration.
#[derive(Debug, Clone)]
pub struct GCodeEmitter {
    config: MachineConfig,
}

impl GCodeEmitter {
    /// Create an emitter for the given configuration.
    pub fn new(config: MachineConfig) -> Self {
        Self { config }
    }

    /// Emit the full command list for an already-ordered stroke set.
    pub fn emit(&self, strokes: &StrokeSet) -> Result<Vec<CommandLine>> {
        let mapper =
            CoordinateMapper::new(&self.config, strokes.source_width(), strokes.source_height());
        let mut out = Vec::new();

        self.emit_header(&mut out, strokes);
        for kind in StrokeKind::ALL {
            for stroke in strokes.category(kind) {
                self.emit_stroke(&mut out, &mapper, stroke, kind)?;
            }
        }
        self.emit_trailer(&mut out);

        Ok(out)
    }

    /// Emit the newline-joined ASCII document.
    pub fn emit_document(&self, strokes: &StrokeSet) -> Result<String> {
        let lines = self.emit(strokes)?;
        let doc: Vec<String> = lines.iter().map(|l| l.to_string()).collect();
        Ok(doc.join("\n"))
    }

    fn emit_header(&self, out: &mut Vec<CommandLine>, strokes: &StrokeSet) {
        let pen_up = self.safe_z(self.config.pen_up_z());
        let rapid = self.config.rapid_feed_rate();

        out.push(CommandLine::comment_only("pen plotter drawing"));
        out.push(CommandLine::comment_only(format!(
            "{} contours, {} hatch lines, {} text strokes",
            strokes.category(StrokeKind::Contour).len(),
            strokes.category(StrokeKind::Hatch).len(),
            strokes.category(StrokeKind::Text).len(),
        )));
        out.push(CommandLine::new("G21 G90 G94"));
        out.push(CommandLine::new(format!("G0 Z{:.3} F{:.0}", pen_up, rapid)));
        out.push(CommandLine::new("G0 X0.000 Y0.000"));
    }

    fn emit_trailer(&self, out: &mut Vec<CommandLine>) {
        let pen_up = self.safe_z(self.config.pen_up_z());
        let rapid = self.config.rapid_feed_rate();

        out.push(CommandLine::new("G0 X0.000 Y0.000"));
        out.push(CommandLine::new(format!("G0 Z{:.3} F{:.0}", pen_up, rapid)));
        out.push(CommandLine::new("M5"));
        out.push(CommandLine::new("M30"));
    }

    fn emit_stroke(
        &self,
        out: &mut Vec<CommandLine>,
        mapper: &CoordinateMapper,
        stroke: &Polyline,
        kind: StrokeKind,
    ) -> Result<()> {
        let points = stroke.points();
        let first = points
            .first()
            .copied()
            .ok_or(plotkit_core::PipelineError::EmptyPolyline)?;

        let depth = self.safe_z(self.config.depth_for(kind));
        let pen_up = self.safe_z(self.config.pen_up_z());
        let threshold = self.config.min_segment(kind);
        let feed = self.config.feed_rate();
        let rapid = self.config.rapid_feed_rate();

        let start = self.safe_xy(mapper.map(first));
        out.push(CommandLine::new(format!(
            "G0 X{:.3} Y{:.3} F{:.0}",
            start.x, start.y, rapid
        )));
        // Plunge at half feed for a clean pen landing.
        out.push(CommandLine::new(format!("G1 Z{:.3} F{:.0}", depth, feed / 2.0)));

        let mut last_emitted = start;
        for point in &points[1..] {
            let mapped = self.safe_xy(mapper.map(*point));
            if mapped.distance_to(&last_emitted) > threshold {
                out.push(CommandLine::new(format!(
                    "G1 X{:.3} Y{:.3} F{:.0}",
                    mapped.x, mapped.y, feed
                )));
                last_emitted = mapped;
            }
        }

        if stroke.is_closed() && last_emitted.distance_to(&start) > threshold {
            out.push(CommandLine::new(format!(
                "G1 X{:.3} Y{:.3} F{:.0}",
                start.x, start.y, feed
            )));
        }

        out.push(CommandLine::new(format!("G1 Z{:.3} F{:.0}", pen_up, rapid)));
        Ok(())
    }

    /// Defensive second clamp onto the work area, guarding against mapper
    /// misuse.
    fn safe_xy(&self, point: Point) -> Point {
        let (width, height) = self.config.work_area();
        Point::new(point.x.clamp(0.0, width), point.y.clamp(0.0, height))
    }

    /// Clamp Z onto the machine-safe absolute bounds.
    fn safe_z(&self, z: f64) -> f64 {
        z.clamp(Z_FLOOR, Z_CEILING)
    }
}
